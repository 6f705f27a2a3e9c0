use crate::descriptor::{EnvValue, TypeDescriptor};

/// A field of a target: its name and declared type
#[derive(Debug, Clone)]
pub struct FieldDescriptor {
    /// Field name, upper-cased to build the environment key
    pub name: String,
    /// Declared type of the field
    pub ty: TypeDescriptor,
}

impl FieldDescriptor {
    pub fn new<T: EnvValue>(name: impl Into<String>) -> Self {
        Self::with_type(name, T::descriptor())
    }

    pub fn with_type(name: impl Into<String>, ty: TypeDescriptor) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}
