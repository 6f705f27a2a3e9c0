use crate::error::{BoxError, ParseError};
use serde::de::DeserializeOwned;
use std::{
    any::{type_name, Any, TypeId},
    collections::{BTreeMap, HashMap},
    fmt,
    marker::PhantomData,
    str::FromStr,
    sync::Arc,
    time::Duration,
};

/// A parsed value with its concrete type erased
pub type AnyValue = Box<dyn Any + Send>;

type ParseFn = dyn Fn(&str) -> Result<AnyValue, ParseError> + Send + Sync;
type ConvertFn = dyn Fn(AnyValue) -> Result<AnyValue, BoxError> + Send + Sync;

/// Concrete type of an erased value
pub(crate) fn concrete_type(value: &AnyValue) -> TypeId {
    let any: &dyn Any = &**value;
    any.type_id()
}

fn unexpected<T>() -> BoxError {
    format!("expected a value of type {}", type_name::<T>()).into()
}

/// A shareable function turning a raw environment string into a typed value
#[derive(Clone)]
pub struct Parser {
    func: Arc<ParseFn>,
}

impl Parser {
    /// Wrap a typed parsing function
    ///
    /// A `ParseError` returned by `func` is kept as is, any other error
    /// becomes [`ParseError::Custom`].
    pub fn new<T, F, E>(func: F) -> Self
    where
        T: Any + Send,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        Self {
            func: Arc::new(move |raw: &str| match func(raw) {
                Ok(value) => Ok(Box::new(value) as AnyValue),
                Err(err) => Err(ParseError::from_boxed(err.into())),
            }),
        }
    }

    pub fn parse(&self, raw: &str) -> Result<AnyValue, ParseError> {
        (self.func)(raw)
    }

    /// Parse and downcast in one step
    pub fn parse_as<T: Any>(&self, raw: &str) -> Result<T, ParseError> {
        self.parse(raw)?
            .downcast::<T>()
            .map(|value| *value)
            .map_err(|_| ParseError::Conversion {
                target: type_name::<T>(),
                source: unexpected::<T>(),
            })
    }

    /// Chain a conversion after this parser, used when a parser registered
    /// for a supertype serves one of its subtypes
    pub(crate) fn then(self, target: &'static str, convert: Arc<ConvertFn>) -> Self {
        let inner = self.func;
        Self {
            func: Arc::new(move |raw: &str| {
                let value = inner(raw)?;
                convert(value).map_err(|source| ParseError::Conversion { target, source })
            }),
        }
    }
}

impl fmt::Debug for Parser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Parser")
    }
}

#[derive(Clone)]
struct Supertype {
    id: TypeId,
    name: &'static str,
    convert: Arc<ConvertFn>,
}

/// Runtime description of a type that can be populated from the environment
///
/// Besides identifying the type it lists the supertypes the type "is-a",
/// each with a conversion from a value of the supertype, and optionally the
/// type's own string constructor.
#[derive(Clone)]
pub struct TypeDescriptor {
    id: TypeId,
    name: &'static str,
    construct: Option<Parser>,
    supertypes: Vec<Supertype>,
}

impl TypeDescriptor {
    /// Describe a type that has no string constructor
    pub fn of<T: Any + Send>() -> DescriptorBuilder<T> {
        DescriptorBuilder::new(None)
    }

    /// Describe a type constructible through its `FromStr` implementation
    pub fn constructible<T>() -> DescriptorBuilder<T>
    where
        T: FromStr + Any + Send,
        T::Err: Into<BoxError>,
    {
        let construct = Parser::new(|raw: &str| {
            raw.parse::<T>().map_err(|err| ParseError::Constructor {
                type_name: type_name::<T>(),
                input: raw.to_string(),
                source: err.into(),
            })
        });
        DescriptorBuilder::new(Some(construct))
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// The type's own string constructor, if it has one
    pub fn constructor(&self) -> Option<&Parser> {
        self.construct.as_ref()
    }

    /// Whether this type is-a `key`: the same type or one of its supertypes
    pub fn is_a(&self, key: TypeId) -> bool {
        self.id == key || self.supertypes.iter().any(|sup| sup.id == key)
    }

    /// Names of the declared supertypes, in declaration order
    pub fn supertype_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.supertypes.iter().map(|sup| sup.name)
    }

    /// Adapt a parser producing `key` values into one producing this type
    pub(crate) fn adapt(&self, key: TypeId, parser: &Parser) -> Option<Parser> {
        if self.id == key {
            return Some(parser.clone());
        }
        self.supertypes
            .iter()
            .find(|sup| sup.id == key)
            .map(|sup| parser.clone().then(self.name, Arc::clone(&sup.convert)))
    }

    /// Describe `U`, a wrapper built from this type with `wrap`
    ///
    /// The wrapper is-a this type and is-a everything this type is-a.
    pub fn wrap<T: Any, U: Any + Send>(self, wrap: fn(T) -> U) -> TypeDescriptor {
        let lift: Arc<ConvertFn> = Arc::new(move |value: AnyValue| {
            let inner = value.downcast::<T>().map_err(|_| unexpected::<T>())?;
            Ok(Box::new(wrap(*inner)) as AnyValue)
        });

        let mut supertypes = vec![Supertype {
            id: self.id,
            name: self.name,
            convert: Arc::clone(&lift),
        }];
        for sup in self.supertypes {
            let lift = Arc::clone(&lift);
            let convert = sup.convert;
            supertypes.push(Supertype {
                id: sup.id,
                name: sup.name,
                convert: Arc::new(move |value| lift(convert(value)?)),
            });
        }

        TypeDescriptor {
            id: TypeId::of::<U>(),
            name: type_name::<U>(),
            construct: self
                .construct
                .map(|parser| parser.then(type_name::<U>(), lift)),
            supertypes,
        }
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("constructible", &self.construct.is_some())
            .field("supertypes", &self.supertype_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Typed builder for a [`TypeDescriptor`]
pub struct DescriptorBuilder<T> {
    descriptor: TypeDescriptor,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send> DescriptorBuilder<T> {
    fn new(construct: Option<Parser>) -> Self {
        Self {
            descriptor: TypeDescriptor {
                id: TypeId::of::<T>(),
                name: type_name::<T>(),
                construct,
                supertypes: Vec::new(),
            },
            _marker: PhantomData,
        }
    }

    /// Declare that `T` is-a `S`, converting through `TryFrom<S>`
    pub fn is_a<S>(self) -> Self
    where
        S: Any,
        T: TryFrom<S>,
        <T as TryFrom<S>>::Error: Into<BoxError>,
    {
        self.is_a_with(|value: S| T::try_from(value))
    }

    /// Declare that `T` is-a `S`, converting with `convert`
    pub fn is_a_with<S, F, E>(mut self, convert: F) -> Self
    where
        S: Any,
        F: Fn(S) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.descriptor.supertypes.push(Supertype {
            id: TypeId::of::<S>(),
            name: type_name::<S>(),
            convert: Arc::new(move |value: AnyValue| {
                let value = value.downcast::<S>().map_err(|_| unexpected::<S>())?;
                match convert(*value) {
                    Ok(converted) => Ok(Box::new(converted) as AnyValue),
                    Err(err) => Err(err.into()),
                }
            }),
        });
        self
    }

    pub fn build(self) -> TypeDescriptor {
        self.descriptor
    }
}

/// A type that can be the declared type of a populated field
pub trait EnvValue: Any + Send {
    fn descriptor() -> TypeDescriptor;
}

// Integers all parse through the multi-base `i128` parser and narrow with `TryFrom`
crate::env_value! {
    i8 => i128,
    i16 => i128,
    i32 => i128,
    i64 => i128,
    isize => i128,
    u8 => i128,
    u16 => i128,
    u32 => i128,
    u64 => i128,
    u128 => i128,
    usize => i128,
}

crate::env_value!(
    i128,
    String,
    bool,
    char,
    f32,
    f64,
    std::path::PathBuf,
    std::ffi::OsString,
    std::net::IpAddr,
    std::net::Ipv4Addr,
    std::net::Ipv6Addr,
    std::net::SocketAddr,
    serde_json::Value,
    chrono::NaiveDate,
    chrono::NaiveTime,
    chrono::NaiveDateTime,
);

impl EnvValue for Duration {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Duration>().build()
    }
}

impl EnvValue for chrono::TimeDelta {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<chrono::TimeDelta>()
            .is_a_with(chrono::TimeDelta::from_std)
            .build()
    }
}

impl EnvValue for serde_json::Map<String, serde_json::Value> {
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Self>().build()
    }
}

impl<T> EnvValue for Vec<T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<Vec<T>>()
            .is_a_with(|items: Vec<serde_json::Value>| {
                serde_json::from_value(serde_json::Value::Array(items))
            })
            .build()
    }
}

impl<T> EnvValue for HashMap<String, T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<HashMap<String, T>>()
            .is_a_with(|map: serde_json::Map<String, serde_json::Value>| {
                serde_json::from_value(serde_json::Value::Object(map))
            })
            .build()
    }
}

impl<T> EnvValue for BTreeMap<String, T>
where
    T: DeserializeOwned + Send + 'static,
{
    fn descriptor() -> TypeDescriptor {
        TypeDescriptor::of::<BTreeMap<String, T>>()
            .is_a_with(|map: serde_json::Map<String, serde_json::Value>| {
                serde_json::from_value(serde_json::Value::Object(map))
            })
            .build()
    }
}

impl<T: EnvValue> EnvValue for Option<T> {
    fn descriptor() -> TypeDescriptor {
        T::descriptor().wrap::<T, Option<T>>(Some)
    }
}
