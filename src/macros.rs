/// Implement [`EnvValue`](crate::EnvValue) for types with a `FromStr` implementation
///
/// Plain types parse through their own `FromStr`. A `Type => Supertype`
/// entry additionally declares that the type is-a `Supertype`, so a parser
/// registered for the supertype is used and its result converted with
/// `TryFrom`.
///
/// ```rust
/// use viaenv::{env_value, TypeRegistry};
///
/// #[derive(Debug, PartialEq)]
/// struct Port(u16);
///
/// impl std::str::FromStr for Port {
///     type Err = std::num::ParseIntError;
///
///     fn from_str(s: &str) -> Result<Self, Self::Err> {
///         s.parse().map(Port)
///     }
/// }
///
/// env_value!(Port);
///
/// let registry = TypeRegistry::new();
/// let parser = registry.resolve_type::<Port>().unwrap();
/// assert_eq!(parser.parse_as::<Port>("8080").unwrap(), Port(8080));
/// ```
#[macro_export]
macro_rules! env_value {
    ($($ty:ty => $sup:ty),+ $(,)?) => {
        $(
            impl $crate::EnvValue for $ty {
                fn descriptor() -> $crate::TypeDescriptor {
                    $crate::TypeDescriptor::constructible::<$ty>()
                        .is_a::<$sup>()
                        .build()
                }
            }
        )+
    };
    ($($ty:ty),+ $(,)?) => {
        $(
            impl $crate::EnvValue for $ty {
                fn descriptor() -> $crate::TypeDescriptor {
                    $crate::TypeDescriptor::constructible::<$ty>().build()
                }
            }
        )+
    };
}
