use crate::{
    descriptor::{concrete_type, AnyValue},
    environment::{EnvSource, ProcessEnv},
    error::EnvError,
    field::FieldDescriptor,
    registry::{with_global_registry, TypeRegistry},
    EnvTarget,
};
use std::{any::type_name, collections::HashSet};
use tracing::debug;

/// Environment key for `field`: `PREFIX_FIELD`, or `FIELD` without a prefix
pub fn env_key(prefix: &str, field: &str) -> String {
    if prefix.is_empty() {
        field.to_uppercase()
    } else {
        format!("{}_{}", prefix.to_uppercase(), field.to_uppercase())
    }
}

/// Populate `target` from `env` (the process environment when `None`)
/// using the process-wide registry
///
/// Either every variable present for the target's fields is parsed and
/// applied, or nothing is. Fields without a variable keep their value.
///
/// # Example
/// ```rust
/// use std::{collections::HashMap, time::Duration};
/// use viaenv::{define_config, populate_from_env};
///
/// define_config! {
///     #[derive(Debug, Default)]
///     pub struct Server {
///         pub port: u16,
///         pub log_file: String,
///         pub timeout: Duration,
///     }
/// }
///
/// let env = HashMap::from([("SRV_PORT", "9000"), ("SRV_TIMEOUT", "300ms")]);
/// let mut server = Server {
///     port: 8080,
///     log_file: "/var/log/server.log".to_string(),
///     timeout: Duration::from_millis(100),
/// };
/// populate_from_env(&mut server, "srv", Some(&env)).unwrap();
///
/// assert_eq!(server.port, 9000);
/// assert_eq!(server.log_file, "/var/log/server.log");
/// assert_eq!(server.timeout, Duration::from_micros(300_000));
/// ```
pub fn populate_from_env<T: EnvTarget + ?Sized>(
    target: &mut T,
    prefix: &str,
    env: Option<&dyn EnvSource>,
) -> Result<(), EnvError> {
    with_global_registry(|registry| {
        let mut populator = Populator::new(registry).prefix(prefix);
        if let Some(env) = env {
            populator = populator.env(env);
        }
        populator.populate(target)
    })
}

/// Populates targets from an environment source through a given registry
///
/// # Example
/// ```rust
/// use std::collections::BTreeMap;
/// use viaenv::{define_config, Populator, TypeRegistry};
///
/// define_config! {
///     #[derive(Default)]
///     pub struct Limits {
///         pub max_connections: u32,
///     }
/// }
///
/// let registry = TypeRegistry::with_builtins();
/// let env = BTreeMap::from([("MAX_CONNECTIONS", "0x100")]);
/// let mut limits = Limits::default();
///
/// Populator::new(&registry).env(&env).populate(&mut limits).unwrap();
/// assert_eq!(limits.max_connections, 256);
/// ```
pub struct Populator<'a> {
    registry: &'a TypeRegistry,
    prefix: String,
    env: Option<&'a dyn EnvSource>,
}

impl<'a> Populator<'a> {
    pub fn new(registry: &'a TypeRegistry) -> Self {
        Self {
            registry,
            prefix: String::new(),
            env: None,
        }
    }

    /// Prefix joined with `_` in front of every field name
    pub fn prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    /// Read from `env` instead of the process environment
    pub fn env(mut self, env: &'a dyn EnvSource) -> Self {
        self.env = Some(env);
        self
    }

    /// Populate `target` using the fields it declares
    pub fn populate<T: EnvTarget + ?Sized>(&self, target: &mut T) -> Result<(), EnvError> {
        let fields = target.env_fields();
        self.apply(target, &fields)
    }

    /// Populate `target` using a caller supplied field list
    ///
    /// Every field in the list must be one the target declares, with the
    /// same type.
    pub fn populate_fields<T: EnvTarget + ?Sized>(
        &self,
        target: &mut T,
        fields: &[FieldDescriptor],
    ) -> Result<(), EnvError> {
        let declared = target.env_fields();
        for field in fields {
            let Some(known) = declared.iter().find(|known| known.name == field.name) else {
                return Err(EnvError::UnknownField {
                    field: field.name.clone(),
                    target: type_name::<T>().to_string(),
                });
            };
            if known.ty.id() != field.ty.id() {
                return Err(EnvError::TypeMismatch {
                    field: field.name.clone(),
                    expected: known.ty.name(),
                });
            }
        }
        self.apply(target, fields)
    }

    fn apply<T: EnvTarget + ?Sized>(
        &self,
        target: &mut T,
        fields: &[FieldDescriptor],
    ) -> Result<(), EnvError> {
        if fields.is_empty() {
            return Err(EnvError::MissingTypeInfo {
                target: type_name::<T>().to_string(),
            });
        }

        let mut keys = HashSet::with_capacity(fields.len());
        for field in fields {
            let key = env_key(&self.prefix, &field.name);
            if !keys.insert(key.clone()) {
                return Err(EnvError::DuplicateField {
                    field: field.name.clone(),
                    key,
                });
            }
        }

        let staged = self.stage(fields)?;
        debug!(
            target_type = type_name::<T>(),
            count = staged.len(),
            "applying values from environment"
        );

        // Names are unique and every value has its field's type, so a
        // well-formed target accepts all of them
        for (field, value) in staged {
            target
                .set_field(&field.name, value)
                .map_err(|_| EnvError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.ty.name(),
                })?;
        }
        Ok(())
    }

    /// Parse every present field without touching the target
    fn stage<'f>(
        &self,
        fields: &'f [FieldDescriptor],
    ) -> Result<Vec<(&'f FieldDescriptor, AnyValue)>, EnvError> {
        let env = self.env.unwrap_or(&ProcessEnv);
        let mut staged = Vec::with_capacity(fields.len());

        for field in fields {
            let key = env_key(&self.prefix, &field.name);
            let Some(raw) = env.get(&key) else {
                debug!(field = %field.name, key = %key, "not set, keeping current value");
                continue;
            };

            let parser = self
                .registry
                .resolve(&field.ty)
                .ok_or_else(|| EnvError::NoParser {
                    field: field.name.clone(),
                    key: key.clone(),
                    type_name: field.ty.name(),
                })?;

            let value = match parser.parse(&raw) {
                Ok(value) => value,
                Err(source) => {
                    return Err(EnvError::InvalidValue {
                        field: field.name.clone(),
                        key,
                        value: raw,
                        source,
                    })
                }
            };

            if concrete_type(&value) != field.ty.id() {
                return Err(EnvError::TypeMismatch {
                    field: field.name.clone(),
                    expected: field.ty.name(),
                });
            }
            staged.push((field, value));
        }

        Ok(staged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::ParseError, EnvValue, Parser, TypeDescriptor};
    use std::{collections::HashMap, time::Duration};

    /// Hand-written target, the way a caller without the macro would
    #[derive(Debug, Default)]
    struct Server {
        port: u16,
        timeout: Duration,
        name: String,
    }

    impl EnvTarget for Server {
        fn env_fields(&self) -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new::<u16>("port"),
                FieldDescriptor::new::<Duration>("timeout"),
                FieldDescriptor::new::<String>("name"),
            ]
        }

        fn set_field(&mut self, name: &str, value: AnyValue) -> Result<(), AnyValue> {
            match name {
                "port" => self.port = *value.downcast::<u16>()?,
                "timeout" => self.timeout = *value.downcast::<Duration>()?,
                "name" => self.name = *value.downcast::<String>()?,
                _ => return Err(value),
            }
            Ok(())
        }
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_env_key() {
        assert_eq!(env_key("srv", "port"), "SRV_PORT");
        assert_eq!(env_key("", "log_file"), "LOG_FILE");
        assert_eq!(env_key("My_App", "Timeout"), "MY_APP_TIMEOUT");
    }

    #[test]
    fn test_populate_with_prefix() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("SRV_PORT", "9000"), ("SRV_TIMEOUT", "300ms")]);
        let mut server = Server {
            name: "api".to_string(),
            ..Server::default()
        };

        Populator::new(&registry)
            .prefix("srv")
            .env(&env)
            .populate(&mut server)
            .unwrap();

        assert_eq!(server.port, 9000);
        assert_eq!(server.timeout, Duration::from_micros(300_000));
        assert_eq!(server.name, "api");
    }

    #[test]
    fn test_failure_is_atomic() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("PORT", "9000"), ("TIMEOUT", "5xx"), ("NAME", "api")]);
        let mut server = Server {
            port: 8080,
            timeout: Duration::from_secs(1),
            name: "before".to_string(),
        };

        let err = Populator::new(&registry)
            .env(&env)
            .populate(&mut server)
            .unwrap_err();

        assert_eq!(err.unknown_unit(), Some("xx"));
        match err {
            EnvError::InvalidValue {
                field, key, value, ..
            } => {
                assert_eq!(field, "timeout");
                assert_eq!(key, "TIMEOUT");
                assert_eq!(value, "5xx");
            }
            other => panic!("Expected InvalidValue error, got {:?}", other),
        }
        assert_eq!(server.port, 8080);
        assert_eq!(server.timeout, Duration::from_secs(1));
        assert_eq!(server.name, "before");
    }

    #[test]
    fn test_absent_variables_are_skipped() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[]);
        let mut server = Server {
            port: 8080,
            ..Server::default()
        };

        Populator::new(&registry)
            .env(&env)
            .populate(&mut server)
            .unwrap();
        assert_eq!(server.port, 8080);
    }

    #[test]
    fn test_empty_field_list() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("PORT", "9000")]);
        let mut server = Server::default();

        let err = Populator::new(&registry)
            .env(&env)
            .populate_fields(&mut server, &[])
            .unwrap_err();
        assert!(matches!(err, EnvError::MissingTypeInfo { .. }));
        assert_eq!(server.port, 0);
    }

    #[test]
    fn test_caller_supplied_fields() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("PORT", "9000"), ("NAME", "api")]);
        let mut server = Server::default();

        Populator::new(&registry)
            .env(&env)
            .populate_fields(&mut server, &[FieldDescriptor::new::<String>("name")])
            .unwrap();
        assert_eq!(server.name, "api");
        assert_eq!(server.port, 0);
    }

    #[test]
    fn test_no_parser_for_opaque_type() {
        struct Handle;

        struct Device {
            handle: Option<Handle>,
        }

        impl EnvTarget for Device {
            fn env_fields(&self) -> Vec<FieldDescriptor> {
                vec![FieldDescriptor::with_type(
                    "handle",
                    TypeDescriptor::of::<Handle>().build(),
                )]
            }

            fn set_field(&mut self, name: &str, value: AnyValue) -> Result<(), AnyValue> {
                match name {
                    "handle" => self.handle = Some(*value.downcast::<Handle>()?),
                    _ => return Err(value),
                }
                Ok(())
            }
        }

        let registry = TypeRegistry::with_builtins();
        let env = env(&[("HANDLE", "3")]);
        let mut device = Device { handle: None };

        let err = Populator::new(&registry)
            .env(&env)
            .populate(&mut device)
            .unwrap_err();
        assert!(matches!(err, EnvError::NoParser { ref key, .. } if key == "HANDLE"));
        assert!(device.handle.is_none());
    }

    /// Declares two fields under one name, which only the first setter arm serves
    #[derive(Debug, Default)]
    struct Clash {
        port: u16,
        label: String,
    }

    impl EnvTarget for Clash {
        fn env_fields(&self) -> Vec<FieldDescriptor> {
            vec![
                FieldDescriptor::new::<u16>("port"),
                FieldDescriptor::new::<String>("port"),
            ]
        }

        fn set_field(&mut self, name: &str, value: AnyValue) -> Result<(), AnyValue> {
            match name {
                "port" => self.port = *value.downcast::<u16>()?,
                "label" => self.label = *value.downcast::<String>()?,
                _ => return Err(value),
            }
            Ok(())
        }
    }

    #[test]
    fn test_duplicate_names_write_nothing() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("SRV_PORT", "9000")]);
        let mut clash = Clash {
            port: 1,
            ..Clash::default()
        };

        let err = Populator::new(&registry)
            .prefix("srv")
            .env(&env)
            .populate(&mut clash)
            .unwrap_err();

        match err {
            EnvError::DuplicateField { field, key } => {
                assert_eq!(field, "port");
                assert_eq!(key, "SRV_PORT");
            }
            other => panic!("Expected DuplicateField error, got {:?}", other),
        }
        assert_eq!(clash.port, 1);
        assert_eq!(clash.label, "");
    }

    #[test]
    fn test_repeated_field_in_list() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("PORT", "9000")]);
        let mut server = Server::default();
        let fields = [
            FieldDescriptor::new::<u16>("port"),
            FieldDescriptor::new::<u16>("port"),
        ];

        let err = Populator::new(&registry)
            .env(&env)
            .populate_fields(&mut server, &fields)
            .unwrap_err();
        assert!(matches!(err, EnvError::DuplicateField { ref key, .. } if key == "PORT"));
        assert_eq!(server.port, 0);
    }

    #[test]
    fn test_undeclared_field_writes_nothing() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("PORT", "9000"), ("WORKERS", "4")]);
        let mut server = Server::default();
        let fields = [
            FieldDescriptor::new::<u16>("port"),
            FieldDescriptor::new::<u32>("workers"),
        ];

        let err = Populator::new(&registry)
            .env(&env)
            .populate_fields(&mut server, &fields)
            .unwrap_err();
        assert!(matches!(err, EnvError::UnknownField { ref field, .. } if field == "workers"));
        assert_eq!(server.port, 0);
    }

    #[test]
    fn test_field_with_wrong_type_writes_nothing() {
        let registry = TypeRegistry::with_builtins();
        let env = env(&[("NAME", "api"), ("PORT", "9000")]);
        let mut server = Server::default();
        let fields = [
            FieldDescriptor::new::<String>("name"),
            FieldDescriptor::new::<u32>("port"),
        ];

        let err = Populator::new(&registry)
            .env(&env)
            .populate_fields(&mut server, &fields)
            .unwrap_err();
        assert!(matches!(err, EnvError::TypeMismatch { ref field, .. } if field == "port"));
        assert_eq!(server.name, "");
        assert_eq!(server.port, 0);
    }

    #[test]
    fn test_mismatched_parser_output() {
        let mut registry = TypeRegistry::new();
        registry.register_parser(
            &u16::descriptor(),
            Parser::new(|_: &str| Ok::<_, ParseError>("not a port".to_string())),
        );
        let env = env(&[("PORT", "1")]);
        let mut server = Server::default();

        let err = Populator::new(&registry)
            .env(&env)
            .populate(&mut server)
            .unwrap_err();
        assert!(matches!(err, EnvError::TypeMismatch { ref field, .. } if field == "port"));
    }

    #[test]
    fn test_global_populate() {
        let env = env(&[("SRV_PORT", "0x1F90")]);
        let mut server = Server::default();

        populate_from_env(&mut server, "srv", Some(&env)).unwrap();
        assert_eq!(server.port, 8080);
    }
}
