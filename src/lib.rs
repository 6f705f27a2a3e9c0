//! Populate typed configuration from environment variables.
//!
//! Every field of a target is looked up as `PREFIX_FIELD` in an environment
//! source. The raw string is converted by the parser a [`TypeRegistry`]
//! resolves for the field type. Either all present values are applied or
//! none is.
//!
//! ```rust
//! use std::{collections::HashMap, time::Duration};
//! use viaenv::{define_config, EnvTarget, Populator, TypeRegistry};
//!
//! define_config! {
//!     #[derive(Debug, Default)]
//!     pub struct Worker {
//!         pub threads: usize,
//!         pub poll: Duration,
//!         pub queues: Vec<String>,
//!         #[env(skip)]
//!         pub handle: Option<std::fs::File>,
//!     }
//! }
//!
//! let registry = TypeRegistry::with_builtins();
//! let env = HashMap::from([
//!     ("WORKER_THREADS", "8"),
//!     ("WORKER_POLL", "1m30s"),
//!     ("WORKER_QUEUES", r#"["mail", "billing"]"#),
//! ]);
//!
//! let mut worker = Worker::default();
//! Populator::new(&registry)
//!     .prefix("worker")
//!     .env(&env)
//!     .populate(&mut worker)
//!     .unwrap();
//!
//! assert_eq!(worker.threads, 8);
//! assert_eq!(worker.poll, Duration::from_secs(90));
//! assert_eq!(worker.queues, ["mail", "billing"]);
//! ```

pub mod descriptor;
pub mod environment;
pub mod error;
pub mod field;
pub mod macros;
pub mod parsers;
pub mod populate;
pub mod registry;

// Re-export main types
pub use descriptor::{AnyValue, DescriptorBuilder, EnvValue, Parser, TypeDescriptor};
pub use environment::{DotenvFile, EnvSource, ProcessEnv};
pub use error::{BoxError, EnvError, ParseError};
pub use field::FieldDescriptor;
pub use populate::{env_key, populate_from_env, Populator};
pub use registry::{register_type_parser, with_global_registry, TypeRegistry};

// Re-export macro
pub use viaenv_macros::define_config;

/// A value whose fields can be populated from the environment
///
/// Usually implemented through [`define_config!`], which only accepts
/// structs with named fields and gives every field its own environment
/// name. Each of these fails to compile:
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Port(u16);
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Marker;
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub enum Mode { Fast, Slow }
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Server {
///         #[env(rename = "")]
///         pub port: u16,
///     }
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Server {
///         #[env(skip, rename = "listen_port")]
///         pub port: u16,
///     }
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Server {
///         #[env(default = "8080")]
///         pub port: u16,
///     }
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Server {
///         pub port: u16,
///         #[env(rename = "port")]
///         pub label: String,
///     }
/// }
/// ```
///
/// ```compile_fail
/// viaenv::define_config! {
///     pub struct Server {
///         pub port: u16,
///         #[env(rename = "PORT")]
///         pub label: String,
///     }
/// }
/// ```
///
/// The same struct with distinct names compiles:
///
/// ```rust
/// viaenv::define_config! {
///     pub struct Server {
///         pub port: u16,
///         #[env(rename = "listen_label")]
///         pub label: String,
///     }
/// }
/// ```
pub trait EnvTarget {
    /// Fields in declaration order
    fn env_fields(&self) -> Vec<FieldDescriptor>;

    /// Store `value` into the field called `name`
    ///
    /// Hands the value back when there is no such field or the value has
    /// the wrong type.
    fn set_field(&mut self, name: &str, value: AnyValue) -> Result<(), AnyValue>;

    /// Populate from the process environment with the process-wide registry
    fn populate_from_env(&mut self, prefix: &str) -> Result<(), EnvError> {
        populate::populate_from_env(self, prefix, None)
    }
}
