use crate::{
    descriptor::{EnvValue, Parser, TypeDescriptor},
    error::BoxError,
    parsers,
};
use std::{
    any::{type_name, Any, TypeId},
    fmt,
    sync::{LazyLock, PoisonError, RwLock},
};
use tracing::{trace, warn};

struct Entry {
    key: TypeId,
    name: &'static str,
    parser: Parser,
}

/// Ordered mapping from a key type to the parser that produces it
///
/// Resolution walks the entries in registration order and picks the first
/// key the requested type is-a. This is first match, not best match: a
/// parser registered for a supertype ahead of a more specific one shadows
/// it. The built-ins are registered with that in mind.
#[derive(Default)]
pub struct TypeRegistry {
    entries: Vec<Entry>,
}

impl TypeRegistry {
    /// An empty registry, every type falls back to its own `FromStr`
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in parsers
    ///
    /// In order: date-time, time, date, duration, JSON list, JSON mapping
    /// and multi-base integer.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        parsers::register_builtins(&mut registry);
        registry
    }

    /// Register `parser` as the parser for values of type `T`
    ///
    /// Registering a type again replaces the parser but keeps its position
    /// in the resolution order.
    pub fn register<T, F, E>(&mut self, parser: F) -> &mut Self
    where
        T: Any + Send,
        F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
        E: Into<BoxError>,
    {
        self.insert(TypeId::of::<T>(), type_name::<T>(), Parser::new(parser))
    }

    /// Register an already erased parser for the type described by `ty`
    pub fn register_parser(&mut self, ty: &TypeDescriptor, parser: Parser) -> &mut Self {
        self.insert(ty.id(), ty.name(), parser)
    }

    fn insert(&mut self, key: TypeId, name: &'static str, parser: Parser) -> &mut Self {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                warn!(ty = name, "replacing previously registered parser");
                entry.parser = parser;
            }
            None => self.entries.push(Entry { key, name, parser }),
        }
        self
    }

    /// Find the parser for `ty`
    ///
    /// Returns the parser of the first registered key `ty` is-a, adapted to
    /// produce `ty` itself, or else the type's own string constructor.
    pub fn resolve(&self, ty: &TypeDescriptor) -> Option<Parser> {
        for entry in &self.entries {
            if let Some(parser) = ty.adapt(entry.key, &entry.parser) {
                trace!(ty = ty.name(), via = entry.name, "resolved parser");
                return Some(parser);
            }
        }
        ty.constructor().cloned()
    }

    pub fn resolve_type<T: EnvValue>(&self) -> Option<Parser> {
        self.resolve(&T::descriptor())
    }

    pub fn contains<T: Any>(&self) -> bool {
        self.entries.iter().any(|entry| entry.key == TypeId::of::<T>())
    }

    /// Key type names in resolution order
    pub fn registered(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.entries.iter().map(|entry| entry.name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.registered()).finish()
    }
}

static GLOBAL: LazyLock<RwLock<TypeRegistry>> =
    LazyLock::new(|| RwLock::new(TypeRegistry::with_builtins()));

/// Register a parser in the process-wide registry used by
/// [`populate_from_env`](crate::populate_from_env)
///
/// Call this during startup, before populating anything. Population holds
/// the registry's read lock while parsers run, so a parser that calls this
/// function deadlocks.
pub fn register_type_parser<T, F, E>(parser: F)
where
    T: Any + Send,
    F: Fn(&str) -> Result<T, E> + Send + Sync + 'static,
    E: Into<BoxError>,
{
    GLOBAL
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .register(parser);
}

/// Run `f` with shared access to the process-wide registry
pub fn with_global_registry<R>(f: impl FnOnce(&TypeRegistry) -> R) -> R {
    let registry = GLOBAL.read().unwrap_or_else(PoisonError::into_inner);
    f(&registry)
}
