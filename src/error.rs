use colored::Colorize;
use std::{fmt, path::PathBuf};

/// Boxed error returned by user supplied parsers and conversions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while converting a single raw string into a typed value
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("'{input}' is not an integer (expected decimal or 0x/0o/0b prefixed digits)")]
    InvalidInteger { input: String },

    #[error("'{input}' is not a valid {kind}: {source}")]
    InvalidTemporal {
        kind: &'static str,
        input: String,
        #[source]
        source: chrono::ParseError,
    },

    #[error("unknown time unit '{unit}' in '{input}'")]
    UnknownUnit { unit: String, input: String },

    #[error("duration '{input}' is too large")]
    DurationOverflow { input: String },

    #[error("'{input}' is not valid JSON: {source}")]
    Json {
        input: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("'{input}' is not a list")]
    NotAList { input: String },

    #[error("'{input}' is not a mapping")]
    NotAMapping { input: String },

    #[error("cannot build {type_name} from '{input}': {source}")]
    Constructor {
        type_name: &'static str,
        input: String,
        #[source]
        source: BoxError,
    },

    #[error("cannot convert to {target}: {source}")]
    Conversion {
        target: &'static str,
        #[source]
        source: BoxError,
    },

    #[error("{0}")]
    Custom(#[source] BoxError),
}

impl ParseError {
    /// Recover a `ParseError` from a boxed error, wrapping anything else as `Custom`
    pub fn from_boxed(err: BoxError) -> Self {
        match err.downcast::<ParseError>() {
            Ok(parse_err) => *parse_err,
            Err(other) => ParseError::Custom(other),
        }
    }
}

/// Errors that can occur while populating a target from the environment
#[derive(Debug)]
pub enum EnvError {
    /// The target exposed no fields at all
    MissingTypeInfo { target: String },
    /// Two fields map to the same environment key
    DuplicateField { field: String, key: String },
    /// A field in the list is not one the target declares
    UnknownField { field: String, target: String },
    /// A present environment variable could not be converted to the field type
    InvalidValue {
        field: String,
        key: String,
        value: String,
        source: ParseError,
    },
    /// Nothing in the registry handles the field type and it has no string constructor
    NoParser {
        field: String,
        key: String,
        type_name: &'static str,
    },
    /// A parser produced a value of a different type than the field declares
    TypeMismatch { field: String, expected: &'static str },
    /// A dotenv file could not be loaded
    Dotenv {
        path: PathBuf,
        source: dotenvy::Error,
    },
}

impl EnvError {
    /// The offending unit when this is a duration with an unknown unit
    pub fn unknown_unit(&self) -> Option<&str> {
        match self {
            EnvError::InvalidValue {
                source: ParseError::UnknownUnit { unit, .. },
                ..
            } => Some(unit),
            _ => None,
        }
    }

    /// Name of the field the error is about, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            EnvError::InvalidValue { field, .. }
            | EnvError::NoParser { field, .. }
            | EnvError::TypeMismatch { field, .. }
            | EnvError::DuplicateField { field, .. }
            | EnvError::UnknownField { field, .. } => Some(field),
            EnvError::MissingTypeInfo { .. } | EnvError::Dotenv { .. } => None,
        }
    }
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EnvError::MissingTypeInfo { target } => {
                writeln!(
                    f,
                    "{}: No field type information to populate from",
                    target.magenta().bold()
                )
            }
            EnvError::DuplicateField { field, key } => {
                writeln!(
                    f,
                    "{}: Used by more than one field",
                    key.magenta().bold()
                )?;
                writeln!(f, "\tField: {}", field)
            }
            EnvError::UnknownField { field, target } => {
                writeln!(
                    f,
                    "{}: Not a field of {}",
                    field.magenta().bold(),
                    target.cyan()
                )
            }
            EnvError::InvalidValue {
                field,
                key,
                value,
                source,
            } => {
                writeln!(
                    f,
                    "{}: Invalid value {}",
                    key.magenta().bold(),
                    format!("'{}'", value).red(),
                )?;
                writeln!(f, "\tField: {}", field)?;
                writeln!(f, "\tCause: {}", source)
            }
            EnvError::NoParser {
                field,
                key,
                type_name,
            } => {
                writeln!(
                    f,
                    "{}: No parser registered for type {}",
                    key.magenta().bold(),
                    type_name.cyan()
                )?;
                writeln!(f, "\tField: {}", field)
            }
            EnvError::TypeMismatch { field, expected } => {
                writeln!(
                    f,
                    "{}: Parser produced a value that is not {}",
                    field.magenta().bold(),
                    expected.cyan()
                )
            }
            EnvError::Dotenv { path, source } => {
                writeln!(
                    f,
                    "{}: Could not load dotenv file",
                    path.display().to_string().magenta().bold()
                )?;
                writeln!(f, "\tCause: {}", source)
            }
        }
    }
}

impl std::error::Error for EnvError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            EnvError::InvalidValue { source, .. } => Some(source),
            EnvError::Dotenv { source, .. } => Some(source),
            _ => None,
        }
    }
}
