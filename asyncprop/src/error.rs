use crate::Mode;
use thiserror::Error;

/// Errors raised while a property set is being configured or bound.
///
/// These are fatal: they surface immediately to whoever is declaring the
/// properties and are never retried.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum ConfigError {
    /// A property was declared without a getter.
    #[error("{mode:?} property '{name}' was declared without a get function")]
    MissingGetter { name: String, mode: Mode },

    /// A computed property has neither `watch` nor `watch_closely`.
    #[error("computed property '{name}' was declared without any kind of watch")]
    MissingWatch { name: String },

    /// A "load more" resolver was requested for a property without `more`.
    #[error("property '{name}' has no more getter")]
    MissingMore { name: String },

    /// Two properties on the same owner share a name.
    #[error("property '{name}' is declared more than once")]
    DuplicateProperty { name: String },

    /// A bound action was looked up by a name nothing registered.
    #[error("no action named '{name}'")]
    UnknownAction { name: String },

    /// A configuration object carried an unusable key.
    #[error("invalid option '{key}': {reason}")]
    InvalidConfig { key: String, reason: String },
}

/// Represents the failure of a single resolution attempt.
///
/// Resolution errors are contained per property: they are routed to the
/// error handler, recorded in the property's error field and never escape
/// the resolver invocation.
#[derive(Error, Debug, Clone, Eq, PartialEq)]
pub enum PropertyError {
    /// The future returned by the getter resolved to an error.
    #[error("{0}")]
    Rejected(String),

    /// The getter failed before producing a value or a future.
    #[error("{0}")]
    Thrown(String),
}

impl PropertyError {
    pub fn rejected(message: impl Into<String>) -> Self {
        PropertyError::Rejected(message.into())
    }

    pub fn thrown(message: impl Into<String>) -> Self {
        PropertyError::Thrown(message.into())
    }

    /// Returns true if this error came from a settled future.
    pub fn is_rejected(&self) -> bool {
        matches!(self, PropertyError::Rejected(_))
    }

    /// Returns true if the getter failed synchronously.
    pub fn is_thrown(&self) -> bool {
        matches!(self, PropertyError::Thrown(_))
    }

    pub fn message(&self) -> &str {
        match self {
            PropertyError::Rejected(message) | PropertyError::Thrown(message) => message,
        }
    }
}
