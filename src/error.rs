use miette::{Diagnostic, Result};
use thiserror::Error;

/// Main error type for the calendar filter
#[derive(Debug, Error, Diagnostic)]
pub enum Error {
    #[error("Configuration error: {0}")]
    #[diagnostic(code(calendar_filter::config))]
    Config(String),

    #[error("Upstream calendar {0} could not be resolved: {1}")]
    #[diagnostic(code(calendar_filter::upstream_resolution))]
    UpstreamResolution(String, String),

    #[error("Upstream calendar fetch failed: {0}")]
    #[diagnostic(code(calendar_filter::upstream_fetch))]
    UpstreamFetch(String),

    #[error("Upstream calendar {0} did not answer within {1}s")]
    #[diagnostic(code(calendar_filter::upstream_timeout))]
    UpstreamTimeout(String, u64),

    #[error("Template error: {0}")]
    #[diagnostic(code(calendar_filter::predicate))]
    Predicate(String),

    #[error("Component error: {0}")]
    #[diagnostic(code(calendar_filter::component))]
    Component(String),

    #[error(transparent)]
    #[diagnostic(code(calendar_filter::io))]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    #[diagnostic(code(calendar_filter::serialization))]
    Serialization(String),

    #[error("Other error: {0}")]
    #[diagnostic(code(calendar_filter::other))]
    Other(String),
}

impl Error {
    /// Whether the error means the events could not be determined right now,
    /// as opposed to there being no calendar to ask.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::UpstreamFetch(_) | Error::UpstreamTimeout(_, _))
    }
}

impl From<toml::ser::Error> for Error {
    fn from(err: toml::ser::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<minijinja::Error> for Error {
    fn from(err: minijinja::Error) -> Self {
        Error::Predicate(err.to_string())
    }
}

/// Type alias for Result with our Error type
pub type FilterResult<T> = Result<T, Error>;

/// Helper to create environment errors
pub fn env_error(var: &str) -> Error {
    Error::Config(format!("Environment variable error: {}", var))
}

/// Helper to create configuration errors
pub fn config_error(message: &str) -> Error {
    Error::Config(message.to_string())
}

/// Helper to create component errors
pub fn component_error(message: &str) -> Error {
    Error::Component(message.to_string())
}

/// Helper to create upstream fetch errors
pub fn upstream_error(message: &str) -> Error {
    Error::UpstreamFetch(message.to_string())
}

/// Helper to create resolution errors
pub fn resolution_error(entity_id: &str, reason: &str) -> Error {
    Error::UpstreamResolution(entity_id.to_string(), reason.to_string())
}
