//! Error taxonomy for the registry and the analyzers.

use thiserror::Error;

/// Errors raised by [`crate::registry::AnalyzerRegistry`].
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("analyzer '{0}' is already registered")]
    DuplicateKey(String),

    #[error("unsupported module '{key}' (available: {available})")]
    UnknownAnalyzer { key: String, available: String },

    #[error("failed to initialize analyzer '{key}': {source}")]
    Construction {
        key: String,
        #[source]
        source: ConstructionError,
    },
}

/// An analyzer could not be built.
#[derive(Debug, Error)]
pub enum ConstructionError {
    #[error("invalid analyzer settings: {0}")]
    InvalidSettings(String),

    #[error("missing dependency: {0}")]
    MissingDependency(String),

    #[error("invalid rule pattern '{id}': {source}")]
    InvalidRule {
        id: String,
        #[source]
        source: regex::Error,
    },
}

/// A request payload is structurally malformed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn field(field: &str, problem: impl std::fmt::Display) -> Self {
        Self::new(format!("field `{}` {}", field, problem))
    }
}

impl From<serde_json::Error> for ValidationError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(err.to_string())
    }
}

/// An analyzer failed while producing an assessment.
#[derive(Debug, Error)]
pub enum AnalysisFailure {
    #[error("malformed request reached analysis: {0}")]
    MalformedRequest(#[from] ValidationError),

    #[error("analyzer state is inconsistent: {0}")]
    InvalidState(String),

    #[error("dependency unavailable: {0}")]
    DependencyUnavailable(String),
}
