//! Error types for MediaCI.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // Registry errors
    #[error("Unknown worker pool: {0}")]
    UnknownPool(String),

    #[error("Specification name declared more than once: {0}")]
    AmbiguousName(String),

    #[error("Build {builder} depends on undeclared build {dependency}")]
    UnknownBuilder { builder: String, dependency: String },

    #[error("Dependency cycle through build: {0}")]
    DependencyCycle(String),

    #[error("Worker pool has no workers: {0}")]
    EmptyPool(String),

    #[error("Invalid specification: {0}")]
    InvalidSpecification(String),

    // Execution errors
    #[error("Stage {stage} of {build} failed: {message}")]
    StageFailed {
        build: String,
        stage: String,
        message: String,
    },

    #[error("Execution error: {0}")]
    Execution(String),

    // Smoke test errors
    #[error("Invalid reference: {0}")]
    InvalidReference(String),

    // Infrastructure errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Whether this error is raised while loading configuration.
    ///
    /// Configuration errors abort startup; everything else is scoped to a
    /// single event or build.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::UnknownPool(_)
                | Error::AmbiguousName(_)
                | Error::UnknownBuilder { .. }
                | Error::DependencyCycle(_)
                | Error::EmptyPool(_)
                | Error::InvalidSpecification(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
