//! Error types for equil operations.
//!
//! Configuration errors are returned from constructors and leave no usable
//! entity behind. Everything else is recoverable and handed back to the
//! analysis driver.

use thiserror::Error;

/// Result type alias using the equil [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during equil operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid construction-time configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid scatter into the equation system.
    #[error("assembly error: {0}")]
    Assembly(String),

    /// Solver errors.
    #[error("solver error: {0}")]
    Solver(String),

    /// Matrix singularity or conditioning issues.
    #[error("singular matrix: {0}")]
    SingularMatrix(String),

    /// Transport failure on a serialization channel.
    #[error("channel error: {0}")]
    Channel(String),

    /// The object broker has no constructor for this class tag.
    #[error("unknown class tag: {0}")]
    UnknownClassTag(i32),

    /// Invalid parameter descriptor or update.
    #[error("parameter error: {0}")]
    Parameter(String),

    /// I/O errors from stream-backed channels.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Negative status code for drivers that work with return codes.
    pub fn status(&self) -> i32 {
        match self {
            Error::Config(_) => -1,
            Error::Assembly(_) => -2,
            Error::Solver(_) => -3,
            Error::SingularMatrix(_) => -4,
            Error::Channel(_) => -5,
            Error::UnknownClassTag(_) => -6,
            Error::Parameter(_) => -7,
            Error::Io(_) => -8,
        }
    }

    /// Whether the analysis driver may retry after this error.
    ///
    /// Only configuration errors are fatal.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Error::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_negative() {
        let errors = [
            Error::Config("x".into()),
            Error::Assembly("x".into()),
            Error::Solver("x".into()),
            Error::SingularMatrix("x".into()),
            Error::Channel("x".into()),
            Error::UnknownClassTag(99),
            Error::Parameter("x".into()),
        ];
        for err in &errors {
            assert!(err.status() < 0, "{err} should map to a negative status");
        }
    }

    #[test]
    fn test_only_config_is_fatal() {
        assert!(!Error::Config("bad".into()).is_recoverable());
        assert!(Error::SingularMatrix("pivot 0".into()).is_recoverable());
        assert!(Error::Channel("closed".into()).is_recoverable());
    }
}
