//! woq-matmul error types

/// woq-matmul result type
pub type Result<T> = std::result::Result<T, Error>;

/// woq-matmul errors
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Error from numr operations
    #[error("numr error: {0}")]
    Numr(#[from] numr::error::Error),

    /// Malformed operator or graph configuration (fatal at build time)
    #[error("configuration error: {reason}")]
    Config {
        /// Description of what went wrong
        reason: String,
    },

    /// Serialized operator state does not match the expected layout
    #[error("serialization error: {reason}")]
    Serialization {
        /// Description of what went wrong
        reason: String,
    },

    /// Missing, mistyped or unparseable construction attributes
    #[error("attribute error: {reason}")]
    Attribute {
        /// Description of what went wrong
        reason: String,
    },

    /// Scratch workspace too small or regions overlapping
    #[error("workspace error: {reason}")]
    Workspace {
        /// Description of what went wrong
        reason: String,
    },

    /// Invalid argument to an operation
    #[error("invalid argument '{arg}': {reason}")]
    InvalidArgument {
        /// Argument name
        arg: &'static str,
        /// Why it's invalid
        reason: String,
    },
}

impl Error {
    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }
}
