//! Error types for policy validation and synthesis.

use thiserror::Error;

use crate::policy::FileType;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PolicyError {
    #[error("invalid policy: keypair alias is empty")]
    EmptyKeypairAlias,

    #[error("invalid policy: keypair alias {0:?} contains whitespace or control characters")]
    InvalidKeypairAlias(String),

    #[error("invalid policy: {file_type} target has an empty path")]
    EmptyTargetPath { file_type: FileType },
}

/// Result type for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;
