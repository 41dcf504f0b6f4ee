//! Error taxonomy shared by every tree, resource and session operation

use thiserror::Error;

use crate::sample::DataType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HubError {
    /// Path or resource absent. Expected during normal operation.
    #[error("Not found: {0}")]
    NotFound(String),
    /// Conflicting re-creation, or re-binding an already bound session.
    #[error("Duplicate: {0}")]
    Duplicate(String),
    #[error("Type mismatch: resource is {expected}, sample is {actual}")]
    TypeMismatch { expected: DataType, actual: DataType },
    #[error("Malformed path: {0}")]
    MalformedPath(String),
    #[error("Not permitted: {0}")]
    NotPermitted(String),
    #[error("Out of memory: {0} pool exhausted")]
    OutOfMemory(&'static str),
    /// Bounded text (string value, JSON value, units) too long.
    #[error("Overflow: {0}")]
    Overflow(String),
    /// JSON value that does not parse.
    #[error("Format error: {0}")]
    Format(String),
}

pub type Result<T> = std::result::Result<T, HubError>;
