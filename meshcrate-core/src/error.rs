//! Error types for meshcrate

use crate::mesh::PrimitiveType;
use thiserror::Error;

/// Main error type for meshcrate operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid primitive type: expected {expected:?}, got {actual:?}")]
    InvalidPrimitiveType {
        expected: PrimitiveType,
        actual: PrimitiveType,
    },
}

/// Result type alias for meshcrate operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Fail unless `actual` matches the primitive type an operation requires.
    pub fn check_primitive_type(expected: PrimitiveType, actual: PrimitiveType) -> Result<()> {
        if expected == actual {
            Ok(())
        } else {
            Err(Error::InvalidPrimitiveType { expected, actual })
        }
    }
}
