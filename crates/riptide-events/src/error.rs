//! Identifier and frame decoding errors.

use std::fmt::{self, Display, Formatter};

/// Error raised when a value cannot be interpreted as a content id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentIdError {
    /// The value had an unexpected number of characters.
    InvalidLength {
        /// Expected character count.
        expected: usize,
        /// Observed character count.
        actual: usize,
    },
    /// The value contained characters outside the encoding alphabet.
    InvalidCharacter,
}

impl Display for ContentIdError {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidLength { .. } => formatter.write_str("content id has invalid length"),
            Self::InvalidCharacter => formatter.write_str("content id has invalid characters"),
        }
    }
}

impl std::error::Error for ContentIdError {}
