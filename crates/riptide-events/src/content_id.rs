//! Stable identifier for a transfer session.

use std::fmt::{self, Display, Formatter};
use std::str::FromStr;

use data_encoding::BASE32;
use serde::{Deserialize, Serialize};

use crate::error::ContentIdError;

/// Length of a hex-encoded v1 info hash.
pub const CONTENT_ID_HEX_LEN: usize = 40;
/// Length of a base32-encoded v1 info hash.
pub const CONTENT_ID_BASE32_LEN: usize = 32;

/// Content identifier derived from the torrent info hash.
///
/// Always 40 lowercase hex characters; construction normalises case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentId(String);

impl ContentId {
    /// Parse a 40 character hex info hash (any case).
    ///
    /// # Errors
    ///
    /// Returns an error when the value has the wrong length or contains
    /// non-hex characters.
    pub fn parse_hex(value: &str) -> Result<Self, ContentIdError> {
        if value.len() != CONTENT_ID_HEX_LEN {
            return Err(ContentIdError::InvalidLength {
                expected: CONTENT_ID_HEX_LEN,
                actual: value.len(),
            });
        }
        hex::decode(value).map_err(|_| ContentIdError::InvalidCharacter)?;
        Ok(Self(value.to_ascii_lowercase()))
    }

    /// Decode a 32 character RFC 4648 base32 info hash into its hex form.
    ///
    /// # Errors
    ///
    /// Returns an error when the value has the wrong length or falls outside
    /// the base32 alphabet.
    pub fn parse_base32(value: &str) -> Result<Self, ContentIdError> {
        if value.len() != CONTENT_ID_BASE32_LEN {
            return Err(ContentIdError::InvalidLength {
                expected: CONTENT_ID_BASE32_LEN,
                actual: value.len(),
            });
        }
        let bytes = BASE32
            .decode(value.to_ascii_uppercase().as_bytes())
            .map_err(|_| ContentIdError::InvalidCharacter)?;
        Ok(Self(hex::encode(bytes)))
    }

    /// Borrow the lowercase hex representation.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for ContentId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> fmt::Result {
        formatter.write_str(&self.0)
    }
}

impl FromStr for ContentId {
    type Err = ContentIdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::parse_hex(value)
    }
}

impl TryFrom<String> for ContentId {
    type Error = ContentIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse_hex(&value)
    }
}

impl From<ContentId> for String {
    fn from(value: ContentId) -> Self {
        value.0
    }
}
