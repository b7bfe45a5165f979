//! Content addressing.

use crate::error::{Error, ErrorKind};
use std::fmt;
use std::str::FromStr;

/// A 256-bit content identifier, displayed as lowercase hex.
///
/// Blob endpoints address content by this value. Treat it as opaque: the
/// only operations that make sense are equality, hashing and display.
///
/// ```
/// use pubsite_remote::ContentHash;
///
/// let hash: ContentHash = "ab".repeat(32).parse().unwrap();
/// assert_eq!(hash.to_string(), "ab".repeat(32));
/// assert!("not-a-hash".parse::<ContentHash>().is_err());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(blake3::Hash::from_bytes(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        self.0.as_bytes()
    }

    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }
}

impl From<blake3::Hash> for ContentHash {
    fn from(hash: blake3::Hash) -> Self {
        Self(hash)
    }
}

impl FromStr for ContentHash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept upper-case hex from sloppy peers, but always print lower-case.
        let hash = blake3::Hash::from_hex(s.to_ascii_lowercase()).map_err(|_| ErrorKind::InvalidHash(s.to_string()))?;
        Ok(Self(hash))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hex = self.to_hex();
        write!(f, "ContentHash({})", hex.get(..16).unwrap_or(&hex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_display_is_lowercase_hex() {
        let hash = ContentHash::from_bytes([0xAB; 32]);
        assert_eq!(hash.to_string(), "ab".repeat(32));
        assert_eq!(hash.to_string().len(), 64);
    }

    #[test]
    fn test_parse_uppercase() {
        let hash: ContentHash = "CD".repeat(32).parse().unwrap();
        assert_eq!(hash, ContentHash::from_bytes([0xCD; 32]));
    }

    #[rstest]
    #[case("")]
    #[case("abc")]
    #[case("zzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzzz")]
    #[case("ababababababababababababababababababababababababababababababababab")]
    fn test_parse_invalid(#[case] input: &str) {
        let err = input.parse::<ContentHash>().unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidHash(_)));
    }

    #[test]
    fn test_debug_is_abbreviated() {
        let hash = ContentHash::from_bytes([0x01; 32]);
        assert_eq!(format!("{hash:?}"), "ContentHash(0101010101010101)");
    }
}
