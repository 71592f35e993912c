//! Content hashes used as the identity of store entries.
//!
//! A thumbprint is the SHA-1 digest of the DER encoding of a certificate or
//! CRL. Its lowercase hex form is the key shared between decoded models,
//! [`PkiItem`](crate::pki_item::PkiItem) records and native store lookups.

use std::fmt;

use openssl::hash::{hash, MessageDigest};

use crate::error::{PkiError, Result};

/// Length of a SHA-1 thumbprint in bytes.
pub const THUMBPRINT_LEN: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Thumbprint([u8; THUMBPRINT_LEN]);

impl Thumbprint {
    /// SHA-1 over `encoded`.
    pub fn of(encoded: &[u8]) -> Self {
        Thumbprint(openssl::sha::sha1(encoded))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let array: [u8; THUMBPRINT_LEN] = bytes.try_into().map_err(|_| {
            PkiError::invalid_input(format!(
                "Thumbprint must be {} bytes, got {}",
                THUMBPRINT_LEN,
                bytes.len()
            ))
        })?;
        Ok(Thumbprint(array))
    }

    /// Parse 40 hex characters, either case.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex_decode(text)?;
        Self::from_bytes(&bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex_encode(&self.0)
    }
}

impl fmt::Display for Thumbprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// Digest `encoded` with the digest named `algorithm` (`"sha256"`, `"md_gost12_256"`, ...).
pub fn digest_named(encoded: &[u8], algorithm: &str) -> Result<Vec<u8>> {
    let md = MessageDigest::from_name(algorithm)
        .ok_or_else(|| PkiError::unsupported(format!("Unknown digest: {}", algorithm)))?;
    let bytes = hash(md, encoded)
        .map_err(|e| PkiError::encoding(format!("Failed to compute {} digest", algorithm), e))?;
    Ok(bytes.to_vec())
}

/// Lowercase hex.
pub fn hex_encode(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Case-insensitive hex decode.
pub fn hex_decode(text: &str) -> Result<Vec<u8>> {
    hex::decode(text)
        .map_err(|e| PkiError::invalid_input(format!("Invalid hex string '{}': {}", text, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_hex_round_trip() {
        let samples: [&[u8]; 4] = [b"", b"\x00", b"\xde\xad\xbe\xef", &[0xffu8; 33]];
        for bytes in samples {
            assert_eq!(hex_decode(&hex_encode(bytes)).unwrap(), bytes);
        }
    }

    #[test]
    fn test_hex_decode_ignores_case() {
        assert_eq!(hex_decode("DEADbeef").unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
        assert_eq!(hex_decode("zz").unwrap_err().kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_thumbprint_is_sha1() {
        // SHA-1("abc")
        let tp = Thumbprint::of(b"abc");
        assert_eq!(tp.to_hex(), "a9993e364706816aba3e25717850c26c9cd0d89d");
        assert_eq!(Thumbprint::from_hex(&tp.to_hex().to_uppercase()).unwrap(), tp);
    }

    #[test]
    fn test_thumbprint_length_checked() {
        let err = Thumbprint::from_hex("abcd").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_digest_named() {
        assert_eq!(digest_named(b"abc", "sha256").unwrap().len(), 32);
        let err = digest_named(b"abc", "no-such-digest").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnsupportedAlgorithm);
    }
}
