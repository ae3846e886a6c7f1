//! Content digests — BLAKE3-backed, hex-encoded, fixed width.
//!
//! `spec.md` permits any 256-bit collision-resistant hash with a hex
//! encoding; this workspace uses BLAKE3 throughout, matching the rest of
//! the stack's hashing choice.

use std::fmt;

/// Length in bytes of the underlying hash.
pub const DIGEST_BYTES: usize = 32;

/// Length in characters of the hex encoding.
pub const DIGEST_HEX_LEN: usize = DIGEST_BYTES * 2;

/// A lowercase hex-encoded 256-bit digest.
///
/// Validated on every construction path — there is no way to build one
/// from an arbitrary string without going through [`HexDigest::parse`],
/// which checks length and charset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HexDigest(String);

/// Errors constructing a [`HexDigest`] from untrusted input.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DigestError {
    #[error("digest has length {0}, expected {DIGEST_HEX_LEN}")]
    WrongLength(usize),
    #[error("digest contains non-hex or uppercase characters: {0:?}")]
    NotLowerHex(String),
}

impl HexDigest {
    /// Hash `bytes` and return its digest.
    pub fn of(bytes: &[u8]) -> Self {
        Self(hex::encode(blake3::hash(bytes).as_bytes()))
    }

    /// Parse a digest received over the wire or read from a manifest line.
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        if s.len() != DIGEST_HEX_LEN {
            return Err(DigestError::WrongLength(s.len()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b)) {
            return Err(DigestError::NotLowerHex(s.to_string()));
        }
        Ok(Self(s.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HexDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Root digest per spec.md §4.6 / §3: the hash of the *hex strings* of the
/// ordered chunk digests concatenated, not of their raw bytes.
pub fn root_digest<'a>(chunk_digests: impl Iterator<Item = &'a HexDigest>) -> HexDigest {
    let mut combined = String::with_capacity(DIGEST_HEX_LEN * 8);
    for d in chunk_digests {
        combined.push_str(d.as_str());
    }
    HexDigest::of(combined.as_bytes())
}
