//! Integrity fingerprints for serialized save blobs.
//!
//! The fingerprint is a 32-bit rolling multiply-accumulate hash over the
//! UTF-8 bytes of the blob. It detects accidental divergence; it is not a
//! cryptographic digest and collisions are an accepted risk.

use crate::error::{ProtocolError, ProtocolResult};
use std::fmt;
use std::str::FromStr;

/// Odd multiplier, so every step is a bijection on `u32`.
const MULTIPLIER: u32 = 31;

/// A 32-bit save fingerprint, rendered as 8 lowercase hex digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(u32);

impl Checksum {
    /// Computes the checksum of a byte sequence.
    pub fn of(bytes: &[u8]) -> Self {
        let hash = bytes.iter().fold(0u32, |acc, &byte| {
            acc.wrapping_mul(MULTIPLIER).wrapping_add(u32::from(byte))
        });
        Self(hash)
    }

    /// Returns the raw hash value.
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Returns true if `bytes` hash to this checksum.
    pub fn matches(&self, bytes: &[u8]) -> bool {
        Self::of(bytes) == *self
    }
}

impl fmt::Display for Checksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

impl FromStr for Checksum {
    type Err = ProtocolError;

    fn from_str(s: &str) -> ProtocolResult<Self> {
        if s.len() != 8 {
            return Err(ProtocolError::InvalidChecksum(s.to_string()));
        }
        u32::from_str_radix(s, 16)
            .map(Self)
            .map_err(|_| ProtocolError::InvalidChecksum(s.to_string()))
    }
}

/// Fingerprints a serialized blob into a fixed-width hex string.
pub fn fingerprint(blob: &str) -> String {
    Checksum::of(blob.as_bytes()).to_string()
}
