//! Perceptual hash values.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ModelError, ModelResult};

/// Length of a hash rendered as hex.
pub const PHASH_HEX_LEN: usize = 64;

const WORDS: usize = 4;
const BITS: usize = WORDS * 64;

/// A 256-bit perceptual fingerprint.
///
/// Stored big-endian across four words so that the hex form reads the same
/// way the bits were shifted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PerceptualHash([u64; WORDS]);

impl PerceptualHash {
    /// Build a hash by shifting `bits` in from the right, first bit most significant.
    ///
    /// Extra leading bits beyond 256 are discarded.
    pub fn from_bits<I>(bits: I) -> Self
    where
        I: IntoIterator<Item = bool>,
    {
        let mut words = [0u64; WORDS];
        for bit in bits {
            for i in 0..WORDS {
                let carry = if i + 1 < WORDS { words[i + 1] >> 63 } else { bit as u64 };
                words[i] = (words[i] << 1) | carry;
            }
        }
        Self(words)
    }

    /// Number of differing bits between two hashes.
    pub fn distance(&self, other: &Self) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }

    /// Value of the bit at `position`, counted from the least significant end.
    pub fn bit(&self, position: usize) -> bool {
        if position >= BITS {
            return false;
        }
        let word = WORDS - 1 - position / 64;
        (self.0[word] >> (position % 64)) & 1 == 1
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|w| format!("{:016x}", w)).collect()
    }

    pub fn from_hex(hex: &str) -> ModelResult<Self> {
        let hex = hex.trim();
        if hex.len() != PHASH_HEX_LEN || !hex.is_ascii() {
            return Err(ModelError::invalid_hash(format!(
                "expected {} hex characters, got {}",
                PHASH_HEX_LEN,
                hex.len()
            )));
        }

        let mut words = [0u64; WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            let chunk = &hex[i * 16..(i + 1) * 16];
            *word = u64::from_str_radix(chunk, 16)
                .map_err(|e| ModelError::invalid_hash(format!("{}: {}", chunk, e)))?;
        }
        Ok(Self(words))
    }
}

impl fmt::Display for PerceptualHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for PerceptualHash {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl TryFrom<String> for PerceptualHash {
    type Error = ModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<PerceptualHash> for String {
    fn from(value: PerceptualHash) -> Self {
        value.to_hex()
    }
}

/// Hash of one slide file, computed once per post-processing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlideHash {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub p_hash: Option<PerceptualHash>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SlideHash {
    pub fn ok(filename: impl Into<String>, hash: PerceptualHash) -> Self {
        Self {
            filename: filename.into(),
            p_hash: Some(hash),
            error: None,
        }
    }

    pub fn failed(filename: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            p_hash: None,
            error: Some(error.into()),
        }
    }

    /// The hash, if it was computed without error.
    pub fn usable_hash(&self) -> Option<&PerceptualHash> {
        match (&self.p_hash, &self.error) {
            (Some(hash), None) => Some(hash),
            _ => None,
        }
    }
}
