//! blake3 plan hashing.
//!
//! A plan hash covers the serialized plan description plus the exact bits
//! of any in-core operands, so two plans that print the same but multiply
//! by different small matrices still hash apart.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{Error, Result};

/// 32-byte digest, serialized as lowercase hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    pub fn to_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.0 {
            use std::fmt::Write as _;
            let _ = write!(&mut s, "{b:02x}");
        }
        s
    }

    /// First 8 hex digits, for log lines.
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash256 {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.len() != 64 || !s.is_ascii() {
            return Err(Error::Hash(format!("expected 64 hex digits, got {:?}", s)));
        }
        let mut out = [0u8; 32];
        for (i, byte) in out.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[2 * i..2 * i + 2], 16)
                .map_err(|e| Error::Hash(format!("bad hex digest: {e}")))?;
        }
        Ok(Hash256(out))
    }
}

impl Serialize for Hash256 {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Hash256 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Incremental hasher. Sections are length-prefixed; concatenating
/// different parts can't produce the same byte stream.
#[derive(Default)]
pub struct PlanHasher {
    inner: blake3::Hasher,
}

impl PlanHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a serde value as canonical JSON.
    pub fn update_json<T: Serialize>(&mut self, v: &T) -> Result<&mut Self> {
        let bytes = serde_json::to_vec(v).map_err(|e| Error::Hash(e.to_string()))?;
        Ok(self.update_bytes(&bytes))
    }

    /// Append floats by their exact bit patterns.
    pub fn update_f64s(&mut self, values: &[f64]) -> &mut Self {
        self.inner.update(&(values.len() as u64).to_le_bytes());
        for v in values {
            self.inner.update(&v.to_bits().to_le_bytes());
        }
        self
    }

    pub fn update_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.inner.update(&(bytes.len() as u64).to_le_bytes());
        self.inner.update(bytes);
        self
    }

    pub fn finish(&self) -> Hash256 {
        Hash256(self.inner.finalize().into())
    }
}

/// Hash a single serde value.
pub fn hash_serde<T: Serialize>(v: &T) -> Result<Hash256> {
    Ok(PlanHasher::new().update_json(v)?.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_round_trip_through_serde() {
        let h = hash_serde(&("SelfGramian", 4, 4)).unwrap();
        let json = serde_json::to_string(&h).unwrap();
        assert_eq!(json.len(), 66);
        let back: Hash256 = serde_json::from_str(&json).unwrap();
        assert_eq!(back, h);
        assert_eq!(h.short(), h.to_hex()[..8]);
        assert!("abc".parse::<Hash256>().is_err());
    }

    #[test]
    fn float_bits_distinguish_signed_zero() {
        let pos = PlanHasher::new().update_f64s(&[0.0]).finish();
        let neg = PlanHasher::new().update_f64s(&[-0.0]).finish();
        assert_ne!(pos, neg);
    }

    #[test]
    fn sections_are_delimited() {
        let joined = PlanHasher::new().update_bytes(b"ab").finish();
        let split = PlanHasher::new().update_bytes(b"a").update_bytes(b"b").finish();
        assert_ne!(joined, split);
    }
}
