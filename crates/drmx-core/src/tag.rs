//! Partitioning tags.
//!
//! A tag is an opaque 64-bit identity given to a distributed result so two
//! operands can be recognized as identically partitioned without re-deriving
//! their lineage. Zero means "unknown" and never matches anything.
//!
//! Tags are random. Two independently drawn tags collide with probability
//! 2^-64, and among `n` tags with probability about `n^2 / 2^65`. A collision
//! would make the planner treat two unrelated collections as zippable; this
//! risk is accepted. A tag *match* is evidence of co-partitioning, a
//! mismatch proves nothing.

use std::fmt;
use std::sync::Mutex;

use once_cell::sync::Lazy;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PartitionTag(u64);

impl PartitionTag {
    pub const UNKNOWN: PartitionTag = PartitionTag(0);

    pub const fn new(v: u64) -> Self {
        Self(v)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    pub const fn is_known(self) -> bool {
        self.0 != 0
    }

    /// True iff both tags are known and equal.
    pub fn matches(self, other: PartitionTag) -> bool {
        self.is_known() && other.is_known() && self.0 == other.0
    }
}

impl fmt::Display for PartitionTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_known() {
            write!(f, "{:016x}", self.0)
        } else {
            f.write_str("unknown")
        }
    }
}

/// Source of fresh, non-zero partitioning tags.
pub struct TagGenerator {
    rng: Mutex<StdRng>,
}

static GLOBAL: Lazy<TagGenerator> = Lazy::new(TagGenerator::from_entropy);

impl TagGenerator {
    pub fn from_entropy() -> Self {
        Self {
            rng: Mutex::new(StdRng::from_entropy()),
        }
    }

    /// Deterministic generator, used when the engine config carries a seed.
    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }

    /// Process-wide generator for tags drawn lazily by derived operators.
    pub fn global() -> &'static TagGenerator {
        &GLOBAL
    }

    pub fn fresh(&self) -> PartitionTag {
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        loop {
            let v: u64 = rng.gen();
            if v != 0 {
                return PartitionTag(v);
            }
        }
    }
}

impl fmt::Debug for TagGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TagGenerator").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_never_matches() {
        assert!(!PartitionTag::UNKNOWN.matches(PartitionTag::UNKNOWN));
        assert!(!PartitionTag::new(7).matches(PartitionTag::UNKNOWN));
        assert!(PartitionTag::new(7).matches(PartitionTag::new(7)));
        assert!(!PartitionTag::new(7).matches(PartitionTag::new(8)));
    }

    #[test]
    fn seeded_generators_repeat() {
        let a = TagGenerator::seeded(42);
        let b = TagGenerator::seeded(42);
        for _ in 0..16 {
            let t = a.fresh();
            assert!(t.is_known());
            assert_eq!(t, b.fresh());
        }
    }
}
