//! Storage levels for materialized results.
//!
//! The substrate decides what these mean physically; the planner only carries
//! the caller's choice into the checkpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StorageLevel {
    pub use_memory: bool,
    pub use_disk: bool,
    pub serialized: bool,
    pub replication: u8,
}

impl StorageLevel {
    pub const NONE: StorageLevel = StorageLevel::new(false, false, false, 1);
    pub const MEMORY_ONLY: StorageLevel = StorageLevel::new(true, false, false, 1);
    pub const MEMORY_ONLY_2: StorageLevel = StorageLevel::new(true, false, false, 2);
    pub const MEMORY_ONLY_SER: StorageLevel = StorageLevel::new(true, false, true, 1);
    pub const MEMORY_ONLY_SER_2: StorageLevel = StorageLevel::new(true, false, true, 2);
    pub const DISK_ONLY: StorageLevel = StorageLevel::new(false, true, false, 1);
    pub const DISK_ONLY_2: StorageLevel = StorageLevel::new(false, true, false, 2);
    pub const MEMORY_AND_DISK: StorageLevel = StorageLevel::new(true, true, false, 1);
    pub const MEMORY_AND_DISK_2: StorageLevel = StorageLevel::new(true, true, false, 2);
    pub const MEMORY_AND_DISK_SER: StorageLevel = StorageLevel::new(true, true, true, 1);
    pub const MEMORY_AND_DISK_SER_2: StorageLevel = StorageLevel::new(true, true, true, 2);

    const NAMED: [(&'static str, StorageLevel); 11] = [
        ("NONE", Self::NONE),
        ("MEMORY_ONLY", Self::MEMORY_ONLY),
        ("MEMORY_ONLY_2", Self::MEMORY_ONLY_2),
        ("MEMORY_ONLY_SER", Self::MEMORY_ONLY_SER),
        ("MEMORY_ONLY_SER_2", Self::MEMORY_ONLY_SER_2),
        ("DISK_ONLY", Self::DISK_ONLY),
        ("DISK_ONLY_2", Self::DISK_ONLY_2),
        ("MEMORY_AND_DISK", Self::MEMORY_AND_DISK),
        ("MEMORY_AND_DISK_2", Self::MEMORY_AND_DISK_2),
        ("MEMORY_AND_DISK_SER", Self::MEMORY_AND_DISK_SER),
        ("MEMORY_AND_DISK_SER_2", Self::MEMORY_AND_DISK_SER_2),
    ];

    pub const fn new(use_memory: bool, use_disk: bool, serialized: bool, replication: u8) -> Self {
        Self {
            use_memory,
            use_disk,
            serialized,
            replication,
        }
    }

    /// False for `NONE`: nothing is cached, the result is recomputed on use.
    pub fn is_cached(&self) -> bool {
        self.use_memory || self.use_disk
    }
}

impl Default for StorageLevel {
    fn default() -> Self {
        Self::MEMORY_ONLY
    }
}

impl FromStr for StorageLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == wanted)
            .map(|(_, level)| *level)
            .ok_or_else(|| Error::Config(format!("unknown storage level '{s}'")))
    }
}

impl fmt::Display for StorageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match Self::NAMED.iter().find(|(_, level)| level == self) {
            Some((name, _)) => f.write_str(name),
            None => write!(
                f,
                "StorageLevel(memory={}, disk={}, ser={}, x{})",
                self.use_memory, self.use_disk, self.serialized, self.replication
            ),
        }
    }
}
