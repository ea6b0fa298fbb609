//! Convenient re-exports for downstream crates.

pub use crate::config::EngineConfig;
pub use crate::error::{Error, Result};
pub use crate::handle::PhysicalHandle;
pub use crate::hash::Hash256;
pub use crate::id::{CheckpointId, HandleId, NodeId};
pub use crate::incore::InCoreMatrix;
pub use crate::key::{KeyType, RowKey};
pub use crate::manifest::{ManifestId, MaterializationManifest};
pub use crate::storage::StorageLevel;
pub use crate::tag::{PartitionTag, TagGenerator};
