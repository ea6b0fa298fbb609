//! Materialization manifest.
//!
//! The checkpoint manager records one of these per materialized expression
//! root: which optimized plan ran and when.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::hash::Hash256;
use crate::id::{CheckpointId, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManifestId(pub Uuid);

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MaterializationManifest {
    pub id: ManifestId,

    /// Expression root that was checkpointed.
    pub root: NodeId,

    /// Checkpoint produced for it (set by `finish`).
    pub checkpoint: Option<CheckpointId>,

    /// Stable hash of the optimized plan description.
    pub plan_hash: Hash256,

    pub engine_version: String,

    /// Milliseconds since Unix epoch (UTC).
    pub started_ms: u64,
    pub finished_ms: u64,
}

impl MaterializationManifest {
    pub fn new(root: NodeId, plan_hash: Hash256, started_ms: u64) -> Self {
        Self {
            id: ManifestId(Uuid::new_v4()),
            root,
            checkpoint: None,
            plan_hash,
            engine_version: crate::VERSION.to_string(),
            started_ms,
            finished_ms: started_ms,
        }
    }

    pub fn finish(mut self, finished_ms: u64, checkpoint: CheckpointId) -> Self {
        self.finished_ms = finished_ms;
        self.checkpoint = Some(checkpoint);
        self
    }
}
