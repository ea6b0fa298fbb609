//! How trees are spread over partitions.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{ForestError, Result};

/// Upper bound on trees per forest; keeps the packed form unambiguous.
pub const MAX_TREE_ID: u64 = 100_000;

/// A tree's global index together with the partition it belongs to. In
/// step 1 that is the partition that grew it; in step 2 the partition whose
/// instances it classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TreeId {
    partition: u32,
    tree_id: u32,
}

impl TreeId {
    pub fn new(partition: u32, tree_id: u32) -> Result<Self> {
        if u64::from(tree_id) >= MAX_TREE_ID {
            return Err(ForestError::Invalid(format!(
                "tree id {tree_id} exceeds {MAX_TREE_ID}"
            )));
        }
        Ok(Self { partition, tree_id })
    }

    pub fn partition(&self) -> u32 {
        self.partition
    }

    pub fn tree_id(&self) -> u32 {
        self.tree_id
    }

    /// Single integer key: `partition * MAX_TREE_ID + tree_id`.
    pub fn packed(&self) -> u64 {
        u64::from(self.partition) * MAX_TREE_ID + u64::from(self.tree_id)
    }

    pub fn from_packed(v: u64) -> Result<Self> {
        let partition = u32::try_from(v / MAX_TREE_ID)
            .map_err(|_| ForestError::Invalid(format!("packed tree id {v} out of range")))?;
        Self::new(partition, (v % MAX_TREE_ID) as u32)
    }
}

impl fmt::Display for TreeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.tree_id)
    }
}

fn check(num_maps: u32, num_trees: u32, partition: u32) -> Result<()> {
    if num_maps == 0 {
        return Err(ForestError::Invalid("at least one partition is required".into()));
    }
    if partition >= num_maps {
        return Err(ForestError::Invalid(format!(
            "partition {partition} outside 0..{num_maps}"
        )));
    }
    if u64::from(num_trees) > MAX_TREE_ID {
        return Err(ForestError::Invalid(format!("{num_trees} trees exceed {MAX_TREE_ID}")));
    }
    Ok(())
}

/// Trees grown by `partition`: an even share, with partition 0 also taking
/// the remainder.
pub fn nb_trees(num_maps: u32, num_trees: u32, partition: u32) -> Result<u32> {
    check(num_maps, num_trees, partition)?;
    let share = num_trees / num_maps;
    Ok(if partition == 0 {
        share + num_trees % num_maps
    } else {
        share
    })
}

/// Trees a step-2 pass on `partition` classifies with: all but its own.
pub fn nb_concerned(num_maps: u32, num_trees: u32, partition: u32) -> Result<u32> {
    Ok(num_trees - nb_trees(num_maps, num_trees, partition)?)
}
