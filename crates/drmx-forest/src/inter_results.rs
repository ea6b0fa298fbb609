//! Side file carrying step-1 output into step 2.
//!
//! JSON document: partition sizes, then `(TreeId, Node)` pairs in ascending
//! global tree order.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{ForestError, Result};
use crate::partial::{nb_concerned, TreeId};
use crate::tree::Node;

#[derive(Serialize, Deserialize)]
struct SideFile {
    sizes: Vec<u64>,
    trees: Vec<(TreeId, Node)>,
}

/// Trees a step-2 pass works with, plus every partition's size.
#[derive(Debug, Clone)]
pub struct LoadedTrees {
    pub sizes: Vec<u64>,
    pub keys: Vec<TreeId>,
    pub trees: Vec<Node>,
}

pub fn store(path: &Path, keys: &[TreeId], trees: &[Node], sizes: &[u64]) -> Result<()> {
    if keys.len() != trees.len() {
        return Err(ForestError::Invalid(format!(
            "{} keys for {} trees",
            keys.len(),
            trees.len()
        )));
    }
    let doc = SideFile {
        sizes: sizes.to_vec(),
        trees: keys.iter().copied().zip(trees.iter().cloned()).collect(),
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_vec(&doc)?)?;
    Ok(())
}

/// Load the trees `partition` did not grow, in ascending tree-id order.
pub fn load(path: &Path, num_maps: u32, num_trees: u32, partition: u32) -> Result<LoadedTrees> {
    let expected = nb_concerned(num_maps, num_trees, partition)? as usize;
    let doc: SideFile = serde_json::from_slice(&fs::read(path)?)?;

    if doc.sizes.len() != num_maps as usize {
        return Err(ForestError::Invalid(format!(
            "side file has {} partition sizes, expected {num_maps}",
            doc.sizes.len()
        )));
    }

    let mut pairs: Vec<(TreeId, Node)> = doc
        .trees
        .into_iter()
        .filter(|(k, _)| k.partition() != partition)
        .collect();
    pairs.sort_by_key(|(k, _)| k.tree_id());

    if pairs.len() != expected {
        return Err(ForestError::Invalid(format!(
            "partition {partition}: loaded {} trees, expected {expected}",
            pairs.len()
        )));
    }

    #[cfg(feature = "tracing")]
    tracing::debug!(partition, trees = pairs.len(), "loaded step-1 trees");

    let (keys, trees) = pairs.into_iter().unzip();
    Ok(LoadedTrees {
        sizes: doc.sizes,
        keys,
        trees,
    })
}
