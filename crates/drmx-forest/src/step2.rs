//! Step 2: classify one partition's instances with every foreign tree.

use serde::{Deserialize, Serialize};

use crate::data::Instance;
use crate::error::{ForestError, Result};
use crate::partial::TreeId;
use crate::tree::Node;

/// Prediction per instance of the partition, `-1` for not classified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapredOutput {
    pub predictions: Vec<i32>,
}

pub struct Step2Mapper {
    partition: u32,
    keys: Vec<TreeId>,
    trees: Vec<Node>,
    predictions: Vec<Vec<i32>>,
}

impl Step2Mapper {
    /// `keys`/`trees` as returned by `inter_results::load` for `partition`.
    pub fn new(
        partition: u32,
        keys: Vec<TreeId>,
        trees: Vec<Node>,
        num_instances: usize,
    ) -> Result<Self> {
        if keys.len() != trees.len() {
            return Err(ForestError::Invalid(format!(
                "{} keys for {} trees",
                keys.len(),
                trees.len()
            )));
        }
        if let Some(own) = keys.iter().find(|k| k.partition() == partition) {
            return Err(ForestError::Invalid(format!(
                "tree {own} belongs to partition {partition} itself"
            )));
        }
        let predictions = vec![vec![-1; num_instances]; trees.len()];
        Ok(Self {
            partition,
            keys,
            trees,
            predictions,
        })
    }

    /// Classify the instance at `index` within the partition.
    pub fn map(&mut self, index: usize, instance: &Instance) -> Result<()> {
        for (tree, out) in self.trees.iter().zip(&mut self.predictions) {
            let slot = out.get_mut(index).ok_or_else(|| {
                ForestError::Invalid(format!("instance index {index} past partition size"))
            })?;
            *slot = tree.classify(instance);
        }
        Ok(())
    }

    /// One output per tree, in load order, keyed by this partition.
    pub fn cleanup(self) -> Result<Vec<(TreeId, MapredOutput)>> {
        let partition = self.partition;
        self.keys
            .into_iter()
            .zip(self.predictions)
            .map(|(key, predictions)| {
                Ok((
                    TreeId::new(partition, key.tree_id())?,
                    MapredOutput { predictions },
                ))
            })
            .collect()
    }
}
