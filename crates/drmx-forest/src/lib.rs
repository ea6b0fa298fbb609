#![forbid(unsafe_code)]
//! drmx-forest: the second step of partial decision-forest training.
//!
//! Step 1 (not here) grows trees independently on each data partition and
//! stores them with their `TreeId`s. Step 2 runs once per partition: it
//! loads every tree grown on the *other* partitions and classifies the
//! partition's instances with them, giving out-of-partition predictions.
//!
//! - `partial`: tree-to-partition arithmetic and `TreeId`.
//! - `inter_results`: the side file passed from step 1 to step 2.
//! - `step2`: the per-partition classifier pass.
//! - `tree`, `data`: minimal tree and instance types.

pub mod data;
pub mod error;
pub mod inter_results;
pub mod partial;
pub mod step2;
pub mod tree;

pub use data::{split_instances, Instance};
pub use error::{ForestError, Result};
pub use inter_results::{load, store, LoadedTrees};
pub use partial::{nb_concerned, nb_trees, TreeId};
pub use step2::{MapredOutput, Step2Mapper};
pub use tree::Node;
