#![forbid(unsafe_code)]
//! drmx-planner: distributed matrix expressions → optimized logical plan.
//!
//! Design:
//! - `logical`: the expression tree (`Drm` nodes over a closed `LogicalOp` enum).
//! - `algebra`: user-facing combinators (`t()`, `times`, `+`, `*`, ...).
//! - `shape`: row/column inference, shape validation, non-zero metadata.
//! - `rules`: the two fixed rewrite passes (normalize, then cleanup).
//! - `explain`: serializable plan descriptions and plan hashing.
//! - `dsl`: tiny YAML → expression front end.
//!
//! Physical lowering and materialization live in `drmx-exec`.

pub mod algebra;
pub mod dsl;
pub mod explain;
pub mod logical;
pub mod rules;
pub mod shape;

pub use algebra::InCoreTimes;
pub use dsl::yaml::{parse_yaml_expression, DslError, DslResult, ExpressionDoc, InputDef};
pub use explain::{describe, plan_hash, PlanDescription};
pub use logical::{BlockMap, CheckpointedDrm, Drm, EwiseOp, LogicalOp, ScalarOp, WeakDrm};
pub use rules::{cleanup, normalize, optimize};
pub use shape::{non_zero_count, validate_shapes, NonZeroCount};

#[cfg(test)]
pub(crate) mod testing {
    use drmx_core::prelude::*;

    use crate::logical::{CheckpointedDrm, Drm};
    use crate::shape::NonZeroCount;

    /// Leaf checkpoint with a dummy handle; enough for planning tests.
    pub(crate) fn leaf(nrow: usize, ncol: usize, key_type: KeyType, tag: u64) -> Drm {
        Drm::from_checkpoint(CheckpointedDrm::new(
            PhysicalHandle::new(ncol, ()),
            nrow,
            ncol,
            NonZeroCount::Unknown,
            StorageLevel::MEMORY_ONLY,
            PartitionTag::new(tag),
            key_type,
        ))
    }
}
