//! Physical operator library interface.
//!
//! One method per physical family. Each receives the logical node it is
//! lowering (for shape and key metadata) and the already-lowered operand
//! handles, and returns a fresh handle. Substrates own the data behind the
//! handles; the planner never looks inside.
//!
//! Invariants:
//! - Row-preserving families (`ewise`, `ewise_scalar`, `times_right_in_core`,
//!   `map_block`) keep the left operand's partitioning, since the planner
//!   hands their results the operand's partitioning tag.
//! - `at_b` with `zippable == true` may assume both operands are split
//!   identically and pair partitions positionally.

use std::ops::Range;

use drmx_core::prelude::*;
use drmx_planner::{BlockMap, CheckpointedDrm, Drm, EwiseOp, ScalarOp};

/// A single row of a distributed matrix with its key.
pub type KeyedRow = (RowKey, Vec<f64>);

pub trait PhysicalOps: Send + Sync {
    /// Human-readable substrate name (stable).
    fn name(&self) -> &'static str;

    /// Handle of an already materialized leaf.
    fn read_checkpoint(&self, cp: &CheckpointedDrm) -> Result<PhysicalHandle> {
        Ok(cp.handle().clone())
    }

    /// `A'` for an `Int`-keyed `A`.
    fn transpose(&self, node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle>;

    /// `A' B`.
    fn at_b(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        zippable: bool,
    ) -> Result<PhysicalHandle>;

    /// `A B'`.
    fn ab_t(&self, node: &Drm, a: &PhysicalHandle, b: &PhysicalHandle) -> Result<PhysicalHandle>;

    /// `A' A`.
    fn at_a(&self, node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle>;

    fn ewise(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        op: EwiseOp,
    ) -> Result<PhysicalHandle>;

    fn ewise_scalar(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        scalar: f64,
        op: ScalarOp,
    ) -> Result<PhysicalHandle>;

    /// Rows `range` of an `Int`-keyed operand, re-keyed from zero.
    fn row_range(&self, node: &Drm, a: &PhysicalHandle, range: Range<usize>)
        -> Result<PhysicalHandle>;

    /// `A %*% m`.
    fn times_right_in_core(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        m: &InCoreMatrix,
    ) -> Result<PhysicalHandle>;

    fn map_block(&self, node: &Drm, a: &PhysicalHandle, f: &BlockMap) -> Result<PhysicalHandle>;

    // Substrate primitives used by the checkpoint manager.

    /// Distribute rows over `partitions` partitions.
    fn parallelize(&self, rows: Vec<KeyedRow>, ncol: usize, partitions: usize)
        -> Result<PhysicalHandle>;

    fn persist(&self, handle: &PhysicalHandle, level: StorageLevel) -> Result<()>;

    fn release(&self, handle: &PhysicalHandle) -> Result<()>;

    /// Gather every row to the caller.
    fn collect(&self, handle: &PhysicalHandle) -> Result<Vec<KeyedRow>>;
}
