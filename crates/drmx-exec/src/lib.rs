#![forbid(unsafe_code)]
//! drmx-exec: optimized logical plan → physical calls → checkpoints.
//!
//! - `physical`: the operator-library seam every substrate implements.
//! - `lower`: bottom-up lowering of an optimized tree (`exec`).
//! - `checkpoint`: optimize + lower + persist, cached per expression node.
//! - `local`: in-process reference substrate over row-keyed partitions.
//! - `trace`: call-recording wrapper around any substrate.
//! - `metrics`: span hooks.

pub mod checkpoint;
pub mod local;
pub mod lower;
pub mod metrics;
pub mod physical;
pub mod trace;

pub use checkpoint::CheckpointManager;
pub use local::{LocalBackend, LocalMatrix};
pub use lower::{exec, zippable};
pub use physical::{KeyedRow, PhysicalOps};
pub use trace::{CallRecorder, RecordedCall};
