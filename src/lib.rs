//! drmx: algebraic optimizer and checkpointing layer for distributed
//! row matrices.
//!
//! Build expressions over [`Drm`], then materialize them with a
//! [`CheckpointManager`] on top of any [`drmx_exec::PhysicalOps`] substrate.

pub use drmx_core;
pub use drmx_exec;
pub use drmx_forest;
pub use drmx_planner;

pub use drmx_core::prelude::*;
pub use drmx_exec::{CheckpointManager, LocalBackend};
pub use drmx_planner::{optimize, Drm};
