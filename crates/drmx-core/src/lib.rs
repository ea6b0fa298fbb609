#![forbid(unsafe_code)]
//! drmx-core: shared vocabulary for the planner and the executor.
//!
//! Pure data plus a few tiny helpers: ids, partitioning tags, row keys,
//! storage levels, the in-core matrix used by in-core multiplies, the opaque
//! physical handle, config, errors, plan hashing, and manifests.
//!
//! No planning logic and no physical execution live here.

pub mod config;
pub mod error;
pub mod handle;
pub mod hash;
pub mod id;
pub mod incore;
pub mod key;
pub mod manifest;
pub mod prelude;
pub mod storage;
pub mod tag;

pub use error::{Error, Result};

/// Crate version recorded in manifests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
