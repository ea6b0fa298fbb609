//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::StorageLevel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Cluster address handed to the substrate (e.g. `local[4]`).
    pub master: String,

    /// Application name reported to the substrate.
    pub app_name: String,

    /// Default partition count for parallelized inputs.
    pub parallelism: usize,

    /// Storage level used when a checkpoint does not name one.
    pub default_storage_level: StorageLevel,

    /// Optional seed for the partitioning-tag generator (deterministic runs).
    pub seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            master: "local".to_string(),
            app_name: "drmx".to_string(),
            parallelism: 4,
            default_storage_level: StorageLevel::MEMORY_ONLY,
            seed: None,
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    /// Unparsable values are ignored; use `try_from_env` to surface them.
    ///
    /// Environment variables:
    /// - `DRMX_MASTER`: cluster address
    /// - `DRMX_APP_NAME`: application name
    /// - `DRMX_PARALLELISM`: default partition count
    /// - `DRMX_STORAGE_LEVEL`: default storage level (e.g. `MEMORY_AND_DISK`)
    /// - `DRMX_SEED`: tag generator seed
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("DRMX_MASTER") {
            cfg.master = s;
        }

        if let Ok(s) = std::env::var("DRMX_APP_NAME") {
            cfg.app_name = s;
        }

        if let Ok(s) = std::env::var("DRMX_PARALLELISM") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.parallelism = v;
            }
        }

        if let Ok(s) = std::env::var("DRMX_STORAGE_LEVEL") {
            if let Ok(v) = s.parse::<StorageLevel>() {
                cfg.default_storage_level = v;
            }
        }

        if let Ok(s) = std::env::var("DRMX_SEED") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.seed = Some(v);
            }
        }

        cfg
    }

    /// Like `from_env`, but every malformed variable is a configuration error
    /// and the result is validated.
    pub fn try_from_env() -> Result<Self> {
        let mut cfg = Self::from_env();

        if let Ok(s) = std::env::var("DRMX_PARALLELISM") {
            cfg.parallelism = s
                .parse::<usize>()
                .map_err(|e| Error::Config(format!("DRMX_PARALLELISM='{s}': {e}")))?;
        }

        if let Ok(s) = std::env::var("DRMX_STORAGE_LEVEL") {
            cfg.default_storage_level = s.parse::<StorageLevel>()?;
        }

        if let Ok(s) = std::env::var("DRMX_SEED") {
            let seed = s
                .parse::<u64>()
                .map_err(|e| Error::Config(format!("DRMX_SEED='{s}': {e}")))?;
            cfg.seed = Some(seed);
        }

        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the substrate could not start with.
    pub fn validate(&self) -> Result<()> {
        if self.master.trim().is_empty() {
            return Err(Error::Config("master address is empty".into()));
        }
        if self.app_name.trim().is_empty() {
            return Err(Error::Config("application name is empty".into()));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".into()));
        }
        Ok(())
    }
}
