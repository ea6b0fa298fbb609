//! Checkpoint/materialization manager.
//!
//! `checkpoint` is the one place where planning meets execution:
//! validate → optimize → lower → persist → wrap as a new leaf. Results are
//! cached per expression node; the cache only holds a weak reference to the
//! source expression. Once that expression and every handle on its result
//! are gone, the next `checkpoint` releases the stored result.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use drmx_core::prelude::*;
use drmx_planner::{
    non_zero_count, optimize, plan_hash, validate_shapes, CheckpointedDrm, Drm, NonZeroCount,
    WeakDrm,
};

use crate::lower::exec;
use crate::metrics::emit_span;
use crate::physical::{KeyedRow, PhysicalOps};

struct CacheEntry {
    source: WeakDrm,
    result: Drm,
    manifest: MaterializationManifest,
}

impl CacheEntry {
    fn is_dropped(&self) -> bool {
        !self.source.is_alive() && !self.result.is_shared()
    }
}

/// Owns the substrate, the tag generator for new leaves, and the
/// checkpoint cache. Not internally synchronized.
pub struct CheckpointManager<B> {
    cfg: EngineConfig,
    backend: B,
    tags: TagGenerator,
    cache: HashMap<NodeId, CacheEntry>,
}

impl<B: PhysicalOps> CheckpointManager<B> {
    pub fn new(cfg: EngineConfig, backend: B) -> Result<Self> {
        cfg.validate()?;
        let tags = match cfg.seed {
            Some(seed) => TagGenerator::seeded(seed),
            None => TagGenerator::from_entropy(),
        };
        Ok(Self {
            cfg,
            backend,
            tags,
            cache: HashMap::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Leaf checkpoint over an in-core matrix, rows keyed `0..nrow`.
    pub fn parallelize(&mut self, m: &InCoreMatrix, partitions: Option<usize>) -> Result<Drm> {
        let keys = (0..m.nrow())
            .map(|i| {
                i32::try_from(i)
                    .map(RowKey::Int)
                    .map_err(|_| Error::Shape(format!("{} rows exceed int keys", m.nrow())))
            })
            .collect::<Result<Vec<_>>>()?;
        self.parallelize_keyed(keys, m, partitions)
    }

    /// Leaf checkpoint with explicit row keys, all of one key type.
    pub fn parallelize_keyed(
        &mut self,
        keys: Vec<RowKey>,
        m: &InCoreMatrix,
        partitions: Option<usize>,
    ) -> Result<Drm> {
        if keys.len() != m.nrow() {
            return Err(Error::Shape(format!(
                "{} keys for {} rows",
                keys.len(),
                m.nrow()
            )));
        }
        let key_type = keys.first().map_or(KeyType::Int, RowKey::key_type);
        if let Some(k) = keys.iter().find(|k| k.key_type() != key_type) {
            return Err(Error::Invariant(format!(
                "row key {k} is not {key_type}-typed like the first key"
            )));
        }

        let rows: Vec<KeyedRow> = keys.into_iter().zip(m.rows().map(<[f64]>::to_vec)).collect();
        let level = self.cfg.default_storage_level;
        let partitions = partitions.unwrap_or(self.cfg.parallelism);
        let handle = self.backend.parallelize(rows, m.ncol(), partitions)?;
        self.backend.persist(&handle, level)?;

        let tag = self.tags.fresh();
        #[cfg(feature = "tracing")]
        tracing::debug!(nrow = m.nrow(), ncol = m.ncol(), %tag, "parallelized leaf");

        Ok(Drm::from_checkpoint(CheckpointedDrm::new(
            handle,
            m.nrow(),
            m.ncol(),
            NonZeroCount::Counted(m.nnz()),
            level,
            tag,
            key_type,
        )))
    }

    /// Materialize `root` at the configured default storage level.
    pub fn checkpoint_default(&mut self, root: &Drm) -> Result<Drm> {
        self.checkpoint(root, self.cfg.default_storage_level)
    }

    /// Materialize `root`. Idempotent: a node that was already checkpointed
    /// gets the same checkpoint back without any planning or physical work,
    /// and a leaf checkpoint is returned as is.
    pub fn checkpoint(&mut self, root: &Drm, level: StorageLevel) -> Result<Drm> {
        if root.is_checkpoint() {
            return Ok(root.clone());
        }
        self.evict_dropped()?;
        if let Some(entry) = self.cache.get(&root.id()) {
            #[cfg(feature = "tracing")]
            tracing::trace!(node = %root.id(), "checkpoint cache hit");
            return Ok(entry.result.clone());
        }

        validate_shapes(root)?;
        let nnz = non_zero_count(root);
        let optimized = optimize(root)?;
        let hash = plan_hash(&optimized)?;
        #[cfg(feature = "tracing")]
        tracing::debug!(node = %root.id(), plan = %hash.short(), "checkpoint cache miss");
        let manifest = MaterializationManifest::new(root.id(), hash, now_millis());

        let handle = exec(&optimized, &self.backend)?;
        self.backend.persist(&handle, level)?;

        let cp = CheckpointedDrm::new(
            handle,
            optimized.nrow(),
            optimized.ncol(),
            nnz,
            level,
            optimized.partition_tag(),
            optimized.key_type(),
        );
        let manifest = manifest.finish(now_millis(), cp.id());
        let result = Drm::from_checkpoint(cp);

        emit_span(
            "checkpoint",
            &[
                ("node", root.id().to_string()),
                ("plan_hash", manifest.plan_hash.to_hex()),
                ("nnz", nnz.as_i64().to_string()),
                ("storage_level", level.to_string()),
            ],
        );

        self.cache.insert(
            root.id(),
            CacheEntry {
                source: root.downgrade(),
                result: result.clone(),
                manifest,
            },
        );
        Ok(result)
    }

    /// Manifest of the materialization of `drm`, looked up by the source
    /// expression or by the checkpoint it produced.
    pub fn manifest(&self, drm: &Drm) -> Option<&MaterializationManifest> {
        if let Some(entry) = self.cache.get(&drm.id()) {
            return Some(&entry.manifest);
        }
        self.cache
            .values()
            .find(|e| e.result.ptr_eq(drm))
            .map(|e| &e.manifest)
    }

    /// Drop the cached checkpoint of `drm` (or `drm` itself, for a leaf)
    /// and release its storage. Returns whether anything was released.
    pub fn uncache(&mut self, drm: &Drm) -> Result<bool> {
        if let Some(entry) = self.cache.remove(&drm.id()) {
            self.release(&entry.result)?;
            return Ok(true);
        }
        let owner = self
            .cache
            .iter()
            .find(|(_, e)| e.result.ptr_eq(drm))
            .map(|(id, _)| *id);
        if let Some(id) = owner {
            self.cache.remove(&id);
        }
        if drm.is_checkpoint() {
            self.release(drm)?;
            return Ok(true);
        }
        Ok(false)
    }

    /// Release every cached checkpoint whose source expression is gone and
    /// whose result nobody outside the cache still holds. `checkpoint` calls
    /// this first, so explicit calls are only needed to free storage early.
    pub fn evict_dropped(&mut self) -> Result<usize> {
        let dead: Vec<NodeId> = self
            .cache
            .iter()
            .filter(|(_, e)| e.is_dropped())
            .map(|(id, _)| *id)
            .collect();
        if dead.is_empty() {
            return Ok(0);
        }
        for id in &dead {
            if let Some(entry) = self.cache.remove(id) {
                self.release(&entry.result)?;
            }
        }
        #[cfg(feature = "tracing")]
        tracing::debug!(evicted = dead.len(), "evicted dropped checkpoints");
        Ok(dead.len())
    }

    /// Materialize if needed and gather an `Int`-keyed result in core.
    pub fn collect(&mut self, drm: &Drm) -> Result<InCoreMatrix> {
        if !drm.key_type().is_int() {
            return Err(Error::Invariant(format!(
                "cannot collect a {}-keyed matrix in core; use collect_keyed",
                drm.key_type()
            )));
        }
        let (nrow, ncol) = (drm.nrow(), drm.ncol());
        let mut out = InCoreMatrix::zeros(nrow, ncol);
        for (key, row) in self.collect_keyed(drm)? {
            let i = key
                .as_index()
                .filter(|&i| i < nrow)
                .ok_or_else(|| Error::Exec(format!("row key {key} outside 0..{nrow}")))?;
            for (j, v) in row.into_iter().enumerate().take(ncol) {
                out.set(i, j, v);
            }
        }
        Ok(out)
    }

    /// Materialize if needed and gather every keyed row.
    pub fn collect_keyed(&mut self, drm: &Drm) -> Result<Vec<KeyedRow>> {
        let cp = self.checkpoint_default(drm)?;
        match cp.checkpoint() {
            Some(leaf) => self.backend.collect(leaf.handle()),
            None => Err(Error::Plan("checkpoint did not produce a leaf".to_string())),
        }
    }

    fn release(&self, drm: &Drm) -> Result<()> {
        if let Some(leaf) = drm.checkpoint() {
            self.backend.release(leaf.handle())?;
        }
        Ok(())
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
