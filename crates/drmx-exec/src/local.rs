//! In-process reference substrate.
//!
//! A distributed matrix is a list of partitions, each a list of keyed dense
//! rows. Missing rows read as zero rows, matching the sparse convention of
//! the distributed engines this stands in for. Good enough to check plans
//! numerically; not meant to be fast.

use std::collections::{HashMap, HashSet};
use std::ops::Range;
use std::sync::Mutex;

use drmx_core::prelude::*;
use drmx_planner::{BlockMap, Drm, EwiseOp, ScalarOp};

use crate::physical::{KeyedRow, PhysicalOps};

/// Payload behind every handle this backend produces.
#[derive(Debug, Clone)]
pub struct LocalMatrix {
    ncol: usize,
    partitions: Vec<Vec<KeyedRow>>,
}

impl LocalMatrix {
    /// Split `rows` into `partitions` contiguous chunks.
    pub fn distribute(rows: Vec<KeyedRow>, ncol: usize, partitions: usize) -> Result<Self> {
        if let Some((key, row)) = rows.iter().find(|(_, r)| r.len() != ncol) {
            return Err(Error::Shape(format!(
                "row {key} has {} columns, expected {ncol}",
                row.len()
            )));
        }
        let partitions = partitions.max(1);
        let chunk = rows.len().div_ceil(partitions).max(1);
        let mut out: Vec<Vec<KeyedRow>> = (0..partitions).map(|_| Vec::new()).collect();
        for (i, row) in rows.into_iter().enumerate() {
            out[(i / chunk).min(partitions - 1)].push(row);
        }
        Ok(Self { ncol, partitions: out })
    }

    fn from_in_core(m: &InCoreMatrix, partitions: usize) -> Result<Self> {
        let rows = m
            .rows()
            .enumerate()
            .map(|(i, r)| Ok((int_key(i)?, r.to_vec())))
            .collect::<Result<Vec<_>>>()?;
        Self::distribute(rows, m.ncol(), partitions)
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    pub fn nrow(&self) -> usize {
        self.partitions.iter().map(Vec::len).sum()
    }

    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    pub fn partitions(&self) -> &[Vec<KeyedRow>] {
        &self.partitions
    }

    fn rows(&self) -> impl Iterator<Item = &KeyedRow> + '_ {
        self.partitions.iter().flatten()
    }

    /// Same partitioning, every row mapped through `f`.
    fn map_rows(&self, ncol: usize, mut f: impl FnMut(&[f64]) -> Vec<f64>) -> Self {
        Self {
            ncol,
            partitions: self
                .partitions
                .iter()
                .map(|p| p.iter().map(|(k, r)| (k.clone(), f(r))).collect())
                .collect(),
        }
    }

    fn into_handle(self) -> PhysicalHandle {
        PhysicalHandle::new(self.ncol, self)
    }
}

#[derive(Debug, Default)]
pub struct LocalBackend {
    persisted: Mutex<HashMap<HandleId, StorageLevel>>,
}

impl LocalBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_persisted(&self, handle: &PhysicalHandle) -> bool {
        self.persisted
            .lock()
            .map(|p| p.contains_key(&handle.id()))
            .unwrap_or(false)
    }

    pub fn persisted_count(&self) -> usize {
        self.persisted.lock().map(|p| p.len()).unwrap_or(0)
    }
}

fn local(h: &PhysicalHandle) -> Result<&LocalMatrix> {
    h.downcast::<LocalMatrix>()
}

fn int_key(i: usize) -> Result<RowKey> {
    i32::try_from(i)
        .map(RowKey::Int)
        .map_err(|_| Error::Exec(format!("row index {i} does not fit an int key")))
}

fn index_of(key: &RowKey, limit: usize, what: &str) -> Result<usize> {
    match key.as_index() {
        Some(i) if i < limit => Ok(i),
        Some(i) => Err(Error::Exec(format!("{what}: row key {i} outside 0..{limit}"))),
        None => Err(Error::Exec(format!("{what}: row key {key} is not an int index"))),
    }
}

fn check_ncol(what: &str, a: &LocalMatrix, b: &LocalMatrix) -> Result<()> {
    if a.ncol != b.ncol {
        return Err(Error::Shape(format!(
            "{what}: operands have {} and {} columns",
            a.ncol, b.ncol
        )));
    }
    Ok(())
}

/// `out += a' b` for one pair of rows.
fn add_outer(out: &mut InCoreMatrix, a: &[f64], b: &[f64]) {
    for (i, &x) in a.iter().enumerate() {
        if x == 0.0 {
            continue;
        }
        for (j, &y) in b.iter().enumerate() {
            out.set(i, j, out.get(i, j) + x * y);
        }
    }
}

fn lock_err<T>(_: T) -> Error {
    Error::Exec("local backend state lock poisoned".to_string())
}

impl PhysicalOps for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn transpose(&self, node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle> {
        let a = local(a)?;
        let mut out = InCoreMatrix::zeros(a.ncol, node.ncol());
        for (key, row) in a.rows() {
            let i = index_of(key, node.ncol(), "transpose")?;
            for (j, &v) in row.iter().enumerate() {
                out.set(j, i, v);
            }
        }
        Ok(LocalMatrix::from_in_core(&out, a.num_partitions())?.into_handle())
    }

    fn at_b(
        &self,
        _node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        zippable: bool,
    ) -> Result<PhysicalHandle> {
        let (a, b) = (local(a)?, local(b)?);
        let mut out = InCoreMatrix::zeros(a.ncol, b.ncol);
        if zippable {
            if a.num_partitions() != b.num_partitions() {
                return Err(Error::Exec(format!(
                    "at_b: zipped operands have {} and {} partitions",
                    a.num_partitions(),
                    b.num_partitions()
                )));
            }
            for (pa, pb) in a.partitions.iter().zip(&b.partitions) {
                if pa.len() != pb.len() {
                    return Err(Error::Exec("at_b: zipped partitions differ in size".to_string()));
                }
                for ((ka, ra), (kb, rb)) in pa.iter().zip(pb) {
                    if ka != kb {
                        return Err(Error::Exec(format!(
                            "at_b: zipped rows are keyed {ka} and {kb}"
                        )));
                    }
                    add_outer(&mut out, ra, rb);
                }
            }
        } else {
            let by_key: HashMap<&RowKey, &Vec<f64>> = b.rows().map(|(k, r)| (k, r)).collect();
            for (key, ra) in a.rows() {
                if let Some(rb) = by_key.get(key) {
                    add_outer(&mut out, ra, rb);
                }
            }
        }
        Ok(LocalMatrix::from_in_core(&out, a.num_partitions())?.into_handle())
    }

    fn ab_t(&self, node: &Drm, a: &PhysicalHandle, b: &PhysicalHandle) -> Result<PhysicalHandle> {
        let (a, b) = (local(a)?, local(b)?);
        check_ncol("ab_t", a, b)?;
        // B is broadcast whole; its int keys index the result columns.
        let mut bt = InCoreMatrix::zeros(b.ncol, node.ncol());
        for (key, row) in b.rows() {
            let j = index_of(key, node.ncol(), "ab_t")?;
            for (k, &v) in row.iter().enumerate() {
                bt.set(k, j, v);
            }
        }
        Ok(a.map_rows(node.ncol(), |r| bt.left_times_row(r)).into_handle())
    }

    fn at_a(&self, _node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle> {
        let a = local(a)?;
        let mut out = InCoreMatrix::zeros(a.ncol, a.ncol);
        for (_, row) in a.rows() {
            add_outer(&mut out, row, row);
        }
        Ok(LocalMatrix::from_in_core(&out, a.num_partitions())?.into_handle())
    }

    fn ewise(
        &self,
        _node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        op: EwiseOp,
    ) -> Result<PhysicalHandle> {
        let (a, b) = (local(a)?, local(b)?);
        check_ncol("ewise", a, b)?;
        let zero = vec![0.0; a.ncol];
        let by_key: HashMap<&RowKey, &Vec<f64>> = b.rows().map(|(k, r)| (k, r)).collect();
        let apply = |x: &[f64], y: &[f64]| -> Vec<f64> {
            x.iter().zip(y).map(|(&x, &y)| op.apply(x, y)).collect()
        };

        let mut partitions: Vec<Vec<KeyedRow>> = a
            .partitions
            .iter()
            .map(|p| {
                p.iter()
                    .map(|(k, r)| {
                        let other = by_key.get(k).map_or(zero.as_slice(), |v| v.as_slice());
                        (k.clone(), apply(r, other))
                    })
                    .collect()
            })
            .collect();

        // Rows only `b` has.
        let seen: HashSet<&RowKey> = a.rows().map(|(k, _)| k).collect();
        let extra: Vec<KeyedRow> = b
            .rows()
            .filter(|(k, _)| !seen.contains(k))
            .map(|(k, r)| (k.clone(), apply(&zero, r)))
            .collect();
        if !extra.is_empty() {
            match partitions.last_mut() {
                Some(last) => last.extend(extra),
                None => partitions.push(extra),
            }
        }
        Ok(LocalMatrix {
            ncol: a.ncol,
            partitions,
        }
        .into_handle())
    }

    fn ewise_scalar(
        &self,
        _node: &Drm,
        a: &PhysicalHandle,
        scalar: f64,
        op: ScalarOp,
    ) -> Result<PhysicalHandle> {
        let a = local(a)?;
        Ok(a
            .map_rows(a.ncol, |r| r.iter().map(|&x| op.apply(x, scalar)).collect())
            .into_handle())
    }

    fn row_range(
        &self,
        _node: &Drm,
        a: &PhysicalHandle,
        range: Range<usize>,
    ) -> Result<PhysicalHandle> {
        let a = local(a)?;
        let mut partitions = Vec::with_capacity(a.num_partitions());
        for p in &a.partitions {
            let mut kept = Vec::new();
            for (key, row) in p {
                let i = index_of(key, usize::MAX, "row_range")?;
                if range.contains(&i) {
                    kept.push((int_key(i - range.start)?, row.clone()));
                }
            }
            partitions.push(kept);
        }
        Ok(LocalMatrix {
            ncol: a.ncol,
            partitions,
        }
        .into_handle())
    }

    fn times_right_in_core(
        &self,
        _node: &Drm,
        a: &PhysicalHandle,
        m: &InCoreMatrix,
    ) -> Result<PhysicalHandle> {
        let a = local(a)?;
        if a.ncol != m.nrow() {
            return Err(Error::Shape(format!(
                "times_right_in_core: {} columns against {}x{} in-core",
                a.ncol,
                m.nrow(),
                m.ncol()
            )));
        }
        Ok(a.map_rows(m.ncol(), |r| m.left_times_row(r)).into_handle())
    }

    fn map_block(&self, _node: &Drm, a: &PhysicalHandle, f: &BlockMap) -> Result<PhysicalHandle> {
        let a = local(a)?;
        let mut partitions = Vec::with_capacity(a.num_partitions());
        for p in &a.partitions {
            if p.is_empty() {
                partitions.push(Vec::new());
                continue;
            }
            let keys: Vec<RowKey> = p.iter().map(|(k, _)| k.clone()).collect();
            let block = InCoreMatrix::from_rows(p.iter().map(|(_, r)| r.clone()).collect())?;
            let out = f.apply(&keys, &block)?;
            partitions.push(keys.into_iter().zip(out.rows().map(<[f64]>::to_vec)).collect());
        }
        Ok(LocalMatrix {
            ncol: f.ncol(),
            partitions,
        }
        .into_handle())
    }

    fn parallelize(
        &self,
        rows: Vec<KeyedRow>,
        ncol: usize,
        partitions: usize,
    ) -> Result<PhysicalHandle> {
        Ok(LocalMatrix::distribute(rows, ncol, partitions)?.into_handle())
    }

    fn persist(&self, handle: &PhysicalHandle, level: StorageLevel) -> Result<()> {
        local(handle)?;
        if level.is_cached() {
            self.persisted.lock().map_err(lock_err)?.insert(handle.id(), level);
        }
        Ok(())
    }

    fn release(&self, handle: &PhysicalHandle) -> Result<()> {
        self.persisted.lock().map_err(lock_err)?.remove(&handle.id());
        Ok(())
    }

    fn collect(&self, handle: &PhysicalHandle) -> Result<Vec<KeyedRow>> {
        Ok(local(handle)?.rows().cloned().collect())
    }
}
