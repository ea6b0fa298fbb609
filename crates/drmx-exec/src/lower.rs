//! Lowering: optimized logical tree → physical calls.
//!
//! Operands are lowered first, then the node's own family is invoked with
//! their handles. Forms that only exist before optimization have no
//! physical family and are reported as unsupported.

use drmx_core::prelude::*;
use drmx_planner::{Drm, LogicalOp};

use crate::metrics::emit_span;
use crate::physical::PhysicalOps;

/// Whether `a` and `b` may be zipped partition-by-partition instead of
/// joined by key. Tag equality is evidence of identical partitioning, not
/// proof; unknown tags never match.
pub fn zippable(a: &Drm, b: &Drm) -> bool {
    a.partition_tag().matches(b.partition_tag())
}

pub fn exec<B: PhysicalOps + ?Sized>(drm: &Drm, backend: &B) -> Result<PhysicalHandle> {
    use LogicalOp::*;

    let out = match drm.op() {
        Checkpoint(cp) => return backend.read_checkpoint(cp),
        Transpose(a) => backend.transpose(drm, &exec(a, backend)?),
        MatMulTransA(a, b) => {
            let ha = exec(a, backend)?;
            let hb = exec(b, backend)?;
            backend.at_b(drm, &ha, &hb, zippable(a, b))
        }
        MatMulTransB(a, b) => {
            let ha = exec(a, backend)?;
            let hb = exec(b, backend)?;
            backend.ab_t(drm, &ha, &hb)
        }
        SelfGramian(a) => backend.at_a(drm, &exec(a, backend)?),
        Elementwise(a, b, op) => {
            let ha = exec(a, backend)?;
            let hb = exec(b, backend)?;
            backend.ewise(drm, &ha, &hb, *op)
        }
        ElementwiseScalar(a, s, op) => backend.ewise_scalar(drm, &exec(a, backend)?, *s, *op),
        RowRange(a, r) => backend.row_range(drm, &exec(a, backend)?, r.clone()),
        RightMatrixMultiply(a, m) => backend.times_right_in_core(drm, &exec(a, backend)?, m),
        MapBlock(a, f) => backend.map_block(drm, &exec(a, backend)?, f),
        MatMul(..) | TransposeAnyKey(_) | LeftMatrixMultiply(..) => Err(Error::Unsupported {
            op: drm.op().name().to_string(),
        }),
    }?;

    emit_span(
        "lowered",
        &[
            ("op", drm.op().name().to_string()),
            ("node", drm.id().to_string()),
            ("backend", backend.name().to_string()),
        ],
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBackend;
    use crate::trace::CallRecorder;
    use drmx_planner::{optimize, CheckpointedDrm, NonZeroCount};

    fn parallelized(backend: &CallRecorder<LocalBackend>, m: &InCoreMatrix, tag: u64) -> Drm {
        use crate::physical::PhysicalOps as _;
        let rows = m
            .rows()
            .enumerate()
            .map(|(i, r)| (RowKey::Int(i as i32), r.to_vec()))
            .collect();
        let h = backend.parallelize(rows, m.ncol(), 2).unwrap();
        Drm::from_checkpoint(CheckpointedDrm::new(
            h,
            m.nrow(),
            m.ncol(),
            NonZeroCount::Counted(m.nnz()),
            StorageLevel::MEMORY_ONLY,
            PartitionTag::new(tag),
            KeyType::Int,
        ))
    }

    #[test]
    fn zippable_needs_equal_known_tags() {
        let backend = CallRecorder::new(LocalBackend::new());
        let m = InCoreMatrix::identity(4);
        let a = parallelized(&backend, &m, 5);
        let b = parallelized(&backend, &m, 5);
        let c = parallelized(&backend, &m, 6);
        let u = parallelized(&backend, &m, 0);
        let v = parallelized(&backend, &m, 0);
        assert!(zippable(&a, &b));
        assert!(!zippable(&a, &c));
        assert!(!zippable(&u, &v), "unknown tags never match");
    }

    #[test]
    fn atb_receives_zippable_flag() {
        let backend = CallRecorder::new(LocalBackend::new());
        let m = InCoreMatrix::from_fn(6, 2, |i, j| (i + j) as f64);
        let a = parallelized(&backend, &m, 5);
        let b = &a * 2.0;

        let plan = optimize(&a.t().times(&b)).unwrap();
        assert!(matches!(plan.op(), LogicalOp::MatMulTransA(..)));
        exec(&plan, &backend).unwrap();
        let calls = backend.calls();
        let atb = calls.iter().find(|c| c.op == "at_b").unwrap();
        assert_eq!(atb.zippable, Some(true));

        let other = parallelized(&backend, &m, 9);
        let plan = optimize(&a.t().times(&other)).unwrap();
        backend.clear();
        exec(&plan, &backend).unwrap();
        let calls = backend.calls();
        let atb = calls.iter().find(|c| c.op == "at_b").unwrap();
        assert_eq!(atb.zippable, Some(false));
    }

    #[test]
    fn unoptimized_forms_are_unsupported() {
        let backend = CallRecorder::new(LocalBackend::new());
        let m = InCoreMatrix::identity(3);
        let a = parallelized(&backend, &m, 1);

        let err = exec(&a.times(&a), &backend).unwrap_err();
        assert!(matches!(err, Error::Unsupported { ref op } if op == "MatMul"), "{err}");

        use drmx_planner::InCoreTimes;
        let err = exec(&m.times_drm(&a), &backend).unwrap_err();
        assert!(matches!(err, Error::Unsupported { ref op } if op == "LeftMatrixMultiply"));
    }

    #[test]
    fn checkpoint_leaf_reads_handle_without_physical_work() {
        let backend = CallRecorder::new(LocalBackend::new());
        let a = parallelized(&backend, &InCoreMatrix::identity(3), 1);
        backend.clear();
        let h = exec(&a, &backend).unwrap();
        assert_eq!(h.id(), a.checkpoint().unwrap().handle().id());
        assert_eq!(backend.count("read_checkpoint"), 1);
        assert_eq!(backend.calls().len(), 1);
    }
}
