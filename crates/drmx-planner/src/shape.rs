//! Shape and non-zero metadata for logical expressions.
//!
//! Row/column counts are inferred bottom-up when a node is built. Dimension
//! agreement is checked separately by `validate_shapes`, so building an
//! expression never fails and the check runs once, before optimization.

use serde::{Deserialize, Serialize};

use drmx_core::prelude::*;

use crate::logical::{Drm, LogicalOp, ScalarOp};

/// Non-zero element count captured with a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NonZeroCount {
    Counted(u64),
    /// Not derivable from logical metadata for this expression shape.
    Unknown,
}

impl NonZeroCount {
    /// Legacy encoding: `-1` for unknown.
    pub fn as_i64(self) -> i64 {
        match self {
            NonZeroCount::Counted(n) => n as i64,
            NonZeroCount::Unknown => -1,
        }
    }

    pub fn counted(self) -> Option<u64> {
        match self {
            NonZeroCount::Counted(n) => Some(n),
            NonZeroCount::Unknown => None,
        }
    }
}

/// `(nrow, ncol)` of an operator given its (already built) operands.
pub(crate) fn infer(op: &LogicalOp) -> (usize, usize) {
    use LogicalOp::*;
    match op {
        Checkpoint(cp) => (cp.nrow(), cp.ncol()),
        Transpose(a) | TransposeAnyKey(a) => (a.ncol(), a.nrow()),
        MatMul(a, b) => (a.nrow(), b.ncol()),
        MatMulTransA(a, b) => (a.ncol(), b.ncol()),
        MatMulTransB(a, b) => (a.nrow(), b.nrow()),
        SelfGramian(a) => (a.ncol(), a.ncol()),
        Elementwise(a, ..) | ElementwiseScalar(a, ..) => (a.nrow(), a.ncol()),
        RowRange(a, r) => (r.end.saturating_sub(r.start), a.ncol()),
        LeftMatrixMultiply(m, a) => (m.nrow(), a.ncol()),
        RightMatrixMultiply(a, m) => (a.nrow(), m.ncol()),
        MapBlock(a, bm) => (a.nrow(), bm.ncol()),
    }
}

/// Check dimension agreement for the whole tree.
pub fn validate_shapes(drm: &Drm) -> Result<()> {
    use LogicalOp::*;

    for operand in drm.op().operands() {
        validate_shapes(operand)?;
    }

    let mismatch = |what: &str, a: &Drm, b: (usize, usize)| -> Result<()> {
        Err(Error::Shape(format!(
            "{}: {what} {}x{} vs {}x{}",
            drm.op().name(),
            a.nrow(),
            a.ncol(),
            b.0,
            b.1
        )))
    };

    match drm.op() {
        MatMul(a, b) if a.ncol() != b.nrow() => {
            mismatch("inner dimensions", a, (b.nrow(), b.ncol()))
        }
        MatMulTransA(a, b) if a.nrow() != b.nrow() => {
            mismatch("row counts", a, (b.nrow(), b.ncol()))
        }
        MatMulTransB(a, b) if a.ncol() != b.ncol() => {
            mismatch("column counts", a, (b.nrow(), b.ncol()))
        }
        Elementwise(a, b, _) if a.nrow() != b.nrow() || a.ncol() != b.ncol() => {
            mismatch("operand shapes", a, (b.nrow(), b.ncol()))
        }
        LeftMatrixMultiply(m, a) if m.ncol() != a.nrow() => {
            mismatch("in-core columns", a, (m.nrow(), m.ncol()))
        }
        RightMatrixMultiply(a, m) if a.ncol() != m.nrow() => {
            mismatch("in-core rows", a, (m.nrow(), m.ncol()))
        }
        RowRange(a, r) if r.start > r.end || r.end > a.nrow() => Err(Error::Shape(format!(
            "RowRange: {}..{} outside 0..{}",
            r.start,
            r.end,
            a.nrow()
        ))),
        RowRange(a, _) if !a.key_type().is_int() => Err(Error::Invariant(format!(
            "RowRange needs int row keys, operand is {}-keyed",
            a.key_type()
        ))),
        _ => Ok(()),
    }
}

/// Non-zero count derivable from logical metadata alone. Shapes whose count
/// would require looking at the data come out `Unknown`.
pub fn non_zero_count(drm: &Drm) -> NonZeroCount {
    match try_non_zero_count(drm) {
        Some(n) => NonZeroCount::Counted(n),
        None => NonZeroCount::Unknown,
    }
}

fn try_non_zero_count(drm: &Drm) -> Option<u64> {
    use LogicalOp::*;
    match drm.op() {
        Checkpoint(cp) => cp.nnz().counted(),
        Transpose(a) | TransposeAnyKey(a) => try_non_zero_count(a),
        ElementwiseScalar(a, s, ScalarOp::Mul) if *s == 0.0 => {
            // Still walk the operand: an unknown input stays unknown.
            try_non_zero_count(a).map(|_| 0)
        }
        ElementwiseScalar(a, s, ScalarOp::Mul | ScalarOp::Div) if s.is_finite() && *s != 0.0 => {
            try_non_zero_count(a)
        }
        RowRange(a, r) if r.start == 0 && r.end == a.nrow() => try_non_zero_count(a),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logical::EwiseOp;
    use crate::testing::leaf;
    use std::sync::Arc;

    fn leaf_with_nnz(nnz: u64) -> Drm {
        Drm::from_checkpoint(crate::logical::CheckpointedDrm::new(
            PhysicalHandle::new(3, ()),
            10,
            3,
            NonZeroCount::Counted(nnz),
            StorageLevel::MEMORY_ONLY,
            PartitionTag::new(9),
            KeyType::Int,
        ))
    }

    #[test]
    fn matmul_inner_dimension_checked() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let b = leaf(4, 2, KeyType::Int, 2);
        let ab = Drm::new(LogicalOp::MatMul(a.clone(), b));
        assert!(matches!(validate_shapes(&ab), Err(Error::Shape(_))));

        let ok = Drm::new(LogicalOp::MatMul(a, leaf(3, 2, KeyType::Int, 3)));
        validate_shapes(&ok).unwrap();
    }

    #[test]
    fn mismatch_found_below_root() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let b = leaf(9, 3, KeyType::Int, 2);
        let sum = Drm::new(LogicalOp::Elementwise(a, b, EwiseOp::Add));
        let scaled = Drm::new(LogicalOp::ElementwiseScalar(sum, 2.0, ScalarOp::Mul));
        assert!(matches!(validate_shapes(&scaled), Err(Error::Shape(_))));
    }

    #[test]
    fn row_range_bounds_and_keys() {
        let a = leaf(10, 3, KeyType::Int, 1);
        assert!(validate_shapes(&Drm::new(LogicalOp::RowRange(a.clone(), 5..11))).is_err());
        validate_shapes(&Drm::new(LogicalOp::RowRange(a, 5..10))).unwrap();

        let text = leaf(10, 3, KeyType::Text, 1);
        let err = validate_shapes(&Drm::new(LogicalOp::RowRange(text, 0..2))).unwrap_err();
        assert!(matches!(err, Error::Invariant(_)));
    }

    #[test]
    fn in_core_dimensions_checked() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let m = Arc::new(InCoreMatrix::zeros(4, 2));
        let right = Drm::new(LogicalOp::RightMatrixMultiply(a, m));
        assert!(validate_shapes(&right).is_err());
    }

    #[test]
    fn nnz_from_metadata_or_unknown() {
        let a = leaf_with_nnz(12);
        let t = Drm::new(LogicalOp::Transpose(a.clone()));
        assert_eq!(non_zero_count(&t), NonZeroCount::Counted(12));

        let doubled = Drm::new(LogicalOp::ElementwiseScalar(a.clone(), 2.0, ScalarOp::Mul));
        assert_eq!(non_zero_count(&doubled), NonZeroCount::Counted(12));

        let shifted = Drm::new(LogicalOp::ElementwiseScalar(a.clone(), 1.0, ScalarOp::Add));
        assert_eq!(non_zero_count(&shifted), NonZeroCount::Unknown);
        assert_eq!(non_zero_count(&shifted).as_i64(), -1);

        let gram = Drm::new(LogicalOp::SelfGramian(a));
        assert_eq!(non_zero_count(&gram), NonZeroCount::Unknown);
    }

    #[test]
    fn unknown_leaf_stays_unknown() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let zeroed = Drm::new(LogicalOp::ElementwiseScalar(a, 0.0, ScalarOp::Mul));
        assert_eq!(non_zero_count(&zeroed), NonZeroCount::Unknown);
    }
}
