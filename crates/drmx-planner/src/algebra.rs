//! User-facing algebra over `Drm` expressions.
//!
//! Operators follow the usual matrix-DSL conventions: `*` is the Hadamard
//! product and `times` is the matrix product. Nothing here executes; each
//! combinator only builds a logical node.

use std::ops::{Add, Div, Mul, Range, Sub};
use std::sync::Arc;

use drmx_core::prelude::*;

use crate::logical::{BlockMap, Drm, EwiseOp, LogicalOp, ScalarOp};

impl Drm {
    /// Transpose. Non-`Int` keys can't be flipped physically, so those
    /// operands get the key-agnostic form that only products can consume.
    pub fn t(&self) -> Drm {
        if self.key_type().is_int() {
            Drm::new(LogicalOp::Transpose(self.clone()))
        } else {
            Drm::new(LogicalOp::TransposeAnyKey(self.clone()))
        }
    }

    /// Matrix product `self %*% rhs`.
    pub fn times(&self, rhs: &Drm) -> Drm {
        Drm::new(LogicalOp::MatMul(self.clone(), rhs.clone()))
    }

    /// `self %*% m` with a small in-core right operand.
    pub fn times_in_core(&self, m: InCoreMatrix) -> Drm {
        Drm::new(LogicalOp::RightMatrixMultiply(self.clone(), Arc::new(m)))
    }

    pub fn hadamard(&self, rhs: &Drm) -> Drm {
        self.ewise(rhs, EwiseOp::Hadamard)
    }

    pub fn rows(&self, range: Range<usize>) -> Drm {
        Drm::new(LogicalOp::RowRange(self.clone(), range))
    }

    /// Apply `f` to every partition block. `ncol` is the width `f` produces.
    pub fn map_block<F>(&self, ncol: usize, f: F) -> Drm
    where
        F: Fn(&[RowKey], &InCoreMatrix) -> Result<InCoreMatrix> + Send + Sync + 'static,
    {
        Drm::new(LogicalOp::MapBlock(self.clone(), BlockMap::new(ncol, f)))
    }

    pub fn ewise(&self, rhs: &Drm, op: EwiseOp) -> Drm {
        Drm::new(LogicalOp::Elementwise(self.clone(), rhs.clone(), op))
    }

    pub fn scalar(&self, s: f64, op: ScalarOp) -> Drm {
        Drm::new(LogicalOp::ElementwiseScalar(self.clone(), s, op))
    }
}

/// `m %*% drm` for an in-core left operand.
pub trait InCoreTimes {
    fn times_drm(&self, drm: &Drm) -> Drm;
}

impl InCoreTimes for InCoreMatrix {
    fn times_drm(&self, drm: &Drm) -> Drm {
        Drm::new(LogicalOp::LeftMatrixMultiply(Arc::new(self.clone()), drm.clone()))
    }
}

macro_rules! ewise_ops {
    ($($trait:ident :: $method:ident => $op:expr),* $(,)?) => {$(
        impl $trait<&Drm> for &Drm {
            type Output = Drm;
            fn $method(self, rhs: &Drm) -> Drm {
                self.ewise(rhs, $op)
            }
        }

        impl $trait<Drm> for Drm {
            type Output = Drm;
            fn $method(self, rhs: Drm) -> Drm {
                self.ewise(&rhs, $op)
            }
        }
    )*};
}

ewise_ops! {
    Add::add => EwiseOp::Add,
    Sub::sub => EwiseOp::Sub,
    Mul::mul => EwiseOp::Hadamard,
    Div::div => EwiseOp::Div,
}

macro_rules! scalar_ops {
    ($($trait:ident :: $method:ident => $op:expr, $rev:expr),* $(,)?) => {$(
        impl $trait<f64> for &Drm {
            type Output = Drm;
            fn $method(self, s: f64) -> Drm {
                self.scalar(s, $op)
            }
        }

        impl $trait<f64> for Drm {
            type Output = Drm;
            fn $method(self, s: f64) -> Drm {
                self.scalar(s, $op)
            }
        }

        impl $trait<&Drm> for f64 {
            type Output = Drm;
            fn $method(self, drm: &Drm) -> Drm {
                drm.scalar(self, $rev)
            }
        }
    )*};
}

// Scalar on the left: `+` and `*` commute, `-` and `/` reverse.
scalar_ops! {
    Add::add => ScalarOp::Add, ScalarOp::Add,
    Sub::sub => ScalarOp::Sub, ScalarOp::SubFrom,
    Mul::mul => ScalarOp::Mul, ScalarOp::Mul,
    Div::div => ScalarOp::Div, ScalarOp::DivInto,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::leaf;

    #[test]
    fn transpose_picks_variant_by_key_type() {
        let ints = leaf(10, 3, KeyType::Int, 1);
        assert!(matches!(ints.t().op(), LogicalOp::Transpose(_)));
        let texts = leaf(10, 3, KeyType::Text, 1);
        assert!(matches!(texts.t().op(), LogicalOp::TransposeAnyKey(_)));
        let longs = leaf(10, 3, KeyType::Long, 1);
        assert!(matches!(longs.t().op(), LogicalOp::TransposeAnyKey(_)));
    }

    #[test]
    fn operators_build_expected_nodes() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let b = leaf(10, 3, KeyType::Int, 2);

        assert!(matches!((&a * &b).op(), LogicalOp::Elementwise(_, _, EwiseOp::Hadamard)));
        assert!(matches!((&a - 1.0).op(), LogicalOp::ElementwiseScalar(_, _, ScalarOp::Sub)));
        assert!(matches!((1.0 - &a).op(), LogicalOp::ElementwiseScalar(_, _, ScalarOp::SubFrom)));
        assert!(matches!((2.0 / &a).op(), LogicalOp::ElementwiseScalar(_, _, ScalarOp::DivInto)));
        assert!(matches!((3.0 * &a).op(), LogicalOp::ElementwiseScalar(_, _, ScalarOp::Mul)));
        assert!(matches!(a.t().times(&b).op(), LogicalOp::MatMul(..)));

        let m = InCoreMatrix::identity(10);
        let left = m.times_drm(&a);
        assert!(matches!(left.op(), LogicalOp::LeftMatrixMultiply(..)));
        assert_eq!((left.nrow(), left.ncol()), (10, 3));
    }

    #[test]
    fn map_block_declares_width() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let widened = a.map_block(5, |_keys, block| Ok(InCoreMatrix::zeros(block.nrow(), 5)));
        assert_eq!(widened.ncol(), 5);
        assert_eq!(widened.partition_tag(), a.partition_tag());
    }
}
