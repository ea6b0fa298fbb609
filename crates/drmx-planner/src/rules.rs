//! Rewrite passes: algebraic normalization, then cleanup.
//!
//! Both passes are pure functions from tree to tree. The order is fixed;
//! there is no plan search and no cost model.

use std::sync::Arc;

use drmx_core::prelude::*;

use crate::logical::{Drm, LogicalOp};

/// Run both passes and check that the root kept its row-key type.
pub fn optimize(root: &Drm) -> Result<Drm> {
    let normalized = normalize(root)?;
    let cleaned = cleanup(&normalized)?;
    if cleaned.key_type() != root.key_type() {
        return Err(Error::Invariant(format!(
            "optimization changed row keys from {} to {}",
            root.key_type(),
            cleaned.key_type()
        )));
    }
    #[cfg(feature = "tracing")]
    tracing::debug!(root = %root.id(), optimized = %cleaned.id(), "optimized expression");
    Ok(cleaned)
}

/// Pass 1. Products are turned into forms that avoid a physical transpose:
/// `A'A`, `A'B` and `AB'`; left in-core multiplies become right ones.
/// Rules are tried top-down and the first match wins.
pub fn normalize(drm: &Drm) -> Result<Drm> {
    use LogicalOp::*;
    match drm.op() {
        MatMul(a, b) => normalize_product(drm, a, b),

        // M %*% B  ==  (B' %*% M')'
        LeftMatrixMultiply(m, b) => {
            fired("left-in-core-to-right");
            let bt = normalize(b)?.t();
            let right = Drm::new(RightMatrixMultiply(bt, Arc::new(m.transpose())));
            Ok(Drm::replacing(Transpose(right), drm))
        }

        Checkpoint(_) => Ok(drm.clone()),

        _ => rebuild(drm, normalize),
    }
}

fn normalize_product(drm: &Drm, a: &Drm, b: &Drm) -> Result<Drm> {
    use LogicalOp::*;

    // A'A: no transpose at all.
    match a.op() {
        Transpose(x) if x == b => {
            fired("self-gramian");
            return Ok(Drm::replacing(SelfGramian(normalize(x)?), drm));
        }
        TransposeAnyKey(x) if x == b => {
            fired("self-gramian-any-key");
            return Ok(Drm::replacing(SelfGramian(normalize(x)?), drm));
        }
        _ => {}
    }

    if let Transpose(y) = b.op() {
        fired("a-b-transposed");
        return Ok(Drm::replacing(MatMulTransB(normalize(a)?, normalize(y)?), drm));
    }

    match a.op() {
        Transpose(x) if x.partition_tag().matches(b.partition_tag()) => {
            fired("a-transposed-b-copartitioned");
            Ok(Drm::replacing(MatMulTransA(normalize(x)?, normalize(b)?), drm))
        }
        TransposeAnyKey(x) => {
            fired("a-transposed-b-any-key");
            Ok(Drm::replacing(MatMulTransA(normalize(x)?, normalize(b)?), drm))
        }
        // Same physical form as the co-partitioned case; choosing between
        // the two needs a cost model this planner does not have.
        Transpose(x) => {
            fired("a-transposed-b");
            Ok(Drm::replacing(MatMulTransA(normalize(x)?, normalize(b)?), drm))
        }
        _ => {
            fired("a-b-via-transposed-b");
            let bt = normalize(b)?.t();
            Ok(Drm::replacing(MatMulTransB(normalize(a)?, bt), drm))
        }
    }
}

/// Pass 2. Drops double transposes and rejects transposes that have no
/// physical meaning.
pub fn cleanup(drm: &Drm) -> Result<Drm> {
    use LogicalOp::*;
    match drm.op() {
        Transpose(inner) => match inner.op() {
            Transpose(a) => {
                fired("double-transpose");
                cleanup(a)
            }
            _ => rebuild(drm, cleanup),
        },
        TransposeAnyKey(a) => Err(Error::Invariant(format!(
            "non-integer-keyed transpose is not a valid physical operation \
             (operand is {}-keyed, {}x{})",
            a.key_type(),
            a.nrow(),
            a.ncol()
        ))),
        Checkpoint(_) => Ok(drm.clone()),
        _ => rebuild(drm, cleanup),
    }
}

/// Pass-through for operators without a rule of their own: rewrite the
/// operands, and keep the node itself when none of them changed.
fn rebuild(drm: &Drm, pass: fn(&Drm) -> Result<Drm>) -> Result<Drm> {
    let mut changed = false;
    let op = drm.op().map_operands(|operand| {
        let out = pass(operand)?;
        changed |= !out.ptr_eq(operand);
        Ok(out)
    })?;
    if changed {
        Ok(Drm::replacing(op, drm))
    } else {
        Ok(drm.clone())
    }
}

#[inline]
fn fired(rule: &'static str) {
    #[cfg(feature = "tracing")]
    tracing::trace!(rule, "rewrite rule fired");
    #[cfg(not(feature = "tracing"))]
    let _ = rule;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::InCoreTimes;
    use crate::logical::{EwiseOp, ScalarOp};
    use crate::testing::leaf;

    fn ints(nrow: usize, ncol: usize, tag: u64) -> Drm {
        leaf(nrow, ncol, KeyType::Int, tag)
    }

    #[test]
    fn self_gramian_detected_for_int_keys() {
        let a = ints(100, 4, 1);
        let out = normalize(&a.t().times(&a)).unwrap();
        assert_eq!(out, Drm::new(LogicalOp::SelfGramian(normalize(&a).unwrap())));
    }

    #[test]
    fn self_gramian_detected_for_any_key() {
        let a = leaf(100, 4, KeyType::Text, 1);
        let product = a.t().times(&a);
        assert!(matches!(
            product.op(),
            LogicalOp::MatMul(t, _) if matches!(t.op(), LogicalOp::TransposeAnyKey(_))
        ));
        let out = normalize(&product).unwrap();
        assert_eq!(out, Drm::new(LogicalOp::SelfGramian(a.clone())));
        assert_eq!(out.key_type(), KeyType::Int);
    }

    #[test]
    fn self_gramian_uses_structural_equality() {
        let a = ints(100, 4, 1);
        let b1 = &a + 1.0;
        let b2 = &a + 1.0;
        let out = normalize(&b1.t().times(&b2)).unwrap();
        assert!(matches!(out.op(), LogicalOp::SelfGramian(_)));
    }

    #[test]
    fn product_with_transposed_rhs_becomes_abt() {
        let a = ints(100, 4, 1);
        let b = ints(50, 4, 2);
        let out = normalize(&a.times(&b.t())).unwrap();
        assert_eq!(out, Drm::new(LogicalOp::MatMulTransB(a.clone(), b.clone())));
        assert!(!contains(&out, "Transpose"));
    }

    #[test]
    fn transposed_lhs_becomes_atb_with_or_without_copartitioning() {
        let a = ints(100, 4, 7);
        let same = ints(100, 3, 7);
        let other = ints(100, 3, 8);
        for b in [same, other] {
            let out = normalize(&a.t().times(&b)).unwrap();
            assert_eq!(out, Drm::new(LogicalOp::MatMulTransA(a.clone(), b.clone())));
        }
    }

    #[test]
    fn any_key_lhs_becomes_atb() {
        let a = leaf(100, 4, KeyType::Long, 7);
        let b = leaf(100, 3, KeyType::Long, 9);
        let out = normalize(&a.t().times(&b)).unwrap();
        assert_eq!(out, Drm::new(LogicalOp::MatMulTransA(a.clone(), b.clone())));
    }

    #[test]
    fn plain_product_routes_through_transposed_rhs() {
        let a = ints(100, 4, 1);
        let b = ints(4, 6, 2);
        let out = normalize(&a.times(&b)).unwrap();
        let expected = Drm::new(LogicalOp::MatMulTransB(
            a.clone(),
            Drm::new(LogicalOp::Transpose(b.clone())),
        ));
        assert_eq!(out, expected);
        assert_eq!((out.nrow(), out.ncol()), (100, 6));
    }

    #[test]
    fn left_multiply_is_double_transposed_right_multiply() {
        let a = ints(10, 3, 1);
        let m = InCoreMatrix::from_fn(2, 10, |i, j| (i * 10 + j) as f64);
        let out = normalize(&m.times_drm(&a)).unwrap();
        let expected = Drm::new(LogicalOp::Transpose(Drm::new(LogicalOp::RightMatrixMultiply(
            Drm::new(LogicalOp::Transpose(a.clone())),
            Arc::new(m.transpose()),
        ))));
        assert_eq!(out, expected);
        assert_eq!((out.nrow(), out.ncol()), (2, 3));
    }

    #[test]
    fn checkpoint_is_returned_as_is() {
        let a = ints(10, 3, 1);
        assert!(normalize(&a).unwrap().ptr_eq(&a));
        assert!(cleanup(&a).unwrap().ptr_eq(&a));
    }

    #[test]
    fn unary_and_binary_pass_through_rewrite_children() {
        let a = ints(10, 4, 1);
        let gram = a.t().times(&a);
        let expr = &(&gram * 2.0) + &gram;
        let out = normalize(&expr).unwrap();
        let LogicalOp::Elementwise(lhs, rhs, EwiseOp::Add) = out.op() else {
            panic!("expected elementwise add, got {out:?}");
        };
        assert!(matches!(rhs.op(), LogicalOp::SelfGramian(_)));
        let LogicalOp::ElementwiseScalar(inner, s, ScalarOp::Mul) = lhs.op() else {
            panic!("expected scalar multiply, got {lhs:?}");
        };
        assert_eq!(*s, 2.0);
        assert!(matches!(inner.op(), LogicalOp::SelfGramian(_)));
    }

    #[test]
    fn untouched_subtrees_keep_identity() {
        let a = ints(10, 4, 1);
        let expr = &a + 1.0;
        assert!(normalize(&expr).unwrap().ptr_eq(&expr));
    }

    #[test]
    fn rewritten_root_keeps_partition_tag() {
        let a = ints(10, 4, 1);
        let expr = a.t().times(&a);
        let tag = expr.partition_tag();
        assert_eq!(optimize(&expr).unwrap().partition_tag(), tag);
    }

    #[test]
    fn double_transpose_eliminated() {
        let a = ints(10, 4, 1);
        let tt = a.t().t();
        assert_eq!(cleanup(&tt).unwrap(), cleanup(&a).unwrap());

        let nested = (&a + 1.0).t().t().t().t();
        assert_eq!(cleanup(&nested).unwrap(), &a + 1.0);

        let odd = a.t().t().t();
        assert_eq!(cleanup(&odd).unwrap(), a.t());
    }

    #[test]
    fn any_key_transpose_rejected() {
        for key_type in [KeyType::Long, KeyType::Text] {
            let a = leaf(10, 4, key_type, 1);
            let err = cleanup(&a.t()).unwrap_err();
            assert!(matches!(err, Error::Invariant(_)), "{err}");
            // Buried below other operators too.
            let err = cleanup(&(&a.t() * 3.0)).unwrap_err();
            assert!(matches!(err, Error::Invariant(_)));
        }
    }

    #[test]
    fn any_key_transpose_alone_fails_optimize() {
        let a = leaf(10, 4, KeyType::Text, 1);
        assert!(matches!(optimize(&a.t()), Err(Error::Invariant(_))));
        // As a product's left side it is consumed by pass 1.
        let b = leaf(10, 2, KeyType::Text, 2);
        let out = optimize(&a.t().times(&b)).unwrap();
        assert!(matches!(out.op(), LogicalOp::MatMulTransA(..)));
    }

    #[test]
    fn left_multiply_of_any_key_operand_rejected() {
        let a = leaf(10, 3, KeyType::Text, 1);
        let m = InCoreMatrix::identity(10);
        assert!(matches!(optimize(&m.times_drm(&a)), Err(Error::Invariant(_))));
    }

    #[test]
    fn left_multiply_of_product_keeps_one_transpose_per_side() {
        let a = ints(10, 3, 1);
        let b = ints(10, 3, 2);
        let m = InCoreMatrix::identity(3);
        // (A' B) then M %*% ... : left multiply of a product.
        let expr = m.times_drm(&a.t().times(&b));
        let out = optimize(&expr).unwrap();
        assert!(matches!(out.op(), LogicalOp::Transpose(_)));
        let LogicalOp::Transpose(inner) = out.op() else { unreachable!() };
        let LogicalOp::RightMatrixMultiply(lhs, _) = inner.op() else {
            panic!("expected right multiply, got {inner:?}");
        };
        assert!(matches!(lhs.op(), LogicalOp::Transpose(_)));
    }

    fn contains(drm: &Drm, name: &str) -> bool {
        drm.op().name() == name || drm.op().operands().into_iter().any(|o| contains(o, name))
    }
}
