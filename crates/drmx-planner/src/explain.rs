//! Serializable plan descriptions.
//!
//! A description carries only deterministic facts (operator, parameters,
//! shape, key type), never node ids or partition tags, so two builds of the
//! same expression describe and hash identically.

use std::fmt;

use serde::{Deserialize, Serialize};

use drmx_core::hash::{Hash256, PlanHasher};
use drmx_core::prelude::*;

use crate::logical::{Drm, LogicalOp};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanDescription {
    pub op: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub nrow: usize,
    pub ncol: usize,
    pub key_type: KeyType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<PlanDescription>,
}

pub fn describe(drm: &Drm) -> PlanDescription {
    use LogicalOp::*;
    let detail = match drm.op() {
        Checkpoint(cp) => Some(format!(
            "{}, nnz={}",
            cp.storage_level(),
            cp.nnz().as_i64()
        )),
        Elementwise(_, _, op) => Some(op.symbol().to_string()),
        ElementwiseScalar(_, s, op) => Some(format!("{} {s}", op.symbol())),
        RowRange(_, r) => Some(format!("{}..{}", r.start, r.end)),
        LeftMatrixMultiply(m, _) | RightMatrixMultiply(_, m) => {
            Some(format!("in-core {}x{}", m.nrow(), m.ncol()))
        }
        MapBlock(_, bm) => Some(format!("ncol={}", bm.ncol())),
        _ => None,
    };
    PlanDescription {
        op: drm.op().name().to_string(),
        detail,
        nrow: drm.nrow(),
        ncol: drm.ncol(),
        key_type: drm.key_type(),
        children: drm.op().operands().into_iter().map(describe).collect(),
    }
}

/// blake3 over the JSON description, followed by every in-core operand
/// (pre-order) by value, so plans differing only in a small matrix do not
/// collide.
pub fn plan_hash(drm: &Drm) -> Result<Hash256> {
    let mut in_core = Vec::new();
    collect_in_core(drm, &mut in_core);

    let mut hasher = PlanHasher::new();
    hasher.update_json(&describe(drm))?;
    for m in in_core {
        hasher.update_json(&(m.nrow(), m.ncol()))?;
        for row in m.rows() {
            hasher.update_f64s(row);
        }
    }
    Ok(hasher.finish())
}

fn collect_in_core<'a>(drm: &'a Drm, out: &mut Vec<&'a InCoreMatrix>) {
    match drm.op() {
        LogicalOp::LeftMatrixMultiply(m, _) | LogicalOp::RightMatrixMultiply(_, m) => out.push(m),
        _ => {}
    }
    for operand in drm.op().operands() {
        collect_in_core(operand, out);
    }
}

impl fmt::Display for PlanDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

impl PlanDescription {
    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}{}", "", self.op, indent = depth * 2)?;
        if let Some(d) = &self.detail {
            write!(f, " ({d})")?;
        }
        writeln!(f, " [{}x{}, {}]", self.nrow, self.ncol, self.key_type)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }

    /// Number of nodes with the given operator name.
    pub fn count(&self, op: &str) -> usize {
        usize::from(self.op == op) + self.children.iter().map(|c| c.count(op)).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::optimize;
    use crate::testing::leaf;

    #[test]
    fn description_is_tag_and_id_free() {
        let a = leaf(100, 4, KeyType::Int, 1);
        let b = leaf(100, 4, KeyType::Int, 99);
        let d1 = describe(&a.t().times(&a));
        let d2 = describe(&b.t().times(&b));
        assert_eq!(d1, d2);
        assert_eq!(plan_hash(&a.t().times(&a)).unwrap(), plan_hash(&b.t().times(&b)).unwrap());
    }

    #[test]
    fn rendering_indents_children() {
        let a = leaf(100, 4, KeyType::Int, 1);
        let out = optimize(&a.t().times(&a)).unwrap();
        let text = describe(&out).to_string();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "SelfGramian [4x4, int]");
        assert!(lines[1].starts_with("  Checkpoint (MEMORY_ONLY, nnz=-1)"), "{text}");
    }

    #[test]
    fn hash_sees_in_core_values() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let m1 = InCoreMatrix::identity(3);
        let m2 = InCoreMatrix::from_fn(3, 3, |i, j| if i == j { 2.0 } else { 0.0 });
        assert_eq!(describe(&a.times_in_core(m1.clone())), describe(&a.times_in_core(m2.clone())));
        assert_ne!(
            plan_hash(&a.times_in_core(m1)).unwrap(),
            plan_hash(&a.times_in_core(m2)).unwrap()
        );
    }

    #[test]
    fn json_round_trip_and_counts() {
        let a = leaf(10, 3, KeyType::Int, 1);
        let expr = a.t().t();
        let d = describe(&expr);
        assert_eq!(d.count("Transpose"), 2);
        let text = serde_json::to_string(&d).unwrap();
        let back: PlanDescription = serde_json::from_str(&text).unwrap();
        assert_eq!(back, d);
    }
}
