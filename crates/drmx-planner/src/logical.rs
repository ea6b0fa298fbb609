//! Logical expression tree over distributed row-keyed matrices.
//!
//! Nodes are immutable and shared through `Arc`; rewrites build new nodes
//! instead of patching children in place. Every node gets a fresh `NodeId`,
//! which is what the checkpoint manager keys its cache on.

use std::fmt;
use std::ops::Range;
use std::sync::{Arc, Weak};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use drmx_core::prelude::*;

use crate::shape::{self, NonZeroCount};

/// Element-wise binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EwiseOp {
    Add,
    Sub,
    Hadamard,
    Div,
}

impl EwiseOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            EwiseOp::Add => a + b,
            EwiseOp::Sub => a - b,
            EwiseOp::Hadamard => a * b,
            EwiseOp::Div => a / b,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            EwiseOp::Add => "+",
            EwiseOp::Sub => "-",
            EwiseOp::Hadamard => "*",
            EwiseOp::Div => "/",
        }
    }
}

/// Matrix-scalar operators. `SubFrom` and `DivInto` put the scalar on the left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarOp {
    Add,
    Sub,
    SubFrom,
    Mul,
    Div,
    DivInto,
}

impl ScalarOp {
    pub fn apply(self, x: f64, s: f64) -> f64 {
        match self {
            ScalarOp::Add => x + s,
            ScalarOp::Sub => x - s,
            ScalarOp::SubFrom => s - x,
            ScalarOp::Mul => x * s,
            ScalarOp::Div => x / s,
            ScalarOp::DivInto => s / x,
        }
    }

    pub fn is_reversed(self) -> bool {
        matches!(self, ScalarOp::SubFrom | ScalarOp::DivInto)
    }

    pub fn symbol(self) -> &'static str {
        match self {
            ScalarOp::Add => "+",
            ScalarOp::Sub => "-",
            ScalarOp::SubFrom => "-:",
            ScalarOp::Mul => "*",
            ScalarOp::Div => "/",
            ScalarOp::DivInto => "/:",
        }
    }
}

pub type BlockFn = dyn Fn(&[RowKey], &InCoreMatrix) -> Result<InCoreMatrix> + Send + Sync;

/// User block transform with its declared output width.
#[derive(Clone)]
pub struct BlockMap {
    ncol: usize,
    f: Arc<BlockFn>,
}

impl BlockMap {
    pub fn new<F>(ncol: usize, f: F) -> Self
    where
        F: Fn(&[RowKey], &InCoreMatrix) -> Result<InCoreMatrix> + Send + Sync + 'static,
    {
        Self { ncol, f: Arc::new(f) }
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Run the function on one block. The output must keep the row count and
    /// have exactly the declared number of columns.
    pub fn apply(&self, keys: &[RowKey], block: &InCoreMatrix) -> Result<InCoreMatrix> {
        let out = (self.f)(keys, block)?;
        if out.nrow() != block.nrow() || out.ncol() != self.ncol {
            return Err(Error::Shape(format!(
                "map-block produced {}x{}, expected {}x{}",
                out.nrow(),
                out.ncol(),
                block.nrow(),
                self.ncol
            )));
        }
        Ok(out)
    }

    /// Functions are opaque; two block maps are the same only if they share
    /// the closure.
    pub fn same_fn(&self, other: &BlockMap) -> bool {
        self.ncol == other.ncol
            && Arc::as_ptr(&self.f) as *const () == Arc::as_ptr(&other.f) as *const ()
    }
}

impl fmt::Debug for BlockMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockMap")
            .field("ncol", &self.ncol)
            .finish_non_exhaustive()
    }
}

/// A materialized result: the terminal leaf of every expression.
#[derive(Debug)]
pub struct CheckpointedDrm {
    id: CheckpointId,
    handle: PhysicalHandle,
    nrow: usize,
    ncol: usize,
    nnz: NonZeroCount,
    storage_level: StorageLevel,
    tag: PartitionTag,
    key_type: KeyType,
}

impl CheckpointedDrm {
    pub fn new(
        handle: PhysicalHandle,
        nrow: usize,
        ncol: usize,
        nnz: NonZeroCount,
        storage_level: StorageLevel,
        tag: PartitionTag,
        key_type: KeyType,
    ) -> Self {
        Self {
            id: CheckpointId::next(),
            handle,
            nrow,
            ncol,
            nnz,
            storage_level,
            tag,
            key_type,
        }
    }

    pub fn id(&self) -> CheckpointId {
        self.id
    }
    pub fn handle(&self) -> &PhysicalHandle {
        &self.handle
    }
    pub fn nrow(&self) -> usize {
        self.nrow
    }
    pub fn ncol(&self) -> usize {
        self.ncol
    }
    pub fn nnz(&self) -> NonZeroCount {
        self.nnz
    }
    pub fn storage_level(&self) -> StorageLevel {
        self.storage_level
    }
    pub fn partition_tag(&self) -> PartitionTag {
        self.tag
    }
    pub fn key_type(&self) -> KeyType {
        self.key_type
    }
}

/// Logical operators. Every rewrite pass and the lowering match on this
/// enum exhaustively.
#[derive(Clone)]
pub enum LogicalOp {
    Checkpoint(Arc<CheckpointedDrm>),
    Transpose(Drm),
    /// Transpose of a non-`Int`-keyed operand. Only meaningful as the left
    /// side of a product; it has no physical implementation.
    TransposeAnyKey(Drm),
    MatMul(Drm, Drm),
    /// `A' B`, produced by rewriting only.
    MatMulTransA(Drm, Drm),
    /// `A B'`, produced by rewriting only.
    MatMulTransB(Drm, Drm),
    /// `A' A`.
    SelfGramian(Drm),
    Elementwise(Drm, Drm, EwiseOp),
    ElementwiseScalar(Drm, f64, ScalarOp),
    RowRange(Drm, Range<usize>),
    LeftMatrixMultiply(Arc<InCoreMatrix>, Drm),
    RightMatrixMultiply(Drm, Arc<InCoreMatrix>),
    MapBlock(Drm, BlockMap),
}

impl LogicalOp {
    pub fn name(&self) -> &'static str {
        match self {
            LogicalOp::Checkpoint(_) => "Checkpoint",
            LogicalOp::Transpose(_) => "Transpose",
            LogicalOp::TransposeAnyKey(_) => "TransposeAnyKey",
            LogicalOp::MatMul(..) => "MatMul",
            LogicalOp::MatMulTransA(..) => "MatMulTransA",
            LogicalOp::MatMulTransB(..) => "MatMulTransB",
            LogicalOp::SelfGramian(_) => "SelfGramian",
            LogicalOp::Elementwise(..) => "Elementwise",
            LogicalOp::ElementwiseScalar(..) => "ElementwiseScalar",
            LogicalOp::RowRange(..) => "RowRange",
            LogicalOp::LeftMatrixMultiply(..) => "LeftMatrixMultiply",
            LogicalOp::RightMatrixMultiply(..) => "RightMatrixMultiply",
            LogicalOp::MapBlock(..) => "MapBlock",
        }
    }

    pub fn operands(&self) -> Vec<&Drm> {
        use LogicalOp::*;
        match self {
            Checkpoint(_) => vec![],
            Transpose(a)
            | TransposeAnyKey(a)
            | SelfGramian(a)
            | ElementwiseScalar(a, ..)
            | RowRange(a, _)
            | LeftMatrixMultiply(_, a)
            | RightMatrixMultiply(a, _)
            | MapBlock(a, _) => vec![a],
            MatMul(a, b) | MatMulTransA(a, b) | MatMulTransB(a, b) | Elementwise(a, b, _) => {
                vec![a, b]
            }
        }
    }

    /// Same operator with every operand replaced by `f(operand)`.
    pub fn map_operands<F>(&self, mut f: F) -> Result<LogicalOp>
    where
        F: FnMut(&Drm) -> Result<Drm>,
    {
        use LogicalOp::*;
        Ok(match self {
            Checkpoint(cp) => Checkpoint(Arc::clone(cp)),
            Transpose(a) => Transpose(f(a)?),
            TransposeAnyKey(a) => TransposeAnyKey(f(a)?),
            MatMul(a, b) => MatMul(f(a)?, f(b)?),
            MatMulTransA(a, b) => MatMulTransA(f(a)?, f(b)?),
            MatMulTransB(a, b) => MatMulTransB(f(a)?, f(b)?),
            SelfGramian(a) => SelfGramian(f(a)?),
            Elementwise(a, b, op) => Elementwise(f(a)?, f(b)?, *op),
            ElementwiseScalar(a, s, op) => ElementwiseScalar(f(a)?, *s, *op),
            RowRange(a, r) => RowRange(f(a)?, r.clone()),
            LeftMatrixMultiply(m, a) => LeftMatrixMultiply(Arc::clone(m), f(a)?),
            RightMatrixMultiply(a, m) => RightMatrixMultiply(f(a)?, Arc::clone(m)),
            MapBlock(a, bm) => MapBlock(f(a)?, bm.clone()),
        })
    }

    /// Row-key type of the result. Products indexed by a column space and
    /// transposes come out `Int`-keyed; everything else keeps the left
    /// operand's keys.
    fn result_key_type(&self) -> KeyType {
        use LogicalOp::*;
        match self {
            Checkpoint(cp) => cp.key_type(),
            Transpose(_)
            | TransposeAnyKey(_)
            | MatMulTransA(..)
            | SelfGramian(_)
            | LeftMatrixMultiply(..) => KeyType::Int,
            MatMul(a, _)
            | MatMulTransB(a, _)
            | Elementwise(a, ..)
            | ElementwiseScalar(a, ..)
            | RowRange(a, _)
            | RightMatrixMultiply(a, _)
            | MapBlock(a, _) => a.key_type(),
        }
    }

    /// Operand whose partitioning this operator keeps, if any. An
    /// element-wise join only keeps it when both sides are co-partitioned;
    /// otherwise rows only the right side has land in new places.
    fn partitioning_source(&self) -> Option<&Drm> {
        use LogicalOp::*;
        match self {
            Elementwise(a, b, _) if a.partition_tag().matches(b.partition_tag()) => Some(a),
            Elementwise(..) => None,
            ElementwiseScalar(a, ..)
            | RightMatrixMultiply(a, _)
            | MapBlock(a, _) => Some(a),
            _ => None,
        }
    }
}

struct Node {
    id: NodeId,
    op: LogicalOp,
    key_type: KeyType,
    nrow: usize,
    ncol: usize,
    tag: OnceCell<PartitionTag>,
}

/// Handle to a logical expression node. Cloning shares the node.
#[derive(Clone)]
pub struct Drm(Arc<Node>);

impl Drm {
    pub fn new(op: LogicalOp) -> Drm {
        Self::build(op, None)
    }

    /// A node standing in for `original` after a rewrite. It inherits the
    /// original's partitioning tag so the tag survives optimization.
    pub fn replacing(op: LogicalOp, original: &Drm) -> Drm {
        Self::build(op, Some(original.partition_tag()))
    }

    fn build(op: LogicalOp, tag: Option<PartitionTag>) -> Drm {
        let (nrow, ncol) = shape::infer(&op);
        let key_type = op.result_key_type();
        let cell = OnceCell::new();
        if let Some(t) = tag {
            let _ = cell.set(t);
        }
        Drm(Arc::new(Node {
            id: NodeId::next(),
            op,
            key_type,
            nrow,
            ncol,
            tag: cell,
        }))
    }

    pub fn from_checkpoint(cp: CheckpointedDrm) -> Drm {
        Self::new(LogicalOp::Checkpoint(Arc::new(cp)))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn op(&self) -> &LogicalOp {
        &self.0.op
    }

    pub fn key_type(&self) -> KeyType {
        self.0.key_type
    }

    pub fn nrow(&self) -> usize {
        self.0.nrow
    }

    pub fn ncol(&self) -> usize {
        self.0.ncol
    }

    /// Lazily assigned, then fixed for the node's lifetime.
    pub fn partition_tag(&self) -> PartitionTag {
        *self.0.tag.get_or_init(|| match &self.0.op {
            LogicalOp::Checkpoint(cp) => cp.partition_tag(),
            op => match op.partitioning_source() {
                Some(src) => src.partition_tag(),
                None => TagGenerator::global().fresh(),
            },
        })
    }

    pub fn checkpoint(&self) -> Option<&Arc<CheckpointedDrm>> {
        match &self.0.op {
            LogicalOp::Checkpoint(cp) => Some(cp),
            _ => None,
        }
    }

    pub fn is_checkpoint(&self) -> bool {
        self.checkpoint().is_some()
    }

    /// Same node, not merely an equal expression.
    pub fn ptr_eq(&self, other: &Drm) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Whether any other handle shares this node.
    pub fn is_shared(&self) -> bool {
        Arc::strong_count(&self.0) > 1
    }

    pub fn downgrade(&self) -> WeakDrm {
        WeakDrm(Arc::downgrade(&self.0))
    }
}

/// Non-owning reference to a node; used by the checkpoint cache to notice
/// expressions that went out of scope.
#[derive(Clone)]
pub struct WeakDrm(Weak<Node>);

impl WeakDrm {
    pub fn upgrade(&self) -> Option<Drm> {
        self.0.upgrade().map(Drm)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}

impl PartialEq for Drm {
    fn eq(&self, other: &Drm) -> bool {
        if self.ptr_eq(other) {
            return true;
        }
        use LogicalOp::*;
        match (self.op(), other.op()) {
            (Checkpoint(a), Checkpoint(b)) => a.id() == b.id(),
            (Transpose(a), Transpose(b))
            | (TransposeAnyKey(a), TransposeAnyKey(b))
            | (SelfGramian(a), SelfGramian(b)) => a == b,
            (MatMul(a1, b1), MatMul(a2, b2))
            | (MatMulTransA(a1, b1), MatMulTransA(a2, b2))
            | (MatMulTransB(a1, b1), MatMulTransB(a2, b2)) => a1 == a2 && b1 == b2,
            (Elementwise(a1, b1, o1), Elementwise(a2, b2, o2)) => {
                o1 == o2 && a1 == a2 && b1 == b2
            }
            (ElementwiseScalar(a1, s1, o1), ElementwiseScalar(a2, s2, o2)) => {
                o1 == o2 && s1.to_bits() == s2.to_bits() && a1 == a2
            }
            (RowRange(a1, r1), RowRange(a2, r2)) => r1 == r2 && a1 == a2,
            (LeftMatrixMultiply(m1, a1), LeftMatrixMultiply(m2, a2)) => m1 == m2 && a1 == a2,
            (RightMatrixMultiply(a1, m1), RightMatrixMultiply(a2, m2)) => m1 == m2 && a1 == a2,
            (MapBlock(a1, f1), MapBlock(a2, f2)) => f1.same_fn(f2) && a1 == a2,
            _ => false,
        }
    }
}

impl fmt::Debug for Drm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use LogicalOp::*;
        match self.op() {
            Checkpoint(cp) => {
                write!(f, "Checkpoint#{}[{}x{}]", cp.id().get(), cp.nrow(), cp.ncol())
            }
            ElementwiseScalar(a, s, op) => {
                write!(f, "ElementwiseScalar({a:?} {} {s})", op.symbol())
            }
            Elementwise(a, b, op) => write!(f, "Elementwise({a:?} {} {b:?})", op.symbol()),
            RowRange(a, r) => write!(f, "RowRange({a:?}, {}..{})", r.start, r.end),
            LeftMatrixMultiply(m, a) => write!(f, "LeftMatrixMultiply({m:?}, {a:?})"),
            RightMatrixMultiply(a, m) => write!(f, "RightMatrixMultiply({a:?}, {m:?})"),
            MapBlock(a, bm) => write!(f, "MapBlock({a:?}, ncol={})", bm.ncol()),
            op => {
                let mut t = f.debug_tuple(op.name());
                for operand in op.operands() {
                    t.field(operand);
                }
                t.finish()
            }
        }
    }
}
