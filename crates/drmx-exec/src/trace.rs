//! Call-recording wrapper around a substrate.
//!
//! Delegates every call and keeps an ordered log, so callers can check how
//! many physical operations a plan actually cost.

use std::ops::Range;
use std::sync::Mutex;

use serde::Serialize;

use drmx_core::prelude::*;
use drmx_planner::{BlockMap, CheckpointedDrm, Drm, EwiseOp, ScalarOp};

use crate::physical::{KeyedRow, PhysicalOps};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordedCall {
    pub op: &'static str,
    /// Logical node being lowered; absent for substrate primitives.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub node: Option<NodeId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub zippable: Option<bool>,
}

pub struct CallRecorder<B> {
    inner: B,
    calls: Mutex<Vec<RecordedCall>>,
}

impl<B: PhysicalOps> CallRecorder<B> {
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn inner(&self) -> &B {
        &self.inner
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn count(&self, op: &str) -> usize {
        self.calls
            .lock()
            .map(|c| c.iter().filter(|call| call.op == op).count())
            .unwrap_or(0)
    }

    pub fn clear(&self) {
        if let Ok(mut c) = self.calls.lock() {
            c.clear();
        }
    }

    fn record(&self, op: &'static str, node: Option<&Drm>, zippable: Option<bool>) -> Result<()> {
        self.calls
            .lock()
            .map_err(|_| Error::Exec("call log lock poisoned".to_string()))?
            .push(RecordedCall {
                op,
                node: node.map(Drm::id),
                zippable,
            });
        Ok(())
    }
}

impl<B: PhysicalOps> PhysicalOps for CallRecorder<B> {
    fn name(&self) -> &'static str {
        self.inner.name()
    }

    fn read_checkpoint(&self, cp: &CheckpointedDrm) -> Result<PhysicalHandle> {
        self.record("read_checkpoint", None, None)?;
        self.inner.read_checkpoint(cp)
    }

    fn transpose(&self, node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle> {
        self.record("transpose", Some(node), None)?;
        self.inner.transpose(node, a)
    }

    fn at_b(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        zippable: bool,
    ) -> Result<PhysicalHandle> {
        self.record("at_b", Some(node), Some(zippable))?;
        self.inner.at_b(node, a, b, zippable)
    }

    fn ab_t(&self, node: &Drm, a: &PhysicalHandle, b: &PhysicalHandle) -> Result<PhysicalHandle> {
        self.record("ab_t", Some(node), None)?;
        self.inner.ab_t(node, a, b)
    }

    fn at_a(&self, node: &Drm, a: &PhysicalHandle) -> Result<PhysicalHandle> {
        self.record("at_a", Some(node), None)?;
        self.inner.at_a(node, a)
    }

    fn ewise(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        b: &PhysicalHandle,
        op: EwiseOp,
    ) -> Result<PhysicalHandle> {
        self.record("ewise", Some(node), None)?;
        self.inner.ewise(node, a, b, op)
    }

    fn ewise_scalar(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        scalar: f64,
        op: ScalarOp,
    ) -> Result<PhysicalHandle> {
        self.record("ewise_scalar", Some(node), None)?;
        self.inner.ewise_scalar(node, a, scalar, op)
    }

    fn row_range(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        range: Range<usize>,
    ) -> Result<PhysicalHandle> {
        self.record("row_range", Some(node), None)?;
        self.inner.row_range(node, a, range)
    }

    fn times_right_in_core(
        &self,
        node: &Drm,
        a: &PhysicalHandle,
        m: &InCoreMatrix,
    ) -> Result<PhysicalHandle> {
        self.record("times_right_in_core", Some(node), None)?;
        self.inner.times_right_in_core(node, a, m)
    }

    fn map_block(&self, node: &Drm, a: &PhysicalHandle, f: &BlockMap) -> Result<PhysicalHandle> {
        self.record("map_block", Some(node), None)?;
        self.inner.map_block(node, a, f)
    }

    fn parallelize(
        &self,
        rows: Vec<KeyedRow>,
        ncol: usize,
        partitions: usize,
    ) -> Result<PhysicalHandle> {
        self.record("parallelize", None, None)?;
        self.inner.parallelize(rows, ncol, partitions)
    }

    fn persist(&self, handle: &PhysicalHandle, level: StorageLevel) -> Result<()> {
        self.record("persist", None, None)?;
        self.inner.persist(handle, level)
    }

    fn release(&self, handle: &PhysicalHandle) -> Result<()> {
        self.record("release", None, None)?;
        self.inner.release(handle)
    }

    fn collect(&self, handle: &PhysicalHandle) -> Result<Vec<KeyedRow>> {
        self.record("collect", None, None)?;
        self.inner.collect(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::LocalBackend;

    #[test]
    fn records_in_order_and_delegates() {
        let rec = CallRecorder::new(LocalBackend::new());
        let h = rec.parallelize(vec![(RowKey::Int(0), vec![1.0, 2.0])], 2, 1).unwrap();
        rec.persist(&h, StorageLevel::MEMORY_ONLY).unwrap();
        assert!(rec.inner().is_persisted(&h));
        assert_eq!(rec.collect(&h).unwrap(), vec![(RowKey::Int(0), vec![1.0, 2.0])]);

        let ops: Vec<&str> = rec.calls().iter().map(|c| c.op).collect();
        assert_eq!(ops, vec!["parallelize", "persist", "collect"]);
        assert_eq!(rec.count("persist"), 1);
        assert_eq!(rec.name(), "local");

        rec.clear();
        assert!(rec.calls().is_empty());
    }

    #[test]
    fn serializes_compactly() {
        let call = RecordedCall {
            op: "at_b",
            node: Some(NodeId::new(4)),
            zippable: Some(true),
        };
        assert_eq!(
            serde_json::to_string(&call).unwrap(),
            r#"{"op":"at_b","node":4,"zippable":true}"#
        );
    }
}
