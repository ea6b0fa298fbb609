//! Opaque physical result handle.
//!
//! The substrate owns the real distributed collection; the planner only sees
//! a type-erased payload plus the column count. Backends downcast the payload
//! back to their own collection type.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::id::HandleId;

#[derive(Clone)]
pub struct PhysicalHandle {
    id: HandleId,
    ncol: usize,
    payload: Arc<dyn Any + Send + Sync>,
}

impl PhysicalHandle {
    pub fn new<T: Any + Send + Sync>(ncol: usize, payload: T) -> Self {
        Self {
            id: HandleId::next(),
            ncol,
            payload: Arc::new(payload),
        }
    }

    pub fn id(&self) -> HandleId {
        self.id
    }

    pub fn ncol(&self) -> usize {
        self.ncol
    }

    /// Borrow the payload as the backend's collection type.
    pub fn downcast<T: Any + Send + Sync>(&self) -> Result<&T> {
        self.payload.downcast_ref::<T>().ok_or_else(|| {
            Error::Exec(format!(
                "handle {} does not hold a {}",
                self.id,
                std::any::type_name::<T>()
            ))
        })
    }
}

impl fmt::Debug for PhysicalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicalHandle")
            .field("id", &self.id)
            .field("ncol", &self.ncol)
            .finish_non_exhaustive()
    }
}
