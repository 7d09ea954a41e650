mod conflict;
mod error;
mod mutations;
mod queries;

pub use error::EngineError;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use crate::model::*;

pub type SharedFacilityState = Arc<RwLock<FacilityState>>;

/// Behaviour switches fixed at construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineOptions {
    /// Run the overlap check against sibling bookings when a booking is
    /// moved by `update_booking`. Off by default: updates only validate the
    /// new interval on its own.
    pub recheck_overlap_on_update: bool,
}

/// In-memory booking engine. One per process, shared behind an `Arc`.
///
/// Each facility sits behind its own `RwLock`; every mutation of a
/// facility's bookings holds that write lock from validation to commit.
pub struct Engine {
    pub(super) facilities: DashMap<String, SharedFacilityState>,
    pub(super) options: EngineOptions,
    next_seq: AtomicU64,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        Self::with_options(EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self {
            facilities: DashMap::new(),
            options,
            next_seq: AtomicU64::new(0),
        }
    }

    pub fn options(&self) -> EngineOptions {
        self.options
    }

    pub fn facility_count(&self) -> usize {
        self.facilities.len()
    }

    pub fn get_facility(&self, name: &str) -> Option<SharedFacilityState> {
        self.facilities.get(name).map(|e| e.value().clone())
    }

    pub(super) fn next_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    /// Lookup facility, acquire write lock, and make sure it was not deleted
    /// while we waited.
    pub(super) async fn facility_write(
        &self,
        name: &str,
    ) -> Result<OwnedRwLockWriteGuard<FacilityState>, EngineError> {
        let fs = self
            .get_facility(name)
            .ok_or_else(|| EngineError::FacilityNotFound(name.to_string()))?;
        let guard = fs.write_owned().await;
        if guard.retired {
            return Err(EngineError::FacilityNotFound(name.to_string()));
        }
        Ok(guard)
    }
}
