//! Fault injection for testing failure paths.
//!
//! A [`FaultPlan`] belongs to one store instance. Arming a point makes the
//! next `n` operations passing through it fail with
//! [`StoreError::InjectedFault`]; other stores are unaffected.
//!
//! ```
//! use livefetch::store::{fault::points, MemoryStore};
//!
//! let store = MemoryStore::new(["Person"]).unwrap();
//! store.faults().arm(points::SAVE, 1);
//! assert!(store.faults().is_armed(points::SAVE));
//! ```

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::debug;

use super::errors::{StoreError, StoreResult};

/// Per-store set of armed fault points
#[derive(Debug, Default)]
pub struct FaultPlan {
    armed: Mutex<HashMap<&'static str, u32>>,
}

impl FaultPlan {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` passes through `point` fail
    pub fn arm(&self, point: &'static str, times: u32) {
        let mut armed = self.armed.lock();
        if times == 0 {
            armed.remove(point);
        } else {
            armed.insert(point, times);
        }
    }

    pub fn disarm_all(&self) {
        self.armed.lock().clear();
    }

    /// Check if a specific fault point is armed
    pub fn is_armed(&self, point: &str) -> bool {
        self.armed.lock().contains_key(point)
    }

    /// Fails if `point` is armed, consuming one shot
    pub fn check(&self, point: &'static str) -> StoreResult<()> {
        let mut armed = self.armed.lock();
        let Some(remaining) = armed.get_mut(point) else {
            return Ok(());
        };
        *remaining -= 1;
        if *remaining == 0 {
            armed.remove(point);
        }
        debug!(point, "injected fault fired");
        Err(StoreError::InjectedFault(point))
    }
}

/// All defined fault point names
pub mod points {
    /// Object, row and identity fetches
    pub const FETCH: &str = "fetch";
    /// Count requests
    pub const COUNT: &str = "count";
    /// Context saves
    pub const SAVE: &str = "save";

    /// Get all fault point names
    pub fn all() -> &'static [&'static str] {
        &[FETCH, COUNT, SAVE]
    }
}
