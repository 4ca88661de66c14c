//! Dense open-file table.
//!
//! Handles are indices into a slot vector: `add` fills the lowest empty
//! slot, growing geometrically up to a fixed bound, and `remove` shrinks
//! the vector back toward the starting capacity when enough slots free up.
//! The all-ones value is reserved as the sentinel returned when no valid
//! handle can be produced.

use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::{Error, Kind, Result};

/// Sentinel handle handed to the kernel when allocation fails.
pub const ERROR_HANDLE: u64 = u64::MAX;

/// Default bound on simultaneously open handles.
pub const HANDLE_MAX: usize = 4096;

const START_CAPACITY: usize = 8;
const SHRINK_BOUND: usize = 64;

/// Slot table of open handles. Each occupied slot owns one open file or
/// directory stream behind its own mutex, so I/O on distinct handles does
/// not serialize.
pub struct HandleTable<T> {
    slots: RwLock<Vec<Option<Arc<Mutex<T>>>>>,
    max: usize,
}

impl<T> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new(HANDLE_MAX)
    }
}

impl<T> HandleTable<T> {
    pub fn new(max: usize) -> HandleTable<T> {
        HandleTable { slots: RwLock::new(Vec::with_capacity(START_CAPACITY)), max }
    }

    /// Places `value` in the lowest free slot and returns its handle, or
    /// `None` when the table is at its bound.
    pub fn add(&self, value: T) -> Option<u64> {
        let mut slots = self.slots.write();
        let value = Arc::new(Mutex::new(value));

        if let Some(index) = slots.iter().position(Option::is_none) {
            slots[index] = Some(value);
            return Some(index as u64);
        }

        let len = slots.len();
        if len >= self.max {
            return None;
        }
        if len == slots.capacity() {
            let grown = (slots.capacity().max(START_CAPACITY) * 2).min(self.max);
            slots.reserve_exact(grown - len);
        }
        slots.push(Some(value));
        Some(len as u64)
    }

    pub fn get(&self, handle: u64) -> Result<Arc<Mutex<T>>> {
        let slots = self.slots.read();
        slots
            .get(handle as usize)
            .and_then(Clone::clone)
            .ok_or_else(|| Error::msg(Kind::Closed, format!("no handle {handle}")))
    }

    /// Empties the slot and returns its contents. Shrinks the vector when
    /// capacity is above the shrink bound and the live slots fit in a
    /// smaller multiple of the starting capacity.
    pub fn remove(&self, handle: u64) -> Result<Arc<Mutex<T>>> {
        let mut slots = self.slots.write();
        let slot = slots
            .get_mut(handle as usize)
            .ok_or_else(|| Error::msg(Kind::Closed, format!("no handle {handle}")))?;
        let value = slot.take().ok_or_else(|| Error::msg(Kind::Closed, format!("no handle {handle}")))?;

        if slots.capacity() > SHRINK_BOUND {
            let live = slots.iter().rposition(Option::is_some).map_or(0, |i| i + 1);
            let wanted = live.div_ceil(START_CAPACITY).max(1) * START_CAPACITY;
            if wanted < slots.capacity() {
                slots.truncate(live);
                slots.shrink_to(wanted);
            }
        }

        Ok(value)
    }

    pub fn live(&self) -> usize {
        self.slots.read().iter().filter(|slot| slot.is_some()).count()
    }
}
