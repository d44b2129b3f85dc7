//! Per-buffer device residency tracking.
//!
//! One [`BufferResidency`] exists per logical buffer and records which
//! devices hold a copy, which copy is authoritative, and whether each copy is
//! still current. The tracker is bookkeeping only: deciding to transfer, and
//! the transfer itself, belong to the dispatch layer that reads this state.
//!
//! Trackers live in a process-shared [`ResidencyTable`] keyed by buffer id,
//! created lazily on first touch and guarded by a mutex since dispatch
//! threads mutate them concurrently.

use std::fmt;
use std::fmt::Write;

use indexmap::IndexMap;
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};

use crate::runtime::device::DeviceId;

/// Identifier the external task-graph runtime assigns to a logical buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u64);

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "buf{}", self.0)
    }
}

/// How a buffer may be held across devices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SharingMode {
    /// No declared sharing discipline.
    #[default]
    None,
    /// Multiple devices may hold read copies.
    Shared,
    /// A single device holds the only copy.
    Exclusive,
}

/// State of one device's copy of a buffer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeviceBufferState {
    /// Device-side storage exists for the buffer.
    pub allocated: bool,

    /// The device copy matches the authoritative contents.
    pub valid: bool,
}

// =============================================================================
// Per-buffer tracker
// =============================================================================

/// Residency bookkeeping for one logical buffer.
#[derive(Debug, Default)]
pub struct BufferResidency {
    sharing: SharingMode,
    owner: Option<DeviceId>,
    device_states: IndexMap<DeviceId, DeviceBufferState>,
}

impl BufferResidency {
    pub fn new() -> Self {
        BufferResidency::default()
    }

    pub fn sharing(&self) -> SharingMode {
        self.sharing
    }

    pub fn set_sharing(&mut self, sharing: SharingMode) {
        self.sharing = sharing;
    }

    pub fn is_shared(&self) -> bool {
        self.sharing == SharingMode::Shared
    }

    pub fn is_exclusive(&self) -> bool {
        self.sharing == SharingMode::Exclusive
    }

    /// Device whose copy is currently authoritative.
    pub fn owner(&self) -> Option<DeviceId> {
        self.owner
    }

    /// State of `device`'s copy, created fresh (not allocated, not valid) the
    /// first time the device is seen.
    pub fn state(&mut self, device: DeviceId) -> &mut DeviceBufferState {
        self.device_states.entry(device).or_default()
    }

    /// State of the owner's copy, or `None` when no owner has been set.
    pub fn owner_state(&mut self) -> Option<&mut DeviceBufferState> {
        let owner = self.owner?;
        Some(self.state(owner))
    }

    /// Make `device` authoritative. Only bookkeeping changes; any data
    /// movement is the caller's job.
    pub fn set_owner(&mut self, device: DeviceId) {
        self.owner = Some(device);
        self.device_states.entry(device).or_default();
    }

    /// Mark every device copy stale. Used when the authoritative contents
    /// change outside tracked dispatch. Allocation state and owner are kept.
    pub fn invalidate(&mut self) {
        for state in self.device_states.values_mut() {
            state.valid = false;
        }
    }

    /// Drop every device entry. The owner is kept; touching its state again
    /// starts from a fresh entry.
    pub fn clear(&mut self) {
        self.device_states.clear();
    }

    /// Devices that have touched the buffer, in first-touch order.
    pub fn devices(&self) -> impl Iterator<Item = DeviceId> + '_ {
        self.device_states.keys().copied()
    }

    pub fn num_devices(&self) -> usize {
        self.device_states.len()
    }
}

impl fmt::Display for BufferResidency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(if self.is_exclusive() { "X" } else { "-" })?;
        f.write_str(if self.is_shared() { "S" } else { "-" })?;
        f.write_str(" owner=")?;
        match self.owner {
            Some(device) => write!(f, "{}", device)?,
            None => f.write_str("none")?,
        }
        f.write_str(" devices=[")?;
        for (i, (device, state)) in self.device_states.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(
                f,
                "{}:{}{}",
                device,
                if state.allocated { "A" } else { "-" },
                if state.valid { "V" } else { "-" }
            )?;
        }
        f.write_str("]")
    }
}

// =============================================================================
// Process-shared table
// =============================================================================

/// Buffer-id-keyed map of residency trackers shared across dispatch threads.
#[derive(Debug, Default)]
pub struct ResidencyTable {
    trackers: Mutex<IndexMap<BufferId, BufferResidency>>,
}

impl ResidencyTable {
    pub fn new() -> Self {
        ResidencyTable::default()
    }

    /// Scoped access to a buffer's tracker, created lazily on first touch.
    /// The table stays locked for the guard's lifetime.
    pub fn buffer(&self, id: BufferId) -> MappedMutexGuard<'_, BufferResidency> {
        MutexGuard::map(self.trackers.lock(), |trackers| trackers.entry(id).or_default())
    }

    /// Drop a buffer's tracker. Returns whether one existed.
    pub fn remove(&self, id: BufferId) -> bool {
        self.trackers.lock().shift_remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        self.trackers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.trackers.lock().is_empty()
    }

    /// Drop every tracker. Used on runtime teardown.
    pub fn clear(&self) {
        self.trackers.lock().clear();
    }

    /// One line per tracked buffer, for logging.
    pub fn dump(&self) -> String {
        let trackers = self.trackers.lock();
        let mut out = String::new();
        for (id, tracker) in trackers.iter() {
            writeln!(out, "{}: {}", id, tracker).unwrap();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const D0: DeviceId = DeviceId(0);
    const D1: DeviceId = DeviceId(1);

    #[test]
    fn test_state_is_fresh_on_first_touch() {
        let mut tracker = BufferResidency::new();
        let state = tracker.state(D0);
        assert!(!state.allocated);
        assert!(!state.valid);
        assert_eq!(tracker.num_devices(), 1);
    }

    #[test]
    fn test_set_owner_creates_entry() {
        let mut tracker = BufferResidency::new();
        tracker.set_owner(D1);
        assert_eq!(tracker.owner(), Some(D1));
        assert_eq!(tracker.devices().collect::<Vec<_>>(), vec![D1]);

        let state = tracker.owner_state().unwrap();
        assert!(!state.allocated);
        state.allocated = true;
        state.valid = true;
        assert!(tracker.owner_state().unwrap().valid);
    }

    #[test]
    fn test_owner_state_without_owner() {
        let mut tracker = BufferResidency::new();
        assert!(tracker.owner_state().is_none());
    }

    #[test]
    fn test_invalidate_keeps_owner_and_allocation() {
        let mut tracker = BufferResidency::new();
        tracker.set_owner(D0);
        tracker.state(D0).allocated = true;
        tracker.state(D0).valid = true;
        tracker.state(D1).valid = true;

        tracker.invalidate();

        assert_eq!(tracker.owner(), Some(D0));
        assert!(tracker.state(D0).allocated, "allocation survives invalidation");
        assert!(!tracker.state(D0).valid);
        assert!(!tracker.state(D1).valid);
    }

    #[test]
    fn test_clear_never_leaks_stale_validity() {
        let mut tracker = BufferResidency::new();
        tracker.set_owner(D0);
        tracker.state(D0).allocated = true;
        tracker.state(D0).valid = true;

        tracker.clear();

        assert_eq!(tracker.num_devices(), 0);
        let state = tracker.state(D0);
        assert!(!state.allocated);
        assert!(!state.valid);
    }

    #[test]
    fn test_sharing_modes() {
        let mut tracker = BufferResidency::new();
        assert_eq!(tracker.sharing(), SharingMode::None);
        tracker.set_sharing(SharingMode::Exclusive);
        assert!(tracker.is_exclusive());
        assert!(!tracker.is_shared());
    }

    #[test]
    fn test_display_dump() {
        let mut tracker = BufferResidency::new();
        tracker.set_sharing(SharingMode::Exclusive);
        tracker.set_owner(D0);
        tracker.state(D0).allocated = true;
        tracker.state(D0).valid = true;
        tracker.state(D1).allocated = true;

        assert_eq!(tracker.to_string(), "X- owner=d0 devices=[d0:AV d1:A-]");
        assert_eq!(BufferResidency::new().to_string(), "-- owner=none devices=[]");
    }

    #[test]
    fn test_table_scoped_access() {
        let table = ResidencyTable::new();
        table.buffer(BufferId(7)).set_owner(D0);
        table.buffer(BufferId(7)).state(D0).valid = true;

        assert_eq!(table.len(), 1);
        assert_eq!(table.buffer(BufferId(7)).owner(), Some(D0));
        assert!(table.buffer(BufferId(9)).owner().is_none(), "fresh tracker on first touch");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_table_remove_and_clear() {
        let table = ResidencyTable::new();
        table.buffer(BufferId(1)).set_owner(D0);
        table.buffer(BufferId(2)).set_owner(D1);

        assert!(table.remove(BufferId(1)));
        assert!(!table.remove(BufferId(1)));
        assert_eq!(table.len(), 1);

        table.clear();
        assert!(table.is_empty());
    }

    #[test]
    fn test_table_dump_lists_buffers() {
        let table = ResidencyTable::new();
        table.buffer(BufferId(3)).set_owner(D0);
        let dump = table.dump();
        assert_eq!(dump, "buf3: -- owner=d0 devices=[d0:--]\n");
    }
}
