//! Registry of currently connected devices
//!
//! Owns the set of devices observed since startup. Attach appends, detach
//! removes every matching entry, and the unauthorized count is a plain scan
//! against the allow-list. Both collections are small (single-digit to low
//! hundreds), so the naive scan is deliberate; deduplicating identities would
//! change the observable multi-remove semantics.

use crate::allowlist::AllowList;
use crate::identity::{DeviceHandle, DeviceIdentity};

/// One tracked device connection
#[derive(Debug, Clone)]
struct ConnectedDevice {
    handle: DeviceHandle,
    identity: DeviceIdentity,
}

/// Mutable set of currently connected devices
///
/// Not internally synchronized; the [`NetworkGuard`](crate::NetworkGuard)
/// owns it behind its state lock.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Vec<ConnectedDevice>,
    next_handle: u64,
}

impl DeviceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly attached device
    ///
    /// Always succeeds. Duplicate identities are legal and tracked as
    /// independent entries, each with its own handle.
    pub fn insert(&mut self, identity: DeviceIdentity) -> DeviceHandle {
        self.next_handle += 1;
        let handle = DeviceHandle(self.next_handle);
        self.devices.push(ConnectedDevice { handle, identity });
        handle
    }

    /// Remove every entry the detaching identity matches
    ///
    /// Returns the number of removed entries. Zero is a no-op, not an error:
    /// a device may have been attached before the registry started observing.
    /// Removing all matches (rather than one) tolerates duplicate inserts.
    pub fn remove(&mut self, identity: &DeviceIdentity) -> usize {
        let before = self.devices.len();
        self.devices.retain(|device| !identity.matches(&device.identity));
        before - self.devices.len()
    }

    /// Count tracked devices that match no allow-list entry
    pub fn count_unauthorized(&self, allow_list: &AllowList) -> usize {
        self.devices
            .iter()
            .filter(|device| !allow_list.is_allowed(&device.identity))
            .count()
    }

    /// Number of tracked devices
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// True when nothing is tracked
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}
