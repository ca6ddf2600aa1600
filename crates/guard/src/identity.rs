//! Device identity types
//!
//! Defines the matchable attribute tuple that identifies a USB device and the
//! opaque handle the registry hands out for each tracked connection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Registry-assigned handle for one tracked device connection
///
/// Only used to correlate a tracked entry with the attach event that created
/// it. Handles are never reused within a process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceHandle(pub u64);

/// Matchable identity of a USB device
///
/// Two ids plus an optional serial number. Equality between an identity used
/// as a pattern (allow-list entry, detach event) and a concrete device is
/// serial-aware: a pattern without a serial matches any serial, a pattern
/// with one requires an exact string match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// USB Vendor ID
    pub vendor_id: u16,
    /// USB Product ID
    pub product_id: u16,
    /// Serial number string (if available)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial: Option<String>,
}

impl DeviceIdentity {
    /// Create an identity without a serial number
    pub fn new(vendor_id: u16, product_id: u16) -> Self {
        Self {
            vendor_id,
            product_id,
            serial: None,
        }
    }

    /// Attach a serial number to this identity
    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = Some(serial.into());
        self
    }

    /// Check whether `probe` matches this identity used as a pattern
    ///
    /// Vendor and product ids must be equal. When this pattern carries a
    /// serial the probe's serial must equal it exactly; a pattern without a
    /// serial matches probes with any serial (or none).
    pub fn matches(&self, probe: &DeviceIdentity) -> bool {
        if self.vendor_id != probe.vendor_id || self.product_id != probe.product_id {
            return false;
        }
        match &self.serial {
            Some(serial) => probe.serial.as_deref() == Some(serial.as_str()),
            None => true,
        }
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04x}:{:04x}", self.vendor_id, self.product_id)?;
        if let Some(serial) = &self.serial {
            write!(f, " (serial {})", serial)?;
        }
        Ok(())
    }
}
