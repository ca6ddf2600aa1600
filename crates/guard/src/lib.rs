//! Decision core for usb-sentinel
//!
//! This crate contains the kill-switch logic: tracking connected USB devices,
//! classifying them against the configured allow-list, driving the network
//! guard state machine, and matching the passphrase override typed on the
//! keyboard. It performs no I/O of its own - device and keystroke events are
//! pushed in by the host side, and the actual network toggling is delegated
//! to an injected [`NetworkControl`] implementation.

pub mod allowlist;
pub mod error;
pub mod identity;
pub mod netguard;
pub mod passphrase;
pub mod registry;

pub use allowlist::AllowList;
pub use error::{ControlError, GuardError};
pub use identity::{DeviceHandle, DeviceIdentity};
pub use netguard::{GuardState, NetworkControl, NetworkGuard};
pub use passphrase::{MatchResult, PassphraseMatcher};
pub use registry::DeviceRegistry;
