//! Common utilities for usb-sentinel
//!
//! This crate provides the plumbing shared by the daemon and the decision
//! core: error handling, logging setup, and the async channel bridge that
//! carries hot-plug events from the blocking USB monitor thread into the
//! tokio runtime.

pub mod channel;
pub mod error;
pub mod logging;

pub use channel::{
    MonitorBridge, MonitorCommand, MonitorEvent, MonitorWorker, create_monitor_bridge,
};
pub use error::{Error, Result};
pub use logging::setup_logging;
