//! Async channel bridge between the Tokio runtime and the USB monitor thread
//!
//! The hot-plug callbacks run on a dedicated blocking thread (libusb event
//! handling is synchronous); this bridge carries their observations into the
//! async side and lets the runtime request a shutdown.

use async_channel::{Receiver, Sender, bounded};
use guard::DeviceIdentity;

/// Commands from the Tokio runtime to the monitor thread
#[derive(Debug)]
pub enum MonitorCommand {
    /// Shutdown the monitor thread gracefully
    Shutdown,
}

/// Hot-plug observations from the monitor thread
#[derive(Debug, Clone)]
pub enum MonitorEvent {
    /// Device hot-plugged (connected)
    DeviceArrived {
        /// Identity read from the device descriptor
        identity: DeviceIdentity,
    },

    /// Device removed
    DeviceLeft {
        /// Identity of the removed device
        identity: DeviceIdentity,
    },
}

/// Handle for the Tokio runtime (async)
#[derive(Clone)]
pub struct MonitorBridge {
    cmd_tx: Sender<MonitorCommand>,
    event_rx: Receiver<MonitorEvent>,
}

impl MonitorBridge {
    /// Send a command to the monitor thread
    pub async fn send_command(&self, cmd: MonitorCommand) -> crate::Result<()> {
        self.cmd_tx
            .send(cmd)
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }

    /// Receive the next hot-plug event
    pub async fn recv_event(&self) -> crate::Result<MonitorEvent> {
        self.event_rx
            .recv()
            .await
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Handle for the monitor thread (blocking)
pub struct MonitorWorker {
    cmd_rx: Receiver<MonitorCommand>,
    /// Event sender (public so the hot-plug callback can hold a clone)
    pub event_tx: Sender<MonitorEvent>,
}

impl MonitorWorker {
    /// Try to receive a command without blocking
    pub fn try_recv_command(&self) -> Option<MonitorCommand> {
        self.cmd_rx.try_recv().ok()
    }

    /// Send an event to the Tokio runtime (blocking)
    pub fn send_event(&self, event: MonitorEvent) -> crate::Result<()> {
        self.event_tx
            .send_blocking(event)
            .map_err(|e| crate::Error::Channel(e.to_string()))
    }
}

/// Create the channel bridge between Tokio and the monitor thread
///
/// Returns (MonitorBridge for Tokio, MonitorWorker for the USB thread)
pub fn create_monitor_bridge() -> (MonitorBridge, MonitorWorker) {
    let (cmd_tx, cmd_rx) = bounded(16);
    let (event_tx, event_rx) = bounded(256);

    (
        MonitorBridge { cmd_tx, event_rx },
        MonitorWorker { cmd_rx, event_tx },
    )
}
