//! usb-sentinel daemon
//!
//! USB-triggered network kill-switch. Watches USB hot-plug events, compares
//! connected devices against the configured allow-list, and unloads the
//! network kernel modules while an unrecognized device is present. The
//! network comes back when the device leaves or the passphrase is typed.

mod config;
mod keys;
mod monitor;
mod netctl;
mod service;

use anyhow::{Context, Result};
use clap::Parser;
use common::{MonitorCommand, MonitorEvent, create_monitor_bridge, setup_logging};
use guard::{GuardState, NetworkGuard};
use keys::KeyReader;
use netctl::ModprobeControl;
use tokio::signal;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "usb-sentinel")]
#[command(
    author,
    version,
    about = "USB-triggered network kill-switch"
)]
#[command(long_about = "
Watches USB attach/detach events and unloads the configured network kernel
modules whenever a device outside the allow-list is connected. The network is
restored once all unrecognized devices are gone, or when the configured
passphrase is typed on the keyboard.

EXAMPLES:
    # Run with default config
    usb-sentinel

    # Run with custom config
    usb-sentinel --config /path/to/sentinel.toml

    # Validate the configuration and exit
    usb-sentinel --check

    # Run as systemd service
    usb-sentinel --service

CONFIGURATION:
    The daemon looks for configuration files in the following order:
    1. Path specified with --config
    2. ~/.config/usb-sentinel/sentinel.toml
    3. /etc/usb-sentinel/sentinel.toml
    4. Built-in defaults
")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, value_name = "PATH")]
    config: Option<std::path::PathBuf>,

    /// Save default configuration to default location and exit
    #[arg(long)]
    save_config: bool,

    /// Validate the configuration and exit
    #[arg(long)]
    check: bool,

    /// Run as systemd service (no keyboard passphrase input)
    #[arg(long)]
    service: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Handle --save-config flag early (before loading config)
    if args.save_config {
        let config = config::SentinelConfig::default();
        let path = config::SentinelConfig::default_path();
        config.save(&path).context("Failed to save configuration")?;
        println!("Configuration saved to: {}", path.display());
        return Ok(());
    }

    // Configuration errors are fatal: the daemon must not start watching
    // events with a broken allow-list or an empty module list.
    let config = if let Some(ref path) = args.config {
        config::SentinelConfig::load(Some(path.clone())).context("Failed to load configuration")?
    } else {
        config::SentinelConfig::load_or_default().context("Failed to load configuration")?
    };

    if args.check {
        println!("Configuration OK");
        return Ok(());
    }

    let log_level = args.log_level.as_deref().unwrap_or(&config.daemon.log_level);
    setup_logging(log_level).context("Failed to setup logging")?;

    info!("usb-sentinel v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "Guarding modules: {} (helper: {})",
        config.network.modules.join(", "),
        config.network.helper.display()
    );

    let allow_list = config.allow_list().context("Invalid allow-list")?;
    info!("Allow-list has {} entr(ies)", allow_list.len());

    if config.security.passphrase.is_empty() {
        warn!("No passphrase configured, the manual override is disabled");
    }

    let control = ModprobeControl::new(
        config.network.helper.clone(),
        config.network.modules.clone(),
    );
    let sentinel = NetworkGuard::new(allow_list, &config.security.passphrase, control);

    // USB monitor runs on its own thread; events arrive over the bridge.
    let (bridge, worker) = create_monitor_bridge();
    let monitor_handle = monitor::spawn_monitor(worker).context("Failed to spawn USB monitor")?;

    let service_mode = args.service || config.daemon.service_mode;
    let mut key_reader = if service_mode || config.security.passphrase.is_empty() {
        None
    } else {
        KeyReader::new()
    };
    if key_reader.is_none() && !config.security.passphrase.is_empty() && !service_mode {
        warn!("No terminal available, passphrase override inactive");
    }

    if service_mode && service::is_systemd() {
        info!("Running under systemd");
    }
    let watchdog_handle = service::spawn_watchdog_task();
    service::notify_ready().context("Failed to notify systemd ready")?;

    info!("Watching USB events, press Ctrl+C to shutdown");

    let result = run_event_loop(&sentinel, &bridge, &mut key_reader).await;

    // Shutdown sequence: tell systemd, stop the watchdog, stop the monitor
    // thread and wait for it so libusb tears down cleanly.
    if let Err(e) = service::notify_stopping() {
        error!("Failed to notify systemd stopping: {:#}", e);
    }
    watchdog_handle.abort();
    drop(key_reader); // restores the terminal

    info!("Shutting down USB monitor...");
    if let Err(e) = bridge.send_command(MonitorCommand::Shutdown).await {
        error!("Error requesting monitor shutdown: {:#}", e);
    }
    match monitor_handle.join() {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("USB monitor exited with error: {}", e),
        Err(e) => error!("USB monitor thread panicked: {:?}", e),
    }

    result
}

/// Consume device and keyboard events until Ctrl+C
async fn run_event_loop(
    sentinel: &NetworkGuard<ModprobeControl>,
    bridge: &common::MonitorBridge,
    key_reader: &mut Option<KeyReader>,
) -> Result<()> {
    loop {
        tokio::select! {
            event = bridge.recv_event() => {
                match event {
                    Ok(MonitorEvent::DeviceArrived { identity }) => {
                        if let Err(e) = sentinel.on_attach(identity).await {
                            warn!("Attach handling failed, state unchanged: {}", e);
                        }
                    }
                    Ok(MonitorEvent::DeviceLeft { identity }) => {
                        if let Err(e) = sentinel.on_detach(&identity).await {
                            warn!("Detach handling failed, state unchanged: {}", e);
                        }
                    }
                    Err(e) => {
                        // Monitor thread is gone; without device events the
                        // kill-switch is blind, so bail out.
                        error!("USB monitor channel closed: {}", e);
                        return Err(anyhow::anyhow!("USB monitor stopped unexpectedly"));
                    }
                }
                report_status(sentinel).await;
            }

            maybe_key = next_key(key_reader), if key_reader.is_some() => {
                match maybe_key {
                    Some(c) => {
                        if let Err(e) = sentinel.on_key(c).await {
                            warn!("Passphrase enable failed, state unchanged: {}", e);
                        }
                        report_status(sentinel).await;
                    }
                    None => {
                        warn!("Key input stream ended, passphrase override inactive");
                        *key_reader = None;
                    }
                }
            }

            _ = signal::ctrl_c() => {
                info!("Received Ctrl+C, shutting down gracefully...");
                return Ok(());
            }
        }
    }
}

async fn next_key(reader: &mut Option<KeyReader>) -> Option<char> {
    match reader {
        Some(reader) => reader.next().await,
        None => None,
    }
}

/// Push the current guard state into `systemctl status`
async fn report_status(sentinel: &NetworkGuard<ModprobeControl>) {
    let state = match sentinel.state().await {
        GuardState::Enabled => "network enabled",
        GuardState::Disabled => "network disabled",
    };
    let status = format!(
        "{}; {} device(s) connected, {} unauthorized",
        state,
        sentinel.connected().await,
        sentinel.unauthorized().await
    );
    if let Err(e) = service::notify_status(&status) {
        error!("Failed to send status to systemd: {:#}", e);
    }
}
