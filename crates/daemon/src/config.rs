//! Daemon configuration management

use anyhow::{Context, Result, anyhow};
use guard::{AllowList, DeviceIdentity};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SentinelConfig {
    pub daemon: DaemonSettings,
    pub network: NetworkSettings,
    pub security: SecuritySettings,
    /// Devices trusted not to trigger the kill-switch
    #[serde(default)]
    pub allowed_devices: Vec<AllowedDevice>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    pub service_mode: bool,
    pub log_level: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// Helper invoked to load/unload network modules
    #[serde(default = "NetworkSettings::default_helper")]
    pub helper: PathBuf,
    /// Kernel modules toggled by the kill-switch
    pub modules: Vec<String>,
}

impl NetworkSettings {
    fn default_helper() -> PathBuf {
        PathBuf::from("/sbin/modprobe")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecuritySettings {
    /// Passphrase that re-enables the network manually
    ///
    /// Empty disables the override entirely.
    #[serde(default)]
    pub passphrase: String,
}

/// One trusted device entry
///
/// Vendor and product ids are `0x`-prefixed hex strings so config files read
/// like `lsusb` output. A serial pins the entry to one physical unit; without
/// it every unit of the model is trusted.
///
/// # Example Configuration
/// ```toml
/// [[allowed_devices]]
/// vendor_id = "0x0781"
/// product_id = "0x5571"
/// serial = "4C530001230407113173"
/// description = "Office backup stick"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllowedDevice {
    pub vendor_id: String,
    pub product_id: String,
    #[serde(default)]
    pub serial: Option<String>,
    /// Human-readable description
    #[serde(default)]
    pub description: Option<String>,
}

impl AllowedDevice {
    /// Convert a validated entry into a core identity
    pub fn to_identity(&self) -> Result<DeviceIdentity> {
        let vendor_id = parse_hex_id(&self.vendor_id, "vendor_id")?;
        let product_id = parse_hex_id(&self.product_id, "product_id")?;
        let mut identity = DeviceIdentity::new(vendor_id, product_id);
        if let Some(serial) = &self.serial {
            identity = identity.with_serial(serial.clone());
        }
        Ok(identity)
    }
}

/// Parse a `0x`-prefixed 16-bit hex id
fn parse_hex_id(id: &str, name: &str) -> Result<u16> {
    if !id.starts_with("0x") && !id.starts_with("0X") {
        return Err(anyhow!(
            "Invalid {} '{}', must start with '0x' (e.g., '0x0781')",
            name,
            id
        ));
    }

    let hex_part = &id[2..];
    if hex_part.is_empty() || hex_part.len() > 4 {
        return Err(anyhow!(
            "Invalid {} '{}', hex part must be 1-4 digits",
            name,
            id
        ));
    }

    u16::from_str_radix(hex_part, 16)
        .map_err(|_| anyhow!("Invalid {} '{}', not a valid hex number", name, id))
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings {
                service_mode: false,
                log_level: "info".to_string(),
            },
            network: NetworkSettings {
                helper: NetworkSettings::default_helper(),
                modules: vec!["iwlwifi".to_string()],
            },
            security: SecuritySettings {
                passphrase: String::new(),
            },
            allowed_devices: Vec::new(),
        }
    }
}

impl SentinelConfig {
    /// Load configuration from the specified path
    ///
    /// Validation failures are fatal; the daemon must not start watching
    /// events with a half-understood configuration.
    pub fn load(path: Option<PathBuf>) -> Result<Self> {
        let config_path = if let Some(p) = path {
            p
        } else {
            let candidates = vec![
                Self::default_path(),
                PathBuf::from("/etc/usb-sentinel/sentinel.toml"),
            ];

            candidates
                .into_iter()
                .find(|p| p.exists())
                .ok_or_else(|| anyhow!("No configuration file found"))?
        };

        let content = fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: SentinelConfig = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config.validate()?;

        tracing::info!("Loaded configuration from: {}", config_path.display());
        Ok(config)
    }

    /// Load configuration or return defaults if no file exists
    pub fn load_or_default() -> Result<Self> {
        match Self::load(None) {
            Ok(config) => Ok(config),
            Err(e) if e.to_string().contains("No configuration file found") => {
                tracing::warn!("No config file found, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e),
        }
    }

    /// Save configuration to the specified path
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize configuration")?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        tracing::info!("Saved configuration to: {}", path.display());
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> PathBuf {
        if let Some(config_dir) = dirs::config_dir() {
            config_dir.join("usb-sentinel").join("sentinel.toml")
        } else {
            PathBuf::from(".config/usb-sentinel/sentinel.toml")
        }
    }

    /// Build the allow-list from validated entries
    pub fn allow_list(&self) -> Result<AllowList> {
        self.allowed_devices
            .iter()
            .map(AllowedDevice::to_identity)
            .collect::<Result<AllowList>>()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.daemon.log_level.as_str()) {
            return Err(anyhow!(
                "Invalid log level '{}', must be one of: {}",
                self.daemon.log_level,
                valid_levels.join(", ")
            ));
        }

        if self.network.modules.is_empty() {
            return Err(anyhow!(
                "network.modules is empty, nothing for the kill-switch to toggle"
            ));
        }
        if self.network.modules.iter().any(|m| m.trim().is_empty()) {
            return Err(anyhow!("network.modules contains an empty module name"));
        }

        for device in &self.allowed_devices {
            device.to_identity()?;
        }

        Ok(())
    }
}
