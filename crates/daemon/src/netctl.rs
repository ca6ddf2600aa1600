//! Network control via the modprobe helper
//!
//! Implements the guard's [`NetworkControl`] by unloading (disable) or
//! loading (enable) the configured kernel modules through an external helper
//! process. The helper runs with a minimal fixed environment; the daemon's
//! own environment never leaks into it.

use guard::{ControlError, NetworkControl};
use std::path::PathBuf;
use tokio::process::Command;
use tracing::debug;

/// Environment for the helper process
const HELPER_ENV: [(&str, &str); 3] = [
    ("HOME", "/"),
    ("TERM", "linux"),
    ("PATH", "/sbin:/bin:/usr/sbin:/usr/bin"),
];

/// Toggles network kernel modules with `/sbin/modprobe`
///
/// `disable` runs `modprobe -r <module>` for each configured module,
/// `enable` runs `modprobe <module>`. The first failing module aborts the
/// sequence with an error; the guard then leaves its state unchanged and a
/// later event retries the whole transition.
pub struct ModprobeControl {
    helper: PathBuf,
    modules: Vec<String>,
}

impl ModprobeControl {
    /// Create a control for the given helper binary and module list
    pub fn new(helper: PathBuf, modules: Vec<String>) -> Self {
        Self { helper, modules }
    }

    async fn run(&self, unload: bool) -> Result<(), ControlError> {
        for module in &self.modules {
            let mut command = Command::new(&self.helper);
            if unload {
                command.arg("-r");
            }
            command.arg(module);
            command.env_clear();
            command.envs(HELPER_ENV);

            debug!(
                "running {} {}{}",
                self.helper.display(),
                if unload { "-r " } else { "" },
                module
            );

            let status = command.status().await.map_err(|e| ControlError::Spawn {
                helper: self.helper.display().to_string(),
                source: e,
            })?;

            if !status.success() {
                return Err(ControlError::HelperFailed {
                    module: module.clone(),
                    status: status.to_string(),
                });
            }
        }
        Ok(())
    }
}

impl NetworkControl for ModprobeControl {
    async fn disable(&self) -> Result<(), ControlError> {
        self.run(true).await
    }

    async fn enable(&self) -> Result<(), ControlError> {
        self.run(false).await
    }
}
