use std::sync::Arc;

use crate::artifacts::GeneratedArtifacts;
use crate::common::{CommandLine, DisplaySettings, Executor, Result, WebdeskError};
use super::{Account, kill_user_processes};

/// Matches the X server started by `vncserver`, named `Xvnc` or `Xtigervnc` depending on the distribution.
const VNC_SERVER_PATTERN: &str = "X(tiger)?vnc";

/// The `DisplayServer` drives the VNC server (`vncserver`) serving the virtual display of the target user.
pub struct DisplayServer {
    executor: Arc<dyn Executor>,
    settings: DisplaySettings,
}

impl DisplayServer {
    pub fn new(executor: Arc<dyn Executor>, settings: &DisplaySettings) -> Self {
        Self {
            executor,
            settings: settings.clone(),
        }
    }

    /// Starts the VNC server on the configured display, listening on all interfaces so that the
    /// gateway containers can reach it. Any previous server on the same display is stopped first.
    ///
    /// # Arguments
    /// * `account` - The account owning the session.
    /// * `artifacts` - The generated password file and startup script.
    pub fn start(&self, account: &Account, artifacts: &GeneratedArtifacts) -> Result<()> {
        self.stop(account);

        let display_id = self.settings.display_id();
        let resolution = self.settings.resolution()?;

        info!("Starting VNC server on display {} ({}, depth {}) for user {}", display_id, resolution, self.settings.depth, account.username());

        let command = CommandLine::new("vncserver")
            .arg(&display_id)
            .arg("-geometry").arg(resolution.to_string())
            .arg("-depth").arg(self.settings.depth.to_string())
            .args(["-localhost", "no"])
            .args(["-SecurityTypes", "VncAuth"])
            .arg("-PasswordFile").arg(&artifacts.password_file)
            .arg("-xstartup").arg(&artifacts.startup_script)
            .as_user(account);

        self.executor.run_checked(&command, WebdeskError::DisplayError)?;

        debug!("VNC server running on display {} (port {})", display_id, self.settings.vnc_port());
        Ok(())
    }

    /// Stops the VNC server of the display and any remaining VNC X server of the user.
    /// Best-effort: nothing running is not an error.
    pub fn stop(&self, account: &Account) {
        let display_id = self.settings.display_id();
        let command = CommandLine::new("vncserver").arg("-kill").arg(&display_id).as_user(account);

        match self.executor.run(&command) {
            Ok(output) if output.success() => debug!("Stopped VNC server on display {}", display_id),
            Ok(_) => debug!("No VNC server running on display {}", display_id),
            Err(error) => warn!("Could not stop VNC server on display {}: {}", display_id, error),
        }

        kill_user_processes(self.executor.as_ref(), account, VNC_SERVER_PATTERN, false);
    }
}
