use std::fs;
use std::sync::Arc;

use crate::common::{CommandLine, Executor, LimitSettings, Result, WebdeskError};
use crate::desktop::Account;

/// The `ResourceLimitAdjuster` raises the shared memory size and the process and file limits of
/// the target user. Restricted environments (containers, sandboxes) commonly refuse these
/// changes, so every failure is logged and ignored.
pub struct ResourceLimitAdjuster {
    executor: Arc<dyn Executor>,
    settings: LimitSettings,
}

impl ResourceLimitAdjuster {
    pub fn new(executor: Arc<dyn Executor>, settings: &LimitSettings) -> Self {
        Self {
            executor,
            settings: settings.clone(),
        }
    }

    /// Applies the limits. Never fails.
    pub fn apply(&self, account: &Account) {
        if !self.settings.enabled {
            debug!("Resource limit adjustment is disabled");
            return;
        }

        if let Err(error) = self.resize_shared_memory() {
            warn!("Could not resize {}: {}", self.settings.shm_path, error);
        }

        if let Err(error) = self.write_limits(account) {
            warn!("Could not set resource limits for user {}: {}", account.username(), error);
        }
    }

    fn resize_shared_memory(&self) -> Result<()> {
        let command = CommandLine::new("mount")
            .arg("-o")
            .arg(format!("remount,size={}", self.settings.shm_size))
            .arg(&self.settings.shm_path);
        self.executor.run_checked(&command, WebdeskError::SystemError)?;
        debug!("Resized {} to {}", self.settings.shm_path, self.settings.shm_size);
        Ok(())
    }

    /// The limits file content for a user.
    pub fn limits_content(&self, account: &Account) -> String {
        let user = account.username();
        let mut content = String::new();
        for (item, value) in [("nofile", self.settings.nofile), ("nproc", self.settings.nproc)] {
            for kind in ["soft", "hard"] {
                content.push_str(&format!("{} {} {} {}\n", user, kind, item, value));
            }
        }
        content
    }

    pub fn limits_path(&self, account: &Account) -> String {
        format!("{}/webdesk-{}.conf", self.settings.directory, account.username())
    }

    /// Writes the limits file unless it already holds the same content.
    ///
    /// # Returns
    /// `true` if the file was written.
    pub fn write_limits(&self, account: &Account) -> Result<bool> {
        let path = self.limits_path(account);
        let content = self.limits_content(account);

        if fs::read_to_string(&path).map(|existing| existing == content).unwrap_or(false) {
            debug!("Resource limits already configured in {}", path);
            return Ok(false);
        }

        fs::create_dir_all(&self.settings.directory)?;
        fs::write(&path, content)?;
        debug!("Wrote resource limits to {}", path);
        Ok(true)
    }
}
