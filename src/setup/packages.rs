use std::sync::Arc;

use crate::common::{CommandLine, Executor, GatewaySettings, Result, SetupSettings, WebdeskError};
use crate::desktop::Account;
use crate::gateway::ContainerEngine;

/// The `SetupSequencer` makes sure the system provides everything the session needs.
/// Every step first checks whether it is already satisfied and does nothing if so.
pub struct SetupSequencer {
    executor: Arc<dyn Executor>,
    settings: SetupSettings,
    gateway: GatewaySettings,
}

impl SetupSequencer {
    pub fn new(executor: Arc<dyn Executor>, settings: &SetupSettings, gateway: &GatewaySettings) -> Self {
        Self {
            executor,
            settings: settings.clone(),
            gateway: gateway.clone(),
        }
    }

    /// Runs every setup step for the target account.
    pub fn run(&self, account: &Account) -> Result<()> {
        self.ensure_packages()?;
        self.ensure_container_daemon()?;
        self.ensure_group_membership(account);
        Ok(())
    }

    /// Packages whose binary is not available.
    pub fn missing_packages(&self) -> Vec<String> {
        let mut missing: Vec<String> = Vec::new();
        for requirement in &self.settings.packages {
            if self.executor.has_binary(&requirement.binary) {
                trace!("{} is installed", requirement.binary);
            } else if !missing.contains(&requirement.package) {
                missing.push(requirement.package.clone());
            }
        }
        missing
    }

    /// Installs the missing packages in a single package manager call.
    /// The package cache is only refreshed when something has to be installed.
    pub fn ensure_packages(&self) -> Result<()> {
        let missing = self.missing_packages();
        if missing.is_empty() {
            debug!("All required packages are installed");
            return Ok(());
        }

        info!("Installing missing packages: {}", missing.join(" "));

        let update = CommandLine::from_parts(&self.settings.update_command)?
            .env("DEBIAN_FRONTEND", "noninteractive");
        self.executor.run_checked(&update, WebdeskError::SetupError)?;

        let install = CommandLine::from_parts(&self.settings.install_command)?
            .args(&missing)
            .env("DEBIAN_FRONTEND", "noninteractive");
        self.executor.run_checked(&install, WebdeskError::SetupError)?;

        let still_missing = self.missing_packages();
        if !still_missing.is_empty() {
            return Err(WebdeskError::SetupError(format!("Packages still missing after installation: {}", still_missing.join(" "))));
        }

        info!("Installed packages: {}", missing.join(" "));
        Ok(())
    }

    /// Starts the container engine daemon unless it already answers.
    pub fn ensure_container_daemon(&self) -> Result<()> {
        let engine = ContainerEngine::new(self.executor.clone(), &self.gateway.engine);
        if engine.is_available() {
            debug!("Container engine {} is running", self.gateway.engine);
            return Ok(());
        }

        info!("Starting container engine {}", self.gateway.engine);
        let start = CommandLine::from_parts(&self.gateway.daemon_start)?;
        self.executor.run_checked(&start, WebdeskError::SetupError)?;

        if !engine.is_available() {
            return Err(WebdeskError::SetupError(format!("Container engine {} is not available", self.gateway.engine)));
        }
        Ok(())
    }

    /// Adds the account to the container engine group. Best-effort.
    pub fn ensure_group_membership(&self, account: &Account) {
        let group = &self.gateway.engine_group;
        match account.is_member_of(group) {
            Some(true) => debug!("User {} is already in group {}", account.username(), group),
            None => debug!("Group {} does not exist, skipping membership", group),
            Some(false) => {
                let command = CommandLine::new("usermod").args(["-aG", group.as_str(), account.username()]);
                match self.executor.run(&command) {
                    Ok(output) if output.success() => info!("Added user {} to group {}", account.username(), group),
                    Ok(output) => warn!("Could not add user {} to group {}: {}", account.username(), group, output.diagnostic()),
                    Err(error) => warn!("Could not add user {} to group {}: {}", account.username(), group, error),
                }
            }
        }
    }
}
