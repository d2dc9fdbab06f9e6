use std::sync::Arc;

use crate::common::{Executor, Result, Settings, ShutdownSignal, System, SystemExecutor, WebdeskError};
use crate::gateway::HttpProbe;
use crate::lifecycle::{Orchestrator, Teardown};

/// Represents the main application: it launches the desktop session and keeps it running until
/// interrupted, or sweeps up the leftovers of a previous session.
pub struct Application {
    signal: ShutdownSignal,
}

impl Application {
    /// Creates a new instance of the `Application`.
    pub fn new() -> Self {
        Self {
            signal: ShutdownSignal::new(),
        }
    }

    /// Launches the session and blocks until an interrupt is received.
    ///
    /// # Arguments
    /// * `settings` - The application settings.
    ///
    /// # Returns
    /// * `Result<()>` - Indicates success or failure of the operation.
    pub fn run(&self, settings: &Settings) -> Result<()> {
        info!("Starting Webdesk...");

        let account = System::get_account(&settings.user)?;
        info!("Session owner: {}", account);
        let executor: Arc<dyn Executor> = Arc::new(SystemExecutor::new());

        self.create_shutdown_handler()?;

        let probe = HttpProbe::new(settings.gateway.readiness.request_timeout())?;
        let mut orchestrator = Orchestrator::new(executor, settings, &account, &self.signal);
        orchestrator.run(&probe)?;

        info!("Webdesk terminated");
        Ok(())
    }

    /// Stops every service and removes the transient files of a previous session.
    pub fn cleanup(&self, settings: &Settings) -> Result<()> {
        let account = System::get_account(&settings.user)?;
        let executor: Arc<dyn Executor> = Arc::new(SystemExecutor::new());

        Teardown::new(executor, settings, &account).sweep();
        Ok(())
    }

    /// Sets up a handler for SIGINT and SIGTERM that triggers the shutdown signal.
    fn create_shutdown_handler(&self) -> Result<()> {
        let signal = self.signal.clone();
        ctrlc::set_handler(move || {
            info!("Interrupt received, shutting down");
            signal.trigger();
        })
        .map_err(|error| WebdeskError::SystemError(format!("Error setting Ctrl-C handler: {}", error)))
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}
