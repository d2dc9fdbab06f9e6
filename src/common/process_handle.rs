use std::process::Command;
use std::sync::Arc;

use shared_child::SharedChild;

use crate::common::{Result, WebdeskError};

/// The `ProcessHandle` struct represents a handle to a long-running child process (eg a log follower).
#[derive(Clone)]
pub struct ProcessHandle {
    name: String,
    process: Arc<SharedChild>,
}

impl ProcessHandle {
    /// Creates a new `ProcessHandle` by spawning a process using the provided command.
    ///
    /// # Arguments
    /// * `name` - A descriptive name used in log messages.
    /// * `command` - The command to execute.
    ///
    /// # Returns
    /// A `Result` containing the `ProcessHandle` or a `WebdeskError` if the process could not be spawned.
    pub fn new(name: &str, command: &mut Command) -> Result<ProcessHandle> {
        let process = SharedChild::spawn(command)
            .map_err(|error| WebdeskError::SystemError(format!("Failed to spawn {}: {}", name, error)))?;

        Ok(ProcessHandle {
            name: name.to_string(),
            process: Arc::new(process),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the process ID (PID) of the process.
    pub fn pid(&self) -> u32 {
        self.process.id()
    }

    /// Kills the process and reaps it. A process that has already exited is not an error.
    pub fn kill(&self) -> Result<()> {
        if self.is_running() == Some(false) {
            return Ok(());
        }

        self.process.kill()?;
        self.process.wait()?;
        Ok(())
    }

    pub fn is_running(&self) -> Option<bool> {
        let terminate_result = self.process.try_wait();
        match terminate_result {
            Ok(expected_status) => match expected_status {
                // Process already exited
                Some(_status) => Some(false),
                None => Some(true)
            },
            Err(error) => {
                warn!("Failed to wait for process {} [pid={}]. Error: {}", self.name, self.process.id(), error);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kill_stops_a_running_process() {
        let handle = ProcessHandle::new("sleeper", Command::new("sleep").arg("30")).unwrap();
        assert_eq!(handle.is_running(), Some(true));

        handle.kill().unwrap();

        assert_eq!(handle.is_running(), Some(false));
        // Killing twice is harmless
        handle.kill().unwrap();
    }
}
