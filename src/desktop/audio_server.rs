use std::sync::Arc;

use crate::common::{AudioSettings, CommandLine, Executor, Result, WebdeskError};
use super::{Account, kill_user_processes};

/// The `AudioServer` drives the PulseAudio daemon of the target user. The daemon picks up the
/// generated `default.pa`, which exposes the native protocol on the configured TCP port.
pub struct AudioServer {
    executor: Arc<dyn Executor>,
    settings: AudioSettings,
}

impl AudioServer {
    pub fn new(executor: Arc<dyn Executor>, settings: &AudioSettings) -> Self {
        Self {
            executor,
            settings: settings.clone(),
        }
    }

    /// Starts the audio daemon for the user, replacing any running instance.
    pub fn start(&self, account: &Account) -> Result<()> {
        self.stop(account);

        info!("Starting PulseAudio for user {} (port {})", account.username(), self.settings.port);

        let command = CommandLine::new("pulseaudio")
            .args(["--start", "--exit-idle-time=-1"])
            .as_user(account);
        self.executor.run_checked(&command, WebdeskError::AudioError)?;

        let check = CommandLine::new("pulseaudio").arg("--check").as_user(account);
        self.executor.run_checked(&check, WebdeskError::AudioError)?;

        Ok(())
    }

    /// Stops the audio daemon of the user. Best-effort: nothing running is not an error.
    pub fn stop(&self, account: &Account) {
        let command = CommandLine::new("pulseaudio").arg("--kill").as_user(account);
        match self.executor.run(&command) {
            Ok(output) if output.success() => debug!("Stopped PulseAudio for user {}", account.username()),
            Ok(_) => debug!("PulseAudio not running for user {}", account.username()),
            Err(error) => warn!("Could not stop PulseAudio for user {}: {}", account.username(), error),
        }

        kill_user_processes(self.executor.as_ref(), account, "pulseaudio", true);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;

    #[test]
    fn start_kills_previous_daemon_then_checks_new_one() {
        let executor = Arc::new(RecordingExecutor::new());
        let server = AudioServer::new(executor.clone(), &AudioSettings::default());
        let account = Account::new("alice", "/home/alice", 1000, 1000, vec![]);

        server.start(&account).unwrap();

        assert_eq!(executor.commands(), vec![
            "pulseaudio --kill",
            "pkill -u alice -x pulseaudio",
            "pulseaudio --start --exit-idle-time=-1",
            "pulseaudio --check",
        ]);
    }

    #[test]
    fn failing_check_is_fatal() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("pulseaudio --check", 1, "");
        let server = AudioServer::new(executor.clone(), &AudioSettings::default());
        let account = Account::new("alice", "/home/alice", 1000, 1000, vec![]);

        assert!(matches!(server.start(&account), Err(WebdeskError::AudioError(_))));
    }
}
