use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::artifacts::PROFILE_DIRECTORY_PREFIX;
use crate::common::{Executor, Settings};
use crate::desktop::{Account, AudioServer, DisplayServer};
use crate::fs::remove_dir;
use crate::gateway::GatewayService;

/// The `Teardown` stops the session services and removes the transient files.
/// Every step is best-effort: a failure is logged and the next step runs.
/// The persisted gateway configuration is never removed.
pub struct Teardown {
    display: DisplayServer,
    audio: AudioServer,
    gateway: GatewayService,
    account: Account,
    profile_root: String,
    protected: Vec<PathBuf>,
}

impl Teardown {
    pub fn new(executor: Arc<dyn Executor>, settings: &Settings, account: &Account) -> Self {
        let gateway = &settings.gateway;
        Self {
            display: DisplayServer::new(executor.clone(), &settings.display),
            audio: AudioServer::new(executor.clone(), &settings.audio),
            gateway: GatewayService::new(executor, gateway),
            account: account.clone(),
            profile_root: settings.display.profile_root.clone(),
            protected: vec![
                PathBuf::from(&gateway.home),
                PathBuf::from(gateway.properties_path()),
                PathBuf::from(gateway.user_mapping_path()),
            ],
        }
    }

    pub fn stop_container(&self, name: &str) {
        self.gateway.stop_container(name);
    }

    pub fn stop_gateway(&self) {
        for name in self.gateway.settings().container_names() {
            self.stop_container(name);
        }
    }

    pub fn stop_display(&self) {
        self.display.stop(&self.account);
    }

    pub fn stop_audio(&self) {
        self.audio.stop(&self.account);
    }

    /// A directory is protected when it is, or contains, one of the persisted paths.
    fn is_protected(&self, directory: &Path) -> bool {
        self.protected.iter().any(|protected| protected.starts_with(directory))
    }

    /// Removes a browser profile directory unless it holds persisted files.
    pub fn remove_profile(&self, directory: &Path) {
        if self.is_protected(directory) {
            warn!("Not removing {}: it contains the gateway configuration", directory.display());
            return;
        }

        match remove_dir(directory) {
            Ok(true) => debug!("Removed browser profile {}", directory.display()),
            Ok(false) => trace!("Browser profile {} already removed", directory.display()),
            Err(error) => warn!("{}", error),
        }
    }

    /// Removes every browser profile directory left under the profile root.
    pub fn remove_profiles(&self) {
        let entries = match fs::read_dir(&self.profile_root) {
            Ok(entries) => entries,
            Err(error) => {
                debug!("Cannot list {}: {}", self.profile_root, error);
                return;
            }
        };

        for entry in entries.flatten() {
            let is_profile = entry.file_name().to_string_lossy().starts_with(PROFILE_DIRECTORY_PREFIX);
            if is_profile && entry.path().is_dir() {
                self.remove_profile(&entry.path());
            }
        }
    }

    /// Full sweep, in reverse start order. Safe to run any number of times.
    pub fn sweep(&self) {
        info!("Cleaning up the session of user {}", self.account.username());
        self.stop_gateway();
        self.stop_audio();
        self.stop_display();
        self.remove_profiles();
        info!("Cleanup completed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;

    struct Fixture {
        directory: tempfile::TempDir,
        settings: Settings,
        account: Account,
    }

    fn fixture() -> Fixture {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path().to_str().unwrap().to_string();
        let mut settings = Settings::defaults();
        settings.user = "alice".to_string();
        settings.display.profile_root = root.clone();
        settings.gateway.home = format!("{}/guacamole", root);

        Fixture {
            directory,
            settings,
            account: Account::new("alice", &root, 1000, 1000, vec![]),
        }
    }

    #[test]
    fn sweep_twice_keeps_the_gateway_configuration() {
        let fixture = fixture();
        let root = fixture.directory.path();
        fs::create_dir_all(root.join("webdesk-browser-one/Default")).unwrap();
        fs::create_dir_all(root.join("webdesk-browser-two")).unwrap();
        fs::create_dir_all(root.join("unrelated")).unwrap();
        fs::create_dir_all(&fixture.settings.gateway.home).unwrap();
        fs::write(fixture.settings.gateway.user_mapping_path(), "<user-mapping/>").unwrap();

        let executor = Arc::new(RecordingExecutor::new());
        let teardown = Teardown::new(executor.clone(), &fixture.settings, &fixture.account);

        teardown.sweep();
        executor.respond("vncserver -kill", 1, "");
        executor.respond("docker rm -f", 1, "");
        executor.respond("pkill", 1, "");
        teardown.sweep();

        assert!(!root.join("webdesk-browser-one").exists());
        assert!(!root.join("webdesk-browser-two").exists());
        assert!(root.join("unrelated").exists());
        assert!(Path::new(&fixture.settings.gateway.user_mapping_path()).exists());
    }

    #[test]
    fn sweep_stops_services_in_reverse_start_order() {
        let fixture = fixture();
        let executor = Arc::new(RecordingExecutor::new());

        Teardown::new(executor.clone(), &fixture.settings, &fixture.account).sweep();

        let containers = executor.position("docker rm -f").unwrap();
        let audio = executor.position("pulseaudio --kill").unwrap();
        let display = executor.position("vncserver -kill :1").unwrap();
        assert!(containers < audio);
        assert!(audio < display);
        assert!(executor.ran("docker rm -f webdesk-guacamole"));
        assert!(executor.ran("docker rm -f webdesk-guacd"));
    }

    #[test]
    fn profile_holding_the_gateway_home_is_never_removed() {
        let mut fixture = fixture();
        let root = fixture.directory.path();
        let profile = root.join("webdesk-browser-x");
        fixture.settings.gateway.home = profile.join("guacamole").to_str().unwrap().to_string();
        fs::create_dir_all(&fixture.settings.gateway.home).unwrap();

        let teardown = Teardown::new(Arc::new(RecordingExecutor::new()), &fixture.settings, &fixture.account);
        teardown.remove_profiles();

        assert!(profile.exists());
    }

    #[test]
    fn failing_steps_do_not_stop_the_sweep() {
        let fixture = fixture();
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_to_start("docker");
        executor.respond("vncserver", 2, "");

        Teardown::new(executor.clone(), &fixture.settings, &fixture.account).sweep();

        assert!(executor.ran("pulseaudio --kill"));
        assert!(executor.ran("pkill -u alice -f X(tiger)?vnc"));
    }
}
