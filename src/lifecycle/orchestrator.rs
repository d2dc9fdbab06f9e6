use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::artifacts::{profile_directory, ArtifactGenerator, GeneratedArtifacts, SessionCredentials};
use crate::common::{Executor, Result, Settings, ShutdownSignal, WebdeskError};
use crate::desktop::{Account, AudioServer, DisplayServer};
use crate::gateway::{GatewayService, ReadinessProbe};
use crate::setup::{ResourceLimitAdjuster, SetupSequencer};
use super::{PortChecker, Resource, Resources, StartupState, Teardown};

/// A started session. Dropping it stops every service it owns.
pub struct RunningSession {
    session_id: String,
    credentials: SessionCredentials,
    artifacts: GeneratedArtifacts,
    access_url: String,
    resources: Resources,
}

impl RunningSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn artifacts(&self) -> &GeneratedArtifacts {
        &self.artifacts
    }

    pub fn access_url(&self) -> &str {
        &self.access_url
    }

    /// Logs how to reach the desktop.
    pub fn report(&self) {
        info!("Session {} ready at {}", self.session_id, self.access_url);
        info!("Username: {}", self.credentials.gateway_username());
        if self.credentials.generated() {
            info!("Password: {}", self.credentials.gateway_password());
        } else {
            info!("Password: (as configured)");
        }
        info!("Press Ctrl+C to stop");
    }

    /// Stops the session services and removes its transient files.
    pub fn stop(mut self) {
        self.resources.release_all();
    }
}

/// The `Orchestrator` prepares the system then starts the display, audio and gateway services
/// strictly in that order, tracking progress in a `StartupState`.
pub struct Orchestrator {
    executor: Arc<dyn Executor>,
    settings: Settings,
    account: Account,
    signal: ShutdownSignal,
    state: StartupState,
}

impl Orchestrator {
    pub fn new(executor: Arc<dyn Executor>, settings: &Settings, account: &Account, signal: &ShutdownSignal) -> Self {
        Self {
            executor,
            settings: settings.clone(),
            account: account.clone(),
            signal: signal.clone(),
            state: StartupState::NotStarted,
        }
    }

    pub fn state(&self) -> StartupState {
        self.state
    }

    /// Installs what is missing and applies the resource limits.
    pub fn prepare(&self) -> Result<()> {
        SetupSequencer::new(self.executor.clone(), &self.settings.setup, &self.settings.gateway).run(&self.account)?;
        ResourceLimitAdjuster::new(self.executor.clone(), &self.settings.limits).apply(&self.account);
        Ok(())
    }

    /// Starts the session. On failure everything started so far is stopped again and the
    /// state is `Failed`.
    pub fn start(&mut self, probe: &dyn ReadinessProbe) -> Result<RunningSession> {
        match self.start_services(probe) {
            Ok(session) => Ok(session),
            Err(error) => {
                if !self.state.is_terminal() {
                    self.state = self.state.advance(StartupState::Failed)?;
                }
                error!("Startup failed in state {}: {}", self.state, error);
                Err(error)
            }
        }
    }

    /// Prepares the system, starts the session and keeps it running until the shutdown signal.
    pub fn run(&mut self, probe: &dyn ReadinessProbe) -> Result<()> {
        self.prepare()?;

        let mut session = self.start(probe)?;
        self.follow_gateway_logs(&mut session);
        session.report();

        self.signal.wait();
        info!("Shutdown requested");
        session.stop();
        Ok(())
    }

    fn advance(&mut self, next: StartupState) -> Result<()> {
        self.state = self.state.advance(next)?;
        Ok(())
    }

    fn check_interrupted(&self) -> Result<()> {
        if self.signal.is_triggered() {
            return Err(WebdeskError::Interrupted);
        }
        Ok(())
    }

    fn start_services(&mut self, probe: &dyn ReadinessProbe) -> Result<RunningSession> {
        let gateway_settings = self.settings.gateway.clone();
        let gateway = GatewayService::new(self.executor.clone(), &gateway_settings);

        // A stale frontend keeps publishing the web port. Nothing may be launched while it is taken
        gateway.remove_previous()?;
        PortChecker::new(self.executor.clone()).ensure_available(gateway_settings.web_port)?;
        self.check_interrupted()?;

        let session_id = Uuid::new_v4().simple().to_string();
        let credentials = SessionCredentials::resolve(&self.settings);
        let mut resources = Resources::new(Teardown::new(self.executor.clone(), &self.settings, &self.account));

        info!("Starting session {} for user {}", session_id, self.account.username());

        resources.acquire(Resource::ProfileDirectory(PathBuf::from(profile_directory(&self.settings.display.profile_root, &session_id))));
        let artifacts = ArtifactGenerator::new(self.executor.clone(), &self.settings).generate(&self.account, &credentials, &session_id)?;

        self.check_interrupted()?;
        resources.acquire(Resource::DisplayServer);
        DisplayServer::new(self.executor.clone(), &self.settings.display).start(&self.account, &artifacts)?;
        self.advance(StartupState::DisplayUp)?;

        self.check_interrupted()?;
        resources.acquire(Resource::AudioServer);
        AudioServer::new(self.executor.clone(), &self.settings.audio).start(&self.account)?;
        self.advance(StartupState::AudioUp)?;

        self.check_interrupted()?;
        // The frontend is released before the backend it depends on
        for name in gateway_settings.container_names().iter().rev() {
            resources.acquire(Resource::Container(name.to_string()));
        }
        self.advance(StartupState::GatewayStarting)?;
        gateway.start()?;
        gateway.wait_until_ready(probe, &self.signal)?;
        self.advance(StartupState::Ready)?;

        Ok(RunningSession {
            session_id,
            credentials,
            artifacts,
            access_url: format!("http://localhost:{}{}", gateway_settings.web_port, gateway_settings.readiness.path),
            resources,
        })
    }

    /// Forwards the gateway container logs to the console. Best-effort.
    fn follow_gateway_logs(&self, session: &mut RunningSession) {
        let gateway = GatewayService::new(self.executor.clone(), &self.settings.gateway);
        match gateway.follow_logs() {
            Ok(followers) => followers
                .into_iter()
                .for_each(|follower| session.resources.acquire(Resource::LogFollower(follower))),
            Err(error) => warn!("Could not follow the gateway logs: {}", error),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;
    use nix::unistd::{getgid, getuid};
    use std::cell::Cell;
    use std::net::TcpListener;
    use std::path::Path;

    struct ScriptedProbe {
        calls: Cell<u32>,
        ready: bool,
    }

    impl ScriptedProbe {
        fn new(ready: bool) -> Self {
            Self { calls: Cell::new(0), ready }
        }
    }

    impl ReadinessProbe for ScriptedProbe {
        fn probe(&self, _url: &str) -> Result<String> {
            self.calls.set(self.calls.get() + 1);
            if self.ready {
                Ok("<html><title>Guacamole</title></html>".to_string())
            } else {
                Err(WebdeskError::GatewayError("connection refused".to_string()))
            }
        }
    }

    struct Fixture {
        _directory: tempfile::TempDir,
        settings: Settings,
        account: Account,
        executor: Arc<RecordingExecutor>,
    }

    fn free_port() -> u16 {
        TcpListener::bind("0.0.0.0:0").unwrap().local_addr().unwrap().port()
    }

    fn fixture(web_port: u16) -> Fixture {
        let directory = tempfile::tempdir().unwrap();
        let root = directory.path().to_str().unwrap().to_string();
        let home = format!("{}/home", root);
        std::fs::create_dir_all(&home).unwrap();

        let mut settings = Settings::defaults();
        settings.user = "tester".to_string();
        settings.display.profile_root = format!("{}/tmp", root);
        settings.gateway.home = format!("{}/guacamole", root);
        settings.gateway.web_port = web_port;
        settings.gateway.readiness.interval_ms = 0;
        settings.gateway.readiness.attempts = 3;
        settings.limits.enabled = false;

        Fixture {
            _directory: directory,
            settings,
            account: Account::new("tester", &home, getuid().as_raw(), getgid().as_raw(), vec![]),
            executor: Arc::new(RecordingExecutor::new()),
        }
    }

    fn orchestrator(fixture: &Fixture, signal: &ShutdownSignal) -> Orchestrator {
        Orchestrator::new(fixture.executor.clone(), &fixture.settings, &fixture.account, signal)
    }

    #[test]
    fn busy_web_port_aborts_before_any_service() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let fixture = fixture(listener.local_addr().unwrap().port());
        let mut orchestrator = orchestrator(&fixture, &ShutdownSignal::new());

        let result = orchestrator.start(&ScriptedProbe::new(true));

        assert!(matches!(result, Err(WebdeskError::PortError(_))));
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert!(!fixture.executor.ran("vncserver"));
        assert!(!fixture.executor.ran("pulseaudio"));
        assert!(!fixture.executor.ran("docker run"));
        assert!(!Path::new(&fixture.settings.gateway.user_mapping_path()).exists());
    }

    #[test]
    fn stale_gateway_containers_are_removed_before_the_port_check() {
        let fixture = fixture(free_port());
        let listener = format!(
            "LISTEN 0 4096 0.0.0.0:{} 0.0.0.0:* users:((\"docker-proxy\",pid=4242,fd=4))",
            fixture.settings.gateway.web_port
        );
        fixture.executor.respond("ss -Hltnp", 0, &listener);
        let mut orchestrator = orchestrator(&fixture, &ShutdownSignal::new());

        let result = orchestrator.start(&ScriptedProbe::new(true));

        assert!(matches!(result, Err(WebdeskError::PortError(_))));
        let executor = &fixture.executor;
        let check = executor.position("ss -Hltnp").unwrap();
        assert!(executor.position("docker rm -f webdesk-guacamole").unwrap() < check);
        assert!(executor.position("docker rm -f webdesk-guacd").unwrap() < check);
        assert!(!executor.ran("docker run"));
        assert!(!executor.ran("vncserver :1"));
    }

    #[test]
    fn services_start_in_order_and_stop_on_exit() {
        let fixture = fixture(free_port());
        let mut orchestrator = orchestrator(&fixture, &ShutdownSignal::new());

        let session = orchestrator.start(&ScriptedProbe::new(true)).unwrap();

        assert_eq!(orchestrator.state(), StartupState::Ready);
        let executor = &fixture.executor;
        let display = executor.position("vncserver :1 -geometry 1920x1080 -depth 24").unwrap();
        let audio = executor.position("pulseaudio --start").unwrap();
        let backend = executor.position("docker run -d --name webdesk-guacd").unwrap();
        let frontend = executor.position("docker run -d --name webdesk-guacamole").unwrap();
        assert!(executor.position("ss -Hltnp").unwrap() < display);
        assert!(display < audio);
        assert!(audio < backend);
        assert!(backend < frontend);

        let profile = PathBuf::from(&session.artifacts().profile_directory);
        assert!(profile.is_dir());
        assert!(session.access_url().ends_with("/guacamole/"));

        executor.clear();
        session.stop();

        let commands = executor.commands();
        assert_eq!(commands[0], "docker rm -f webdesk-guacamole");
        assert_eq!(commands[1], "docker rm -f webdesk-guacd");
        assert!(executor.position("pulseaudio --kill").unwrap() < executor.position("vncserver -kill :1").unwrap());
        assert!(!profile.exists());
        assert!(Path::new(&fixture.settings.gateway.user_mapping_path()).exists());
    }

    #[test]
    fn readiness_exhaustion_fails_and_cleans_up() {
        let fixture = fixture(free_port());
        let mut orchestrator = orchestrator(&fixture, &ShutdownSignal::new());
        let probe = ScriptedProbe::new(false);

        let result = orchestrator.start(&probe);

        assert!(matches!(result, Err(WebdeskError::GatewayError(_))));
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert_eq!(probe.calls.get(), 3);

        let commands = fixture.executor.commands();
        let logs = commands.iter().position(|command| command.starts_with("docker logs")).unwrap();
        let last_removal = commands.iter().rposition(|command| command.starts_with("docker rm -f")).unwrap();
        assert!(logs < last_removal);
        assert!(fixture.executor.ran("vncserver -kill :1"));
    }

    #[test]
    fn display_failure_stops_what_was_started() {
        let fixture = fixture(free_port());
        fixture.executor.respond("vncserver :1", 1, "");
        let mut orchestrator = orchestrator(&fixture, &ShutdownSignal::new());

        let result = orchestrator.start(&ScriptedProbe::new(true));

        assert!(matches!(result, Err(WebdeskError::DisplayError(_))));
        assert_eq!(orchestrator.state(), StartupState::Failed);
        assert!(!fixture.executor.ran("pulseaudio --start"));
        assert!(!fixture.executor.ran("docker run"));
    }

    #[test]
    fn interrupt_before_start_launches_nothing() {
        let fixture = fixture(free_port());
        let signal = ShutdownSignal::new();
        signal.trigger();
        let mut orchestrator = orchestrator(&fixture, &signal);

        let result = orchestrator.start(&ScriptedProbe::new(true));

        match result {
            Err(error) => assert_eq!(error.exit_code(), 130),
            Ok(_) => panic!("startup should be interrupted"),
        }
        assert!(!fixture.executor.ran("vncserver :1"));
    }

    #[test]
    fn run_stops_the_session_once_signalled() {
        let fixture = fixture(free_port());
        let signal = ShutdownSignal::new();
        let trigger = signal.clone();
        let mut orchestrator = orchestrator(&fixture, &signal);

        let stopper = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(200));
            trigger.trigger();
        });
        orchestrator.run(&ScriptedProbe::new(true)).unwrap();
        stopper.join().unwrap();

        assert!(fixture.executor.ran("docker logs -f --tail 0 webdesk-guacamole"));
        assert!(fixture.executor.ran("vncserver -kill :1"));
    }
}
