use std::sync::Arc;

use crate::artifacts::GATEWAY_CONTAINER_HOME;
use crate::common::{
    Executor, GatewaySettings, NetworkMode, ProcessHandle, Result, RetryPolicy, ShutdownSignal, WebdeskError,
};
use super::{ContainerEngine, ContainerSpec, ReadinessProbe, check_ready};

/// The `GatewayService` manages the two gateway containers: the protocol backend (guacd) and the
/// web frontend, which reach the display and audio servers on the host.
pub struct GatewayService {
    engine: ContainerEngine,
    settings: GatewaySettings,
}

impl GatewayService {
    pub fn new(executor: Arc<dyn Executor>, settings: &GatewaySettings) -> Self {
        Self {
            engine: ContainerEngine::new(executor, &settings.engine),
            settings: settings.clone(),
        }
    }

    pub fn settings(&self) -> &GatewaySettings {
        &self.settings
    }

    pub fn backend_spec(&self) -> ContainerSpec {
        let backend = &self.settings.backend;
        let spec = ContainerSpec::new(&backend.name, &backend.image);
        self.attach_network(spec)
    }

    pub fn frontend_spec(&self) -> ContainerSpec {
        let settings = &self.settings;
        let frontend = &settings.frontend;
        let spec = ContainerSpec::new(&frontend.name, &frontend.image)
            .read_only_volume(&settings.home, GATEWAY_CONTAINER_HOME)
            .env("GUACAMOLE_HOME", GATEWAY_CONTAINER_HOME)
            .env("GUACD_HOSTNAME", settings.backend_address())
            .env("GUACD_PORT", &settings.backend_port.to_string());

        match settings.network_mode {
            NetworkMode::Bridge => self.attach_network(spec).port(settings.web_port, settings.internal_web_port),
            NetworkMode::Host => self.attach_network(spec),
        }
    }

    fn attach_network(&self, spec: ContainerSpec) -> ContainerSpec {
        match self.settings.network_mode {
            NetworkMode::Bridge => spec
                .network(&self.settings.network)
                .host(&self.settings.host_alias, "host-gateway"),
            NetworkMode::Host => spec.network("host"),
        }
    }

    /// Starts the backend then the frontend, replacing any container with the same names.
    pub fn start(&self) -> Result<()> {
        if self.settings.network_mode == NetworkMode::Bridge {
            self.engine.ensure_network(&self.settings.network)?;
        }

        self.remove_previous()?;

        for spec in [self.backend_spec(), self.frontend_spec()] {
            let id = self.engine.run(&spec)?;
            debug!("Container {} started with id {}", spec.name(), id);
        }
        Ok(())
    }

    /// Force-removes the containers left over under the gateway names, which may still publish
    /// the web port.
    pub fn remove_previous(&self) -> Result<()> {
        for name in self.settings.container_names() {
            if self.engine.remove(name)? {
                info!("Removed previous container {}", name);
            }
        }
        Ok(())
    }

    /// Stops and removes a gateway container. Best-effort: failures are logged.
    pub fn stop_container(&self, name: &str) {
        match self.engine.remove(name) {
            Ok(true) => info!("Stopped container {}", name),
            Ok(false) => debug!("Container {} is not running", name),
            Err(error) => warn!("Could not stop container {}: {}", name, error),
        }
    }

    /// Polls the web frontend until it answers with the expected marker.
    /// When every attempt fails the tail of the gateway logs is dumped and an error returned.
    pub fn wait_until_ready(&self, probe: &dyn ReadinessProbe, signal: &ShutdownSignal) -> Result<()> {
        let readiness = &self.settings.readiness;
        let url = self.settings.readiness_url();
        let policy = RetryPolicy::new(readiness.attempts, readiness.interval())
            .with_backoff(readiness.backoff, readiness.max_interval());

        info!("Waiting for the gateway at {} ({} attempts)", url, policy.attempts());

        let ready = policy.run(signal, |attempt| {
            trace!("Gateway readiness attempt {}", attempt);
            Ok(check_ready(probe, &url, &readiness.marker))
        })?;

        match ready {
            Some(()) => Ok(()),
            None => {
                self.dump_logs();
                Err(WebdeskError::GatewayError(format!("Gateway not ready at {} after {} attempts", url, policy.attempts())))
            }
        }
    }

    /// Logs the tail of the frontend and backend logs.
    pub fn dump_logs(&self) {
        for name in self.settings.container_names() {
            match self.engine.logs_tail(name, self.settings.log_tail) {
                Ok(logs) => {
                    error!("Last {} log lines of {}:", self.settings.log_tail, name);
                    for line in logs.lines() {
                        error!("  {}", line);
                    }
                },
                Err(error) => warn!("Could not read logs of {}: {}", name, error),
            }
        }
    }

    /// Starts a log follower for each gateway container.
    pub fn follow_logs(&self) -> Result<Vec<ProcessHandle>> {
        self.settings
            .container_names()
            .iter()
            .map(|name| self.engine.follow_logs(name))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;
    use std::cell::Cell;

    struct ScriptedProbe {
        calls: Cell<u32>,
        ready_at: Option<u32>,
    }

    impl ReadinessProbe for ScriptedProbe {
        fn probe(&self, _url: &str) -> Result<String> {
            let call = self.calls.get() + 1;
            self.calls.set(call);
            match self.ready_at {
                Some(ready_at) if call >= ready_at => Ok("<title>Guacamole</title>".to_string()),
                _ => Err(WebdeskError::GatewayError("connection refused".to_string())),
            }
        }
    }

    fn settings(attempts: u32) -> GatewaySettings {
        let mut settings = GatewaySettings::default();
        settings.readiness.interval_ms = 0;
        settings.readiness.attempts = attempts;
        settings
    }

    #[test]
    fn start_replaces_previous_containers_on_a_bridge_network() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("docker network inspect", 1, "");
        let service = GatewayService::new(executor.clone(), &settings(3));

        service.start().unwrap();

        let commands = executor.commands();
        assert_eq!(commands[0], "docker network inspect webdesk-net");
        assert_eq!(commands[1], "docker network create webdesk-net");
        assert_eq!(commands[2], "docker rm -f webdesk-guacamole");
        assert_eq!(commands[3], "docker rm -f webdesk-guacd");
        assert_eq!(commands[4], "docker run -d --name webdesk-guacd --network webdesk-net --add-host host.docker.internal:host-gateway guacamole/guacd");
        assert!(commands[5].starts_with("docker run -d --name webdesk-guacamole --network webdesk-net"));
        assert!(commands[5].contains("-p 8080:8080"));
        assert!(commands[5].contains("-v /etc/webdesk/guacamole:/etc/guacamole:ro"));
        assert!(commands[5].contains("-e GUACD_HOSTNAME=webdesk-guacd"));
    }

    #[test]
    fn host_mode_shares_the_host_network() {
        let executor = Arc::new(RecordingExecutor::new());
        let mut settings = settings(3);
        settings.network_mode = NetworkMode::Host;
        let service = GatewayService::new(executor.clone(), &settings);

        service.start().unwrap();

        assert!(!executor.ran("docker network"));
        let frontend = service.frontend_spec().run_args().join(" ");
        assert!(frontend.contains("--network host"));
        assert!(!frontend.contains("-p "));
        assert!(!frontend.contains("--add-host"));
        assert!(frontend.contains("GUACD_HOSTNAME=127.0.0.1"));
    }

    #[test]
    fn ready_on_first_marker_hit() {
        let executor = Arc::new(RecordingExecutor::new());
        let service = GatewayService::new(executor.clone(), &settings(5));
        let probe = ScriptedProbe { calls: Cell::new(0), ready_at: Some(3) };

        service.wait_until_ready(&probe, &ShutdownSignal::new()).unwrap();

        assert_eq!(probe.calls.get(), 3);
        assert!(!executor.ran("docker logs"));
    }

    #[test]
    fn fails_after_exactly_the_configured_attempts_and_dumps_logs() {
        let executor = Arc::new(RecordingExecutor::new());
        let service = GatewayService::new(executor.clone(), &settings(4));
        let probe = ScriptedProbe { calls: Cell::new(0), ready_at: None };

        let result = service.wait_until_ready(&probe, &ShutdownSignal::new());

        assert!(matches!(result, Err(WebdeskError::GatewayError(_))));
        assert_eq!(probe.calls.get(), 4);
        assert!(executor.ran("docker logs --tail 50 webdesk-guacamole"));
        assert!(executor.ran("docker logs --tail 50 webdesk-guacd"));
    }

    #[test]
    fn stopping_missing_containers_is_harmless() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("docker rm -f", 1, "");
        let service = GatewayService::new(executor.clone(), &settings(1));

        service.stop_container("webdesk-guacamole");
        service.stop_container("webdesk-guacamole");

        assert_eq!(executor.commands().len(), 2);
    }
}
