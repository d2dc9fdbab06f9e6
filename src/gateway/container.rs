use std::sync::Arc;

use crate::common::{CommandLine, Executor, ProcessHandle, Result, WebdeskError};

/// Description of a detached container to run.
#[derive(Clone, Debug)]
pub struct ContainerSpec {
    name: String,
    image: String,
    network: Option<String>,
    hosts: Vec<(String, String)>,
    ports: Vec<(u16, u16)>,
    volumes: Vec<(String, String)>,
    env: Vec<(String, String)>,
}

impl ContainerSpec {
    pub fn new(name: &str, image: &str) -> Self {
        Self {
            name: name.to_string(),
            image: image.to_string(),
            network: None,
            hosts: Vec::new(),
            ports: Vec::new(),
            volumes: Vec::new(),
            env: Vec::new(),
        }
    }

    /// Network to attach the container to ("host" shares the host network namespace).
    pub fn network(mut self, network: &str) -> Self {
        self.network = Some(network.to_string());
        self
    }

    /// Adds an entry to the container's hosts file.
    pub fn host(mut self, hostname: &str, address: &str) -> Self {
        self.hosts.push((hostname.to_string(), address.to_string()));
        self
    }

    /// Publishes a container port on the host.
    pub fn port(mut self, host_port: u16, container_port: u16) -> Self {
        self.ports.push((host_port, container_port));
        self
    }

    /// Mounts a host directory read-only.
    pub fn read_only_volume(mut self, host_path: &str, container_path: &str) -> Self {
        self.volumes.push((host_path.to_string(), container_path.to_string()));
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Arguments of the `run` command for this container.
    pub fn run_args(&self) -> Vec<String> {
        let mut args = vec!["run".to_string(), "-d".to_string(), "--name".to_string(), self.name.clone()];

        if let Some(network) = &self.network {
            args.push("--network".to_string());
            args.push(network.clone());
        }
        for (hostname, address) in &self.hosts {
            args.push("--add-host".to_string());
            args.push(format!("{}:{}", hostname, address));
        }
        for (host_port, container_port) in &self.ports {
            args.push("-p".to_string());
            args.push(format!("{}:{}", host_port, container_port));
        }
        for (host_path, container_path) in &self.volumes {
            args.push("-v".to_string());
            args.push(format!("{}:{}:ro", host_path, container_path));
        }
        for (key, value) in &self.env {
            args.push("-e".to_string());
            args.push(format!("{}={}", key, value));
        }

        args.push(self.image.clone());
        args
    }
}

/// The `ContainerEngine` wraps the container CLI (docker or a compatible engine).
pub struct ContainerEngine {
    executor: Arc<dyn Executor>,
    binary: String,
}

impl ContainerEngine {
    pub fn new(executor: Arc<dyn Executor>, binary: &str) -> Self {
        Self {
            executor,
            binary: binary.to_string(),
        }
    }

    fn command(&self) -> CommandLine {
        CommandLine::new(&self.binary)
    }

    /// Checks that the engine daemon answers.
    pub fn is_available(&self) -> bool {
        matches!(self.executor.run(&self.command().arg("info")), Ok(output) if output.success())
    }

    pub fn network_exists(&self, network: &str) -> Result<bool> {
        let output = self.executor.run(&self.command().args(["network", "inspect", network]))?;
        Ok(output.success())
    }

    /// Creates the network unless it already exists.
    pub fn ensure_network(&self, network: &str) -> Result<()> {
        if self.network_exists(network)? {
            debug!("Container network {} already exists", network);
            return Ok(());
        }

        info!("Creating container network {}", network);
        self.executor.run_checked(&self.command().args(["network", "create", network]), WebdeskError::GatewayError)?;
        Ok(())
    }

    /// Force-removes a container.
    ///
    /// # Returns
    /// `true` if a container was removed, `false` if none existed.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let output = self.executor.run(&self.command().args(["rm", "-f", name]))?;
        if output.success() {
            // Recent engines succeed silently when the container does not exist
            return Ok(!output.stdout_text().trim().is_empty());
        }

        if output.stderr_text().contains("No such container") {
            return Ok(false);
        }

        Err(WebdeskError::GatewayError(format!("Could not remove container {}: {}", name, output.diagnostic())))
    }

    /// Runs a detached container and returns its id.
    pub fn run(&self, spec: &ContainerSpec) -> Result<String> {
        info!("Starting container {}", spec.name());
        let output = self.executor.run_checked(&self.command().args(spec.run_args()), WebdeskError::GatewayError)?;
        Ok(output.stdout_text().trim().to_string())
    }

    /// The last lines of a container's logs (stdout and stderr).
    pub fn logs_tail(&self, name: &str, lines: u32) -> Result<String> {
        let output = self.executor.run(&self.command().arg("logs").arg("--tail").arg(lines.to_string()).arg(name))?;
        Ok(format!("{}{}", output.stdout_text(), output.stderr_text()))
    }

    /// Follows the logs of a container, forwarding them to the console.
    pub fn follow_logs(&self, name: &str) -> Result<ProcessHandle> {
        let command = self.command().args(["logs", "-f", "--tail", "0", name]);
        self.executor.spawn(&format!("{} logs", name), &command)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;

    #[test]
    fn run_args_include_every_option() {
        let spec = ContainerSpec::new("webdesk-guacamole", "guacamole/guacamole")
            .network("webdesk-net")
            .host("host.docker.internal", "host-gateway")
            .port(8080, 8080)
            .read_only_volume("/etc/webdesk/guacamole", "/etc/guacamole")
            .env("GUACAMOLE_HOME", "/etc/guacamole");

        assert_eq!(
            spec.run_args().join(" "),
            "run -d --name webdesk-guacamole --network webdesk-net --add-host host.docker.internal:host-gateway \
             -p 8080:8080 -v /etc/webdesk/guacamole:/etc/guacamole:ro -e GUACAMOLE_HOME=/etc/guacamole guacamole/guacamole"
        );
    }

    #[test]
    fn ensure_network_is_idempotent() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = ContainerEngine::new(executor.clone(), "docker");

        executor.respond("docker network inspect", 1, "");
        engine.ensure_network("webdesk-net").unwrap();
        assert!(executor.ran("docker network create webdesk-net"));

        executor.clear();
        executor.respond("docker network inspect", 0, "[]");
        engine.ensure_network("webdesk-net").unwrap();
        assert!(!executor.ran("docker network create"));
    }

    #[test]
    fn removing_a_missing_container_is_not_an_error() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = ContainerEngine::new(executor.clone(), "docker");

        executor.respond("docker rm -f", 0, "webdesk-guacd\n");
        assert!(engine.remove("webdesk-guacd").unwrap());

        executor.respond("docker rm -f", 0, "");
        assert!(!engine.remove("webdesk-guacd").unwrap());
    }

    #[test]
    fn run_returns_the_container_id() {
        let executor = Arc::new(RecordingExecutor::new());
        let engine = ContainerEngine::new(executor.clone(), "docker");
        executor.respond("docker run", 0, "3f2a9c1d\n");

        let id = engine.run(&ContainerSpec::new("webdesk-guacd", "guacamole/guacd")).unwrap();

        assert_eq!(id, "3f2a9c1d");
        assert_eq!(executor.commands(), vec!["docker run -d --name webdesk-guacd guacamole/guacd"]);
    }
}
