use std::io::ErrorKind;
use std::net::TcpListener;
use std::sync::Arc;

use crate::common::{CommandLine, Executor, Result, WebdeskError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortStatus {
    Available,
    /// The port is taken; holds the listener found.
    InUse(String),
}

/// Extracts the listening sockets bound to a port from `ss -Hltnp` output.
pub fn find_listeners(ss_output: &str, port: u16) -> Vec<String> {
    let port = port.to_string();
    ss_output
        .lines()
        .filter(|line| {
            line.split_whitespace()
                .nth(3)
                .and_then(|local_address| local_address.rsplit_once(':'))
                .map(|(_, local_port)| local_port == port)
                .unwrap_or(false)
        })
        .map(|line| line.split_whitespace().collect::<Vec<&str>>().join(" "))
        .collect()
}

/// The `PortChecker` queries the local listening-socket table.
pub struct PortChecker {
    executor: Arc<dyn Executor>,
}

impl PortChecker {
    pub fn new(executor: Arc<dyn Executor>) -> Self {
        Self {
            executor
        }
    }

    /// Looks the port up with `ss`, then confirms with a bind probe when `ss` finds nothing
    /// (or is not available).
    pub fn check(&self, port: u16) -> PortStatus {
        let command = CommandLine::new("ss").arg("-Hltnp");
        match self.executor.run(&command) {
            Ok(output) if output.success() => {
                let listeners = find_listeners(&output.stdout_text(), port);
                if !listeners.is_empty() {
                    return PortStatus::InUse(listeners.join("; "));
                }
            },
            Ok(output) => debug!("Could not list listening sockets: {}", output.diagnostic()),
            Err(error) => debug!("Could not list listening sockets: {}", error),
        }

        match TcpListener::bind(("0.0.0.0", port)) {
            Ok(_) => PortStatus::Available,
            Err(error) if error.kind() == ErrorKind::AddrInUse => PortStatus::InUse(format!("0.0.0.0:{} ({})", port, error)),
            Err(error) => {
                debug!("Bind probe on port {} failed: {}", port, error);
                PortStatus::Available
            }
        }
    }

    /// Fails if the port is in use.
    pub fn ensure_available(&self, port: u16) -> Result<()> {
        match self.check(port) {
            PortStatus::Available => {
                debug!("Port {} is available", port);
                Ok(())
            },
            PortStatus::InUse(listener) => {
                error!("Port {} is already in use by: {}", port, listener);
                Err(WebdeskError::PortError(format!("Port {} is already in use by: {}", port, listener)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::executor::testing::RecordingExecutor;

    const SS_OUTPUT: &str = "\
LISTEN 0      4096         0.0.0.0:8080      0.0.0.0:*    users:((\"docker-proxy\",pid=812,fd=4))
LISTEN 0      128          127.0.0.1:5901    0.0.0.0:*    users:((\"Xtigervnc\",pid=90,fd=7))
LISTEN 0      4096            [::]:18080        [::]:*    users:((\"java\",pid=77,fd=3))
";

    #[test]
    fn finds_listeners_by_exact_port() {
        let listeners = find_listeners(SS_OUTPUT, 8080);

        assert_eq!(listeners.len(), 1);
        assert!(listeners[0].contains("docker-proxy"));
        assert!(find_listeners(SS_OUTPUT, 80).is_empty());
        assert_eq!(find_listeners(SS_OUTPUT, 18080).len(), 1);
    }

    #[test]
    fn reports_listener_found_by_ss() {
        let executor = Arc::new(RecordingExecutor::new());
        executor.respond("ss", 0, SS_OUTPUT);
        let checker = PortChecker::new(executor);

        match checker.check(5901) {
            PortStatus::InUse(listener) => assert!(listener.contains("Xtigervnc")),
            PortStatus::Available => panic!("port 5901 should be in use"),
        }
    }

    #[test]
    fn bind_probe_detects_unlisted_listener() {
        let listener = TcpListener::bind("0.0.0.0:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let executor = Arc::new(RecordingExecutor::new());
        executor.fail_to_start("ss");
        let checker = PortChecker::new(executor);

        assert!(matches!(checker.check(port), PortStatus::InUse(_)));
        assert!(matches!(checker.ensure_available(port), Err(WebdeskError::PortError(_))));
    }

    #[test]
    fn free_port_is_available() {
        let port = TcpListener::bind("0.0.0.0:0").unwrap().local_addr().unwrap().port();
        let checker = PortChecker::new(Arc::new(RecordingExecutor::new()));

        assert_eq!(checker.check(port), PortStatus::Available);
    }
}
