use std::time::Duration;

use crate::common::{Attempt, Result, WebdeskError};

/// Queries a health-indicating endpoint.
pub trait ReadinessProbe {
    /// Returns the response body on a successful response, an error otherwise.
    fn probe(&self, url: &str) -> Result<String>;
}

/// Probes an HTTP endpoint with a blocking client.
pub struct HttpProbe {
    client: reqwest::blocking::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            // The gateway is always probed on the loopback interface
            .no_proxy()
            .build()?;

        Ok(Self {
            client
        })
    }
}

impl ReadinessProbe for HttpProbe {
    fn probe(&self, url: &str) -> Result<String> {
        let response = self.client.get(url).send()?;
        let status = response.status();
        if !status.is_success() {
            return Err(WebdeskError::GatewayError(format!("{} answered with HTTP {}", url, status)));
        }

        Ok(response.text()?)
    }
}

/// Runs one readiness check: ready when the endpoint answers with a body containing the marker.
pub fn check_ready(probe: &dyn ReadinessProbe, url: &str, marker: &str) -> Attempt<()> {
    match probe.probe(url) {
        Ok(body) if body.contains(marker) => Attempt::Done(()),
        Ok(_) => Attempt::Retry(format!("{} answered without \"{}\"", url, marker)),
        Err(error) => Attempt::Retry(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::TcpListener;
    use std::thread;

    fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut buffer = [0u8; 1024];
            let _ = stream.read(&mut buffer);
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status, body.len(), body
            );
            stream.write_all(response.as_bytes()).unwrap();
        });

        format!("http://{}/guacamole/", address)
    }

    #[test]
    fn http_probe_returns_body_of_successful_response() {
        let url = serve_once("200 OK", "<title>Guacamole</title>");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();

        assert!(matches!(check_ready(&probe, &url, "Guacamole"), Attempt::Done(())));
    }

    #[test]
    fn http_probe_rejects_error_status() {
        let url = serve_once("503 Service Unavailable", "Guacamole is starting");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();

        assert!(probe.probe(&url).is_err());
    }

    #[test]
    fn missing_marker_is_not_ready() {
        let url = serve_once("200 OK", "It works!");
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();

        assert!(matches!(check_ready(&probe, &url, "Guacamole"), Attempt::Retry(_)));
    }

    #[test]
    fn closed_port_is_not_ready() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        drop(listener);
        let probe = HttpProbe::new(Duration::from_secs(5)).unwrap();

        assert!(matches!(check_ready(&probe, &url, "Guacamole"), Attempt::Retry(_)));
    }
}
