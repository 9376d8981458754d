//! HTTP access to a running system under test.

use std::time::Duration;

use ct_types::{Configuration, CtError, CtResult, EvaluationError};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::system::{flatten_metrics, Metrics, SystemUnderTest};

/// Where the system lives and how long to wait on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteConfig {
    pub base_url: String,
    pub execute_path: String,
    pub monitor_path: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    /// Delay between applying a configuration and reading metrics.
    pub settle_ms: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            execute_path: "/execute".to_string(),
            monitor_path: "/monitor".to_string(),
            timeout_ms: 30_000,
            settle_ms: 10_000,
        }
    }
}

impl RemoteConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_settle(mut self, settle: Duration) -> Self {
        self.settle_ms = settle.as_millis() as u64;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }
}

/// [`SystemUnderTest`] over `PUT {execute}` and `GET {monitor}`.
#[derive(Debug, Clone)]
pub struct HttpSystem {
    config: RemoteConfig,
    client: reqwest::blocking::Client,
}

impl HttpSystem {
    pub fn new(config: RemoteConfig) -> CtResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| CtError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Poll the monitor endpoint until it answers successfully.
    pub fn wait_until_ready(&self, attempts: usize, interval: Duration) -> bool {
        let url = self.config.url(&self.config.monitor_path);
        for attempt in 1..=attempts {
            match self.client.get(&url).send() {
                Ok(response) if response.status().is_success() => {
                    info!(attempt, url = %url, "system under test is ready");
                    return true;
                }
                Ok(response) => {
                    debug!(attempt, status = %response.status(), "system not ready yet");
                }
                Err(e) => debug!(attempt, error = %e, "system not reachable yet"),
            }
            if attempt < attempts {
                std::thread::sleep(interval);
            }
        }
        warn!(attempts, url = %url, "system under test never became ready");
        false
    }
}

fn classify(endpoint: &str, error: reqwest::Error) -> EvaluationError {
    if error.is_timeout() {
        EvaluationError::Timeout {
            endpoint: endpoint.to_string(),
        }
    } else if let Some(status) = error.status() {
        EvaluationError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        }
    } else {
        EvaluationError::Transport {
            message: format!("{endpoint}: {error}"),
        }
    }
}

fn ensure_success(
    endpoint: &str,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, EvaluationError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(EvaluationError::Status {
            endpoint: endpoint.to_string(),
            status: status.as_u16(),
        })
    }
}

impl SystemUnderTest for HttpSystem {
    fn apply(&mut self, configuration: &Configuration) -> Result<(), EvaluationError> {
        let endpoint = self.config.execute_path.as_str();
        let response = self
            .client
            .put(self.config.url(endpoint))
            .json(configuration)
            .send()
            .map_err(|e| classify(endpoint, e))?;
        ensure_success(endpoint, response)?;
        Ok(())
    }

    fn read_metrics(&mut self) -> Result<Metrics, EvaluationError> {
        let endpoint = self.config.monitor_path.as_str();
        let response = self
            .client
            .get(self.config.url(endpoint))
            .send()
            .map_err(|e| classify(endpoint, e))?;
        let body = ensure_success(endpoint, response)?
            .text()
            .map_err(|e| classify(endpoint, e))?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|e| EvaluationError::MalformedPayload {
                message: format!("{endpoint}: {e}"),
            })?;
        flatten_metrics(&value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ct_types::ParameterValue;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::mpsc;
    use std::thread;

    struct Recorded {
        request_line: String,
        body: String,
    }

    fn read_request(stream: &mut TcpStream) -> Recorded {
        let mut reader = BufReader::new(stream);
        let mut request_line = String::new();
        reader.read_line(&mut request_line).unwrap();

        let mut content_length = 0usize;
        loop {
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();
            if line == "\r\n" || line.is_empty() {
                break;
            }
            let lower = line.to_ascii_lowercase();
            if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap();
            }
        }

        let mut body = vec![0u8; content_length];
        reader.read_exact(&mut body).unwrap();
        Recorded {
            request_line: request_line.trim().to_string(),
            body: String::from_utf8(body).unwrap(),
        }
    }

    /// Serve `responses` in order, one per connection, reporting each request.
    fn serve(
        responses: Vec<(u16, &'static str)>,
        delay: Duration,
    ) -> (String, mpsc::Receiver<Recorded>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            for (status, body) in responses {
                let Ok((mut stream, _)) = listener.accept() else {
                    return;
                };
                let recorded = read_request(&mut stream);
                let _ = tx.send(recorded);
                thread::sleep(delay);
                let reply = format!(
                    "HTTP/1.1 {status} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                    body.len()
                );
                let _ = stream.write_all(reply.as_bytes());
            }
        });
        (base_url, rx)
    }

    fn system(base_url: &str, timeout: Duration) -> HttpSystem {
        let config = RemoteConfig::default()
            .with_base_url(base_url)
            .with_timeout(timeout)
            .with_settle(Duration::ZERO);
        HttpSystem::new(config).unwrap()
    }

    #[test]
    fn puts_configuration_and_reads_metrics() {
        let (base_url, requests) = serve(
            vec![
                (200, "{}"),
                (200, r#"{"car_stats": {"routing_duration": 2.5}, "averageTravelTime": 61}"#),
            ],
            Duration::ZERO,
        );
        let mut system = system(&base_url, Duration::from_secs(5));

        let configuration = Configuration::from([
            ("exploration_percentage".to_string(), ParameterValue::Float(0.25)),
            ("re_route_every_ticks".to_string(), ParameterValue::Int(12)),
        ]);
        system.apply(&configuration).unwrap();
        let metrics = system.read_metrics().unwrap();

        assert_eq!(metrics["car_stats.routing_duration"], 2.5);
        assert_eq!(metrics["averageTravelTime"], 61.0);

        let put = requests.recv().unwrap();
        assert!(put.request_line.starts_with("PUT /execute"));
        let sent: serde_json::Value = serde_json::from_str(&put.body).unwrap();
        assert_eq!(sent["exploration_percentage"], 0.25);
        assert_eq!(sent["re_route_every_ticks"], 12);

        let get = requests.recv().unwrap();
        assert!(get.request_line.starts_with("GET /monitor"));
    }

    #[test]
    fn error_status_is_reported() {
        let (base_url, _requests) = serve(vec![(500, "{}")], Duration::ZERO);
        let mut system = system(&base_url, Duration::from_secs(5));
        let result = system.apply(&Configuration::new());
        assert_eq!(
            result,
            Err(EvaluationError::Status {
                endpoint: "/execute".to_string(),
                status: 500
            })
        );
    }

    #[test]
    fn malformed_metrics_body() {
        let (base_url, _requests) = serve(vec![(200, "not json")], Duration::ZERO);
        let mut system = system(&base_url, Duration::from_secs(5));
        assert!(matches!(
            system.read_metrics(),
            Err(EvaluationError::MalformedPayload { .. })
        ));
    }

    #[test]
    fn refused_connection_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        drop(listener);

        let mut system = system(&base_url, Duration::from_secs(2));
        assert!(matches!(
            system.read_metrics(),
            Err(EvaluationError::Transport { .. })
        ));
        assert!(!system.wait_until_ready(2, Duration::from_millis(10)));
    }

    #[test]
    fn slow_response_times_out() {
        let (base_url, _requests) = serve(vec![(200, "{}")], Duration::from_secs(2));
        let mut system = system(&base_url, Duration::from_millis(200));
        let result = system.read_metrics();
        assert!(matches!(
            result,
            Err(EvaluationError::Timeout { .. }) | Err(EvaluationError::Transport { .. })
        ));
    }

    #[test]
    fn ready_when_monitor_answers() {
        let (base_url, _requests) = serve(vec![(200, "{}")], Duration::ZERO);
        let system = system(&base_url, Duration::from_secs(5));
        assert!(system.wait_until_ready(3, Duration::from_millis(10)));
    }

    #[test]
    fn base_url_trailing_slash_is_ignored() {
        let config = RemoteConfig::default().with_base_url("http://host:1/");
        assert_eq!(config.url("/monitor"), "http://host:1/monitor");
        assert_eq!(config.settle(), Duration::from_secs(10));
    }
}
