use std::fmt;
use std::time::{Duration, Instant};

use anyhow::Context;
use async_trait::async_trait;
use rand::Rng;
use tracing::trace;

use crate::settings::FetchConfig;

/// Result of a single fetch attempt. Never retried.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    Success { id: u64, url: String, payload: String },
    Failure { id: u64, cause: FetchFailure },
}

/// Why a fetch failed. Only used for logging and the run summary:
/// every kind drops the identifier the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchFailure {
    Timeout,
    Connect,
    Status(u16),
    Body,
    Request,
}

impl FetchFailure {
    fn from_reqwest(e: &reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchFailure::Timeout
        } else if e.is_connect() {
            FetchFailure::Connect
        } else if let Some(status) = e.status() {
            FetchFailure::Status(status.as_u16())
        } else if e.is_body() || e.is_decode() {
            FetchFailure::Body
        } else {
            FetchFailure::Request
        }
    }

    /// Short label used as a map key in summaries.
    pub fn label(&self) -> String {
        match self {
            FetchFailure::Timeout => "timeout".to_string(),
            FetchFailure::Connect => "connect".to_string(),
            FetchFailure::Status(code) => format!("http_{}", code),
            FetchFailure::Body => "body".to_string(),
            FetchFailure::Request => "request".to_string(),
        }
    }
}

impl fmt::Display for FetchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchFailure::Status(code) => write!(f, "HTTP {}", code),
            other => f.write_str(&other.label()),
        }
    }
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    /// The URL a given identifier resolves to.
    fn url_for(&self, id: u64) -> String;

    async fn fetch(&self, id: u64) -> FetchOutcome;
}

/// Substitute `{id}` in the template, or append the identifier when the
/// template has no placeholder.
pub fn render_url(template: &str, id: u64) -> String {
    if template.contains("{id}") {
        template.replace("{id}", &id.to_string())
    } else {
        format!("{}{}", template, id)
    }
}

/// Uniform random wait before each request.
#[derive(Debug, Clone, Copy)]
pub struct Politeness {
    min: Duration,
    max: Duration,
}

impl Politeness {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max: max.max(min) }
    }

    pub fn sample(&self) -> Duration {
        if self.min == self.max {
            return self.min;
        }
        let lo = self.min.as_millis() as u64;
        let hi = self.max.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi))
    }

    pub async fn wait(&self) {
        let delay = self.sample();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}

/// Plain reqwest fetcher: one GET per identifier, no retries.
pub struct HttpFetcher {
    client: reqwest::Client,
    base_url: String,
    politeness: Politeness,
}

impl HttpFetcher {
    pub fn new(cfg: &FetchConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: cfg.base_url.clone(),
            politeness: Politeness::new(cfg.delay_min, cfg.delay_max),
        })
    }

    async fn get(&self, url: &str) -> Result<String, FetchFailure> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| FetchFailure::from_reqwest(&e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchFailure::Status(status.as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| FetchFailure::from_reqwest(&e))
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    fn url_for(&self, id: u64) -> String {
        render_url(&self.base_url, id)
    }

    async fn fetch(&self, id: u64) -> FetchOutcome {
        let url = self.url_for(id);
        self.politeness.wait().await;

        let start = Instant::now();
        let result = self.get(&url).await;
        let latency_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(payload) => {
                trace!(id, latency_ms, bytes = payload.len(), "fetched");
                FetchOutcome::Success { id, url, payload }
            }
            Err(cause) => {
                trace!(id, latency_ms, %cause, "fetch failed");
                FetchOutcome::Failure { id, cause }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Minimal HTTP/1.1 server: `/items/show/404` answers 404, anything else
    /// returns a small HTML body echoing the path.
    async fn spawn_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            loop {
                let Ok((mut socket, _)) = listener.accept().await else {
                    break;
                };
                tokio::spawn(async move {
                    let mut buf = vec![0u8; 4096];
                    let n = socket.read(&mut buf).await.unwrap_or(0);
                    let request = String::from_utf8_lossy(&buf[..n]);
                    let path = request
                        .lines()
                        .next()
                        .and_then(|l| l.split_whitespace().nth(1))
                        .unwrap_or("/")
                        .to_string();

                    let (status, body) = if path.ends_with("/404") {
                        ("404 Not Found", "missing".to_string())
                    } else {
                        ("200 OK", format!("<h1>{}</h1>", path))
                    };
                    let response = format!(
                        "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                        status,
                        body.len(),
                        body
                    );
                    let _ = socket.write_all(response.as_bytes()).await;
                    let _ = socket.shutdown().await;
                });
            }
        });

        format!("http://{}/items/show/", addr)
    }

    fn fetch_config(base_url: String) -> FetchConfig {
        FetchConfig {
            base_url,
            timeout: Duration::from_secs(5),
            delay_min: Duration::ZERO,
            delay_max: Duration::ZERO,
            user_agent: "test".to_string(),
        }
    }

    #[test]
    fn url_appends_id_without_placeholder() {
        assert_eq!(
            render_url("https://braceroarchive.org/items/show/", 42),
            "https://braceroarchive.org/items/show/42"
        );
    }

    #[test]
    fn url_substitutes_placeholder() {
        assert_eq!(
            render_url("https://example.org/items/{id}/view", 7),
            "https://example.org/items/7/view"
        );
    }

    #[test]
    fn politeness_samples_inside_interval() {
        let p = Politeness::new(Duration::from_millis(500), Duration::from_millis(1500));
        for _ in 0..200 {
            let d = p.sample();
            assert!(d >= Duration::from_millis(500) && d <= Duration::from_millis(1500));
        }
    }

    #[test]
    fn politeness_fixed_interval() {
        let p = Politeness::new(Duration::from_millis(20), Duration::from_millis(20));
        assert_eq!(p.sample(), Duration::from_millis(20));
        assert_eq!(Politeness::new(Duration::ZERO, Duration::ZERO).sample(), Duration::ZERO);
    }

    #[test]
    fn failure_labels() {
        assert_eq!(FetchFailure::Status(404).label(), "http_404");
        assert_eq!(FetchFailure::Timeout.to_string(), "timeout");
        assert_eq!(FetchFailure::Status(503).to_string(), "HTTP 503");
    }

    #[tokio::test]
    async fn success_returns_payload() {
        let base = spawn_server().await;
        let fetcher = HttpFetcher::new(&fetch_config(base.clone())).unwrap();

        match fetcher.fetch(12).await {
            FetchOutcome::Success { id, url, payload } => {
                assert_eq!(id, 12);
                assert_eq!(url, format!("{}12", base));
                assert_eq!(payload, "<h1>/items/show/12</h1>");
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn non_success_status_is_failure() {
        let base = spawn_server().await;
        let fetcher = HttpFetcher::new(&fetch_config(base)).unwrap();

        match fetcher.fetch(404).await {
            FetchOutcome::Failure { id, cause, .. } => {
                assert_eq!(id, 404);
                assert_eq!(cause, FetchFailure::Status(404));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    /// Accepts connections and holds them open without ever answering.
    async fn spawn_silent_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        format!("http://{}/items/show/", addr)
    }

    #[tokio::test]
    async fn silent_server_times_out_after_politeness_delay() {
        let base = spawn_silent_server().await;
        let delay = Duration::from_millis(300);
        let cfg = FetchConfig {
            timeout: Duration::from_millis(200),
            delay_min: delay,
            delay_max: delay,
            ..fetch_config(base)
        };
        let fetcher = HttpFetcher::new(&cfg).unwrap();

        let start = Instant::now();
        let outcome = fetcher.fetch(1).await;
        let elapsed = start.elapsed();

        assert!(
            matches!(outcome, FetchOutcome::Failure { id: 1, cause: FetchFailure::Timeout }),
            "got {:?}",
            outcome
        );
        assert!(elapsed >= delay, "elapsed {:?}", elapsed);
        assert!(elapsed < Duration::from_secs(5), "elapsed {:?}", elapsed);
    }

    #[tokio::test]
    async fn unreachable_host_is_failure() {
        // Bind then drop to get a port nobody listens on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let fetcher =
            HttpFetcher::new(&fetch_config(format!("http://{}/items/show/", addr))).unwrap();
        let outcome = fetcher.fetch(1).await;
        assert!(matches!(outcome, FetchOutcome::Failure { id: 1, .. }));
    }
}
