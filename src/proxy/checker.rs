//! Proxy checker module: liveness probing and per-candidate validation

use crate::error::{ProbeError, StorageError};
use crate::proxy::models::{Candidate, ValidationOutcome};
use crate::proxy::store::ResultStore;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use reqwest::{Client, Proxy as ReqwestProxy};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default timeout for a single probe attempt in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 5;

/// Default number of concurrent checks
const DEFAULT_CONCURRENCY: usize = 20;

/// Default URL to test proxies against
const DEFAULT_TEST_URL: &str = "http://httpbin.org/ip";

/// Default URL to test CONNECT-capable (https) proxies against
const DEFAULT_SECURE_TEST_URL: &str = "https://httpbin.org/ip";

/// Configuration for proxy checking
#[derive(Debug, Clone)]
pub struct CheckerConfig {
    /// Timeout for each probe attempt
    pub timeout: Duration,
    /// Number of concurrent checks
    pub concurrency: usize,
    /// URL to test proxies against
    pub test_url: String,
    /// URL to test https proxies against
    pub secure_test_url: String,
    /// Attempts and backoff per candidate
    pub retry: RetryPolicy,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            concurrency: DEFAULT_CONCURRENCY,
            test_url: DEFAULT_TEST_URL.to_string(),
            secure_test_url: DEFAULT_SECURE_TEST_URL.to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl CheckerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_test_url(mut self, url: String) -> Self {
        self.test_url = url;
        self
    }

    pub fn with_secure_test_url(mut self, url: String) -> Self {
        self.secure_test_url = url;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A single liveness probe through a candidate proxy
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, candidate: &Candidate) -> Result<(), ProbeError>;
}

/// Probe that sends a GET to a "what is my IP" endpoint through the candidate
#[derive(Debug, Clone)]
pub struct HttpProbe {
    timeout: Duration,
    test_url: String,
    secure_test_url: String,
}

impl HttpProbe {
    pub fn new(config: &CheckerConfig) -> Self {
        Self {
            timeout: config.timeout,
            test_url: config.test_url.clone(),
            secure_test_url: config.secure_test_url.clone(),
        }
    }

    /// Liveness target for a candidate's protocol
    fn target_url(&self, candidate: &Candidate) -> &str {
        if candidate.protocol.needs_tls_target() {
            &self.secure_test_url
        } else {
            &self.test_url
        }
    }

    /// Create a reqwest client that routes every request through the candidate
    fn create_client(&self, candidate: &Candidate) -> Result<Client, ProbeError> {
        let mismatch = |e: reqwest::Error| ProbeError::ProtocolMismatch(e.to_string());
        let proxy = ReqwestProxy::all(candidate.url()).map_err(mismatch)?;

        Client::builder()
            .proxy(proxy)
            .timeout(self.timeout)
            .pool_max_idle_per_host(0)
            .build()
            .map_err(mismatch)
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, candidate: &Candidate) -> Result<(), ProbeError> {
        let client = self.create_client(candidate)?;
        client
            .get(self.target_url(candidate))
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Validates one candidate at a time, recording working ones in the store
pub struct ProxyValidator<P> {
    probe: P,
    timeout: Duration,
    retry: RetryPolicy,
    store: Arc<ResultStore>,
}

impl<P: Probe> ProxyValidator<P> {
    pub fn new(probe: P, config: &CheckerConfig, store: Arc<ResultStore>) -> Self {
        Self {
            probe,
            timeout: config.timeout,
            retry: config.retry,
            store,
        }
    }

    pub fn probe(&self) -> &P {
        &self.probe
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    /// Probe a candidate with retries.
    ///
    /// A working candidate is recorded in the store before this returns; the
    /// only error is a failure to persist it.
    pub async fn validate(&self, candidate: &Candidate) -> Result<ValidationOutcome, StorageError> {
        let probe = &self.probe;
        let timeout = self.timeout;
        let target = candidate.to_string();

        let result = self
            .retry
            .execute(&target, || async move {
                let start = Instant::now();
                match tokio::time::timeout(timeout, probe.probe(candidate)).await {
                    Ok(Ok(())) => Ok(start.elapsed()),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(ProbeError::Timeout),
                }
            })
            .await;

        match result {
            Ok(latency) => {
                info!(
                    "{} ({}) is working ({}ms)",
                    candidate.address(),
                    candidate.protocol,
                    latency.as_millis()
                );
                self.store
                    .record_async(candidate.protocol, candidate.address())
                    .await?;
                Ok(ValidationOutcome::working(candidate.clone(), latency))
            }
            Err(e) => {
                debug!(candidate = %candidate, error = %e, "proxy not working");
                Ok(ValidationOutcome::failed(candidate.clone(), e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::models::ProxyType;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Local HTTP proxy answering one request with a canned response
    async fn serve_once(response: &'static str) -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                let n = socket.read(&mut buf).await.unwrap();
                if n == 0 {
                    return;
                }
                request.extend_from_slice(&buf[..n]);
            }
            socket.write_all(response.as_bytes()).await.unwrap();
            let _ = socket.shutdown().await;
        });
        port
    }

    /// Local proxy that accepts connections and never answers
    async fn serve_silently() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(10)).await;
        });
        port
    }

    fn local_probe() -> HttpProbe {
        HttpProbe::new(
            &CheckerConfig::new()
                .with_timeout(Duration::from_millis(500))
                .with_test_url("http://proxy-sieve.test/ip".to_string()),
        )
    }

    fn local_candidate(port: u16) -> Candidate {
        Candidate::new("127.0.0.1", port, ProxyType::Http)
    }

    fn fast_config() -> CheckerConfig {
        CheckerConfig::new()
            .with_timeout(Duration::from_millis(100))
            .with_retry(RetryPolicy::new().with_backoff_unit(Duration::from_millis(1)))
    }

    /// Probe that fails a fixed number of times before succeeding
    struct FlakyProbe {
        failures: u32,
        error: ProbeError,
        calls: AtomicU32,
    }

    impl FlakyProbe {
        fn new(failures: u32, error: ProbeError) -> Self {
            Self {
                failures,
                error,
                calls: AtomicU32::new(0),
            }
        }
    }

    #[async_trait]
    impl Probe for FlakyProbe {
        async fn probe(&self, _candidate: &Candidate) -> Result<(), ProbeError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.failures {
                Err(self.error.clone())
            } else {
                Ok(())
            }
        }
    }

    struct SlowProbe;

    #[async_trait]
    impl Probe for SlowProbe {
        async fn probe(&self, _candidate: &Candidate) -> Result<(), ProbeError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        }
    }

    #[test]
    fn test_checker_config_default() {
        let config = CheckerConfig::default();
        assert_eq!(config.timeout, Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        assert_eq!(config.concurrency, DEFAULT_CONCURRENCY);
        assert_eq!(config.test_url, DEFAULT_TEST_URL);
        assert_eq!(config.secure_test_url, DEFAULT_SECURE_TEST_URL);
        assert_eq!(config.retry.max_attempts, 3);
    }

    #[test]
    fn test_checker_config_builder() {
        let config = CheckerConfig::new()
            .with_timeout(Duration::from_secs(30))
            .with_concurrency(50)
            .with_test_url("http://example.com".to_string());

        assert_eq!(config.timeout, Duration::from_secs(30));
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.test_url, "http://example.com");
    }

    #[test]
    fn test_https_candidates_probe_tls_target() {
        let probe = HttpProbe::new(&CheckerConfig::default());
        let https = Candidate::new("1.2.3.4", 443, ProxyType::Https);
        let socks = Candidate::new("1.2.3.4", 1080, ProxyType::Socks5);

        assert_eq!(probe.target_url(&https), DEFAULT_SECURE_TEST_URL);
        assert_eq!(probe.target_url(&socks), DEFAULT_TEST_URL);
    }

    #[test]
    fn test_http_probe_builds_client_for_supported_protocols() {
        let probe = HttpProbe::new(&CheckerConfig::default());
        for protocol in ProxyType::ALL {
            let candidate = Candidate::new("1.2.3.4", 8080, protocol);
            assert!(probe.create_client(&candidate).is_ok(), "{}", protocol);
        }
    }

    #[tokio::test]
    async fn test_validate_success_records_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::open(dir.path()).unwrap());
        let validator = ProxyValidator::new(
            FlakyProbe::new(0, ProbeError::Timeout),
            &fast_config(),
            Arc::clone(&store),
        );
        let candidate = Candidate::new("1.2.3.4", 8080, ProxyType::Http);

        let outcome = validator.validate(&candidate).await.unwrap();

        assert!(outcome.success);
        assert!(outcome.latency.is_some());
        assert_eq!(store.snapshot(ProxyType::Http), vec!["1.2.3.4:8080"]);
        assert_eq!(validator.probe.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_validate_retries_then_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::open(dir.path()).unwrap());
        let validator = ProxyValidator::new(
            FlakyProbe::new(2, ProbeError::ConnectFailed("refused".into())),
            &fast_config(),
            Arc::clone(&store),
        );
        let candidate = Candidate::new("1.2.3.4", 1080, ProxyType::Socks5);

        let outcome = validator.validate(&candidate).await.unwrap();

        assert!(outcome.success);
        assert_eq!(validator.probe.calls.load(Ordering::SeqCst), 3);
        assert_eq!(store.len(ProxyType::Socks5), 1);
    }

    #[tokio::test]
    async fn test_validate_failure_leaves_store_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::open(dir.path()).unwrap());
        let validator = ProxyValidator::new(
            FlakyProbe::new(u32::MAX, ProbeError::BadResponse(403)),
            &fast_config(),
            Arc::clone(&store),
        );
        let candidate = Candidate::new("1.2.3.4", 8080, ProxyType::Http);

        let outcome = validator.validate(&candidate).await.unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ProbeError::BadResponse(403)));
        assert_eq!(validator.probe.calls.load(Ordering::SeqCst), 3);
        assert!(store.is_empty());
        assert!(!store.path_for(ProxyType::Http).exists());
    }

    #[tokio::test]
    async fn test_validate_attempt_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ResultStore::open(dir.path()).unwrap());
        let config = fast_config()
            .with_timeout(Duration::from_millis(20))
            .with_retry(
                RetryPolicy::new()
                    .with_max_attempts(2)
                    .with_backoff_unit(Duration::from_millis(1)),
            );
        let validator = ProxyValidator::new(SlowProbe, &config, Arc::clone(&store));
        let candidate = Candidate::new("1.2.3.4", 8080, ProxyType::Http);

        let start = Instant::now();
        let outcome = validator.validate(&candidate).await.unwrap();

        assert_eq!(outcome.error, Some(ProbeError::Timeout));
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_http_probe_ok_through_working_proxy() {
        let port = serve_once(
            "HTTP/1.1 200 OK\r\nContent-Length: 2\r\nConnection: close\r\n\r\n{}",
        )
        .await;

        assert_eq!(local_probe().probe(&local_candidate(port)).await, Ok(()));
    }

    #[tokio::test]
    async fn test_http_probe_non_success_status() {
        let port = serve_once(
            "HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;

        assert_eq!(
            local_probe().probe(&local_candidate(port)).await,
            Err(ProbeError::BadResponse(503))
        );
    }

    #[tokio::test]
    async fn test_http_probe_closed_port() {
        let port = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let result = local_probe().probe(&local_candidate(port)).await;
        assert!(matches!(result, Err(ProbeError::ConnectFailed(_))), "{:?}", result);
    }

    #[tokio::test]
    async fn test_http_probe_silent_proxy_times_out() {
        let port = serve_silently().await;

        assert_eq!(
            local_probe().probe(&local_candidate(port)).await,
            Err(ProbeError::Timeout)
        );
    }
}
