//! Proxy data models

use crate::error::ProbeError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Proxy protocol enumeration
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum ProxyType {
    #[default]
    Http,
    Https,
    Socks4,
    Socks5,
}

impl ProxyType {
    /// Every protocol, in output order
    pub const ALL: [ProxyType; 4] = [
        ProxyType::Http,
        ProxyType::Https,
        ProxyType::Socks4,
        ProxyType::Socks5,
    ];

    /// URL scheme used to reach a proxy of this protocol.
    ///
    /// HTTPS proxies are plain HTTP proxies that accept CONNECT, so they are
    /// dialed with the `http` scheme and tunnel the TLS target.
    pub fn proxy_scheme(&self) -> &'static str {
        match self {
            ProxyType::Http | ProxyType::Https => "http",
            ProxyType::Socks4 => "socks4",
            ProxyType::Socks5 => "socks5",
        }
    }

    /// Whether the liveness probe must go to a TLS target to exercise CONNECT
    pub fn needs_tls_target(&self) -> bool {
        matches!(self, ProxyType::Https)
    }

    /// File name of this protocol's output destination
    pub fn file_name(&self) -> String {
        format!("{}.txt", self)
    }
}

impl fmt::Display for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyType::Http => write!(f, "http"),
            ProxyType::Https => write!(f, "https"),
            ProxyType::Socks4 => write!(f, "socks4"),
            ProxyType::Socks5 => write!(f, "socks5"),
        }
    }
}

impl FromStr for ProxyType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "http" => Ok(ProxyType::Http),
            "https" => Ok(ProxyType::Https),
            "socks4" => Ok(ProxyType::Socks4),
            "socks5" => Ok(ProxyType::Socks5),
            other => Err(format!(
                "Invalid proxy type: {}. Use: http, https, socks4, socks5",
                other
            )),
        }
    }
}

/// An unverified proxy endpoint extracted from a source list
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Candidate {
    pub host: String,
    pub port: u16,
    pub protocol: ProxyType,
}

impl Candidate {
    pub fn new(host: impl Into<String>, port: u16, protocol: ProxyType) -> Self {
        Self {
            host: host.into(),
            port,
            protocol,
        }
    }

    /// URL used to dial this candidate as a forward proxy
    pub fn url(&self) -> String {
        format!("{}://{}:{}", self.protocol.proxy_scheme(), self.host, self.port)
    }

    /// The candidate in HOST:PORT format, as persisted
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}:{}", self.protocol, self.host, self.port)
    }
}

/// Result of validating one candidate, after retries
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub candidate: Candidate,
    pub success: bool,
    pub latency: Option<Duration>,
    pub error: Option<ProbeError>,
}

impl ValidationOutcome {
    pub fn working(candidate: Candidate, latency: Duration) -> Self {
        Self {
            candidate,
            success: true,
            latency: Some(latency),
            error: None,
        }
    }

    pub fn failed(candidate: Candidate, error: ProbeError) -> Self {
        Self {
            candidate,
            success: false,
            latency: None,
            error: Some(error),
        }
    }

    pub fn latency_ms(&self) -> Option<u64> {
        self.latency.map(|l| l.as_millis() as u64)
    }
}

/// Totals for one dispatcher run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub working: usize,
    pub failed: usize,
    pub by_protocol: BTreeMap<ProxyType, usize>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl RunSummary {
    pub fn start(total: usize) -> Self {
        Self {
            total,
            working: 0,
            failed: 0,
            by_protocol: BTreeMap::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn tally(&mut self, outcome: &ValidationOutcome) {
        if outcome.success {
            self.working += 1;
            *self
                .by_protocol
                .entry(outcome.candidate.protocol)
                .or_insert(0) += 1;
        } else {
            self.failed += 1;
        }
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn completed(&self) -> usize {
        self.working + self.failed
    }

    pub fn working_for(&self, protocol: ProxyType) -> usize {
        self.by_protocol.get(&protocol).copied().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidate_creation() {
        let candidate = Candidate::new("127.0.0.1", 8080, ProxyType::Http);
        assert_eq!(candidate.host, "127.0.0.1");
        assert_eq!(candidate.port, 8080);
        assert_eq!(candidate.protocol, ProxyType::Http);
    }

    #[test]
    fn test_candidate_url() {
        let candidate = Candidate::new("127.0.0.1", 8080, ProxyType::Http);
        assert_eq!(candidate.url(), "http://127.0.0.1:8080");

        let candidate = Candidate::new("192.168.1.1", 1080, ProxyType::Socks5);
        assert_eq!(candidate.url(), "socks5://192.168.1.1:1080");

        // https proxies are dialed as http and tunnel with CONNECT
        let candidate = Candidate::new("10.0.0.1", 443, ProxyType::Https);
        assert_eq!(candidate.url(), "http://10.0.0.1:443");
        assert_eq!(candidate.to_string(), "https://10.0.0.1:443");
    }

    #[test]
    fn test_candidate_address() {
        let candidate = Candidate::new("127.0.0.1", 8080, ProxyType::Socks4);
        assert_eq!(candidate.address(), "127.0.0.1:8080");
    }

    #[test]
    fn test_proxy_type_from_str() {
        assert_eq!("HTTP".parse::<ProxyType>(), Ok(ProxyType::Http));
        assert_eq!(" socks5 ".parse::<ProxyType>(), Ok(ProxyType::Socks5));
        assert!("ftp".parse::<ProxyType>().is_err());
    }

    #[test]
    fn test_proxy_type_file_name() {
        assert_eq!(ProxyType::Socks4.file_name(), "socks4.txt");
        assert_eq!(ProxyType::Https.file_name(), "https.txt");
    }

    #[test]
    fn test_validation_outcome() {
        let candidate = Candidate::new("127.0.0.1", 8080, ProxyType::Http);

        let outcome = ValidationOutcome::working(candidate.clone(), Duration::from_millis(100));
        assert!(outcome.success);
        assert_eq!(outcome.latency_ms(), Some(100));
        assert!(outcome.error.is_none());

        let outcome = ValidationOutcome::failed(candidate, ProbeError::Timeout);
        assert!(!outcome.success);
        assert_eq!(outcome.error, Some(ProbeError::Timeout));
        assert!(outcome.latency.is_none());
    }

    #[test]
    fn test_run_summary_tally() {
        let mut summary = RunSummary::start(3);
        let http = Candidate::new("1.1.1.1", 80, ProxyType::Http);
        let socks = Candidate::new("2.2.2.2", 1080, ProxyType::Socks5);

        summary.tally(&ValidationOutcome::working(http, Duration::from_millis(5)));
        summary.tally(&ValidationOutcome::failed(socks.clone(), ProbeError::Timeout));
        summary.tally(&ValidationOutcome::working(socks, Duration::from_millis(5)));
        summary.finish();

        assert_eq!(summary.completed(), 3);
        assert_eq!(summary.working, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.working_for(ProxyType::Http), 1);
        assert_eq!(summary.working_for(ProxyType::Socks5), 1);
        assert_eq!(summary.working_for(ProxyType::Socks4), 0);
        assert!(summary.finished_at.is_some());
    }
}
