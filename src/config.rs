//! Application configuration, loaded from an optional TOML file

use crate::proxy::{
    CheckerConfig, CrawlerConfig, ProxyCrawler, ProxySource, ProxyType, SourceFormat,
};
use crate::retry::RetryPolicy;
use crate::Result;
use anyhow::Context;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file picked up from the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "proxy-sieve.toml";

/// A list source as written in the config file
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub url: String,
    pub name: Option<String>,
    pub protocol: Option<ProxyType>,
    pub format: Option<SourceFormat>,
}

impl SourceConfig {
    pub fn to_source(&self) -> ProxySource {
        let mut source = ProxySource::from_url(&self.url);
        if let Some(name) = &self.name {
            source.name = name.clone();
        }
        if let Some(protocol) = self.protocol {
            source.proxy_type = protocol;
        }
        if let Some(format) = self.format {
            source.format = format;
        }
        source
    }
}

/// Application configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding http.txt, https.txt, socks4.txt and socks5.txt
    pub output_dir: PathBuf,
    /// Number of candidates validated at once
    pub concurrency: usize,
    /// Timeout for a single probe attempt, in seconds
    pub probe_timeout_secs: u64,
    /// Liveness target for http and socks proxies
    pub test_url: String,
    /// Liveness target for https proxies
    pub secure_test_url: String,
    /// Attempts per candidate and per source
    pub max_attempts: u32,
    /// Exponential backoff base, in seconds
    pub backoff_base: u32,
    /// Timeout for fetching a list source, in seconds
    pub fetch_timeout_secs: u64,
    pub user_agent: Option<String>,
    /// Scrape the built-in list of public proxy sites
    pub common_sources: bool,
    /// Extra sources
    pub sources: Vec<SourceConfig>,
}

impl Default for Config {
    fn default() -> Self {
        let checker = CheckerConfig::default();
        let crawler = CrawlerConfig::default();
        Self {
            output_dir: PathBuf::from("."),
            concurrency: checker.concurrency,
            probe_timeout_secs: checker.timeout.as_secs(),
            test_url: checker.test_url,
            secure_test_url: checker.secure_test_url,
            max_attempts: checker.retry.max_attempts,
            backoff_base: checker.retry.backoff_base,
            fetch_timeout_secs: crawler.timeout.as_secs(),
            user_agent: None,
            common_sources: true,
            sources: Vec::new(),
        }
    }
}

impl Config {
    /// Load from `path`, or from `proxy-sieve.toml` if it exists, or defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml(&data).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml(data: &str) -> Result<Self> {
        Ok(toml::from_str(data)?)
    }

    fn retry(&self) -> RetryPolicy {
        RetryPolicy::new()
            .with_max_attempts(self.max_attempts)
            .with_backoff_base(self.backoff_base)
    }

    pub fn checker_config(&self) -> CheckerConfig {
        CheckerConfig::new()
            .with_concurrency(self.concurrency)
            .with_timeout(Duration::from_secs(self.probe_timeout_secs))
            .with_test_url(self.test_url.clone())
            .with_secure_test_url(self.secure_test_url.clone())
            .with_retry(self.retry())
    }

    pub fn crawler_config(&self) -> CrawlerConfig {
        let config = CrawlerConfig::new()
            .with_timeout(Duration::from_secs(self.fetch_timeout_secs))
            .with_retry(self.retry().with_failure_warnings());
        match &self.user_agent {
            Some(ua) => config.with_user_agent(ua.clone()),
            None => config,
        }
    }

    /// Sources to scrape: configured extras, preceded by the built-in list
    /// when `common_sources` is set
    pub fn sources(&self) -> Vec<ProxySource> {
        let mut sources = if self.common_sources {
            ProxyCrawler::common_sources()
        } else {
            Vec::new()
        };
        sources.extend(self.sources.iter().map(SourceConfig::to_source));
        sources
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::proxy::ProtocolColumn;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.output_dir, PathBuf::from("."));
        assert_eq!(config.concurrency, 20);
        assert_eq!(config.probe_timeout_secs, 5);
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.backoff_base, 2);
        assert!(config.common_sources);
        assert_eq!(config.sources().len(), ProxyCrawler::common_sources().len());
    }

    #[test]
    fn test_config_from_toml() {
        let config = Config::from_toml(
            r#"
output_dir = "out"
concurrency = 50
probe_timeout_secs = 3
common_sources = false

[[sources]]
url = "https://example.com/socks5.txt"
protocol = "socks5"

[[sources]]
url = "https://example.com/table"
name = "table"
format = { kind = "html", protocol_column = { https_flag = 6 } }
"#,
        )
        .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.concurrency, 50);
        assert_eq!(config.max_attempts, 3);

        let checker = config.checker_config();
        assert_eq!(checker.timeout, Duration::from_secs(3));
        assert_eq!(checker.concurrency, 50);

        let sources = config.sources();
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].proxy_type, ProxyType::Socks5);
        assert_eq!(sources[0].format, SourceFormat::Lines);
        assert_eq!(sources[1].name, "table");
        assert_eq!(
            sources[1].format,
            SourceFormat::Html {
                protocol_column: Some(ProtocolColumn::HttpsFlag(6))
            }
        );
    }

    #[test]
    fn test_config_rejects_unknown_protocol() {
        let result = Config::from_toml(
            r#"
[[sources]]
url = "https://example.com/list.txt"
protocol = "ftp"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Config::load(Some(&dir.path().join("missing.toml"))).is_err());
    }
}
