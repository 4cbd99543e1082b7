//! Proxy crawler module for fetching candidates from proxy list websites
//!
//! This module provides functionality for:
//! - Fetching proxy list pages with bounded retries
//! - Parsing them with a per-source strategy (HTML tables, plain lines, or a
//!   regex scan)
//! - Merging many sources while skipping the ones that fail

use crate::error::FetchError;
use crate::proxy::models::{Candidate, ProxyType};
use crate::proxy::parser::ProxyParser;
use crate::retry::RetryPolicy;
use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{error, info};

/// Default timeout for HTTP requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 10;

/// Default user agent for HTTP requests
const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

/// Regex pattern to match IP:PORT patterns in text
static IP_PORT_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}):(\d{1,5})\b")
        .expect("Invalid IP:PORT regex")
});

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Invalid row selector"));

static CELL_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("td").expect("Invalid cell selector"));

/// Where a table source keeps each row's protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProtocolColumn {
    /// Column holds a protocol name such as `socks4`
    Name(usize),
    /// Column holds `yes`/`no` for HTTPS support
    HttpsFlag(usize),
}

/// How to turn a fetched page into candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceFormat {
    /// Line parsing, falling back to a regex scan for IP:PORT
    #[default]
    Auto,
    /// One proxy per line
    Lines,
    /// `<tr>` rows with host in column 0 and port in column 1
    Html {
        #[serde(default)]
        protocol_column: Option<ProtocolColumn>,
    },
}

impl SourceFormat {
    /// Guess a strategy from the URL alone: raw `.json`/`.txt` lists are line based
    pub fn infer(url: &str) -> Self {
        let path = url.split(['?', '#']).next().unwrap_or(url).to_lowercase();
        if path.ends_with(".json") || path.ends_with(".txt") {
            SourceFormat::Lines
        } else {
            SourceFormat::Auto
        }
    }
}

/// Result of crawling a single source
#[derive(Debug, Clone)]
pub struct CrawlResult {
    /// The source that was crawled
    pub source: String,
    /// Candidates extracted from the source
    pub candidates: Vec<Candidate>,
    /// Error message if crawling failed
    pub error: Option<String>,
}

impl CrawlResult {
    pub fn success(source: String, candidates: Vec<Candidate>) -> Self {
        Self {
            source,
            candidates,
            error: None,
        }
    }

    pub fn failure(source: String, error: String) -> Self {
        Self {
            source,
            candidates: Vec::new(),
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// Configuration for proxy crawler
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// Timeout for HTTP requests
    pub timeout: Duration,
    /// User agent for HTTP requests
    pub user_agent: String,
    /// Attempts and backoff per source
    pub retry: RetryPolicy,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            retry: RetryPolicy::default().with_failure_warnings(),
        }
    }
}

impl CrawlerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_user_agent(mut self, user_agent: String) -> Self {
        self.user_agent = user_agent;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Proxy source representing a website that provides proxy lists
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySource {
    /// Name of the proxy source
    pub name: String,
    /// URL to fetch proxies from
    pub url: String,
    /// Protocol assumed when a row or line does not name one
    pub proxy_type: ProxyType,
    /// Parse strategy for this source
    pub format: SourceFormat,
}

impl ProxySource {
    pub fn new(name: &str, url: &str, proxy_type: ProxyType, format: SourceFormat) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            proxy_type,
            format,
        }
    }

    /// Source named after its URL, with the format inferred from it
    pub fn from_url(url: &str) -> Self {
        Self::new(url, url, ProxyType::Http, SourceFormat::infer(url))
    }

    /// Parse a fetched page with this source's strategy
    pub fn parse(&self, content: &str) -> Result<Vec<Candidate>, FetchError> {
        match self.format {
            SourceFormat::Lines => Ok(ProxyParser::parse_string(content, self.proxy_type)),
            SourceFormat::Auto => Ok(parse_proxies_from_text(content, self.proxy_type)),
            SourceFormat::Html { protocol_column } => {
                parse_html_table(content, self.proxy_type, protocol_column)
            }
        }
    }
}

/// Producer of raw candidates from list sources
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn fetch_candidates(&self, source: &ProxySource) -> Result<Vec<Candidate>, FetchError>;
}

/// Fetch every source, skipping the ones that fail, and merge the results.
///
/// Duplicates (same host, port and protocol) are dropped, keeping the first.
pub async fn collect_candidates(
    adapter: &dyn SourceAdapter,
    sources: &[ProxySource],
) -> Vec<Candidate> {
    let mut seen = HashSet::new();
    let mut candidates = Vec::new();

    for result in crawl_sources_with_results(adapter, sources).await {
        match result.error {
            None => {
                info!("Scraped {} proxies from {}", result.candidates.len(), result.source);
                candidates.extend(
                    result
                        .candidates
                        .into_iter()
                        .filter(|c| seen.insert(c.clone())),
                );
            }
            Some(e) => error!("Error scraping {}: {}", result.source, e),
        }
    }

    candidates
}

/// Fetch every source, returning one result per source
pub async fn crawl_sources_with_results(
    adapter: &dyn SourceAdapter,
    sources: &[ProxySource],
) -> Vec<CrawlResult> {
    let mut results = Vec::new();

    for source in sources {
        info!("Scraping proxies from {}...", source.url);
        let result = match adapter.fetch_candidates(source).await {
            Ok(candidates) => CrawlResult::success(source.name.clone(), candidates),
            Err(e) => CrawlResult::failure(source.name.clone(), e.to_string()),
        };
        results.push(result);
    }

    results
}

/// Proxy crawler for fetching candidates from websites
pub struct ProxyCrawler {
    config: CrawlerConfig,
    client: Client,
}

impl ProxyCrawler {
    /// Create a new proxy crawler with default configuration
    pub fn new() -> Result<Self, FetchError> {
        Self::with_config(CrawlerConfig::default())
    }

    /// Create a new proxy crawler with custom configuration
    pub fn with_config(config: CrawlerConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        Ok(Self { config, client })
    }

    /// Fetch a page body, failing on non-2xx statuses
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }

    /// Get the list of common free proxy sources
    pub fn common_sources() -> Vec<ProxySource> {
        let https_flag = SourceFormat::Html {
            protocol_column: Some(ProtocolColumn::HttpsFlag(6)),
        };
        vec![
            ProxySource::new(
                "free-proxy-list.net",
                "https://www.free-proxy-list.net",
                ProxyType::Http,
                https_flag,
            ),
            ProxySource::new(
                "socks-proxy.net",
                "https://www.socks-proxy.net",
                ProxyType::Socks4,
                SourceFormat::Html {
                    protocol_column: Some(ProtocolColumn::Name(4)),
                },
            ),
            ProxySource::new("us-proxy.org", "https://www.us-proxy.org", ProxyType::Http, https_flag),
            ProxySource::new("sslproxies.org", "https://www.sslproxies.org", ProxyType::Https, https_flag),
            ProxySource::new(
                "freeproxylist.org",
                "https://www.freeproxylist.org/",
                ProxyType::Http,
                SourceFormat::Auto,
            ),
            ProxySource::new(
                "proxynova.com",
                "https://www.proxynova.com/proxy-server-list/",
                ProxyType::Http,
                SourceFormat::Auto,
            ),
            ProxySource::new(
                "spys.one",
                "https://www.spys.one/en/free-proxy-list/",
                ProxyType::Http,
                SourceFormat::Auto,
            ),
            ProxySource::new(
                "getproxylist.com",
                "https://www.getproxylist.com",
                ProxyType::Http,
                SourceFormat::Auto,
            ),
            ProxySource::new(
                "undesired.com",
                "https://www.undesired.com/proxies/",
                ProxyType::Http,
                SourceFormat::Auto,
            ),
        ]
    }
}

#[async_trait]
impl SourceAdapter for ProxyCrawler {
    async fn fetch_candidates(&self, source: &ProxySource) -> Result<Vec<Candidate>, FetchError> {
        let content = self
            .config
            .retry
            .execute(&source.url, || self.fetch_text(&source.url))
            .await?;
        source.parse(&content)
    }
}

/// Parse candidates from raw text content
///
/// This tries line-by-line parsing first and falls back to regex-based
/// IP:PORT extraction when no line parses.
pub fn parse_proxies_from_text(content: &str, proxy_type: ProxyType) -> Vec<Candidate> {
    let candidates = ProxyParser::parse_string(content, proxy_type);
    if candidates.is_empty() {
        extract_proxies_with_regex(content, proxy_type)
    } else {
        candidates
    }
}

/// Extract candidates using regex pattern matching
fn extract_proxies_with_regex(content: &str, proxy_type: ProxyType) -> Vec<Candidate> {
    IP_PORT_REGEX
        .captures_iter(content)
        .filter_map(|cap| {
            let host = cap.get(1)?.as_str();
            if host.split('.').any(|part| part.parse::<u8>().is_err()) {
                return None;
            }
            let port = ProxyParser::parse_port(cap.get(2)?.as_str())?;
            Some(Candidate::new(host, port, proxy_type))
        })
        .collect()
}

/// Parse `<tr>` rows: host in column 0, port in column 1, protocol from an
/// optional column, falling back to `proxy_type`
fn parse_html_table(
    content: &str,
    proxy_type: ProxyType,
    protocol_column: Option<ProtocolColumn>,
) -> Result<Vec<Candidate>, FetchError> {
    let document = Html::parse_document(content);
    let mut rows = document.select(&ROW_SELECTOR).peekable();
    if rows.peek().is_none() {
        return Err(FetchError::Parse("no table rows found".to_string()));
    }

    let candidates = rows
        .filter_map(|row| {
            let cells: Vec<String> = row
                .select(&CELL_SELECTOR)
                .map(|td| td.text().collect::<String>().trim().to_string())
                .collect();
            if cells.len() < 2 || cells[0].is_empty() {
                return None;
            }
            let port = ProxyParser::parse_port(&cells[1])?;

            let protocol = match protocol_column {
                Some(ProtocolColumn::Name(i)) => cells
                    .get(i)
                    .and_then(|v| v.parse::<ProxyType>().ok())
                    .unwrap_or(proxy_type),
                Some(ProtocolColumn::HttpsFlag(i)) => match cells.get(i) {
                    Some(v) if v.eq_ignore_ascii_case("yes") => ProxyType::Https,
                    Some(v) if v.eq_ignore_ascii_case("no") => ProxyType::Http,
                    _ => proxy_type,
                },
                None => proxy_type,
            };

            Some(Candidate::new(cells[0].as_str(), port, protocol))
        })
        .collect();

    Ok(candidates)
}
