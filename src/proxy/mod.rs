//! Proxy module for discovering and validating proxies
//!
//! This module provides functionality for:
//! - Crawling proxy websites to extract candidate lists
//! - Parsing candidates from plain-text lists
//! - Probing candidates concurrently with bounded retries
//! - Appending working proxies to one file per protocol

pub mod checker;
pub mod crawler;
pub mod dispatcher;
pub mod models;
pub mod parser;
pub mod store;

pub use checker::{CheckerConfig, HttpProbe, Probe, ProxyValidator};
pub use crawler::{
    collect_candidates, CrawlerConfig, ProtocolColumn, ProxyCrawler, ProxySource, SourceAdapter,
    SourceFormat,
};
pub use dispatcher::Dispatcher;
pub use models::{Candidate, ProxyType, RunSummary, ValidationOutcome};
pub use parser::ProxyParser;
pub use store::ResultStore;
