//! Proxy Sieve - Proxy Scraper and Validator
//!
//! Scrapes published proxy lists, validates every candidate through a live
//! liveness probe with a bounded worker pool, and appends the working ones to
//! one file per protocol.

pub mod config;
pub mod error;
pub mod progress;
pub mod proxy;
pub mod retry;
pub mod tui;

pub use config::Config;
pub use error::{FetchError, ProbeError, StorageError};
pub use proxy::*;
pub use retry::RetryPolicy;

/// Application result type
pub type Result<T> = anyhow::Result<T>;
