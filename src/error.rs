//! Error types for fetching, probing and persisting proxies

use serde::{Deserialize, Serialize};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Why a single liveness probe through a candidate failed
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum ProbeError {
    #[error("connection failed: {0}")]
    ConnectFailed(String),

    #[error("timed out")]
    Timeout,

    #[error("bad response status: {0}")]
    BadResponse(u16),

    #[error("protocol rejected by transport: {0}")]
    ProtocolMismatch(String),
}

impl ProbeError {
    /// Short label for the failure class
    pub fn kind(&self) -> &'static str {
        match self {
            ProbeError::ConnectFailed(_) => "connect",
            ProbeError::Timeout => "timeout",
            ProbeError::BadResponse(_) => "status",
            ProbeError::ProtocolMismatch(_) => "protocol",
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ProbeError::Timeout
        } else if e.is_builder() {
            ProbeError::ProtocolMismatch(e.to_string())
        } else if let Some(status) = e.status() {
            ProbeError::BadResponse(status.as_u16())
        } else {
            ProbeError::ConnectFailed(e.to_string())
        }
    }
}

/// Failure to fetch or parse one proxy list source
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout
        } else {
            FetchError::Http(e.to_string())
        }
    }
}

/// Failure to persist working proxies. This is the only error that aborts a run.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("cannot create output directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("cannot write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("storage task failed: {0}")]
    Task(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_error_display() {
        assert_eq!(ProbeError::Timeout.to_string(), "timed out");
        assert_eq!(
            ProbeError::BadResponse(503).to_string(),
            "bad response status: 503"
        );
    }

    #[test]
    fn test_probe_error_kind() {
        assert_eq!(ProbeError::ConnectFailed("refused".into()).kind(), "connect");
        assert_eq!(ProbeError::Timeout.kind(), "timeout");
        assert_eq!(ProbeError::BadResponse(503).kind(), "status");
        assert_eq!(ProbeError::ProtocolMismatch("ftp".into()).kind(), "protocol");
    }

    #[test]
    fn test_storage_error_mentions_path() {
        let err = StorageError::Write {
            path: PathBuf::from("out/http.txt"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("out/http.txt"));
    }
}
