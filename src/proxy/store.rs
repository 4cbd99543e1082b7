//! Thread-safe store of working proxies, persisted per protocol

use crate::error::StorageError;
use crate::proxy::models::ProxyType;
use std::collections::HashMap;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tracing::{debug, info};

#[derive(Debug, Default)]
struct Bucket {
    entries: Vec<String>,
    /// Number of leading entries already appended to disk
    flushed: usize,
}

/// Working proxies bucketed by protocol.
///
/// Each protocol is appended to `<dir>/<protocol>.txt`. Files from earlier
/// runs are appended to, never truncated.
#[derive(Debug)]
pub struct ResultStore {
    dir: PathBuf,
    buckets: Mutex<HashMap<ProxyType, Bucket>>,
}

impl ResultStore {
    /// Open a store writing into `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|source| StorageError::CreateDir {
            path: dir.clone(),
            source,
        })?;

        Ok(Self {
            dir,
            buckets: Mutex::new(HashMap::new()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Destination file for a protocol
    pub fn path_for(&self, protocol: ProxyType) -> PathBuf {
        self.dir.join(protocol.file_name())
    }

    /// Append a working proxy and immediately persist its bucket
    pub fn record(&self, protocol: ProxyType, address: impl Into<String>) -> Result<(), StorageError> {
        let mut buckets = self.lock();
        let bucket = buckets.entry(protocol).or_default();
        bucket.entries.push(address.into());
        self.flush_bucket(protocol, bucket)?;
        Ok(())
    }

    /// [`record`](Self::record) on the blocking pool, so the file write never
    /// stalls other tasks polled on the caller's thread
    pub async fn record_async(
        self: &Arc<Self>,
        protocol: ProxyType,
        address: impl Into<String>,
    ) -> Result<(), StorageError> {
        let store = Arc::clone(self);
        let address = address.into();
        tokio::task::spawn_blocking(move || store.record(protocol, address))
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// [`flush_all`](Self::flush_all) on the blocking pool
    pub async fn flush_all_async(self: &Arc<Self>) -> Result<usize, StorageError> {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || store.flush_all())
            .await
            .map_err(|e| StorageError::Task(e.to_string()))?
    }

    /// Persist entries of one protocol not yet written. Returns how many lines were written.
    pub fn flush(&self, protocol: ProxyType) -> Result<usize, StorageError> {
        let mut buckets = self.lock();
        match buckets.get_mut(&protocol) {
            Some(bucket) => self.flush_bucket(protocol, bucket),
            None => Ok(0),
        }
    }

    /// Persist every bucket. Safe to call any number of times.
    pub fn flush_all(&self) -> Result<usize, StorageError> {
        let mut buckets = self.lock();
        let mut written = 0;
        for protocol in ProxyType::ALL {
            if let Some(bucket) = buckets.get_mut(&protocol) {
                written += self.flush_bucket(protocol, bucket)?;
            }
        }
        for protocol in ProxyType::ALL {
            let count = buckets.get(&protocol).map_or(0, |b| b.entries.len());
            if count > 0 {
                info!("Saved {} {} proxies to {}", count, protocol, self.path_for(protocol).display());
            }
        }
        Ok(written)
    }

    /// Working proxies recorded for a protocol during this run
    pub fn snapshot(&self, protocol: ProxyType) -> Vec<String> {
        self.lock()
            .get(&protocol)
            .map(|b| b.entries.clone())
            .unwrap_or_default()
    }

    pub fn len(&self, protocol: ProxyType) -> usize {
        self.lock().get(&protocol).map_or(0, |b| b.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.lock().values().all(|b| b.entries.is_empty())
    }

    #[cfg(test)]
    pub(crate) fn hold_lock_while(&self, f: impl FnOnce()) {
        let _buckets = self.lock();
        f();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ProxyType, Bucket>> {
        // A panic while holding the lock leaves the cursor consistent: it only
        // advances after a successful write.
        self.buckets.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn flush_bucket(&self, protocol: ProxyType, bucket: &mut Bucket) -> Result<usize, StorageError> {
        let pending = &bucket.entries[bucket.flushed..];
        if pending.is_empty() {
            return Ok(0);
        }

        let path = self.path_for(protocol);
        let mut content = pending.join("\n");
        content.push('\n');

        let write_err = |source: std::io::Error| StorageError::Write {
            path: path.clone(),
            source,
        };
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(write_err)?;
        file.write_all(content.as_bytes()).map_err(write_err)?;
        file.sync_data().map_err(write_err)?;

        let written = pending.len();
        bucket.flushed = bucket.entries.len();
        debug!(protocol = %protocol, written, path = %path.display(), "flushed working proxies");
        Ok(written)
    }
}
