//! Concurrent fan-out of validations over a candidate set

use crate::error::StorageError;
use crate::progress::ProgressSink;
use crate::proxy::checker::{CheckerConfig, HttpProbe, Probe, ProxyValidator};
use crate::proxy::models::{Candidate, RunSummary};
use crate::proxy::store::ResultStore;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::info;

/// Runs the validator over many candidates with a bounded number in flight
pub struct Dispatcher<P> {
    validator: ProxyValidator<P>,
    concurrency: usize,
}

impl Dispatcher<HttpProbe> {
    /// Dispatcher probing real proxies over HTTP
    pub fn with_config(config: &CheckerConfig, store: Arc<ResultStore>) -> Self {
        let validator = ProxyValidator::new(HttpProbe::new(config), config, store);
        Self::new(validator, config.concurrency)
    }
}

impl<P: Probe> Dispatcher<P> {
    pub fn new(validator: ProxyValidator<P>, concurrency: usize) -> Self {
        Self {
            validator,
            concurrency,
        }
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        self.validator.store()
    }

    /// Validate every candidate and wait for all of them.
    ///
    /// At most `concurrency` validations run at once (0 is treated as 1); the
    /// rest wait their turn. Per-candidate failures only show up in the
    /// summary. After the last completion the store is flushed once more.
    pub async fn run(
        &self,
        candidates: Vec<Candidate>,
        progress: &dyn ProgressSink,
    ) -> Result<RunSummary, StorageError> {
        let total = candidates.len();
        let limit = self.concurrency.max(1);
        let mut summary = RunSummary::start(total);

        info!("Checking {} proxies with {} workers", total, limit);

        let mut outcomes = stream::iter(candidates)
            .map(|candidate| async move { self.validator.validate(&candidate).await })
            .buffer_unordered(limit);

        let mut completed = 0;
        while let Some(outcome) = outcomes.next().await {
            let outcome = outcome?;
            completed += 1;
            summary.tally(&outcome);
            progress.update(completed, total, &outcome);
        }

        self.store().flush_all_async().await?;
        summary.finish();
        progress.finish(&summary);

        Ok(summary)
    }
}
