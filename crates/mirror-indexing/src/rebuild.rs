//! Batch re-indexing of an entity type from the primary store.
//!
//! Walks the entity's keys in ascending order, one bounded page at a time,
//! and runs an upsert for each. Per-record failures are tallied and do not
//! stop the batch. Re-running converges to the same index state.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::IndexingError;
use crate::store::{Condition, FindOptions, KeyOrder};
use crate::synchronizer::IndexSynchronizer;

/// Random pause between records so a rebuild does not saturate the backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Maximum pause in milliseconds (0 = no pause).
    pub max_delay_ms: u64,
}

impl ThrottleConfig {
    pub fn new(max_delay_ms: u64) -> Self {
        Self { max_delay_ms }
    }

    pub fn none() -> Self {
        Self { max_delay_ms: 0 }
    }

    /// A uniformly random duration in `[0, max_delay_ms)`.
    pub fn generate_delay(&self) -> Duration {
        if self.max_delay_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..self.max_delay_ms))
    }

    pub fn is_enabled(&self) -> bool {
        self.max_delay_ms > 0
    }
}

/// Configuration for re-index runs.
#[derive(Debug, Clone)]
pub struct RebuildConfig {
    /// Keys read from the primary store per page.
    pub page_size: usize,
    pub throttle: ThrottleConfig,
    /// Whether to continue on individual record errors.
    pub continue_on_error: bool,
}

impl Default for RebuildConfig {
    fn default() -> Self {
        Self {
            page_size: 500,
            throttle: ThrottleConfig::none(),
            continue_on_error: true,
        }
    }
}

impl RebuildConfig {
    pub fn with_page_size(mut self, size: usize) -> Self {
        self.page_size = size;
        self
    }

    pub fn with_throttle(mut self, throttle: ThrottleConfig) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }
}

/// Progress of a re-index run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RebuildProgress {
    pub indexed: u64,
    pub failed: u64,
    /// Pages read from the primary store.
    pub pages: u64,
    pub completed: bool,
}

impl RebuildProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_indexed(&mut self) {
        self.indexed += 1;
    }

    pub fn record_failure(&mut self) {
        self.failed += 1;
    }

    /// Reclassify records counted as indexed whose queued write later failed.
    pub fn reclassify_failed(&mut self, count: u64) {
        let moved = count.min(self.indexed);
        self.indexed -= moved;
        self.failed += moved;
    }

    /// Records visited so far.
    pub fn visited(&self) -> u64 {
        self.indexed + self.failed
    }

    pub fn mark_completed(&mut self) {
        self.completed = true;
    }
}

/// Result of a re-index run.
#[derive(Debug, Clone)]
pub struct RebuildResult {
    pub progress: RebuildProgress,
    /// Time taken in milliseconds.
    pub elapsed_ms: u64,
}

impl RebuildResult {
    pub fn summary(&self) -> String {
        format!(
            "re-indexed {} records ({} failed)",
            self.progress.indexed, self.progress.failed
        )
    }
}

/// Trait for receiving re-index progress updates.
pub trait ProgressCallback: Send {
    /// Called after each page and once on completion.
    fn on_progress(&self, progress: &RebuildProgress);
}

/// A no-op progress callback for when progress reporting isn't needed.
pub struct NoOpProgressCallback;

impl ProgressCallback for NoOpProgressCallback {
    fn on_progress(&self, _progress: &RebuildProgress) {}
}

/// Logs progress at info level.
pub struct LoggingProgressCallback {
    entity_type: String,
}

impl LoggingProgressCallback {
    pub fn new(entity_type: impl Into<String>) -> Self {
        Self {
            entity_type: entity_type.into(),
        }
    }
}

impl ProgressCallback for LoggingProgressCallback {
    fn on_progress(&self, progress: &RebuildProgress) {
        info!(
            entity_type = %self.entity_type,
            pages = progress.pages,
            indexed = progress.indexed,
            failed = progress.failed,
            completed = progress.completed,
            "Re-index progress"
        );
    }
}

/// Drives the synchronizer over every record of an entity type.
pub struct BatchReindexer<'a> {
    synchronizer: &'a IndexSynchronizer,
    config: RebuildConfig,
}

impl<'a> BatchReindexer<'a> {
    pub fn new(synchronizer: &'a IndexSynchronizer, config: RebuildConfig) -> Self {
        Self {
            synchronizer,
            config,
        }
    }

    /// Re-index every record matching `filter`.
    ///
    /// Stops after the first page shorter than `page_size`. With deferred
    /// writes each page's upserts are batched and applied at the end of the
    /// page; the synchronizer's shared queue is left alone.
    pub fn reindex_all<P: ProgressCallback>(
        &self,
        entity_type: &str,
        filter: Vec<Condition>,
        progress_callback: &P,
    ) -> Result<RebuildResult, IndexingError> {
        let page_size = self.config.page_size;
        if page_size == 0 {
            return Err(IndexingError::Config(
                "re-index page size must be positive".to_string(),
            ));
        }

        let deferred = self
            .synchronizer
            .registry()
            .get(entity_type)?
            .settings
            .deferred_writes;
        let store = self.synchronizer.store();
        let started = Instant::now();
        let mut progress = RebuildProgress::new();

        info!(entity_type, page_size, "Starting re-index");

        for page in 1.. {
            let options = FindOptions::new()
                .with_conditions(filter.iter().cloned())
                .with_limit(page_size)
                .with_page(page)
                .ordered(KeyOrder::Ascending);
            let keys = store.list_keys(entity_type, &options)?;
            progress.pages += 1;
            debug!(entity_type, page, count = keys.len(), "Read key page");

            let mut staged = Vec::new();
            for key in &keys {
                let result = if deferred {
                    self.synchronizer
                        .stage_upsert(entity_type, key)
                        .map(|task| staged.extend(task))
                } else {
                    self.synchronizer
                        .sync_upsert(entity_type, Some(key), None)
                        .map(|_| ())
                };
                match result {
                    Ok(()) => progress.record_indexed(),
                    Err(e) if self.config.continue_on_error => {
                        warn!(entity_type, key = %key, error = %e, "Failed to re-index record");
                        progress.record_failure();
                    }
                    Err(e) => return Err(e),
                }

                let delay = self.config.throttle.generate_delay();
                if !delay.is_zero() {
                    std::thread::sleep(delay);
                }
            }

            if deferred {
                let report = self.synchronizer.apply_tasks(staged);
                progress.reclassify_failed(report.failed as u64);
            }
            progress_callback.on_progress(&progress);

            if keys.len() < page_size {
                break;
            }
        }

        progress.mark_completed();
        progress_callback.on_progress(&progress);

        let result = RebuildResult {
            progress,
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        info!(
            entity_type,
            pages = result.progress.pages,
            indexed = result.progress.indexed,
            failed = result.progress.failed,
            elapsed_ms = result.elapsed_ms,
            "Re-index complete"
        );
        Ok(result)
    }
}
