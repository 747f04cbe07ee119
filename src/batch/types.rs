//! Configuration, per-item result and summary types

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{EngineError, Result};

/// Environment variable overriding [`BatchConfig::max_concurrency`]
pub const ENV_MAX_CONCURRENCY: &str = "BATCH_MAX_CONCURRENCY";

/// Environment variable overriding [`BatchConfig::continue_on_error`]
pub const ENV_CONTINUE_ON_ERROR: &str = "BATCH_CONTINUE_ON_ERROR";

/// Batch execution configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Maximum simultaneous processor calls. `0` means one slot per item.
    pub max_concurrency: usize,
    /// Keep dispatching after a failure instead of stopping at the first one
    pub continue_on_error: bool,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 0,
            continue_on_error: true,
        }
    }
}

impl BatchConfig {
    /// Set the concurrency ceiling
    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Set the failure policy
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Stop dispatching new items after the first failure
    pub fn stop_on_error(self) -> Self {
        self.with_continue_on_error(false)
    }

    /// Number of semaphore slots for a batch of `item_count` items.
    ///
    /// Zero, or any ceiling above the item count, collapses to the item count.
    pub fn effective_concurrency(&self, item_count: usize) -> usize {
        if self.max_concurrency == 0 || self.max_concurrency > item_count {
            item_count
        } else {
            self.max_concurrency
        }
    }

    /// Load configuration from the process environment.
    ///
    /// Unset variables keep their default values.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_MAX_CONCURRENCY) {
            config.max_concurrency = raw.trim().parse().map_err(|_| {
                EngineError::Config(format!(
                    "{} must be a non-negative integer, got {:?}",
                    ENV_MAX_CONCURRENCY, raw
                ))
            })?;
        }

        if let Some(raw) = lookup(ENV_CONTINUE_ON_ERROR) {
            config.continue_on_error = parse_bool(&raw).ok_or_else(|| {
                EngineError::Config(format!(
                    "{} must be a boolean, got {:?}",
                    ENV_CONTINUE_ON_ERROR, raw
                ))
            })?;
        }

        Ok(config)
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Outcome of one dispatched item
#[derive(Debug)]
pub struct BatchResult<O, E> {
    /// Position of the item in the input collection
    pub index: usize,
    /// Diagnostic label, empty when no label function was supplied
    pub item_label: String,
    /// Processor output (if successful)
    pub output: Option<O>,
    /// Processor error (if failed)
    pub error: Option<Arc<E>>,
    /// Wall time spent in the processor
    pub duration: Duration,
}

impl<O, E> BatchResult<O, E> {
    pub(crate) fn new(
        index: usize,
        item_label: String,
        outcome: std::result::Result<O, E>,
        duration: Duration,
    ) -> Self {
        let (output, error) = match outcome {
            Ok(output) => (Some(output), None),
            Err(err) => (None, Some(Arc::new(err))),
        };

        Self {
            index,
            item_label,
            output,
            error,
            duration,
        }
    }

    /// Whether the processor returned an output
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }

    /// Whether the processor returned an error
    pub fn is_failure(&self) -> bool {
        self.error.is_some()
    }

    /// Borrow the outcome as a `Result`
    pub fn outcome(&self) -> std::result::Result<Option<&O>, &E> {
        match &self.error {
            Some(err) => Err(err.as_ref()),
            None => Ok(self.output.as_ref()),
        }
    }
}

/// Batch execution statistics
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Size of the input collection
    pub total_items: usize,
    /// Items for which a worker was dispatched
    pub dispatched: usize,
    /// Dispatched items whose processor succeeded
    pub succeeded: usize,
    /// Dispatched items whose processor failed
    pub failed: usize,
    /// Items never dispatched because the batch stopped early
    pub skipped: usize,
    /// Wall time of the whole batch
    pub elapsed: Duration,
}

impl BatchSummary {
    /// Percentage of input items that succeeded
    pub fn success_rate(&self) -> f64 {
        if self.total_items == 0 {
            return 0.0;
        }
        (self.succeeded as f64 / self.total_items as f64) * 100.0
    }

    /// Whether every input item was dispatched and succeeded
    pub fn is_complete_success(&self) -> bool {
        self.failed == 0 && self.skipped == 0
    }
}

/// Callback for progress updates: `(completed, total)`
pub type ProgressCallback = Arc<dyn Fn(usize, usize) + Send + Sync>;
