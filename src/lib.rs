//! # Batch Engine
//!
//! Bounded-concurrency batch execution for fan-out workloads: apply one
//! async operation to every item of a collection, with at most N calls in
//! flight, and get back every per-item outcome.
//!
//! ## Quick Start
//!
//! ```rust
//! use batch_engine::batch::{execute_batch, BatchConfig};
//! use batch_engine::EngineError;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() {
//! let parent = CancellationToken::new();
//! let entities = vec!["light.kitchen".to_string(), "sensor.temperature".to_string()];
//!
//! let results = execute_batch(
//!     &parent,
//!     entities,
//!     Some(|entity: &String| entity.clone()),
//!     |_token, _index, entity: String| async move {
//!         Ok::<_, EngineError>(entity.len())
//!     },
//!     BatchConfig::default().with_max_concurrency(4),
//! )
//! .await;
//!
//! assert!(!results.has_errors());
//! # }
//! ```
//!
//! ## Key Features
//!
//! - **Bounded fan-out**: a counting semaphore caps simultaneous processor calls
//! - **Failure policies**: continue-and-collect or stop dispatching on first error
//! - **Cooperative cancellation**: processors receive a [`CancellationToken`](tokio_util::sync::CancellationToken)
//!   derived from the caller's token
//! - **Aggregated errors**: per-item failures render as one readable report
//!
//! ## Modules
//!
//! - [`batch`]: Configuration, result containers and the executor
//! - [`utils`]: Logging bootstrap

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

use thiserror::Error;

/// Result type for batch engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Main error type for batch engine operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// The operation observed its cancellation token
    #[error("operation cancelled")]
    Cancelled,

    /// Invalid configuration value
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic per-item processing failure
    #[error("{0}")]
    Processing(String),
}

impl EngineError {
    /// Create a processing error from any message
    pub fn processing(message: impl Into<String>) -> Self {
        Self::Processing(message.into())
    }

    /// Whether this error is the cancellation error
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Batch execution engine
pub mod batch;

/// Utility functions and helpers
pub mod utils;
