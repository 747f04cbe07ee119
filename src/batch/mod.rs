//! Bounded-concurrency batch execution
//!
//! [`BatchExecutor`] drives the fan-out, [`BatchResults`] collects per-item
//! outcomes and [`BatchErrors`] renders the failures.

pub mod executor;
pub mod results;
pub mod types;

pub use executor::*;
pub use results::*;
pub use types::*;
