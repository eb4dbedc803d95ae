//! Worker crate
//!
//! Executes in-memory sources as parallel bundles inside the current process.

pub mod error;
pub mod executor;

pub use error::{Result, WorkerError};
pub use executor::{BundleExecutor, BundleSummary, ExecutionReport};
