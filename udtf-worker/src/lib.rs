//! # udtf-worker
//!
//! Plan-time analysis of table functions hosted in pooled worker processes.
//!
//! This crate provides:
//! - The [`WorkerPool`] interface and a scoped [`SessionLease`] that always
//!   releases or destroys the worker it holds
//! - A process-backed pool speaking over child stdin/stdout
//! - The [`Analyzer`] driving one request/response cycle per call
//! - Side-channel counters merged back from workers
//! - Layered configuration (defaults, YAML file, environment)

pub mod accumulator;
pub mod analyzer;
pub mod config;
pub mod error;
pub mod function;
pub mod pool;
pub mod process;

#[cfg(test)]
pub(crate) mod testing;

pub use accumulator::{SharedCounter, SideChannelCounter};
pub use analyzer::Analyzer;
pub use config::{AnalyzerConfig, PoolConfig, WorkerConfig};
pub use error::{AcquireError, AnalyzeError, ConfigError};
pub use function::{BroadcastRef, FunctionHandle};
pub use pool::{SessionLease, SessionState, WorkerKey, WorkerPool, WorkerSession, WorkerStream};
pub use process::{PoolStats, ProcessWorkerPool};
