//! Analyzer error types.

use std::io;
use std::path::PathBuf;
use thiserror::Error;
use udtf_protocol::{ProtocolError, SerializationError};

/// Configuration loading or validation failure.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{}': {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse config file '{}': {message}", path.display())]
    Parse { path: PathBuf, message: String },

    #[error("configuration validation failed: {0}")]
    Validation(String),
}

/// The pool could not hand out a worker.
#[derive(Debug, Error)]
pub enum AcquireError {
    #[error("failed to spawn worker '{executable}': {source}")]
    Spawn {
        executable: String,
        #[source]
        source: io::Error,
    },

    #[error("worker stdio was not captured")]
    StreamUnavailable,

    #[error("worker pool is shut down")]
    PoolClosed,

    #[error("no worker available: {0}")]
    Unavailable(String),
}

/// Errors from a single analysis call.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("failed to acquire worker: {0}")]
    Acquire(#[from] AcquireError),

    #[error("serialization error: {0}")]
    Serialization(SerializationError),

    #[error("protocol error: {0}")]
    Protocol(ProtocolError),

    #[error("worker exited unexpectedly (crashed)")]
    WorkerCrashed(#[source] io::Error),

    #[error("I/O error: {0}")]
    Io(io::Error),

    /// The worker's analysis itself raised. Surfaced to the user as a
    /// query compilation error.
    #[error("failed to analyze table function: {message}")]
    AnalysisFailed { message: String },

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),
}

impl AnalyzeError {
    /// Returns whether the caller could reasonably retry the call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AnalyzeError::WorkerCrashed(_) | AnalyzeError::Io(_))
    }

    /// Returns whether this error belongs to the user's query rather than
    /// the infrastructure.
    pub fn is_compilation_error(&self) -> bool {
        matches!(
            self,
            AnalyzeError::AnalysisFailed { .. } | AnalyzeError::InvalidArguments(_)
        )
    }
}

fn is_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::UnexpectedEof
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

impl From<io::Error> for AnalyzeError {
    fn from(err: io::Error) -> Self {
        if is_disconnect(&err) {
            AnalyzeError::WorkerCrashed(err)
        } else {
            AnalyzeError::Io(err)
        }
    }
}

impl From<ProtocolError> for AnalyzeError {
    fn from(err: ProtocolError) -> Self {
        match err {
            ProtocolError::Io(e) => e.into(),
            other => AnalyzeError::Protocol(other),
        }
    }
}

impl From<SerializationError> for AnalyzeError {
    fn from(err: SerializationError) -> Self {
        match err {
            SerializationError::ArityMismatch { .. } => {
                AnalyzeError::InvalidArguments(err.to_string())
            }
            other => AnalyzeError::Serialization(other),
        }
    }
}
