//! Function handles.

use crate::accumulator::SharedCounter;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Job artifact id sent when the function does not name one.
pub const DEFAULT_JOB_ARTIFACT_ID: &str = "default";

/// A broadcast value the function depends on.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BroadcastRef {
    pub id: i64,
    /// Where the worker can load the value from.
    pub path: String,
}

impl BroadcastRef {
    pub fn new(id: i64, path: impl Into<String>) -> Self {
        Self {
            id,
            path: path.into(),
        }
    }
}

/// Everything needed to host and call a table function in a worker.
///
/// Read-only to the analyzer.
#[derive(Debug, Clone)]
pub struct FunctionHandle {
    command: Bytes,
    executable: PathBuf,
    version: String,
    job_artifact_id: Option<String>,
    includes: Vec<String>,
    broadcasts: Vec<BroadcastRef>,
    env: BTreeMap<String, String>,
    accumulator: Option<SharedCounter>,
}

impl FunctionHandle {
    pub fn new(
        command: impl Into<Bytes>,
        executable: impl Into<PathBuf>,
        version: impl Into<String>,
    ) -> Self {
        Self {
            command: command.into(),
            executable: executable.into(),
            version: version.into(),
            job_artifact_id: None,
            includes: Vec::new(),
            broadcasts: Vec::new(),
            env: BTreeMap::new(),
            accumulator: None,
        }
    }

    pub fn with_job_artifact_id(mut self, id: impl Into<String>) -> Self {
        self.job_artifact_id = Some(id.into());
        self
    }

    pub fn with_include(mut self, path: impl Into<String>) -> Self {
        self.includes.push(path.into());
        self
    }

    pub fn with_broadcast(mut self, broadcast: BroadcastRef) -> Self {
        self.broadcasts.push(broadcast);
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_accumulator(mut self, counter: SharedCounter) -> Self {
        self.accumulator = Some(counter);
        self
    }

    pub fn command(&self) -> &Bytes {
        &self.command
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// The job artifact id, or [`DEFAULT_JOB_ARTIFACT_ID`].
    pub fn job_artifact_id(&self) -> &str {
        self.job_artifact_id
            .as_deref()
            .unwrap_or(DEFAULT_JOB_ARTIFACT_ID)
    }

    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    pub fn broadcasts(&self) -> &[BroadcastRef] {
        &self.broadcasts
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    pub fn accumulator(&self) -> Option<&SharedCounter> {
        self.accumulator.as_ref()
    }
}
