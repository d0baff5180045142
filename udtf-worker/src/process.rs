//! Worker pool backed by child processes.
//!
//! Each worker is the configured executable started as `<exe> -m <role>`
//! with the key's environment. Requests go to the child's stdin and
//! responses come back on its stdout; stderr is inherited.

use crate::config::PoolConfig;
use crate::error::AcquireError;
use crate::pool::{WorkerKey, WorkerPool, WorkerSession};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, warn};
use uuid::Uuid;

/// Builds the command used to start a worker for a key.
pub type Launcher = Box<dyn Fn(&WorkerKey) -> Command + Send + Sync>;

/// `<exe> -m <role>` with the key's environment.
pub fn default_command(key: &WorkerKey) -> Command {
    let mut cmd = Command::new(&key.executable);
    cmd.arg("-m").arg(&key.role).envs(&key.env);
    cmd
}

/// The child's stdout and stdin joined into one stream.
struct ChildStream {
    stdin: ChildStdin,
    stdout: ChildStdout,
}

impl Read for ChildStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stdout.read(buf)
    }
}

impl Write for ChildStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdin.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdin.flush()
    }
}

/// Counters for pool activity.
#[derive(Debug, Default)]
pub struct PoolStats {
    spawned: AtomicU64,
    reused: AtomicU64,
    released: AtomicU64,
    destroyed: AtomicU64,
}

impl PoolStats {
    pub fn spawned(&self) -> u64 {
        self.spawned.load(Ordering::Relaxed)
    }

    pub fn reused(&self) -> u64 {
        self.reused.load(Ordering::Relaxed)
    }

    pub fn released(&self) -> u64 {
        self.released.load(Ordering::Relaxed)
    }

    pub fn destroyed(&self) -> u64 {
        self.destroyed.load(Ordering::Relaxed)
    }
}

/// A [`WorkerPool`] that starts workers as child processes.
pub struct ProcessWorkerPool {
    config: PoolConfig,
    launcher: Launcher,
    idle: Mutex<HashMap<WorkerKey, Vec<WorkerSession>>>,
    children: Mutex<HashMap<Uuid, Child>>,
    stats: PoolStats,
    closed: AtomicBool,
}

impl ProcessWorkerPool {
    pub fn new(config: PoolConfig) -> Self {
        Self::with_launcher(config, Box::new(default_command))
    }

    /// Uses `launcher` instead of [`default_command`] to start workers.
    pub fn with_launcher(config: PoolConfig, launcher: Launcher) -> Self {
        Self {
            config,
            launcher,
            idle: Mutex::new(HashMap::new()),
            children: Mutex::new(HashMap::new()),
            stats: PoolStats::default(),
            closed: AtomicBool::new(false),
        }
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    /// Number of idle workers across all keys.
    pub fn idle_count(&self) -> usize {
        self.idle.lock().values().map(Vec::len).sum()
    }

    /// Number of worker processes the pool still owns.
    pub fn live_count(&self) -> usize {
        self.children.lock().len()
    }

    /// Kills every worker and refuses further acquires.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::SeqCst);
        let idle: Vec<WorkerSession> = self.idle.lock().drain().flat_map(|(_, s)| s).collect();
        drop(idle);
        let children: Vec<(Uuid, Child)> = self.children.lock().drain().collect();
        for (id, child) in children {
            reap(id, child);
        }
    }

    fn spawn(&self, key: &WorkerKey) -> Result<WorkerSession, AcquireError> {
        let mut child = (self.launcher)(key)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|source| AcquireError::Spawn {
                executable: key.executable.display().to_string(),
                source,
            })?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, stdout),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(AcquireError::StreamUnavailable);
            }
        };

        let session = WorkerSession::new(ChildStream { stdin, stdout });
        debug!(worker = %session.id(), pid = child.id(), role = %key.role, "spawned worker");
        self.children.lock().insert(session.id(), child);
        self.stats.spawned.fetch_add(1, Ordering::Relaxed);
        Ok(session)
    }

    /// Returns whether the worker behind `id` is still running.
    fn is_alive(&self, id: Uuid) -> bool {
        let mut children = self.children.lock();
        match children.get_mut(&id).map(Child::try_wait) {
            Some(Ok(None)) => true,
            Some(Ok(Some(status))) => {
                debug!(worker = %id, %status, "idle worker exited");
                children.remove(&id);
                false
            }
            Some(Err(e)) => {
                warn!(worker = %id, error = %e, "failed to poll idle worker");
                let child = children.remove(&id);
                drop(children);
                if let Some(child) = child {
                    reap(id, child);
                }
                false
            }
            None => false,
        }
    }
}

impl WorkerPool for ProcessWorkerPool {
    fn acquire(&self, key: &WorkerKey) -> Result<WorkerSession, AcquireError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(AcquireError::PoolClosed);
        }

        loop {
            let candidate = self.idle.lock().get_mut(key).and_then(Vec::pop);
            match candidate {
                Some(session) if self.is_alive(session.id()) => {
                    self.stats.reused.fetch_add(1, Ordering::Relaxed);
                    debug!(worker = %session.id(), "reusing idle worker");
                    return Ok(session);
                }
                Some(session) => {
                    self.stats.destroyed.fetch_add(1, Ordering::Relaxed);
                    drop(session);
                }
                None => return self.spawn(key),
            }
        }
    }

    fn release(&self, key: &WorkerKey, session: WorkerSession) {
        if self.closed.load(Ordering::SeqCst) {
            self.destroy(key, session);
            return;
        }

        let mut idle = self.idle.lock();
        let slot = idle.entry(key.clone()).or_default();
        if slot.len() >= self.config.max_idle_per_key {
            drop(idle);
            debug!(worker = %session.id(), "idle limit reached, dropping worker");
            self.destroy(key, session);
            return;
        }
        slot.push(session);
        self.stats.released.fetch_add(1, Ordering::Relaxed);
    }

    fn destroy(&self, _key: &WorkerKey, session: WorkerSession) {
        let id = session.id();
        // Pipes close before the kill.
        drop(session);
        let child = self.children.lock().remove(&id);
        if let Some(child) = child {
            reap(id, child);
        }
        self.stats.destroyed.fetch_add(1, Ordering::Relaxed);
    }
}

impl Drop for ProcessWorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn reap(id: Uuid, mut child: Child) {
    if let Err(e) = child.kill() {
        if e.kind() != io::ErrorKind::InvalidInput {
            warn!(worker = %id, error = %e, "failed to kill worker");
        }
    }
    if let Err(e) = child.wait() {
        warn!(worker = %id, error = %e, "failed to reap worker");
    }
}
