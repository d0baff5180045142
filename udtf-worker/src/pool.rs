//! Worker pooling interface and scoped session leases.

use crate::error::AcquireError;
use crate::function::BroadcastRef;
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::warn;
use udtf_protocol::BroadcastEntry;
use uuid::Uuid;

/// A bidirectional byte stream to one worker.
pub trait WorkerStream: Read + Write + Send {}

impl<T: Read + Write + Send> WorkerStream for T {}

/// Identifies interchangeable workers.
///
/// Two sessions with equal keys run the same executable in the same role
/// with the same environment.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerKey {
    pub executable: PathBuf,
    pub role: String,
    pub env: BTreeMap<String, String>,
}

impl WorkerKey {
    pub fn new(
        executable: impl Into<PathBuf>,
        role: impl Into<String>,
        env: BTreeMap<String, String>,
    ) -> Self {
        Self {
            executable: executable.into(),
            role: role.into(),
            env,
        }
    }
}

/// One worker's stream plus what the worker already holds.
pub struct WorkerSession {
    id: Uuid,
    stream: Box<dyn WorkerStream>,
    broadcasts: HashSet<i64>,
    calls: u64,
}

impl WorkerSession {
    pub fn new(stream: impl WorkerStream + 'static) -> Self {
        Self {
            id: Uuid::new_v4(),
            stream: Box::new(stream),
            broadcasts: HashSet::new(),
            calls: 0,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn stream(&mut self) -> &mut dyn WorkerStream {
        self.stream.as_mut()
    }

    /// Broadcast ids this worker has already loaded.
    pub fn known_broadcasts(&self) -> &HashSet<i64> {
        &self.broadcasts
    }

    /// Computes the broadcast changes needed to bring the worker to
    /// `wanted` and records the worker as holding exactly `wanted`.
    ///
    /// New ids come first in `wanted` order, then removals by ascending id.
    pub fn sync_broadcasts(&mut self, wanted: &[BroadcastRef]) -> Vec<BroadcastEntry> {
        let mut entries = Vec::new();
        let mut target = HashSet::with_capacity(wanted.len());

        for b in wanted {
            if target.insert(b.id) && !self.broadcasts.contains(&b.id) {
                entries.push(BroadcastEntry::Add {
                    id: b.id,
                    path: b.path.clone(),
                });
            }
        }

        let mut stale: Vec<i64> = self.broadcasts.difference(&target).copied().collect();
        stale.sort_unstable();
        entries.extend(stale.into_iter().map(|id| BroadcastEntry::Remove { id }));

        self.broadcasts = target;
        entries
    }

    /// Number of completed calls on this worker.
    pub fn calls(&self) -> u64 {
        self.calls
    }

    pub(crate) fn mark_used(&mut self) {
        self.calls += 1;
    }
}

impl fmt::Debug for WorkerSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerSession")
            .field("id", &self.id)
            .field("broadcasts", &self.broadcasts)
            .field("calls", &self.calls)
            .finish_non_exhaustive()
    }
}

/// Hands out worker sessions.
///
/// Every acquired session must come back through exactly one of
/// [`release`](WorkerPool::release) or [`destroy`](WorkerPool::destroy).
pub trait WorkerPool: Send + Sync {
    /// Returns an idle worker for `key`, or starts a new one.
    fn acquire(&self, key: &WorkerKey) -> Result<WorkerSession, AcquireError>;

    /// Returns a healthy worker for reuse.
    fn release(&self, key: &WorkerKey, session: WorkerSession);

    /// Tears a worker down.
    fn destroy(&self, key: &WorkerKey, session: WorkerSession);
}

/// Lifecycle of a leased session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Leased,
    InUse,
    ReleasedForReuse,
    Destroyed,
}

/// A session borrowed from a pool.
///
/// Consumed by [`release`](SessionLease::release) or
/// [`destroy`](SessionLease::destroy). Dropping an undisposed lease destroys
/// the session.
pub struct SessionLease<'a, P: WorkerPool + ?Sized> {
    pool: &'a P,
    key: &'a WorkerKey,
    session: Option<WorkerSession>,
    state: SessionState,
}

impl<'a, P: WorkerPool + ?Sized> SessionLease<'a, P> {
    pub fn acquire(pool: &'a P, key: &'a WorkerKey) -> Result<Self, AcquireError> {
        let session = pool.acquire(key)?;
        Ok(Self {
            pool,
            key,
            session: Some(session),
            state: SessionState::Leased,
        })
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn session(&self) -> &WorkerSession {
        self.session.as_ref().expect("lease holds a session until disposed")
    }

    /// Marks the session in use and returns it.
    pub fn session_mut(&mut self) -> &mut WorkerSession {
        self.state = SessionState::InUse;
        self.session.as_mut().expect("lease holds a session until disposed")
    }

    /// Hands the session back for reuse.
    pub fn release(mut self) -> SessionState {
        if let Some(session) = self.session.take() {
            self.pool.release(self.key, session);
            self.state = SessionState::ReleasedForReuse;
        }
        self.state
    }

    /// Tears the session down.
    pub fn destroy(mut self) -> SessionState {
        self.destroy_inner();
        self.state
    }

    fn destroy_inner(&mut self) {
        if let Some(session) = self.session.take() {
            self.pool.destroy(self.key, session);
            self.state = SessionState::Destroyed;
        }
    }
}

impl<P: WorkerPool + ?Sized> Drop for SessionLease<'_, P> {
    fn drop(&mut self) {
        if let Some(session) = &self.session {
            warn!(worker = %session.id(), "worker lease dropped without disposition, destroying");
        }
        self.destroy_inner();
    }
}
