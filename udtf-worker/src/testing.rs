//! In-memory pool and stream for driver tests.

use crate::error::AcquireError;
use crate::pool::{WorkerKey, WorkerPool, WorkerSession};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::io::{self, Read, Write};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PoolEvent {
    Acquired(Uuid),
    Released(Uuid),
    Destroyed(Uuid),
}

/// Reads scripted worker output and records everything written.
pub struct ScriptedStream {
    input: Arc<Mutex<VecDeque<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    write_limit: Option<usize>,
}

impl Read for ScriptedStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut input = self.input.lock();
        let n = buf.len().min(input.len());
        for (slot, byte) in buf.iter_mut().zip(input.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for ScriptedStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut written = self.written.lock();
        if let Some(limit) = self.write_limit {
            if written.len() >= limit {
                return Err(io::Error::new(io::ErrorKind::BrokenPipe, "worker closed stdin"));
            }
            let n = buf.len().min(limit - written.len());
            written.extend_from_slice(&buf[..n]);
            return Ok(n);
        }
        written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// A pool whose workers replay queued bytes.
///
/// Released sessions are reused by the next acquire, so broadcast state
/// carries over like it does with real idle workers.
pub struct ScriptedPool {
    input: Arc<Mutex<VecDeque<u8>>>,
    written: Arc<Mutex<Vec<u8>>>,
    idle: Mutex<Vec<WorkerSession>>,
    events: Mutex<Vec<PoolEvent>>,
    keys: Mutex<Vec<WorkerKey>>,
    fail_acquire: bool,
    write_limit: Option<usize>,
}

impl ScriptedPool {
    pub fn new() -> Self {
        Self {
            input: Arc::new(Mutex::new(VecDeque::new())),
            written: Arc::new(Mutex::new(Vec::new())),
            idle: Mutex::new(Vec::new()),
            events: Mutex::new(Vec::new()),
            keys: Mutex::new(Vec::new()),
            fail_acquire: false,
            write_limit: None,
        }
    }

    pub fn failing_acquire(mut self) -> Self {
        self.fail_acquire = true;
        self
    }

    /// Workers accept at most `limit` request bytes, then report a broken pipe.
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = Some(limit);
        self
    }

    /// Queues bytes for workers to answer with.
    pub fn push_response(&self, bytes: &[u8]) {
        self.input.lock().extend(bytes.iter().copied());
    }

    pub fn written(&self) -> Vec<u8> {
        self.written.lock().clone()
    }

    pub fn events(&self) -> Vec<PoolEvent> {
        self.events.lock().clone()
    }

    pub fn keys(&self) -> Vec<WorkerKey> {
        self.keys.lock().clone()
    }

    pub fn acquired(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Acquired(_)))
    }

    pub fn released(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Released(_)))
    }

    pub fn destroyed(&self) -> usize {
        self.count(|e| matches!(e, PoolEvent::Destroyed(_)))
    }

    fn count(&self, f: impl Fn(&PoolEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| f(e)).count()
    }
}

impl WorkerPool for ScriptedPool {
    fn acquire(&self, key: &WorkerKey) -> Result<WorkerSession, AcquireError> {
        if self.fail_acquire {
            return Err(AcquireError::Unavailable("scripted failure".to_string()));
        }
        self.keys.lock().push(key.clone());
        let session = self.idle.lock().pop().unwrap_or_else(|| {
            WorkerSession::new(ScriptedStream {
                input: self.input.clone(),
                written: self.written.clone(),
                write_limit: self.write_limit,
            })
        });
        self.events.lock().push(PoolEvent::Acquired(session.id()));
        Ok(session)
    }

    fn release(&self, _key: &WorkerKey, session: WorkerSession) {
        self.events.lock().push(PoolEvent::Released(session.id()));
        self.idle.lock().push(session);
    }

    fn destroy(&self, _key: &WorkerKey, session: WorkerSession) {
        self.events.lock().push(PoolEvent::Destroyed(session.id()));
    }
}
