//! Analysis driver.
//!
//! One call is one strictly sequential exchange with one worker:
//!
//! ```text
//! acquire -> handshake -> command -> arguments -> flush
//!         -> response -> accumulator updates -> control -> release | destroy
//! ```
//!
//! Arguments are serialized before a worker is acquired and the whole
//! request is encoded before the first byte is written. The session is held
//! by a [`SessionLease`], so every exit path that does not release it
//! destroys it.

use crate::accumulator::{merge_updates, SideChannelCounter};
use crate::config::WorkerConfig;
use crate::error::AnalyzeError;
use crate::function::FunctionHandle;
use crate::pool::{SessionLease, WorkerKey, WorkerPool, WorkerSession};
use std::io::{BufReader, Write};
use std::sync::Arc;
use tracing::{debug, warn};
use udtf_protocol::{
    decode_response, encode_arguments, read_accumulator_updates, AnalysisResult, AnalyzeRequest,
    ArgumentExpression, EncodedArgument, StructType, WireReader, WorkerSignal,
};

/// Runs plan-time analysis of table functions on pooled workers.
pub struct Analyzer<P: WorkerPool + ?Sized> {
    pool: Arc<P>,
    config: WorkerConfig,
}

impl<P: WorkerPool + ?Sized> Analyzer<P> {
    pub fn new(pool: Arc<P>, config: WorkerConfig) -> Self {
        Self { pool, config }
    }

    pub fn pool(&self) -> &Arc<P> {
        &self.pool
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// The key workers for `func` are pooled under.
    pub fn worker_key(&self, func: &FunctionHandle) -> WorkerKey {
        WorkerKey::new(
            func.executable(),
            self.config.module.clone(),
            self.config.worker_env(func.env(), func.job_artifact_id()),
        )
    }

    /// Returns the output schema of `func` called with `exprs`.
    ///
    /// `table_args[i]` marks `exprs[i]` as a table argument. A failure
    /// raised by the function's own analysis is returned as
    /// [`AnalyzeError::AnalysisFailed`].
    pub fn analyze<E: ArgumentExpression>(
        &self,
        func: &FunctionHandle,
        exprs: &[E],
        table_args: &[bool],
    ) -> Result<StructType, AnalyzeError> {
        match self.analyze_result(func, exprs, table_args)? {
            AnalysisResult::Schema(schema) => Ok(schema),
            AnalysisResult::RemoteFailure { message } => {
                Err(AnalyzeError::AnalysisFailed { message })
            }
        }
    }

    /// Like [`analyze`](Self::analyze) but returns a remote failure as a
    /// value.
    pub fn analyze_result<E: ArgumentExpression>(
        &self,
        func: &FunctionHandle,
        exprs: &[E],
        table_args: &[bool],
    ) -> Result<AnalysisResult, AnalyzeError> {
        let arguments = encode_arguments(exprs, table_args)?;
        self.run(func, arguments)
    }

    /// Runs one exchange with already encoded arguments.
    pub fn run(
        &self,
        func: &FunctionHandle,
        arguments: Vec<EncodedArgument>,
    ) -> Result<AnalysisResult, AnalyzeError> {
        if let Some(b) = func.broadcasts().iter().find(|b| b.id < 0) {
            return Err(AnalyzeError::InvalidArguments(format!(
                "broadcast id must not be negative: {}",
                b.id
            )));
        }

        let key = self.worker_key(func);
        let snapshot = func.accumulator().map(|c| c.lock().copy_and_reset());

        let mut lease = SessionLease::acquire(self.pool.as_ref(), &key)?;
        let worker = lease.session().id();
        debug!(%worker, args = arguments.len(), "acquired worker for analysis");

        match self.exchange(lease.session_mut(), func, arguments, snapshot) {
            Ok((result, signal)) => {
                if signal == WorkerSignal::EndOfStream && self.config.reuse {
                    lease.release();
                    debug!(%worker, "released worker");
                } else {
                    lease.destroy();
                    debug!(%worker, ?signal, reuse = self.config.reuse, "destroyed worker");
                }
                Ok(result)
            }
            Err(err) => {
                warn!(%worker, error = %err, "analysis exchange failed, destroying worker");
                lease.destroy();
                Err(err)
            }
        }
    }

    fn exchange(
        &self,
        session: &mut WorkerSession,
        func: &FunctionHandle,
        arguments: Vec<EncodedArgument>,
        snapshot: Option<SideChannelCounter>,
    ) -> Result<(AnalysisResult, WorkerSignal), AnalyzeError> {
        let request = AnalyzeRequest {
            version: func.version().to_string(),
            job_artifact_id: func.job_artifact_id().to_string(),
            workdir: self.config.workdir.display().to_string(),
            includes: func.includes().to_vec(),
            broadcasts: session.sync_broadcasts(func.broadcasts()),
            command: func.command().clone(),
            arguments,
        };
        let encoded = request.encode()?;

        let stream = session.stream();
        stream.write_all(&encoded)?;
        stream.flush()?;
        debug!(bytes = encoded.len(), "request sent");

        let mut reader = WireReader::with_max_block(
            BufReader::with_capacity(self.config.effective_buffer_size(), stream),
            self.config.max_response_size,
        );

        let length = reader.read_i32()?;
        let result = decode_response(length, &mut reader)?;
        if let AnalysisResult::RemoteFailure { message } = &result {
            debug!(%message, "worker reported analysis failure");
        }

        let updates = read_accumulator_updates(&mut reader)?;
        if let (Some(counter), Some(snapshot)) = (func.accumulator(), snapshot) {
            merge_updates(counter, snapshot, &updates)?;
        }

        let signal = WorkerSignal::from_wire(reader.read_i32()?);
        drop(reader);

        session.mark_used();
        Ok((result, signal))
    }
}
