//! Analysis response decoding.
//!
//! The worker answers with:
//!
//! ```text
//! int32 length >= 0                -> length bytes of schema JSON
//!   or  PYTHON_EXCEPTION_THROWN    -> int32 length + UTF-8 error message
//! int32 accumulator update count   -> that many length-prefixed updates
//! int32 control                    -> END_OF_STREAM when reusable
//! ```
//!
//! Sentinels stop here: callers only ever see [`AnalysisResult`] and
//! [`WorkerSignal`].

use crate::error::ProtocolError;
use crate::types::StructType;
use crate::wire::{self, WireReader, END_OF_STREAM, PYTHON_EXCEPTION_THROWN};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;

/// Outcome of the worker's analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalysisResult {
    Schema(StructType),
    RemoteFailure { message: String },
}

impl AnalysisResult {
    pub fn is_schema(&self) -> bool {
        matches!(self, AnalysisResult::Schema(_))
    }
}

/// The control value a worker sends after the accumulator block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerSignal {
    /// The worker finished cleanly and is positioned for a new request.
    EndOfStream,
    /// Anything else; the worker must not be reused.
    Other(i32),
}

impl WorkerSignal {
    pub fn from_wire(value: i32) -> Self {
        match value {
            END_OF_STREAM => WorkerSignal::EndOfStream,
            other => WorkerSignal::Other(other),
        }
    }

    pub fn to_wire(self) -> i32 {
        match self {
            WorkerSignal::EndOfStream => END_OF_STREAM,
            WorkerSignal::Other(v) => v,
        }
    }
}

/// Decodes the result that follows a response length already read from
/// `reader`.
pub fn decode_response<R: Read>(
    length: i32,
    reader: &mut WireReader<R>,
) -> Result<AnalysisResult, ProtocolError> {
    match length {
        len if len >= 0 => {
            let data = reader.read_exact_block(len)?;
            let json = std::str::from_utf8(&data).map_err(|_| ProtocolError::InvalidUtf8)?;
            Ok(AnalysisResult::Schema(StructType::from_json(json)?))
        }
        PYTHON_EXCEPTION_THROWN => Ok(AnalysisResult::RemoteFailure {
            message: reader.read_utf()?,
        }),
        other => Err(ProtocolError::UnexpectedLength(other)),
    }
}

/// Reads the accumulator block: a count followed by raw updates.
pub fn read_accumulator_updates<R: Read>(
    reader: &mut WireReader<R>,
) -> Result<Vec<Bytes>, ProtocolError> {
    let n = reader.read_i32()?;
    if n < 0 {
        return Err(ProtocolError::UnexpectedLength(n));
    }
    let mut updates = Vec::with_capacity(wire::capacity_hint(n as usize));
    for _ in 0..n {
        updates.push(reader.read_block()?);
    }
    Ok(updates)
}

/// A complete response, as written by a worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeResponse {
    pub result: AnalysisResult,
    pub accumulator_updates: Vec<Bytes>,
    pub signal: WorkerSignal,
}

impl AnalyzeResponse {
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::new();
        match &self.result {
            AnalysisResult::Schema(schema) => wire::put_utf(&mut buf, &schema.json())?,
            AnalysisResult::RemoteFailure { message } => {
                buf.put_i32(PYTHON_EXCEPTION_THROWN);
                wire::put_utf(&mut buf, message)?;
            }
        }
        buf.put_i32(self.accumulator_updates.len() as i32);
        for update in &self.accumulator_updates {
            wire::put_block(&mut buf, update)?;
        }
        buf.put_i32(self.signal.to_wire());
        Ok(buf)
    }

    /// Reads a complete response.
    pub fn read<R: Read>(reader: &mut WireReader<R>) -> Result<Self, ProtocolError> {
        let length = reader.read_i32()?;
        let result = decode_response(length, reader)?;
        let accumulator_updates = read_accumulator_updates(reader)?;
        let signal = WorkerSignal::from_wire(reader.read_i32()?);
        Ok(Self {
            result,
            accumulator_updates,
            signal,
        })
    }
}
