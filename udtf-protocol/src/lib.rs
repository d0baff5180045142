//! # udtf-protocol
//!
//! Wire protocol spoken between the planner and a table-function analysis
//! worker.
//!
//! This crate provides:
//! - Big-endian integer framing and length-prefixed blocks
//! - Reserved sentinel lengths marking structural boundaries
//! - Portable JSON type descriptors for argument types and result schemas
//! - Literal value serialization for constant arguments
//! - Request encoding (handshake, command, arguments) and response decoding

pub mod argument;
pub mod error;
pub mod request;
pub mod response;
pub mod types;
pub mod value;
pub mod wire;

pub use argument::{encode_arguments, ArgumentExpression, CallArgument, EncodedArgument, Expr};
pub use error::{ProtocolError, SerializationError};
pub use request::{AnalyzeRequest, BroadcastEntry};
pub use response::{
    decode_response, read_accumulator_updates, AnalysisResult, AnalyzeResponse, WorkerSignal,
};
pub use types::{DataType, StructField, StructType};
pub use value::Literal;
pub use wire::{WireReader, END_OF_DATA_SECTION, END_OF_STREAM, NULL, PYTHON_EXCEPTION_THROWN};

/// Default upper bound for a single block read from a worker (16 MiB).
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;
