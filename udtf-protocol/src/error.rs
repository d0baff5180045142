//! Protocol and serialization error types.

use std::io;
use thiserror::Error;

/// Errors raised while framing or parsing bytes on the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("block too large: {size} bytes (max {max})")]
    BlockTooLarge { size: usize, max: usize },

    #[error("unexpected length marker: {0}")]
    UnexpectedLength(i32),

    #[error("invalid boolean byte: {0:#x}")]
    InvalidBool(u8),

    #[error("invalid UTF-8 in payload")]
    InvalidUtf8,

    #[error("malformed type descriptor: {0}")]
    MalformedType(String),

    #[error("expected a struct schema, got '{0}'")]
    NotAStruct(String),

    #[error("invalid broadcast id: {0}")]
    InvalidBroadcastId(i64),

    #[error("unsupported protocol feature: {0}")]
    Unsupported(&'static str),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Returns whether the peer went away while a read or write was pending.
    pub fn is_disconnect(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                io::ErrorKind::UnexpectedEof
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::ConnectionReset
                    | io::ErrorKind::ConnectionAborted
            ),
            _ => false,
        }
    }
}

/// Errors raised while converting argument values or accumulator updates
/// to or from their serialized form.
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("value {value} does not match declared type {data_type}")]
    TypeMismatch { data_type: String, value: String },

    #[error("non-finite float {0} cannot be serialized")]
    NonFinite(f64),

    #[error("failed to evaluate constant argument: {0}")]
    Evaluation(String),

    #[error("{expressions} argument expressions but {flags} table-argument flags")]
    ArityMismatch { expressions: usize, flags: usize },

    #[error("malformed accumulator update: {0}")]
    MalformedUpdate(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SerializationError {
    pub(crate) fn mismatch(data_type: impl ToString, value: impl std::fmt::Debug) -> Self {
        SerializationError::TypeMismatch {
            data_type: data_type.to_string(),
            value: format!("{:?}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disconnect_classification() {
        let eof = ProtocolError::Io(io::Error::new(io::ErrorKind::UnexpectedEof, "eof"));
        assert!(eof.is_disconnect());

        let pipe = ProtocolError::Io(io::Error::new(io::ErrorKind::BrokenPipe, "pipe"));
        assert!(pipe.is_disconnect());

        let denied = ProtocolError::Io(io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(!denied.is_disconnect());

        assert!(!ProtocolError::UnexpectedLength(-7).is_disconnect());
        assert!(!ProtocolError::InvalidUtf8.is_disconnect());
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::BlockTooLarge { size: 100, max: 50 };
        assert!(err.to_string().contains("100"));

        let err = ProtocolError::UnexpectedLength(-9);
        assert!(err.to_string().contains("-9"));

        let err = ProtocolError::InvalidBool(0x07);
        assert!(err.to_string().contains("0x7"));

        let err = ProtocolError::NotAStruct("int".to_string());
        assert!(err.to_string().contains("int"));

        let err = ProtocolError::InvalidUtf8;
        assert!(err.to_string().contains("UTF-8"));
    }

    #[test]
    fn test_serialization_error_display() {
        let err = SerializationError::mismatch("int", "abc");
        let msg = err.to_string();
        assert!(msg.contains("int"));
        assert!(msg.contains("abc"));

        let err = SerializationError::ArityMismatch {
            expressions: 3,
            flags: 2,
        };
        assert!(err.to_string().contains("3 argument expressions"));

        let err = SerializationError::NonFinite(f64::NAN);
        assert!(err.to_string().contains("NaN"));
    }
}
