//! Primitive wire encoding.
//!
//! All integers are fixed-width big-endian. Byte blocks and strings are
//! prefixed with an `int32` length. Negative lengths are reserved as
//! sentinels and never describe a block:
//!
//! ```text
//! +---------------+------------------------------------------------+
//! | int32 length  | length bytes (UTF-8 for strings)               |
//! +---------------+------------------------------------------------+
//!
//!  -1  END_OF_DATA_SECTION      argument list finished
//!  -2  PYTHON_EXCEPTION_THROWN  an error message block follows
//!  -4  END_OF_STREAM            worker finished cleanly, reusable
//!  -5  NULL                     reserved
//! ```

use crate::error::ProtocolError;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;

/// Terminates the argument list.
pub const END_OF_DATA_SECTION: i32 = -1;

/// Announces that the worker's analysis raised; a message block follows.
pub const PYTHON_EXCEPTION_THROWN: i32 = -2;

/// Final control value of a clean exchange; the worker may be reused.
pub const END_OF_STREAM: i32 = -4;

/// Reserved null marker.
pub const NULL: i32 = -5;

/// Upper bound on capacity reserved up front for a count read off the wire.
const MAX_PREALLOC: usize = 1024;

/// Capacity to reserve for `count` elements announced by the peer.
pub fn capacity_hint(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

/// Returns whether `value` is one of the reserved sentinel lengths.
pub fn is_sentinel(value: i32) -> bool {
    value < 0
}

/// Appends a one-byte boolean.
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

/// Appends an `int32` length followed by `data`.
pub fn put_block(buf: &mut BytesMut, data: &[u8]) -> Result<(), ProtocolError> {
    let len = i32::try_from(data.len()).map_err(|_| ProtocolError::BlockTooLarge {
        size: data.len(),
        max: i32::MAX as usize,
    })?;
    buf.reserve(4 + data.len());
    buf.put_i32(len);
    buf.put_slice(data);
    Ok(())
}

/// Appends a length-prefixed UTF-8 string.
pub fn put_utf(buf: &mut BytesMut, value: &str) -> Result<(), ProtocolError> {
    put_block(buf, value.as_bytes())
}

/// Blocking reader for wire primitives.
///
/// Every block read is bounded by `max_block` so a corrupt length cannot
/// trigger an unbounded allocation.
pub struct WireReader<R> {
    inner: R,
    max_block: usize,
}

impl<R: Read> WireReader<R> {
    pub fn new(inner: R) -> Self {
        Self::with_max_block(inner, crate::MAX_BLOCK_SIZE)
    }

    pub fn with_max_block(inner: R, max_block: usize) -> Self {
        Self { inner, max_block }
    }

    pub fn read_i32(&mut self) -> Result<i32, ProtocolError> {
        let mut buf = [0u8; 4];
        self.inner.read_exact(&mut buf)?;
        Ok(i32::from_be_bytes(buf))
    }

    pub fn read_i64(&mut self) -> Result<i64, ProtocolError> {
        let mut buf = [0u8; 8];
        self.inner.read_exact(&mut buf)?;
        Ok(i64::from_be_bytes(buf))
    }

    pub fn read_bool(&mut self) -> Result<bool, ProtocolError> {
        let mut buf = [0u8; 1];
        self.inner.read_exact(&mut buf)?;
        match buf[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(ProtocolError::InvalidBool(other)),
        }
    }

    /// Reads exactly `len` bytes whose length prefix was already consumed.
    pub fn read_exact_block(&mut self, len: i32) -> Result<Bytes, ProtocolError> {
        if len < 0 {
            return Err(ProtocolError::UnexpectedLength(len));
        }
        let len = len as usize;
        if len > self.max_block {
            return Err(ProtocolError::BlockTooLarge {
                size: len,
                max: self.max_block,
            });
        }
        let mut data = vec![0u8; len];
        self.inner.read_exact(&mut data)?;
        Ok(Bytes::from(data))
    }

    /// Reads a length prefix and the block it describes.
    pub fn read_block(&mut self) -> Result<Bytes, ProtocolError> {
        let len = self.read_i32()?;
        self.read_exact_block(len)
    }

    /// Reads a length-prefixed UTF-8 string.
    pub fn read_utf(&mut self) -> Result<String, ProtocolError> {
        let data = self.read_block()?;
        String::from_utf8(data.to_vec()).map_err(|_| ProtocolError::InvalidUtf8)
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}
