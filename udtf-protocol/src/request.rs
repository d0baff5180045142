//! Analysis request encoding.
//!
//! A request is written in one piece, in this order:
//!
//! ```text
//! utf   version marker
//! utf   job artifact id
//! utf   working directory hint
//! int32 include count, then utf per include
//! bool  broadcast encryption (always false)
//! int32 broadcast entry count, then per entry:
//!         int64 id >= 0, utf path     (worker must load)
//!         int64 -(id + 1)             (worker may drop)
//! int32 command length, command bytes
//! int32 argument count, then per argument (see `EncodedArgument`)
//! int32 END_OF_DATA_SECTION
//! ```

use crate::argument::EncodedArgument;
use crate::error::ProtocolError;
use crate::wire::{self, WireReader, END_OF_DATA_SECTION};
use bytes::{BufMut, Bytes, BytesMut};
use std::io::Read;

/// A change to the set of broadcast values a worker holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastEntry {
    /// The worker must load the value stored at `path`.
    Add { id: i64, path: String },
    /// The worker no longer needs the value.
    Remove { id: i64 },
}

impl BroadcastEntry {
    pub fn id(&self) -> i64 {
        match self {
            BroadcastEntry::Add { id, .. } | BroadcastEntry::Remove { id } => *id,
        }
    }

    fn put(&self, buf: &mut BytesMut) -> Result<(), ProtocolError> {
        if self.id() < 0 {
            return Err(ProtocolError::InvalidBroadcastId(self.id()));
        }
        match self {
            BroadcastEntry::Add { id, path } => {
                buf.put_i64(*id);
                wire::put_utf(buf, path)?;
            }
            BroadcastEntry::Remove { id } => buf.put_i64(-id - 1),
        }
        Ok(())
    }

    fn read<R: Read>(reader: &mut WireReader<R>) -> Result<Self, ProtocolError> {
        let id = reader.read_i64()?;
        if id >= 0 {
            Ok(BroadcastEntry::Add {
                id,
                path: reader.read_utf()?,
            })
        } else {
            Ok(BroadcastEntry::Remove { id: -(id + 1) })
        }
    }
}

/// Everything the worker needs to analyze one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    /// Interpreter/protocol version marker.
    pub version: String,
    pub job_artifact_id: String,
    /// Directory the worker resolves auxiliary files against.
    pub workdir: String,
    /// Auxiliary file references the worker adds to its import path.
    pub includes: Vec<String>,
    pub broadcasts: Vec<BroadcastEntry>,
    /// Serialized function body.
    pub command: Bytes,
    pub arguments: Vec<EncodedArgument>,
}

impl AnalyzeRequest {
    /// Encodes the complete request.
    pub fn encode(&self) -> Result<BytesMut, ProtocolError> {
        let mut buf = BytesMut::with_capacity(self.encoded_size_hint());

        // Handshake
        wire::put_utf(&mut buf, &self.version)?;
        wire::put_utf(&mut buf, &self.job_artifact_id)?;
        wire::put_utf(&mut buf, &self.workdir)?;
        buf.put_i32(count(self.includes.len())?);
        for include in &self.includes {
            wire::put_utf(&mut buf, include)?;
        }
        wire::put_bool(&mut buf, false);
        buf.put_i32(count(self.broadcasts.len())?);
        for entry in &self.broadcasts {
            entry.put(&mut buf)?;
        }

        // Command
        wire::put_block(&mut buf, &self.command)?;

        // Arguments
        buf.put_i32(count(self.arguments.len())?);
        for argument in &self.arguments {
            argument.put(&mut buf)?;
        }
        buf.put_i32(END_OF_DATA_SECTION);

        Ok(buf)
    }

    /// Reads a request as the worker would.
    pub fn read<R: Read>(reader: &mut WireReader<R>) -> Result<Self, ProtocolError> {
        let version = reader.read_utf()?;
        let job_artifact_id = reader.read_utf()?;
        let workdir = reader.read_utf()?;

        let n = read_count(reader)?;
        let mut includes = Vec::with_capacity(wire::capacity_hint(n));
        for _ in 0..n {
            includes.push(reader.read_utf()?);
        }

        if reader.read_bool()? {
            return Err(ProtocolError::Unsupported("encrypted broadcasts"));
        }
        let n = read_count(reader)?;
        let mut broadcasts = Vec::with_capacity(wire::capacity_hint(n));
        for _ in 0..n {
            broadcasts.push(BroadcastEntry::read(reader)?);
        }

        let command = reader.read_block()?;

        let n = read_count(reader)?;
        let mut arguments = Vec::with_capacity(wire::capacity_hint(n));
        for _ in 0..n {
            arguments.push(EncodedArgument::read(reader)?);
        }
        match reader.read_i32()? {
            END_OF_DATA_SECTION => {}
            other => return Err(ProtocolError::UnexpectedLength(other)),
        }

        Ok(Self {
            version,
            job_artifact_id,
            workdir,
            includes,
            broadcasts,
            command,
            arguments,
        })
    }

    fn encoded_size_hint(&self) -> usize {
        let strings: usize = self.includes.iter().map(|s| 4 + s.len()).sum();
        let args: usize = self
            .arguments
            .iter()
            .map(|a| 4 + a.type_json.len() + 2 + a.value.as_ref().map_or(0, |v| 4 + v.len()))
            .sum();
        64 + self.version.len()
            + self.job_artifact_id.len()
            + self.workdir.len()
            + strings
            + self.broadcasts.len() * 32
            + self.command.len()
            + args
    }
}

fn count(n: usize) -> Result<i32, ProtocolError> {
    i32::try_from(n).map_err(|_| ProtocolError::BlockTooLarge {
        size: n,
        max: i32::MAX as usize,
    })
}

fn read_count<R: Read>(reader: &mut WireReader<R>) -> Result<usize, ProtocolError> {
    let n = reader.read_i32()?;
    if n < 0 {
        return Err(ProtocolError::UnexpectedLength(n));
    }
    Ok(n as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::argument::{encode_arguments, Expr};
    use crate::types::DataType;
    use bytes::Buf;
    use proptest::prelude::*;

    fn sample_request(arguments: Vec<EncodedArgument>) -> AnalyzeRequest {
        AnalyzeRequest {
            version: "3.11".to_string(),
            job_artifact_id: "default".to_string(),
            workdir: "/tmp/udtf".to_string(),
            includes: vec!["deps.zip".to_string()],
            broadcasts: vec![
                BroadcastEntry::Add {
                    id: 3,
                    path: "/tmp/b3".to_string(),
                },
                BroadcastEntry::Remove { id: 0 },
            ],
            command: Bytes::from_static(b"\x80\x05fn"),
            arguments,
        }
    }

    #[test]
    fn test_request_roundtrip() {
        let args = encode_arguments(
            &[
                Expr::literal(1, DataType::Integer),
                Expr::column("c", DataType::String),
            ],
            &[false, false],
        )
        .unwrap();
        let request = sample_request(args);
        let encoded = request.encode().unwrap();

        let mut reader = WireReader::new(&encoded[..]);
        let decoded = AnalyzeRequest::read(&mut reader).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_request_ends_with_end_of_data() {
        let encoded = sample_request(Vec::new()).encode().unwrap();
        let tail = &encoded[encoded.len() - 4..];
        assert_eq!(i32::from_be_bytes(tail.try_into().unwrap()), END_OF_DATA_SECTION);
    }

    #[test]
    fn test_version_marker_first() {
        let mut encoded = sample_request(Vec::new()).encode().unwrap();
        assert_eq!(encoded.get_i32(), 4);
        assert_eq!(&encoded[..4], b"3.11");
    }

    #[test]
    fn test_removal_encoding() {
        let mut buf = BytesMut::new();
        BroadcastEntry::Remove { id: 0 }.put(&mut buf).unwrap();
        assert_eq!(buf.get_i64(), -1);
    }

    #[test]
    fn test_negative_broadcast_id_rejected() {
        let mut request = sample_request(Vec::new());
        request.broadcasts = vec![BroadcastEntry::Add {
            id: -3,
            path: "/b".to_string(),
        }];
        assert!(matches!(
            request.encode(),
            Err(ProtocolError::InvalidBroadcastId(-3))
        ));

        request.broadcasts = vec![BroadcastEntry::Remove { id: i64::MIN }];
        assert!(matches!(
            request.encode(),
            Err(ProtocolError::InvalidBroadcastId(i64::MIN))
        ));
    }

    #[test]
    fn test_extreme_removal_id_decodes() {
        let data = i64::MIN.to_be_bytes();
        let mut reader = WireReader::new(&data[..]);
        assert_eq!(
            BroadcastEntry::read(&mut reader).unwrap(),
            BroadcastEntry::Remove { id: i64::MAX }
        );
    }

    #[test]
    fn test_huge_count_does_not_preallocate() {
        let mut data = Vec::new();
        for s in ["3.11", "default", "/tmp"] {
            data.extend_from_slice(&(s.len() as i32).to_be_bytes());
            data.extend_from_slice(s.as_bytes());
        }
        data.extend_from_slice(&i32::MAX.to_be_bytes());
        let mut reader = WireReader::new(&data[..]);
        let err = AnalyzeRequest::read(&mut reader).unwrap_err();
        assert!(err.is_disconnect());
    }

    #[test]
    fn test_missing_terminator_rejected() {
        let mut encoded = sample_request(Vec::new()).encode().unwrap();
        let len = encoded.len();
        encoded[len - 4..].copy_from_slice(&7i32.to_be_bytes());
        let mut reader = WireReader::new(&encoded[..]);
        assert!(matches!(
            AnalyzeRequest::read(&mut reader),
            Err(ProtocolError::UnexpectedLength(7))
        ));
    }

    proptest! {
        #[test]
        fn prop_argument_frames_match_count(
            specs in proptest::collection::vec((any::<Option<i64>>(), any::<bool>()), 0..16)
        ) {
            let exprs: Vec<Expr> = specs
                .iter()
                .enumerate()
                .map(|(i, (v, _))| match v {
                    Some(v) => Expr::literal(*v, DataType::Long),
                    None => Expr::column(format!("c{}", i), DataType::Long),
                })
                .collect();
            let flags: Vec<bool> = specs.iter().map(|(_, t)| *t).collect();
            let args = encode_arguments(&exprs, &flags).unwrap();
            let encoded = sample_request(args).encode().unwrap();

            let mut reader = WireReader::new(&encoded[..]);
            let decoded = AnalyzeRequest::read(&mut reader).unwrap();
            prop_assert_eq!(decoded.arguments.len(), specs.len());
            for ((value, is_table), arg) in specs.iter().zip(&decoded.arguments) {
                prop_assert_eq!(arg.value.is_some(), value.is_some());
                prop_assert_eq!(arg.is_table, *is_table);
            }
            // Nothing follows the terminator.
            prop_assert!(reader.into_inner().is_empty());
        }
    }
}
