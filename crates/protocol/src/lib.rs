//! Wire protocol for client-server communication.
//!
//! Defines the request/response message shapes, a pluggable [`Codec`], and
//! length-prefixed framing in the [`frame`] module. Messages are opaque to
//! the framing layer: it only ever moves length-delimited byte slices.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use types::Record;


/// The operation a [`Request`] asks the dispatcher to perform.
///
/// Encoded on the wire as a single `u8` via a hand-written `Serialize`/
/// `Deserialize` pair (see below), so the numeric codes here genuinely are
/// part of the wire contract and must not be renumbered — unlike a plain
/// `#[derive(Serialize, Deserialize)]` on a fieldless enum, which `serde`
/// (and `bincode`'s implementation of it) encodes by declaration-order
/// variant index, not by any `#[repr(u8)] = N` discriminant written on an
/// arm. `Unknown` carries whatever byte didn't match one of the known
/// codes, so a well-framed request with an unrecognized operation reaches
/// the dispatcher instead of failing to decode at all; the dispatcher turns
/// it into `GodisError::NotImplemented`, per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Get,
    Set,
    Remove,
    Keys,
    GetByIndex,
    GetByKey,
    Unknown(u8),
}

impl Operation {
    fn code(self) -> u8 {
        match self {
            Operation::Get => 1,
            Operation::Set => 2,
            Operation::Remove => 3,
            Operation::Keys => 4,
            Operation::GetByIndex => 5,
            Operation::GetByKey => 6,
            Operation::Unknown(code) => code,
        }
    }

    fn from_code(code: u8) -> Self {
        match code {
            1 => Operation::Get,
            2 => Operation::Set,
            3 => Operation::Remove,
            4 => Operation::Keys,
            5 => Operation::GetByIndex,
            6 => Operation::GetByKey,
            other => Operation::Unknown(other),
        }
    }
}

impl Serialize for Operation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

impl<'de> Deserialize<'de> for Operation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(Operation::from_code(u8::deserialize(deserializer)?))
    }
}

/// A single client request. Not every field applies to every operation: a
/// `Get` ignores `value`/`index`/`map_key`; a `Keys` request interprets `key`
/// as a regular expression rather than a literal key.
///
/// `value` carries both the payload variant and its expiry deadline — on
/// the wire a "Value" is always the pair, never the bare variant alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub key: String,
    pub operation: Operation,
    pub value: Option<Record>,
    pub index: Option<u32>,
    pub map_key: Option<String>,
}

impl Request {
    pub fn get(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Get)
    }

    pub fn set(key: impl Into<String>, value: Record) -> Self {
        Self {
            value: Some(value),
            ..Self::new(key, Operation::Set)
        }
    }

    pub fn remove(key: impl Into<String>) -> Self {
        Self::new(key, Operation::Remove)
    }

    pub fn keys(pattern: impl Into<String>) -> Self {
        Self::new(pattern, Operation::Keys)
    }

    pub fn get_by_index(key: impl Into<String>, index: u32) -> Self {
        Self {
            index: Some(index),
            ..Self::new(key, Operation::GetByIndex)
        }
    }

    pub fn get_by_key(key: impl Into<String>, map_key: impl Into<String>) -> Self {
        Self {
            map_key: Some(map_key.into()),
            ..Self::new(key, Operation::GetByKey)
        }
    }

    fn new(key: impl Into<String>, operation: Operation) -> Self {
        Self {
            key: key.into(),
            operation,
            value: None,
            index: None,
            map_key: None,
        }
    }
}

/// The server's reply to a [`Request`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Response {
    /// A successful read, carrying the resulting value and its deadline.
    Value(Record),
    /// A successful mutation (`Set`, `Remove`) with nothing to return.
    Empty,
    /// Any failure — bad type, absent key, out-of-range index, bad pattern.
    Error { message: String },
}

/// Serializes and deserializes protocol messages to/from bytes.
///
/// The framing layer treats the result as opaque; any self-describing
/// tagged encoding that round-trips [`Request`]/[`Response`] works.
pub trait Codec {
    fn marshal<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, common::GodisError>;
    fn unmarshal<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T, common::GodisError>;
}

/// The default codec: `bincode`'s standard configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct BincodeCodec;

impl Codec for BincodeCodec {
    fn marshal<T: Serialize>(&self, msg: &T) -> Result<Vec<u8>, common::GodisError> {
        bincode::serde::encode_to_vec(msg, bincode::config::standard())
            .map_err(|e| common::GodisError::Decode(e.to_string()))
    }

    fn unmarshal<T: for<'de> Deserialize<'de>>(&self, bytes: &[u8]) -> Result<T, common::GodisError> {
        bincode::serde::decode_from_slice(bytes, bincode::config::standard())
            .map(|(msg, _)| msg)
            .map_err(|e| common::GodisError::Decode(e.to_string()))
    }
}

/// Length-prefixed framing: `[u32 length, big-endian][payload]`.
///
/// The core imposes no maximum frame size; callers that need a cap (see
/// `Config::max_frame_bytes`) should check the decoded length themselves
/// before reading the payload, using the `_capped` variants below.
pub mod frame {
    use common::GodisError;
    use std::io::{self, Read, Write};
    use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

    /// Writes one frame: encodes `message`, prefixes its length, and writes
    /// both in a single flush so a slow reader never observes a length
    /// without its payload.
    pub fn write_message<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(payload);
        writer.write_all(&buf)?;
        writer.flush()
    }

    /// Reads one frame's raw payload bytes, honoring `max_frame_bytes` as a
    /// denial-of-service guard. Returns `Ok(None)` on a clean EOF at a frame
    /// boundary.
    pub fn read_message<R: Read>(
        reader: &mut R,
        max_frame_bytes: u32,
    ) -> io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match read_fill(reader, &mut len_buf)? {
            0 => return Ok(None),
            n if n < len_buf.len() => {
                return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "short read on frame length"));
            }
            _ => {}
        }
        let len = u32::from_be_bytes(len_buf);
        if len > max_frame_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds max of {max_frame_bytes}"),
            ));
        }
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload)?;
        Ok(Some(payload))
    }

    fn read_fill<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
        let mut total = 0;
        while total < buf.len() {
            match r.read(&mut buf[total..])? {
                0 => break,
                n => total += n,
            }
        }
        Ok(total)
    }

    /// Async counterpart of [`write_message`], for Tokio connection tasks.
    pub async fn write_message_async<W: AsyncWrite + Unpin>(
        writer: &mut W,
        payload: &[u8],
    ) -> io::Result<()> {
        let len = u32::try_from(payload.len())
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame too large"))?;
        let mut buf = Vec::with_capacity(4 + payload.len());
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(payload);
        writer.write_all(&buf).await?;
        writer.flush().await
    }

    /// Async counterpart of [`read_message`]. Returns `Ok(None)` on a clean
    /// EOF at a frame boundary; any other short read is a hard error.
    pub async fn read_message_async<R: AsyncRead + Unpin>(
        reader: &mut R,
        max_frame_bytes: u32,
    ) -> io::Result<Option<Vec<u8>>> {
        let mut len_buf = [0u8; 4];
        match reader.read(&mut len_buf).await? {
            0 => return Ok(None),
            n if n < len_buf.len() => {
                reader.read_exact(&mut len_buf[n..]).await?;
            }
            _ => {}
        }
        let len = u32::from_be_bytes(len_buf);
        if len > max_frame_bytes {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {len} bytes exceeds max of {max_frame_bytes}"),
            ));
        }
        let mut payload = vec![0u8; len as usize];
        reader.read_exact(&mut payload).await?;
        Ok(Some(payload))
    }

    /// Convenience combinator: marshal + frame + write in one call.
    pub async fn send_async<W, T>(
        writer: &mut W,
        codec: &impl super::Codec,
        message: &T,
    ) -> Result<(), GodisError>
    where
        W: AsyncWrite + Unpin,
        T: serde::Serialize,
    {
        let bytes = codec.marshal(message)?;
        write_message_async(writer, &bytes).await.map_err(GodisError::Io)
    }

    /// Convenience combinator: read + unframe + unmarshal in one call.
    /// Returns `Ok(None)` on a clean peer disconnect.
    pub async fn recv_async<R, T>(
        reader: &mut R,
        codec: &impl super::Codec,
        max_frame_bytes: u32,
    ) -> Result<Option<T>, GodisError>
    where
        R: AsyncRead + Unpin,
        T: for<'de> serde::Deserialize<'de>,
    {
        match read_message_async(reader, max_frame_bytes).await.map_err(GodisError::Io)? {
            Some(bytes) => Ok(Some(codec.unmarshal(&bytes)?)),
            None => Ok(None),
        }
    }
}
