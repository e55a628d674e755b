//! Client library for the in-memory key-value server.
//!
//! A thin, single-connection wrapper around the wire protocol: every call
//! sends one framed [`protocol::Request`] and waits for its matching
//! [`protocol::Response`]. Requests on one connection are serviced strictly
//! in order, so a single `Client` is not meant to be shared across
//! concurrent callers without external synchronisation — open one
//! connection per concurrent caller instead.
//!
//! # Example
//!
//! ```no_run
//! use client::Client;
//!
//! #[tokio::main]
//! async fn main() -> client::Result<()> {
//!     let mut client = Client::connect("localhost:4321").await?;
//!
//!     client.set_string("greeting", "hello", i64::MAX).await?;
//!     let greeting = client.get_string("greeting").await?;
//!     println!("{greeting:?}");
//!
//!     Ok(())
//! }
//! ```

mod error;

pub use error::{ClientError, Result};

use bytes::Bytes;
use protocol::{BincodeCodec, Codec, Request, Response, frame};
use std::collections::HashMap;
use tokio::net::TcpStream;
use types::{Record, Value};

/// A connection to the key-value server.
pub struct Client {
    socket: TcpStream,
    codec: BincodeCodec,
    max_frame_bytes: u32,
}

impl Client {
    /// Connect to the server at `addr`.
    pub async fn connect(addr: &str) -> Result<Self> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(ClientError::Connection)?;
        Ok(Self {
            socket,
            codec: BincodeCodec,
            max_frame_bytes: 64 * 1024 * 1024,
        })
    }

    /// Caps the size of frames this client will read back from the server.
    /// Defaults to 64 MiB; set to match the server's `--max-frame-bytes`.
    pub fn with_max_frame_bytes(mut self, max_frame_bytes: u32) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }

    async fn roundtrip(&mut self, request: Request) -> Result<Response> {
        frame::send_async(&mut self.socket, &self.codec, &request)
            .await
            .map_err(|err| ClientError::Protocol(to_io_error(err)))?;

        frame::recv_async::<_, Response>(&mut self.socket, &self.codec, self.max_frame_bytes)
            .await
            .map_err(|err| ClientError::Protocol(to_io_error(err)))?
            .ok_or_else(|| {
                ClientError::Protocol(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "server closed the connection",
                ))
            })
    }

    /// Fetches the record stored at `key`.
    ///
    /// Fails with [`ClientError::Server`] if the key is absent or expired.
    pub async fn get(&mut self, key: &str) -> Result<Record> {
        match self.roundtrip(Request::get(key)).await? {
            Response::Value(record) => Ok(record),
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Empty => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Stores `value` at `key`, replacing any prior record.
    pub async fn set(&mut self, key: &str, value: Record) -> Result<()> {
        match self.roundtrip(Request::set(key, value)).await? {
            Response::Empty => Ok(()),
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Value(_) => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Removes `key`. Removing an absent key is not an error.
    pub async fn remove(&mut self, key: &str) -> Result<()> {
        match self.roundtrip(Request::remove(key)).await? {
            Response::Empty => Ok(()),
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Value(_) => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Lists the currently live keys whose string form matches `pattern`,
    /// a regular expression evaluated by the server. Order is unspecified.
    pub async fn keys(&mut self, pattern: &str) -> Result<Vec<String>> {
        match self.roundtrip(Request::keys(pattern)).await? {
            Response::Value(record) => {
                let slice = record
                    .value
                    .as_slice()
                    .ok_or(ClientError::UnexpectedResponse)?;
                slice
                    .iter()
                    .map(|b| {
                        String::from_utf8(b.to_vec())
                            .map_err(|_| ClientError::UnexpectedResponse)
                    })
                    .collect()
            }
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Empty => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches element `index` of the `StringSlice` stored at `key`.
    pub async fn get_by_index(&mut self, key: &str, index: u32) -> Result<Record> {
        match self.roundtrip(Request::get_by_index(key, index)).await? {
            Response::Value(record) => Ok(record),
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Empty => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Fetches `map_key`'s value from the `StringMap` stored at `key`.
    pub async fn get_by_key(&mut self, key: &str, map_key: &str) -> Result<Record> {
        match self.roundtrip(Request::get_by_key(key, map_key)).await? {
            Response::Value(record) => Ok(record),
            Response::Error { message } => Err(ClientError::Server { message }),
            Response::Empty => Err(ClientError::UnexpectedResponse),
        }
    }

    /// Stores a bare string value at `key` with the given absolute deadline.
    /// Convenience wrapper over [`set`](Self::set) for the common `StringVal` case.
    pub async fn set_string(&mut self, key: &str, value: impl AsRef<[u8]>, deadline: i64) -> Result<()> {
        let record = Record::new(Value::StringVal(Bytes::copy_from_slice(value.as_ref())), deadline);
        self.set(key, record).await
    }

    /// Fetches `key` and unwraps its `StringVal` payload.
    pub async fn get_string(&mut self, key: &str) -> Result<Bytes> {
        let record = self.get(key).await?;
        record
            .value
            .as_string()
            .cloned()
            .ok_or(ClientError::UnexpectedResponse)
    }

    /// Stores an ordered sequence of byte strings at `key`.
    pub async fn set_slice(&mut self, key: &str, values: Vec<Bytes>, deadline: i64) -> Result<()> {
        self.set(key, Record::new(Value::StringSlice(values), deadline)).await
    }

    /// Fetches `key` and unwraps its `StringSlice` payload.
    pub async fn get_slice(&mut self, key: &str) -> Result<Vec<Bytes>> {
        let record = self.get(key).await?;
        record
            .value
            .as_slice()
            .map(|s| s.to_vec())
            .ok_or(ClientError::UnexpectedResponse)
    }

    /// Stores a string-to-string map at `key`.
    pub async fn set_map(&mut self, key: &str, values: HashMap<Bytes, Bytes>, deadline: i64) -> Result<()> {
        self.set(key, Record::new(Value::StringMap(values), deadline)).await
    }

    /// Fetches `key` and unwraps its `StringMap` payload.
    pub async fn get_map(&mut self, key: &str) -> Result<HashMap<Bytes, Bytes>> {
        let record = self.get(key).await?;
        record
            .value
            .as_map()
            .cloned()
            .ok_or(ClientError::UnexpectedResponse)
    }
}

fn to_io_error(err: common::GodisError) -> std::io::Error {
    match err {
        common::GodisError::Io(io_err) => io_err,
        other => std::io::Error::other(other.to_string()),
    }
}
