//! The value model stored under each key.
//!
//! A key maps to exactly one [`Record`]: a tagged [`Value`] plus an absolute
//! expiry deadline. `Value`'s payloads are `bytes::Bytes` rather than owned
//! `Vec<u8>` so that a shard can hand a snapshot of a record to a caller
//! without cloning the underlying bytes or holding a lock across the clone.

use bytes::Bytes;
use std::collections::HashMap;

/// One of the three payload shapes a stored value may hold.
///
/// Keys within `StringMap` and elements within `StringSlice` are plain byte
/// strings; equality throughout is bytewise, never locale- or case-aware.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Value {
    StringVal(Bytes),
    StringSlice(Vec<Bytes>),
    StringMap(HashMap<Bytes, Bytes>),
}

impl Value {
    /// Short name of the active variant, used in type-mismatch error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::StringVal(_) => "string",
            Value::StringSlice(_) => "slice",
            Value::StringMap(_) => "map",
        }
    }

    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::StringVal(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_slice(&self) -> Option<&[Bytes]> {
        match self {
            Value::StringSlice(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<Bytes, Bytes>> {
        match self {
            Value::StringMap(v) => Some(v),
            _ => None,
        }
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::StringVal(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::StringVal(Bytes::from(v))
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::StringVal(Bytes::copy_from_slice(v.as_bytes()))
    }
}

/// Absolute deadline, nanoseconds since `UNIX_EPOCH`. A deadline of `0` is
/// "already expired at epoch" — callers populate it with `now + ttl`.
pub type Deadline = i64;

/// A stored record: one [`Value`] plus the deadline after which reads treat
/// it as absent.
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Record {
    pub value: Value,
    pub deadline: Deadline,
}

impl Record {
    pub fn new(value: Value, deadline: Deadline) -> Self {
        Self { value, deadline }
    }

    /// A record is expired once `now_nanos` has passed its deadline.
    pub fn is_expired(&self, now_nanos: i64) -> bool {
        now_nanos > self.deadline
    }
}
