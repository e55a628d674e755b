//! Per-connection request handling: decode → validate type → mutate/read
//! the store → WAL on mutations → encode response.

use common::{GodisError, GodisResult, now_nanos};
use protocol::{BincodeCodec, Codec, Operation, Request, Response};
use regex::Regex;
use std::sync::{Arc, Mutex};
use store::ShardMap;
use types::{Record, Value};
use wal::{Command, Wal};

/// Shared state a connection task dispatches requests against. Cheap to
/// clone: `store` is itself a shallow handle and `wal` is reference-counted.
#[derive(Clone)]
pub struct Dispatcher {
    store: ShardMap,
    wal: Arc<dyn Wal>,
    codec: BincodeCodec,
}

impl Dispatcher {
    pub fn new(store: ShardMap, wal: Arc<dyn Wal>) -> Self {
        Self {
            store,
            wal,
            codec: BincodeCodec,
        }
    }

    /// Handles one decoded [`Request`], returning the [`Response`] to send
    /// back. Never panics on a type mismatch or bad input — those become
    /// `Response::Error`.
    pub async fn dispatch(&self, request: Request) -> Response {
        let key = request.key.as_bytes();
        let now = now_nanos();

        let result = match request.operation {
            Operation::Get => self.store.get(key, now).map(Response::Value),
            Operation::Set => self.handle_set(key, request.value),
            Operation::Remove => self.handle_remove(key),
            Operation::Keys => self.handle_keys(&request.key).await,
            Operation::GetByIndex => self.handle_get_by_index(key, request.index, now),
            Operation::GetByKey => self.handle_get_by_key(key, request.map_key, now),
            Operation::Unknown(_) => Err(GodisError::NotImplemented),
        };

        match result {
            Ok(response) => response,
            Err(err) => crate::error::to_response(err),
        }
    }

    fn handle_set(&self, key: &[u8], value: Option<Record>) -> GodisResult<Response> {
        let record = value.ok_or(GodisError::Decode("Set request missing value".into()))?;
        self.store.set(key, record.clone());

        let encoded = self.codec.marshal(&record)?;
        if let Err(err) = self.wal.write(Command::Write, key, &encoded) {
            tracing::error!(error = %err, "WAL write failed after in-memory Set");
        }
        Ok(Response::Empty)
    }

    fn handle_remove(&self, key: &[u8]) -> GodisResult<Response> {
        self.store.delete(key);
        if let Err(err) = self.wal.write(Command::Delete, key, &[]) {
            tracing::error!(error = %err, "WAL write failed after in-memory Remove");
        }
        Ok(Response::Empty)
    }

    async fn handle_keys(&self, pattern: &str) -> GodisResult<Response> {
        let regex = Regex::new(pattern).map_err(|e| GodisError::BadPattern(e.to_string()))?;
        let now = now_nanos();

        let matched: Arc<Mutex<Vec<bytes::Bytes>>> = Arc::new(Mutex::new(Vec::new()));
        let matched_for_callback = Arc::clone(&matched);
        self.store
            .for_each(now, move |key, _record| {
                if let Ok(key_str) = std::str::from_utf8(key) {
                    if regex.is_match(key_str) {
                        matched_for_callback
                            .lock()
                            .expect("keys accumulator poisoned")
                            .push(bytes::Bytes::copy_from_slice(key));
                    }
                }
            })
            .await;

        let keys = Arc::try_unwrap(matched)
            .map(|m| m.into_inner().expect("keys accumulator poisoned"))
            .unwrap_or_else(|arc| arc.lock().expect("keys accumulator poisoned").clone());

        Ok(Response::Value(Record::new(
            Value::StringSlice(keys),
            i64::MAX,
        )))
    }

    fn handle_get_by_index(
        &self,
        key: &[u8],
        index: Option<u32>,
        now: i64,
    ) -> GodisResult<Response> {
        let index = index.ok_or(GodisError::Decode("GetByIndex missing index".into()))?;
        let record = self.store.get(key, now)?;
        let slice = record.value.as_slice().ok_or(GodisError::TypeMismatch {
            expected: "slice",
            found: record.value.kind(),
        })?;

        if index as usize >= slice.len() {
            return Err(GodisError::IndexOutOfRange {
                index,
                len: slice.len(),
            });
        }

        Ok(Response::Value(Record::new(
            Value::StringVal(slice[index as usize].clone()),
            record.deadline,
        )))
    }

    fn handle_get_by_key(
        &self,
        key: &[u8],
        map_key: Option<String>,
        now: i64,
    ) -> GodisResult<Response> {
        let map_key = map_key.ok_or(GodisError::Decode("GetByKey missing map_key".into()))?;
        let record = self.store.get(key, now)?;
        let map = record.value.as_map().ok_or(GodisError::TypeMismatch {
            expected: "map",
            found: record.value.kind(),
        })?;

        let value = map
            .get(map_key.as_bytes())
            .cloned()
            .ok_or_else(|| GodisError::SubKeyAbsent(map_key.into_bytes()))?;

        Ok(Response::Value(Record::new(
            Value::StringVal(value),
            record.deadline,
        )))
    }
}
