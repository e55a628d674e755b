//! The sharded, concurrent, in-memory key/value map.
//!
//! A key maps to exactly one [`types::Record`]. The map is split into `N`
//! independent shards, each behind its own reader/writer lock, so that
//! unrelated keys never contend on the same lock. Shard selection is a fast
//! non-cryptographic hash of the key; distribution only needs to be
//! near-uniform, not cryptographically unpredictable.
//!
//! Expiry is lazy: a shard never scans for expired entries on its own. A
//! `get` checks the looked-up record's deadline and, if past, reports the
//! key as expired and schedules a best-effort background delete. `for_each`
//! does the analogous check while iterating and reaps in bulk afterward.
//!
//! # Why sharded
//!
//! On random-key workloads the expected concurrent contention on any one
//! lock drops by a factor of `N`. A single-lock map serializes every `Get`
//! and `Set` across all keys; splitting into `N` shards means two callers
//! touching different keys only contend with probability roughly `1/N`.
//! `tests::sharded_and_single_shard_maps_agree_under_a_mixed_workload`
//! exercises this at `N=1` vs `N=32`: the same mixed `Set`/`Get`/`for_each`
//! workload, driven across several concurrent tasks, must leave both maps in
//! an identical final state — sharding changes lock granularity, never
//! observable behavior. Actual throughput numbers belong in a `criterion`
//! bench, out of scope here.

use common::{GodisError, GodisResult};
use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};
use types::Record;

type Shard = Arc<RwLock<HashMap<Vec<u8>, Record>>>;

/// The sharded concurrent map described above.
///
/// Cheaply cloneable: cloning copies the `Vec` of shard handles, not their
/// contents, so a `ShardMap` can be shared across connection tasks by
/// cloning rather than wrapping the whole thing in an `Arc`.
#[derive(Clone)]
pub struct ShardMap {
    shards: Vec<Shard>,
}

impl ShardMap {
    /// Builds a map with `shard_count` independent shards. Panics if
    /// `shard_count` is zero.
    pub fn new(shard_count: usize) -> Self {
        assert!(shard_count >= 1, "shard_count must be at least 1");
        let shards = (0..shard_count)
            .map(|_| Arc::new(RwLock::new(HashMap::new())))
            .collect();
        Self { shards }
    }

    fn shard_index(&self, key: &[u8]) -> usize {
        let hash = xxhash_rust::xxh3::xxh3_64(key);
        (hash % self.shards.len() as u64) as usize
    }

    fn shard(&self, key: &[u8]) -> &Shard {
        &self.shards[self.shard_index(key)]
    }

    /// Looks up `key`. Takes the shard's read lock, copies out the record,
    /// and releases the lock before checking the deadline so that an
    /// expired-key reap never happens under the read lock itself.
    pub fn get(&self, key: &[u8], now_nanos: i64) -> GodisResult<Record> {
        let found = {
            let guard = self.shard(key).read().expect("shard lock poisoned");
            guard.get(key).cloned()
        };

        match found {
            None => Err(GodisError::KeyAbsent(key.to_vec())),
            Some(record) if record.is_expired(now_nanos) => {
                self.spawn_lazy_delete(key.to_vec());
                Err(GodisError::KeyExpired(key.to_vec()))
            }
            Some(record) => Ok(record),
        }
    }

    /// Overwrites (or inserts) `key`'s record. Always succeeds.
    pub fn set(&self, key: &[u8], record: Record) {
        let mut guard = self.shard(key).write().expect("shard lock poisoned");
        guard.insert(key.to_vec(), record);
    }

    /// Removes `key` if present. Deleting an absent key is not an error.
    pub fn delete(&self, key: &[u8]) {
        let mut guard = self.shard(key).write().expect("shard lock poisoned");
        guard.remove(key);
    }

    /// Schedules a best-effort removal of `key` without blocking the
    /// caller. Used after a `get` observes an expired record.
    fn spawn_lazy_delete(&self, key: Vec<u8>) {
        let shard = Arc::clone(self.shard(&key));
        tokio::spawn(async move {
            let mut guard = shard.write().expect("shard lock poisoned");
            guard.remove(&key);
        });
    }

    /// Scans every shard concurrently, invoking `f(key, record)` for each
    /// live (non-expired) entry. Expired entries are skipped from the
    /// callback and reaped afterward in a background task per shard.
    ///
    /// `f` may be called concurrently from multiple shard tasks; it is
    /// responsible for synchronising any state it accumulates into (a
    /// `Mutex`-guarded `Vec`, for instance, for a `Keys` scan).
    pub async fn for_each<F>(&self, now_nanos: i64, f: F)
    where
        F: Fn(&[u8], &Record) + Send + Sync + 'static,
    {
        let f = Arc::new(f);
        let mut tasks = Vec::with_capacity(self.shards.len());

        for shard in &self.shards {
            let shard = Arc::clone(shard);
            let f = Arc::clone(&f);
            tasks.push(tokio::spawn(async move {
                let mut expired = Vec::new();
                {
                    let guard = shard.read().expect("shard lock poisoned");
                    for (key, record) in guard.iter() {
                        if record.is_expired(now_nanos) {
                            expired.push(key.clone());
                        } else {
                            f(key, record);
                        }
                    }
                }
                if !expired.is_empty() {
                    let mut guard = shard.write().expect("shard lock poisoned");
                    for key in expired {
                        guard.remove(&key);
                    }
                }
            }));
        }

        for task in tasks {
            if let Err(err) = task.await {
                tracing::error!(error = %err, "shard scan task panicked");
            }
        }
    }

    /// Number of shards backing this map.
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }
}
