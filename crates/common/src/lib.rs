
use serde::{Deserialize, Serialize};
use std::{io, path::PathBuf, time::Duration};
use thiserror::Error;

/// Canonical error type shared across the storage engine, WAL, and dispatcher.
///
/// Each variant carries the key (and, where relevant, the index or sub-key)
/// so the dispatcher can format spec-accurate human-readable messages
/// without re-deriving context at the call site.
#[derive(Error, Debug)]
pub enum GodisError {
    #[error("key doesn't exist: {0:?}")]
    KeyAbsent(Vec<u8>),

    #[error("key ttl expired: {0:?}")]
    KeyExpired(Vec<u8>),

    #[error("bad key type: expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("index out of range: {index} (len {len})")]
    IndexOutOfRange { index: u32, len: usize },

    #[error("sub-key doesn't exist: {0:?}")]
    SubKeyAbsent(Vec<u8>),

    #[error("bad pattern: {0}")]
    BadPattern(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("not implemented")]
    NotImplemented,

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Result alias that carries a [`GodisError`].
pub type GodisResult<T> = Result<T, GodisError>;

/// Flushing strategy for the write-ahead log.
///
/// `Fsync` issues a durability barrier on every write (Variant A);
/// `Interval` batches writes in memory and syncs on a fixed period
/// (Variant B); `Noop` discards writes entirely and is meant for tests that
/// do not care about durability.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum WalMode {
    Fsync,
    Interval(Duration),
    Noop,
}

impl Default for WalMode {
    fn default() -> Self {
        WalMode::Fsync
    }
}

/// Runtime configuration shared by the server binary and by tests that spin
/// up an in-process server.
///
/// # Example
/// ```
/// use common::{Config, WalMode};
/// use std::time::Duration;
///
/// let config = Config::builder()
///     .endpoint("localhost:4321".to_string())
///     .wal_mode(WalMode::Interval(Duration::from_millis(200)))
///     .shard_count(64)
///     .build();
/// ```
#[derive(Clone, Debug, Serialize, Deserialize, bon::Builder)]
pub struct Config {
    /// Address the TCP listener binds to.
    #[builder(default = "localhost:4321".to_string())]
    pub endpoint: String,
    /// Path to the write-ahead log file.
    #[builder(default = PathBuf::from("./godis.wal"))]
    pub wal_path: PathBuf,
    /// Durability strategy for the WAL.
    #[builder(default)]
    pub wal_mode: WalMode,
    /// Number of independent shards in the concurrent map. Must be >= 1.
    #[builder(default = 32)]
    pub shard_count: usize,
    /// Maximum accepted frame size on the wire, in bytes.
    #[builder(default = 64 * 1024 * 1024)]
    pub max_frame_bytes: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: "localhost:4321".to_string(),
            wal_path: PathBuf::from("./godis.wal"),
            wal_mode: WalMode::default(),
            shard_count: 32,
            max_frame_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Initialize a `tracing` subscriber reading `RUST_LOG` (defaulting to
/// `info`). Safe to call more than once; later calls are no-ops.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Nanoseconds since `UNIX_EPOCH`, used as the clock for record deadlines.
pub fn now_nanos() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_nanos() as i64
}

/// Convenient re-exports for downstream crates.
pub mod prelude {
    pub use crate::{Config, GodisError, GodisResult, WalMode};
}
