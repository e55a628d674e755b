//! Spins up the real dispatcher/listener stack against a temporary WAL file.
//!
//! [`TestServer`] is the one piece of test-only plumbing shared across the
//! workspace: it runs the same `server::Dispatcher` and `server::Listener`
//! that the `godis-server` binary runs, bound to an ephemeral port, backed by
//! a WAL under a `tempfile::TempDir`. Tests connect with the real `client`
//! crate and see the real wire protocol end to end.

use anyhow::Result;
use common::WalMode;
use protocol::{BincodeCodec, Codec};
use server::dispatcher::Dispatcher;
use server::listener::Listener;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use store::ShardMap;
use tempfile::TempDir;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use wal::{FsyncWal, IntervalWal, NoopWal, Wal};

const DEFAULT_SHARD_COUNT: usize = 8;
const DEFAULT_MAX_FRAME_BYTES: u32 = 16 * 1024 * 1024;

/// An in-process TCP server, for integration tests that want the real
/// wire protocol without running a separate binary.
pub struct TestServer {
    address: String,
    wal_path: PathBuf,
    temp_dir: TempDir,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Starts a server with `FsyncWal` durability, the default for
    /// production use.
    pub async fn start() -> Result<Self> {
        Self::start_with_wal_mode(WalMode::Fsync).await
    }

    /// Starts a server using the given WAL durability strategy.
    pub async fn start_with_wal_mode(mode: WalMode) -> Result<Self> {
        let temp_dir = TempDir::new()?;
        let wal_path = temp_dir.path().join("godis.wal");
        Self::start_at(temp_dir, wal_path, mode).await
    }

    /// Stops this server (aborting its listener task) and starts a fresh one
    /// pointed at the same WAL file and temp directory, simulating a process
    /// restart for WAL-replay tests. The new server listens on a new port.
    pub async fn restart(self, mode: WalMode) -> Result<Self> {
        let _ = self.shutdown.send(true);
        self.task.abort();
        Self::start_at(self.temp_dir, self.wal_path, mode).await
    }

    async fn start_at(temp_dir: TempDir, wal_path: PathBuf, mode: WalMode) -> Result<Self> {
        let store = ShardMap::new(DEFAULT_SHARD_COUNT);
        let wal = open_wal(&wal_path, mode, &store)?;

        let dispatcher = Dispatcher::new(store, wal);
        let listener = Listener::bind("127.0.0.1:0", dispatcher, DEFAULT_MAX_FRAME_BYTES).await?;
        let address = listener.local_addr()?.to_string();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn(listener.serve(shutdown_rx));

        Ok(Self {
            address,
            wal_path,
            temp_dir,
            shutdown: shutdown_tx,
            task,
        })
    }

    /// Address clients should dial, e.g. `127.0.0.1:54321`.
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Path to the WAL file backing this server, stable across [`restart`](Self::restart).
    pub fn wal_path(&self) -> &Path {
        &self.wal_path
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        let _ = self.shutdown.send(true);
        self.task.abort();
    }
}

fn open_wal(path: &Path, mode: WalMode, store: &ShardMap) -> Result<Arc<dyn Wal>> {
    let apply = |store: &ShardMap, record: wal::Record| match record.cmd {
        wal::Command::Write => {
            match BincodeCodec.unmarshal::<types::Record>(&record.value) {
                Ok(value) => store.set(&record.key, value),
                Err(err) => tracing::error!(error = %err, "failed to decode WAL record during test replay"),
            }
        }
        wal::Command::Delete => store.delete(&record.key),
    };

    let wal: Arc<dyn Wal> = match mode {
        WalMode::Noop => Arc::new(NoopWal),
        WalMode::Fsync => {
            let store = store.clone();
            Arc::new(FsyncWal::open(path, move |record| apply(&store, record))?)
        }
        WalMode::Interval(period) => {
            let store = store.clone();
            Arc::new(IntervalWal::open(path, period_or_default(period), move |record| {
                apply(&store, record)
            })?)
        }
    };
    Ok(wal)
}

fn period_or_default(period: Duration) -> Duration {
    if period.is_zero() {
        Duration::from_millis(50)
    } else {
        period
    }
}
