//! TCP server for the in-memory key-value store.
//!
//! Binds a listener, replays the write-ahead log to rebuild in-memory
//! state, then accepts connections until interrupted.

use anyhow::Result;
use clap::Parser;
use common::{Config, WalMode};
use server::dispatcher::Dispatcher;
use server::listener::Listener;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use store::ShardMap;
use tokio::signal;
use tokio::sync::watch;
use types::Record;
use wal::{Command, FsyncWal, IntervalWal, NoopWal, Wal};

#[derive(Parser, Debug)]
#[command(name = "godis-server", about = "TCP server for an in-memory key-value store")]
struct Args {
    /// Address to bind the TCP listener to.
    #[arg(long, default_value = "localhost:4321")]
    endpoint: String,

    /// Path to the write-ahead log file.
    #[arg(long, default_value = "./godis.wal")]
    wal_path: PathBuf,

    /// WAL durability mode: "fsync", "interval", or "noop".
    #[arg(long, default_value = "fsync")]
    wal_mode: String,

    /// Flush period in milliseconds, used only when --wal-mode=interval.
    #[arg(long, default_value_t = 200)]
    wal_interval_ms: u64,

    /// Number of independent shards in the concurrent map.
    #[arg(long, default_value_t = 32)]
    shard_count: usize,

    /// Maximum accepted frame size on the wire, in bytes.
    #[arg(long, default_value_t = 64 * 1024 * 1024)]
    max_frame_bytes: u32,
}

impl Args {
    fn wal_mode(&self) -> Result<WalMode> {
        match self.wal_mode.as_str() {
            "fsync" => Ok(WalMode::Fsync),
            "noop" => Ok(WalMode::Noop),
            "interval" => Ok(WalMode::Interval(Duration::from_millis(self.wal_interval_ms))),
            other => anyhow::bail!("unknown --wal-mode {other:?}, expected fsync|interval|noop"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::init_tracing();
    let args = Args::parse();

    let config = Config::builder()
        .endpoint(args.endpoint.clone())
        .wal_path(args.wal_path.clone())
        .wal_mode(args.wal_mode()?)
        .shard_count(args.shard_count)
        .max_frame_bytes(args.max_frame_bytes)
        .build();

    let store = ShardMap::new(config.shard_count);
    let wal = open_wal(&config, &store)?;

    let dispatcher = Dispatcher::new(store, wal);
    let listener = Listener::bind(&config.endpoint, dispatcher, config.max_frame_bytes).await?;
    let bound_addr = listener.local_addr()?;

    tracing::info!(addr = %bound_addr, wal_path = %config.wal_path.display(), "godis server listening");

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let serve_task = tokio::spawn(listener.serve(shutdown_rx));

    signal::ctrl_c().await?;
    tracing::info!("shutdown signal received");
    let _ = shutdown_tx.send(true);
    serve_task.await?;

    Ok(())
}

/// Opens the configured WAL variant, replaying its contents into `store`
/// before the listener starts accepting connections.
fn open_wal(config: &Config, store: &ShardMap) -> Result<Arc<dyn Wal>> {
    let replay = |store: &ShardMap, record: wal::Record| {
        apply_replayed_record(store, record);
    };

    let wal: Arc<dyn Wal> = match config.wal_mode {
        WalMode::Noop => Arc::new(NoopWal),
        WalMode::Fsync => {
            let store = store.clone();
            Arc::new(FsyncWal::open(&config.wal_path, move |record| {
                replay(&store, record)
            })?)
        }
        WalMode::Interval(period) => {
            let store = store.clone();
            Arc::new(IntervalWal::open(&config.wal_path, period, move |record| {
                replay(&store, record)
            })?)
        }
    };
    Ok(wal)
}

/// Reconstructs a single store mutation from a replayed WAL record. `Write`
/// records carry a codec-encoded `Record` as their value; `Delete` records
/// carry no value.
fn apply_replayed_record(store: &ShardMap, record: wal::Record) {
    use protocol::{BincodeCodec, Codec};
    match record.cmd {
        Command::Write => match BincodeCodec.unmarshal::<Record>(&record.value) {
            Ok(value) => store.set(&record.key, value),
            Err(err) => tracing::error!(error = %err, "failed to decode WAL record during replay, skipping"),
        },
        Command::Delete => store.delete(&record.key),
    }
}
