//! Write-ahead log for crash recovery and durability.
//!
//! Every mutation (`Set`/`Remove`) is appended to the log before the client
//! is acknowledged, so a restarted server can reconstruct in-memory state by
//! replaying the log in order.
//!
//! # Architecture
//!
//! - **Redo-only**: no UNDO or transaction rollback is needed; replay just
//!   re-applies each logged command.
//! - **Fixed binary record layout**: see [`Record`] — stable, self-framing,
//!   safe for sequential forward iteration.
//! - **Two flushing strategies**: [`FsyncWal`] syncs on every write
//!   (Variant A); [`IntervalWal`] batches writes and syncs on a timer
//!   (Variant B). [`NoopWal`] discards writes for tests that don't need
//!   durability.
//! - **Single file, append-only**: never rotated or compacted by this crate.
//!
//! # Example
//!
//! ```no_run
//! use wal::{Command, FsyncWal, Wal};
//!
//! let wal = FsyncWal::open("data/godis.wal", |_record| {
//!     // apply each replayed record to the store
//! }).unwrap();
//! wal.write(Command::Write, b"key", b"value").unwrap();
//! ```

#[cfg(test)]
mod tests;

use common::GodisResult;
use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::Path,
    sync::{Arc, Mutex},
    time::Duration,
};

/// The kind of mutation a WAL record represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    Write = 0,
    Delete = 1,
}

impl TryFrom<u8> for Command {
    type Error = io::Error;

    fn try_from(b: u8) -> Result<Self, Self::Error> {
        match b {
            0 => Ok(Command::Write),
            1 => Ok(Command::Delete),
            other => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown WAL command byte: {other}"),
            )),
        }
    }
}

/// One WAL entry: `key_len(8) value_len(8) cmd(1) key value`, all integers
/// big-endian. The 17-byte header is fixed; `key`/`value` follow inline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub cmd: Command,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

impl Record {
    fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&(self.key.len() as i64).to_be_bytes())?;
        w.write_all(&(self.value.len() as i64).to_be_bytes())?;
        w.write_all(&[self.cmd as u8])?;
        w.write_all(&self.key)?;
        w.write_all(&self.value)?;
        Ok(())
    }

    /// Reads one record. Returns `Ok(None)` on a clean end-of-file at a
    /// record boundary; a partial record (fewer than a full header, or a
    /// header whose key/value bytes are truncated) is a fatal `Err`.
    fn read_from<R: Read>(r: &mut R) -> io::Result<Option<Record>> {
        let mut key_len_buf = [0u8; 8];
        let n = read_fill(r, &mut key_len_buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < key_len_buf.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated WAL record: short key length",
            ));
        }
        let key_len = i64::from_be_bytes(key_len_buf) as usize;

        let mut value_len_buf = [0u8; 8];
        r.read_exact(&mut value_len_buf)?;
        let value_len = i64::from_be_bytes(value_len_buf) as usize;

        let mut cmd_buf = [0u8; 1];
        r.read_exact(&mut cmd_buf)?;
        let cmd = Command::try_from(cmd_buf[0])?;

        let mut key = vec![0u8; key_len];
        r.read_exact(&mut key)?;

        let mut value = vec![0u8; value_len];
        r.read_exact(&mut value)?;

        Ok(Some(Record { cmd, key, value }))
    }
}

/// Reads until `buf` is full or the underlying reader reports a clean EOF
/// (zero bytes read on the very first attempt). Distinguishes "nothing left
/// to read" from "stream ended mid-record".
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

/// Replays every record in `path` in order, invoking `replay` for each.
/// Returns the open file handle positioned at end-of-file, ready for
/// appending. A partial trailing record aborts recovery with an error.
fn open_and_replay(path: impl AsRef<Path>, mut replay: impl FnMut(Record)) -> GodisResult<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .open(path.as_ref())?;

    loop {
        match Record::read_from(&mut file)? {
            Some(record) => replay(record),
            None => break,
        }
    }
    file.seek(SeekFrom::End(0))?;
    Ok(file)
}

/// Durability interface implemented by each WAL flushing strategy.
///
/// `write` appends a logical `{cmd, key, value}` record. The `value` bytes
/// are already codec-encoded by the caller; the WAL never interprets them.
pub trait Wal: Send + Sync {
    fn write(&self, cmd: Command, key: &[u8], value: &[u8]) -> GodisResult<()>;
}

/// Discards every write. Used when durability is not required (tests, or
/// experimentation without a `--wal-path`).
#[derive(Default)]
pub struct NoopWal;

impl Wal for NoopWal {
    fn write(&self, _cmd: Command, _key: &[u8], _value: &[u8]) -> GodisResult<()> {
        Ok(())
    }
}

/// Variant A: appends under an exclusive lock and fsyncs before returning.
/// Gives per-request durability at the cost of latency.
pub struct FsyncWal {
    file: Mutex<File>,
}

impl FsyncWal {
    /// Opens (creating if absent) the WAL at `path`, replaying any existing
    /// records through `replay` before returning.
    pub fn open(path: impl AsRef<Path>, replay: impl FnMut(Record)) -> GodisResult<Self> {
        let file = open_and_replay(path, replay)?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }
}

impl Wal for FsyncWal {
    fn write(&self, cmd: Command, key: &[u8], value: &[u8]) -> GodisResult<()> {
        let record = Record {
            cmd,
            key: key.to_vec(),
            value: value.to_vec(),
        };
        let mut file = self.file.lock().expect("WAL file mutex poisoned");
        record.write_to(&mut *file)?;
        file.sync_all()?;
        Ok(())
    }
}

/// Variant B: appends to an in-memory buffer under a short lock and returns
/// immediately. A background task, ticking at `period`, swaps the buffer for
/// an empty one, writes every buffered record to the file in order, and
/// issues a single durability barrier.
///
/// Acknowledges writes before they reach disk: a crash between ticks loses
/// up to one period's worth of writes. This mirrors the design tension
/// spec'd for this variant — callers that need strict per-write durability
/// should use [`FsyncWal`] instead.
pub struct IntervalWal {
    pending: Arc<Mutex<Vec<Record>>>,
    task: tokio::task::JoinHandle<()>,
}

impl IntervalWal {
    /// Opens (creating if absent) the WAL at `path`, replaying any existing
    /// records through `replay`, then spawns the background flush task on
    /// the current Tokio runtime.
    pub fn open(
        path: impl AsRef<Path>,
        period: Duration,
        replay: impl FnMut(Record),
    ) -> GodisResult<Self> {
        let file = open_and_replay(path, replay)?;
        let file = Arc::new(Mutex::new(file));
        let pending: Arc<Mutex<Vec<Record>>> = Arc::new(Mutex::new(Vec::new()));

        let task = tokio::spawn(Self::monitor(Arc::clone(&pending), Arc::clone(&file), period));

        Ok(Self { pending, task })
    }

    async fn monitor(pending: Arc<Mutex<Vec<Record>>>, file: Arc<Mutex<File>>, period: Duration) {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // first tick fires immediately; skip it
        loop {
            ticker.tick().await;
            let batch = {
                let mut guard = pending.lock().expect("WAL pending buffer poisoned");
                std::mem::take(&mut *guard)
            };
            if batch.is_empty() {
                continue;
            }
            let mut file = file.lock().expect("WAL file mutex poisoned");
            for record in &batch {
                if let Err(err) = record.write_to(&mut *file) {
                    tracing::error!(error = %err, "interval WAL failed to write buffered record");
                }
            }
            if let Err(err) = file.sync_all() {
                tracing::error!(error = %err, "interval WAL failed to sync");
            }
        }
    }
}

impl Wal for IntervalWal {
    fn write(&self, cmd: Command, key: &[u8], value: &[u8]) -> GodisResult<()> {
        let record = Record {
            cmd,
            key: key.to_vec(),
            value: value.to_vec(),
        };
        self.pending
            .lock()
            .expect("WAL pending buffer poisoned")
            .push(record);
        Ok(())
    }
}

impl Drop for IntervalWal {
    fn drop(&mut self) {
        self.task.abort();
    }
}
