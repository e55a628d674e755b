use super::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use tempfile::tempdir;

#[test]
fn noop_wal_accepts_every_write() {
    let wal = NoopWal;
    wal.write(Command::Write, b"k", b"v").unwrap();
    wal.write(Command::Delete, b"k", b"").unwrap();
}

#[test]
fn fsync_wal_append_then_replay_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    {
        let wal = FsyncWal::open(&path, |_| panic!("fresh file should replay nothing")).unwrap();
        wal.write(Command::Write, b"alpha", b"1").unwrap();
        wal.write(Command::Write, b"beta", b"2").unwrap();
        wal.write(Command::Delete, b"alpha", b"").unwrap();
    }

    let mut replayed = Vec::new();
    let _wal = FsyncWal::open(&path, |record| replayed.push(record)).unwrap();

    assert_eq!(replayed.len(), 3);
    assert_eq!(replayed[0].cmd, Command::Write);
    assert_eq!(replayed[0].key, b"alpha");
    assert_eq!(replayed[0].value, b"1");
    assert_eq!(replayed[1].key, b"beta");
    assert_eq!(replayed[2].cmd, Command::Delete);
    assert_eq!(replayed[2].key, b"alpha");
}

#[test]
fn fsync_wal_can_append_after_replay() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    {
        let wal = FsyncWal::open(&path, |_| {}).unwrap();
        wal.write(Command::Write, b"first", b"1").unwrap();
    }

    let count = AtomicUsize::new(0);
    let wal = FsyncWal::open(&path, |_| {
        count.fetch_add(1, Ordering::SeqCst);
    })
    .unwrap();
    assert_eq!(count.load(Ordering::SeqCst), 1);

    wal.write(Command::Write, b"second", b"2").unwrap();

    let mut replayed = Vec::new();
    let _wal = FsyncWal::open(&path, |record| replayed.push(record)).unwrap();
    assert_eq!(replayed.len(), 2);
    assert_eq!(replayed[1].key, b"second");
}

#[test]
fn empty_key_or_value_round_trips() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    {
        let wal = FsyncWal::open(&path, |_| {}).unwrap();
        wal.write(Command::Write, b"", b"").unwrap();
    }

    let mut replayed = Vec::new();
    let _wal = FsyncWal::open(&path, |record| replayed.push(record)).unwrap();
    assert_eq!(replayed.len(), 1);
    assert!(replayed[0].key.is_empty());
    assert!(replayed[0].value.is_empty());
}

#[test]
fn replay_on_missing_file_creates_it_and_sees_no_records() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nonexistent.wal");

    let mut replayed = Vec::new();
    let _wal = FsyncWal::open(&path, |record| replayed.push(record)).unwrap();
    assert!(replayed.is_empty());
    assert!(path.exists());
}

#[test]
fn truncated_tail_record_aborts_recovery() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    {
        let wal = FsyncWal::open(&path, |_| {}).unwrap();
        wal.write(Command::Write, b"whole", b"record").unwrap();
    }

    // Append a partial header — fewer than 8 bytes of key_len.
    {
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[0, 0, 0]).unwrap();
    }

    let result = FsyncWal::open(&path, |_| {});
    assert!(result.is_err());
}

#[tokio::test(start_paused = true)]
async fn interval_wal_flushes_buffered_writes_on_tick() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    let wal = IntervalWal::open(&path, Duration::from_millis(50), |_| {}).unwrap();
    wal.write(Command::Write, b"queued", b"value").unwrap();

    tokio::time::advance(Duration::from_millis(200)).await;
    tokio::task::yield_now().await;

    drop(wal);

    let mut replayed = Vec::new();
    let _wal = FsyncWal::open(&path, |record| replayed.push(record)).unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].key, b"queued");
}

#[tokio::test]
async fn interval_wal_replays_existing_records_on_open() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("godis.wal");

    {
        let wal = FsyncWal::open(&path, |_| {}).unwrap();
        wal.write(Command::Write, b"existing", b"1").unwrap();
    }

    let mut replayed = Vec::new();
    let _wal = IntervalWal::open(&path, Duration::from_secs(60), |record| {
        replayed.push(record);
    })
    .unwrap();
    assert_eq!(replayed.len(), 1);
    assert_eq!(replayed[0].key, b"existing");
}
