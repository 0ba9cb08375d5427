//! Tests for WAL crash recovery
//!
//! These tests verify:
//! - Reopen restores every record and the LSN counter
//! - Torn trailing frames end their segment cleanly and are repaired on open
//! - Complete frames with a bad checksum abort recovery

use std::fs::{self, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use segwal::{Payload, TxnState, Wal, WalConfig, WalError};
use tempfile::TempDir;
use uuid::Uuid;

// =============================================================================
// Helper Functions
// =============================================================================

fn quiet_config(dir: &Path) -> WalConfig {
    WalConfig::builder(dir).periodic_sync(false).build()
}

fn payload(i: u64) -> Payload {
    Payload::new().with("i", i as i64)
}

/// Write `count` records and close, returning the encoded size of one record
fn populate(dir: &Path, count: u64) -> u64 {
    let wal = Wal::open(quiet_config(dir)).unwrap();
    let txn = Uuid::from_u128(42);
    for i in 0..count {
        wal.append(payload(i), txn, TxnState::Begin).unwrap();
    }
    wal.close().unwrap();

    let size = fs::metadata(dir.join("00000000.log")).unwrap().len();
    size / count
}

fn flip_byte(path: &Path, offset: u64) {
    let mut file = OpenOptions::new().read(true).write(true).open(path).unwrap();
    let mut byte = [0u8; 1];
    file.seek(SeekFrom::Start(offset)).unwrap();
    std::io::Read::read_exact(&mut file, &mut byte).unwrap();
    byte[0] ^= 0x40;
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(&byte).unwrap();
    file.sync_all().unwrap();
}

// =============================================================================
// End-to-End Tests
// =============================================================================

#[test]
fn test_begin_payload_commit_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let txn = Uuid::new_v4();
    let kv = Payload::new().with("k", "v");

    {
        let wal = Wal::open(WalConfig::builder(temp.path()).build()).unwrap();
        assert_eq!(wal.append(Payload::new(), txn, TxnState::Begin).unwrap(), 0);
        assert_eq!(wal.append(kv.clone(), txn, TxnState::Begin).unwrap(), 1);
        assert_eq!(wal.append(Payload::new(), txn, TxnState::Commit).unwrap(), 2);
        wal.close().unwrap();
    }

    let wal = Wal::open(WalConfig::builder(temp.path()).build()).unwrap();
    let recovery = wal.recover().unwrap();
    let records: Vec<_> = recovery.records_for(txn).collect();

    assert_eq!(records.len(), 3);
    assert_eq!(
        records.iter().map(|r| r.lsn).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
    assert_eq!(
        records.iter().map(|r| r.state).collect::<Vec<_>>(),
        vec![TxnState::Begin, TxnState::Begin, TxnState::Commit]
    );
    assert_eq!(records[0].payload, Payload::new());
    assert_eq!(records[1].payload, kv);
    assert_eq!(records[1].payload.get("k").and_then(|v| v.as_str()), Some("v"));
    assert_eq!(records[2].payload, Payload::new());

    assert_eq!(recovery.latest_states().get(&txn), Some(&TxnState::Commit));
    assert!(recovery.in_flight().is_empty());
    assert_eq!(recovery.report.records_recovered, 3);
    assert_eq!(recovery.report.last_lsn, Some(2));
    assert!(!recovery.report.torn_tail);
}

#[test]
fn test_lsn_continues_after_reopen() {
    let temp = TempDir::new().unwrap();
    populate(temp.path(), 5);

    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    assert_eq!(wal.next_lsn(), 5);
    assert_eq!(wal.append(payload(5), Uuid::new_v4(), TxnState::Begin).unwrap(), 5);

    let lsns: Vec<u64> = wal.read_entries().unwrap().iter().map(|r| r.lsn).collect();
    assert_eq!(lsns, (0..6).collect::<Vec<_>>());
}

#[test]
fn test_reopen_across_rotated_segments() {
    let temp = TempDir::new().unwrap();
    let config = || {
        WalConfig::builder(temp.path())
            .periodic_sync(false)
            .rotation_threshold(300)
            .max_segments(100)
            .build()
    };

    {
        let wal = Wal::open(config()).unwrap();
        for i in 0..25 {
            wal.append(payload(i), Uuid::new_v4(), TxnState::Commit).unwrap();
        }
        wal.close().unwrap();
    }

    let wal = Wal::open(config()).unwrap();
    let recovery = wal.recover().unwrap();
    assert!(recovery.report.segments_scanned > 1);
    assert_eq!(recovery.records.len(), 25);
    assert_eq!(wal.next_lsn(), 25);

    // Appends continue in the highest segment
    let last_segment = *wal.segments().unwrap().last().unwrap();
    wal.append(payload(25), Uuid::new_v4(), TxnState::Begin).unwrap();
    assert!(*wal.segments().unwrap().last().unwrap() >= last_segment);
}

#[test]
fn test_in_flight_transactions() {
    let temp = TempDir::new().unwrap();
    let committed = Uuid::from_u128(1);
    let aborted = Uuid::from_u128(2);
    let open = Uuid::from_u128(3);

    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    for txn in [committed, aborted, open] {
        wal.append(Payload::new(), txn, TxnState::Begin).unwrap();
    }
    wal.append(Payload::new(), committed, TxnState::Commit).unwrap();
    wal.append(Payload::new(), aborted, TxnState::Abort).unwrap();

    let recovery = wal.recover().unwrap();
    let states = recovery.latest_states();
    assert_eq!(states[&committed], TxnState::Commit);
    assert_eq!(states[&aborted], TxnState::Abort);
    assert_eq!(states[&open], TxnState::Begin);
    assert_eq!(recovery.in_flight(), vec![open]);
}

// =============================================================================
// Torn Write Tests
// =============================================================================

#[test]
fn test_torn_tail_is_tolerated() {
    let temp = TempDir::new().unwrap();
    let record_size = populate(temp.path(), 4);
    let path = temp.path().join("00000000.log");

    // Chop part of the last frame, as a crash mid-write would
    let full = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - record_size / 2).unwrap();
    drop(file);

    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    let lsns: Vec<u64> = wal.read_entries().unwrap().iter().map(|r| r.lsn).collect();
    assert_eq!(lsns, vec![0, 1, 2]);
    assert_eq!(wal.next_lsn(), 3);

    // The torn bytes were dropped on open
    assert_eq!(fs::metadata(&path).unwrap().len(), 3 * record_size);
}

#[test]
fn test_appends_after_torn_tail_are_recoverable() {
    let temp = TempDir::new().unwrap();
    let record_size = populate(temp.path(), 3);
    let path = temp.path().join("00000000.log");

    let full = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(full - 1).unwrap();
    drop(file);

    {
        let wal = Wal::open(quiet_config(temp.path())).unwrap();
        assert_eq!(wal.append(payload(9), Uuid::new_v4(), TxnState::Commit).unwrap(), 2);
        wal.close().unwrap();
    }

    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    let recovery = wal.recover().unwrap();
    assert!(!recovery.report.torn_tail);
    let entries = recovery.records;
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[2].payload, payload(9));
    assert_eq!(fs::metadata(&path).unwrap().len(), 3 * record_size);
}

#[test]
fn test_torn_length_prefix_is_tolerated() {
    let temp = TempDir::new().unwrap();
    populate(temp.path(), 2);
    let path = temp.path().join("00000000.log");

    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0, 0]).unwrap();
    drop(file);

    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    assert_eq!(wal.read_entries().unwrap().len(), 2);
}

#[test]
fn test_torn_historical_segment_ends_only_that_segment() {
    let temp = TempDir::new().unwrap();
    let config = || {
        WalConfig::builder(temp.path())
            .periodic_sync(false)
            .rotation_threshold(300)
            .max_segments(100)
            .build()
    };

    {
        let wal = Wal::open(config()).unwrap();
        for i in 0..25 {
            wal.append(payload(i), Uuid::new_v4(), TxnState::Commit).unwrap();
        }
        wal.close().unwrap();
    }

    // Leave half a length prefix behind the last frame of the oldest segment
    let oldest = temp.path().join("00000000.log");
    let sealed_len = fs::metadata(&oldest).unwrap().len();
    let mut file = OpenOptions::new().append(true).open(&oldest).unwrap();
    file.write_all(&[0, 0]).unwrap();
    drop(file);

    let wal = Wal::open(config()).unwrap();
    let recovery = wal.recover().unwrap();
    assert!(recovery.report.torn_tail);
    let lsns: Vec<u64> = recovery.records.iter().map(|r| r.lsn).collect();
    assert_eq!(lsns, (0..25).collect::<Vec<_>>());
    assert_eq!(wal.next_lsn(), 25);

    // Only the active segment is repaired on open
    assert_eq!(fs::metadata(&oldest).unwrap().len(), sealed_len + 2);
}

// =============================================================================
// Corruption Tests
// =============================================================================

#[test]
fn test_corrupt_middle_frame_fails_open() {
    let temp = TempDir::new().unwrap();
    let record_size = populate(temp.path(), 3);
    let path = temp.path().join("00000000.log");

    // Damage the LSN of the second (non-trailing) frame
    flip_byte(&path, record_size + 10);

    let err = Wal::open(quiet_config(temp.path())).err().unwrap();
    assert!(err.is_corruption(), "expected corruption, got {:?}", err);
}

#[test]
fn test_corruption_after_open_fails_recover() {
    let temp = TempDir::new().unwrap();
    let wal = Wal::open(quiet_config(temp.path())).unwrap();
    let txn = Uuid::new_v4();
    for i in 0..3 {
        wal.append(payload(i), txn, TxnState::Begin).unwrap();
    }
    wal.sync().unwrap();

    let path = temp.path().join("00000000.log");
    let record_size = fs::metadata(&path).unwrap().len() / 3;
    flip_byte(&path, record_size + record_size - 1);

    match wal.recover() {
        Err(WalError::Corruption { offset, .. }) => assert_eq!(offset, record_size),
        other => panic!("expected corruption, got {:?}", other.map(|r| r.report)),
    }
    assert!(matches!(wal.read_entries(), Err(WalError::Corruption { .. })));
}

#[test]
fn test_corruption_in_historical_segment_fails_recover() {
    let temp = TempDir::new().unwrap();
    let config = || {
        WalConfig::builder(temp.path())
            .periodic_sync(false)
            .rotation_threshold(200)
            .max_segments(100)
            .build()
    };
    {
        let wal = Wal::open(config()).unwrap();
        for i in 0..10 {
            wal.append(payload(i), Uuid::new_v4(), TxnState::Begin).unwrap();
        }
        wal.close().unwrap();
    }

    flip_byte(&temp.path().join("00000000.log"), 20);

    assert!(Wal::open(config()).err().unwrap().is_corruption());
}
