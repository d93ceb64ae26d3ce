//! Tests for FileStore
//!
//! These tests verify:
//! - Records, links and station rows survive reopen
//! - A store cannot be created twice in one directory
//! - A torn trailing frame is ignored, then overwritten by the next append
//! - A damaged frame in the middle of the log blocks appends and is never cut off
//! - A reader handle sees another handle's appends after refresh

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use obschain::config::SyncStrategy;
use obschain::convention::LinkField;
use obschain::station::StationRow;
use obschain::{
    Config, Convention, Encoding, FileStore, ObsError, RecordPayload, RecordStore, Schema,
};
use tempfile::TempDir;

// =============================================================================
// Helper Functions
// =============================================================================

fn create(dir: &Path, encoding: Encoding) -> FileStore {
    let convention = Convention::default();
    FileStore::create(
        dir,
        Schema::for_encoding(&convention, encoding),
        &convention,
        SyncStrategy::EveryWrite,
    )
    .unwrap()
}

fn reopen(dir: &Path) -> FileStore {
    FileStore::open(dir, &Convention::default(), SyncStrategy::EveryWrite).unwrap()
}

// =============================================================================
// Persistence Tests
// =============================================================================

#[test]
fn test_records_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = create(temp.path(), Encoding::Forward);
        for i in 0..10 {
            store
                .append(RecordPayload::new(i % 3, i * 1000).field("v", i as f64))
                .unwrap();
        }
    }

    let store = reopen(temp.path());
    assert_eq!(store.record_count(), 10);
    let record = store.read(7).unwrap();
    assert_eq!(record.time(), 7000);
    assert_eq!(record.payload.fields.get("v"), Some(&7.0));
}

#[test]
fn test_schema_survives_reopen() {
    let temp = TempDir::new().unwrap();
    let schema = create(temp.path(), Encoding::Contiguous).schema().clone();

    let store = reopen(temp.path());
    assert_eq!(store.schema(), &schema);
}

#[test]
fn test_links_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = create(temp.path(), Encoding::Backward);
        store.append(RecordPayload::new("A", 1)).unwrap();
        store.append(RecordPayload::new("A", 2)).unwrap();
        store.write_link(LinkField::PrevChild, 1, Some(0)).unwrap();
        store.sync().unwrap();
    }

    let store = reopen(temp.path());
    assert_eq!(store.read_link(LinkField::PrevChild, 0).unwrap(), None);
    assert_eq!(store.read_link(LinkField::PrevChild, 1).unwrap(), Some(0));
}

#[test]
fn test_station_rows_survive_reopen() {
    let temp = TempDir::new().unwrap();
    {
        let store = create(temp.path(), Encoding::Forward);
        store.append(RecordPayload::new("A", 1)).unwrap();
        let row = StationRow {
            key: "A".into(),
            description: "pier".to_string(),
            location: None,
            first_child: Some(0),
            last_child: Some(0),
            num_children: None,
            inventory: None,
        };
        store.append_station_rows(&[row.clone(), row]).unwrap();
    }

    let rows = reopen(temp.path()).station_rows().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].description, "pier");
    assert_eq!(rows[1].first_child, Some(0));
}

#[test]
fn test_create_twice_fails() {
    let temp = TempDir::new().unwrap();
    create(temp.path(), Encoding::Forward);

    let convention = Convention::default();
    let result = FileStore::create(
        temp.path(),
        Schema::for_encoding(&convention, Encoding::Forward),
        &convention,
        SyncStrategy::EveryWrite,
    );
    assert!(matches!(result, Err(ObsError::Config(_))));
}

#[test]
fn test_open_or_create_keeps_existing_schema() {
    let temp = TempDir::new().unwrap();
    let backward = create(temp.path(), Encoding::Backward).schema().clone();

    let config = Config::builder()
        .data_dir(temp.path())
        .encoding(Encoding::Contiguous)
        .build();
    let store = FileStore::open_or_create(&config).unwrap();
    assert_eq!(store.schema(), &backward);
}

// =============================================================================
// Torn Tail Tests
// =============================================================================

#[test]
fn test_torn_tail_is_ignored_and_overwritten() {
    let temp = TempDir::new().unwrap();
    {
        let store = create(temp.path(), Encoding::Forward);
        for i in 0..3 {
            store.append(RecordPayload::new("A", i)).unwrap();
        }
    }

    // Half a frame header, as left by a crash mid-append
    let mut log = OpenOptions::new()
        .append(true)
        .open(temp.path().join("records.log"))
        .unwrap();
    log.write_all(&[0x20, 0x00, 0x00, 0x00, 0x01]).unwrap();
    drop(log);

    let store = reopen(temp.path());
    assert_eq!(store.record_count(), 3);

    let recno = store.append(RecordPayload::new("A", 3)).unwrap();
    assert_eq!(recno, 3);
    drop(store);

    let store = reopen(temp.path());
    assert_eq!(store.record_count(), 4);
    assert_eq!(store.read(3).unwrap().time(), 3);
}

#[test]
fn test_damaged_frame_refuses_append_and_keeps_log() {
    let temp = TempDir::new().unwrap();
    {
        let store = create(temp.path(), Encoding::Forward);
        for i in 0..5 {
            store.append(RecordPayload::new("A", i)).unwrap();
        }
    }

    // Flip the first payload byte of record 1
    let path = temp.path().join("records.log");
    let mut bytes = std::fs::read(&path).unwrap();
    let first_len = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
    let damaged = 8 + first_len + 8;
    bytes[damaged] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();
    let before = bytes.len() as u64;

    let store = reopen(temp.path());
    assert_eq!(store.record_count(), 1);
    assert_eq!(store.read(0).unwrap().time(), 0);

    let result = store.append(RecordPayload::new("A", 5));
    assert!(matches!(result, Err(ObsError::RecordCorruption(_))));
    assert_eq!(store.record_count(), 1);
    drop(store);

    assert_eq!(std::fs::metadata(&path).unwrap().len(), before);

    // Repairing the byte brings every record back
    bytes[damaged] ^= 0xFF;
    std::fs::write(&path, &bytes).unwrap();
    let store = reopen(temp.path());
    assert_eq!(store.record_count(), 5);
    assert_eq!(store.read(4).unwrap().time(), 4);
}

// =============================================================================
// Multi-Handle Tests
// =============================================================================

#[test]
fn test_reader_sees_appends_after_refresh() {
    let temp = TempDir::new().unwrap();
    let writer = create(temp.path(), Encoding::Forward);
    writer.append(RecordPayload::new("A", 0)).unwrap();

    let reader = reopen(temp.path());
    assert_eq!(reader.record_count(), 1);

    writer.append(RecordPayload::new("A", 1)).unwrap();
    writer.append(RecordPayload::new("B", 2)).unwrap();

    assert_eq!(reader.record_count(), 1);
    assert!(matches!(reader.read(2), Err(ObsError::OutOfRange { .. })));

    assert_eq!(reader.refresh().unwrap(), 3);
    assert_eq!(reader.read(2).unwrap().time(), 2);
}

#[test]
fn test_buffered_sync_strategy() {
    let temp = TempDir::new().unwrap();
    let convention = Convention::default();
    {
        let store = FileStore::create(
            temp.path(),
            Schema::for_encoding(&convention, Encoding::Forward),
            &convention,
            SyncStrategy::EveryNEntries { count: 4 },
        )
        .unwrap();
        for i in 0..10 {
            store.append(RecordPayload::new("A", i)).unwrap();
        }
        store.sync().unwrap();
    }

    assert_eq!(reopen(temp.path()).record_count(), 10);
}
