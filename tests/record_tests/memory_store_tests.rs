//! Tests for MemoryStore
//!
//! These tests verify:
//! - Sequential record numbers and read-back
//! - Out-of-range reads
//! - Stale handles and refresh
//! - Linkage fields (single writes and pointer arrays)
//! - Append-only station rows

use obschain::chain::codec::encode_pointer_array;
use obschain::convention::LinkField;
use obschain::station::StationRow;
use obschain::{Convention, Encoding, MemoryStore, ObsError, RecordPayload, RecordStore, Schema};

// =============================================================================
// Helper Functions
// =============================================================================

fn store(encoding: Encoding) -> MemoryStore {
    let convention = Convention::default();
    MemoryStore::new(Schema::for_encoding(&convention, encoding), &convention)
}

fn row(key: &str) -> StationRow {
    StationRow {
        key: key.into(),
        description: String::new(),
        location: None,
        first_child: Some(-1),
        last_child: Some(-1),
        num_children: None,
        inventory: None,
    }
}

// =============================================================================
// Append / Read Tests
// =============================================================================

#[test]
fn test_append_assigns_sequential_recnos() {
    let store = store(Encoding::Forward);

    for i in 0..5 {
        let recno = store.append(RecordPayload::new("A", i * 10)).unwrap();
        assert_eq!(recno, i as u64);
    }
    assert_eq!(store.record_count(), 5);
}

#[test]
fn test_read_returns_payload() {
    let store = store(Encoding::Forward);
    store
        .append(RecordPayload::new("A", 100).nominal_time(90).field("temp", 12.5))
        .unwrap();

    let record = store.read(0).unwrap();
    assert_eq!(record.recno, 0);
    assert_eq!(record.time(), 100);
    assert_eq!(record.payload.nominal_time, Some(90));
    assert_eq!(record.payload.fields.get("temp"), Some(&12.5));
}

#[test]
fn test_read_out_of_range() {
    let store = store(Encoding::Forward);
    store.append(RecordPayload::new("A", 1)).unwrap();

    match store.read(1) {
        Err(ObsError::OutOfRange { recno, len }) => {
            assert_eq!(recno, 1);
            assert_eq!(len, 1);
        }
        other => panic!("expected OutOfRange, got {:?}", other),
    }
}

// =============================================================================
// Handle Tests
// =============================================================================

#[test]
fn test_handle_is_stale_until_refresh() {
    let writer = store(Encoding::Forward);
    writer.append(RecordPayload::new("A", 1)).unwrap();

    let reader = writer.handle();
    assert_eq!(reader.record_count(), 1);

    writer.append(RecordPayload::new("A", 2)).unwrap();
    assert_eq!(reader.record_count(), 1);
    assert!(matches!(reader.read(1), Err(ObsError::OutOfRange { .. })));

    assert_eq!(reader.refresh().unwrap(), 2);
    assert_eq!(reader.read(1).unwrap().time(), 2);
}

// =============================================================================
// Link Tests
// =============================================================================

#[test]
fn test_links_start_as_sentinel() {
    let store = store(Encoding::Forward);
    store.append(RecordPayload::new("A", 1)).unwrap();

    assert_eq!(store.read_link(LinkField::NextChild, 0).unwrap(), None);
    assert_eq!(store.read_link(LinkField::PrevChild, 0).unwrap(), None);
}

#[test]
fn test_write_link() {
    let store = store(Encoding::Backward);
    store.append(RecordPayload::new("A", 1)).unwrap();
    store.append(RecordPayload::new("A", 2)).unwrap();

    store.write_link(LinkField::PrevChild, 1, Some(0)).unwrap();
    assert_eq!(store.read_link(LinkField::PrevChild, 1).unwrap(), Some(0));
}

#[test]
fn test_write_link_array() {
    let store = store(Encoding::Forward);
    for i in 0..4 {
        store.append(RecordPayload::new("A", i)).unwrap();
    }

    let pointers = encode_pointer_array(&[Some(3), None]);
    store
        .write_link_array(LinkField::NextChild, 1, &pointers)
        .unwrap();

    assert_eq!(store.read_link(LinkField::NextChild, 0).unwrap(), None);
    assert_eq!(store.read_link(LinkField::NextChild, 1).unwrap(), Some(3));
    assert_eq!(store.read_link(LinkField::NextChild, 2).unwrap(), None);
}

#[test]
fn test_write_link_array_past_end() {
    let store = store(Encoding::Forward);
    store.append(RecordPayload::new("A", 0)).unwrap();

    let pointers = encode_pointer_array(&[None, None]);
    let result = store.write_link_array(LinkField::NextChild, 0, &pointers);
    assert!(matches!(result, Err(ObsError::OutOfRange { .. })));
}

#[test]
fn test_contiguous_store_has_no_link_fields() {
    let store = store(Encoding::Contiguous);
    store.append(RecordPayload::new("A", 0)).unwrap();

    let result = store.read_link(LinkField::NextChild, 0);
    assert!(matches!(result, Err(ObsError::UnknownField(_))));
}

// =============================================================================
// Station Row Tests
// =============================================================================

#[test]
fn test_station_rows_append_in_order() {
    let store = store(Encoding::Forward);
    store.append_station_rows(&[row("A"), row("B")]).unwrap();
    store.append_station_rows(&[row("A")]).unwrap();

    let keys: Vec<String> = store
        .station_rows()
        .unwrap()
        .iter()
        .map(|r| r.key.to_string())
        .collect();
    assert_eq!(keys, vec!["A", "B", "A"]);
}
