//! Tests for ChainCodec
//!
//! These tests verify:
//! - Encoding detection order and failure
//! - Detection through a non-default naming convention
//! - Pointer encoding and pointer arrays
//! - Decoding station rows into chains

use obschain::chain::codec::{decode_link, decode_pointer_array, encode_pointer_array};
use obschain::chain::{Chain, ChainCodec};
use obschain::station::StationRow;
use obschain::{Convention, Encoding, MemoryStore, ObsError, Schema};

// =============================================================================
// Helper Functions
// =============================================================================

fn row(first: Option<i64>, last: Option<i64>, n: Option<i64>) -> StationRow {
    StationRow {
        key: "A".into(),
        description: String::new(),
        location: None,
        first_child: first,
        last_child: last,
        num_children: n,
        inventory: None,
    }
}

fn codec(encoding: Encoding) -> ChainCodec {
    ChainCodec::new(encoding, Convention::default())
}

// =============================================================================
// Detection Tests
// =============================================================================

#[test]
fn test_detect_each_encoding() {
    let convention = Convention::default();
    for encoding in [Encoding::Forward, Encoding::Backward, Encoding::Contiguous] {
        let schema = Schema::for_encoding(&convention, encoding);
        let codec = ChainCodec::detect(&schema, &convention).unwrap();
        assert_eq!(codec.encoding(), encoding);
    }
}

#[test]
fn test_detect_prefers_contiguous() {
    let convention = Convention::default();
    let mut schema = Schema::for_encoding(&convention, Encoding::Forward);
    schema.station_fields.insert(convention.num_children.clone());

    let codec = ChainCodec::detect(&schema, &convention).unwrap();
    assert_eq!(codec.encoding(), Encoding::Contiguous);
}

#[test]
fn test_detect_forward_without_backward_fields() {
    let convention = Convention::default();
    let mut schema = Schema::default();
    schema.station_fields.insert(convention.first_child.clone());
    schema.record_fields.insert(convention.next_child.clone());

    let codec = ChainCodec::detect(&schema, &convention).unwrap();
    assert_eq!(codec.encoding(), Encoding::Forward);
}

#[test]
fn test_detect_half_pair_is_missing() {
    let convention = Convention::default();
    let mut schema = Schema::default();
    schema.station_fields.insert(convention.last_child.clone());
    schema.record_fields.insert(convention.next_child.clone());

    let result = ChainCodec::detect(&schema, &convention);
    assert!(matches!(result, Err(ObsError::MissingLinkageFields)));
}

#[test]
fn test_detect_empty_schema() {
    let result = ChainCodec::detect(&Schema::default(), &Convention::default());
    assert!(matches!(result, Err(ObsError::MissingLinkageFields)));
}

#[test]
fn test_detect_with_custom_convention() {
    let convention = Convention {
        first_child: "first_obs".to_string(),
        next_child: "next_obs".to_string(),
        ..Convention::default()
    };
    let mut schema = Schema::default();
    schema.station_fields.insert("first_obs".to_string());
    schema.record_fields.insert("next_obs".to_string());

    let codec = ChainCodec::detect(&schema, &convention).unwrap();
    assert_eq!(codec.encoding(), Encoding::Forward);

    // Same schema under the default names has no linkage
    let result = ChainCodec::detect(&schema, &Convention::default());
    assert!(matches!(result, Err(ObsError::MissingLinkageFields)));
}

// =============================================================================
// Pointer Tests
// =============================================================================

#[test]
fn test_decode_link_values() {
    assert_eq!(decode_link(-1).unwrap(), None);
    assert_eq!(decode_link(0).unwrap(), Some(0));
    assert_eq!(decode_link(42).unwrap(), Some(42));
    assert!(matches!(decode_link(-7), Err(ObsError::RecordCorruption(_))));
}

#[test]
fn test_pointer_array_layout() {
    let bytes = encode_pointer_array(&[Some(2), None]);
    assert_eq!(bytes.len(), 16);
    assert_eq!(&bytes[..8], &2i64.to_le_bytes());
    assert_eq!(&bytes[8..], &(-1i64).to_le_bytes());

    assert_eq!(decode_pointer_array(&bytes).unwrap(), vec![Some(2), None]);
}

#[test]
fn test_pointer_array_rejects_partial_pointer() {
    let result = decode_pointer_array(&[0u8; 12]);
    assert!(matches!(result, Err(ObsError::RecordCorruption(_))));
}

// =============================================================================
// Row Decoding Tests
// =============================================================================

#[test]
fn test_forward_row() {
    let chain = codec(Encoding::Forward)
        .chain_from_row(&row(Some(3), Some(9), None))
        .unwrap();
    assert_eq!(chain.first, Some(3));
    assert_eq!(chain.last, Some(9));
    assert_eq!(chain.count, None);
    assert_eq!(codec(Encoding::Forward).head(&chain), Some(3));
}

#[test]
fn test_backward_row_starts_at_last() {
    let codec = codec(Encoding::Backward);
    let chain = codec.chain_from_row(&row(None, Some(9), None)).unwrap();
    assert_eq!(codec.head(&chain), Some(9));
}

#[test]
fn test_row_missing_required_column() {
    let result = codec(Encoding::Forward).chain_from_row(&row(None, Some(1), None));
    assert!(matches!(result, Err(ObsError::RecordCorruption(_))));

    let result = codec(Encoding::Contiguous).chain_from_row(&row(Some(1), None, None));
    assert!(matches!(result, Err(ObsError::RecordCorruption(_))));
}

#[test]
fn test_contiguous_row_derives_last() {
    let chain = codec(Encoding::Contiguous)
        .chain_from_row(&row(Some(5), None, Some(3)))
        .unwrap();
    assert_eq!(chain.first, Some(5));
    assert_eq!(chain.last, Some(7));
    assert_eq!(chain.count, Some(3));
}

#[test]
fn test_contiguous_row_with_zero_records() {
    let chain = codec(Encoding::Contiguous)
        .chain_from_row(&row(Some(-1), None, Some(0)))
        .unwrap();
    assert_eq!(chain.first, None);
    assert_eq!(chain.count, Some(0));
}

#[test]
fn test_contiguous_row_with_negative_count() {
    let result = codec(Encoding::Contiguous).chain_from_row(&row(Some(0), None, Some(-2)));
    assert!(matches!(result, Err(ObsError::RecordCorruption(_))));
}

#[test]
fn test_contiguous_next_is_arithmetic() {
    let convention = Convention::default();
    let store = MemoryStore::new(
        Schema::for_encoding(&convention, Encoding::Contiguous),
        &convention,
    );
    let codec = codec(Encoding::Contiguous);
    let chain = Chain {
        first: Some(5),
        last: Some(7),
        count: Some(3),
        inventory: None,
    };

    // The store is empty: next() must not read it
    assert_eq!(codec.next(&store, &chain, 5).unwrap(), Some(6));
    assert_eq!(codec.next(&store, &chain, 6).unwrap(), Some(7));
    assert_eq!(codec.next(&store, &chain, 7).unwrap(), None);
}
