//! Error types for obschain
//!
//! Provides a unified error type for all operations.
//!
//! ## Propagation
//! - Detection-time errors (`MissingLinkageFields`) abort index construction.
//! - Traversal-time errors (`DanglingPointer`, `CorruptChain`) are scoped to
//!   the station being walked.
//! - `CorruptMerge` drops a single chain; previously merged chains survive.
//! - `OutOfRange` is recovered inside the walker by one refresh-and-retry.

use thiserror::Error;

/// Result type alias using ObsError
pub type Result<T> = std::result::Result<T, ObsError>;

/// Unified error type for obschain operations
#[derive(Debug, Error)]
pub enum ObsError {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // -------------------------------------------------------------------------
    // Record Store Errors
    // -------------------------------------------------------------------------
    #[error("Record corruption detected: {0}")]
    RecordCorruption(String),

    #[error("Record {recno} out of range (store length {len})")]
    OutOfRange { recno: u64, len: u64 },

    #[error("Unknown linkage field: {0}")]
    UnknownField(String),

    // -------------------------------------------------------------------------
    // Chain Errors
    // -------------------------------------------------------------------------
    #[error("No linkage fields found")]
    MissingLinkageFields,

    #[error("Dangling pointer in station {station}: record {recno} beyond store length {len}")]
    DanglingPointer { station: String, recno: u64, len: u64 },

    #[error("Corrupt chain in station {station}: {reason}")]
    CorruptChain { station: String, reason: String },

    #[error("Corrupt merge for station {station} (head {head}): {reason}")]
    CorruptMerge {
        station: String,
        head: i64,
        reason: String,
    },

    #[error("Station {station}: record {recno} breaks contiguous run (expected {expected})")]
    NonContiguous {
        station: String,
        recno: u64,
        expected: u64,
    },

    #[error("Chain builder already finalized")]
    BuilderFinalized,

    // -------------------------------------------------------------------------
    // Lookup Errors
    // -------------------------------------------------------------------------
    #[error("Station not found: {0}")]
    StationNotFound(String),

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Serialization error: {0}")]
    Serialization(String),

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<bincode::Error> for ObsError {
    fn from(err: bincode::Error) -> Self {
        ObsError::Serialization(err.to_string())
    }
}

impl ObsError {
    /// True for errors that describe a damaged index rather than an I/O fault
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            ObsError::DanglingPointer { .. }
                | ObsError::CorruptChain { .. }
                | ObsError::CorruptMerge { .. }
                | ObsError::RecordCorruption(_)
        )
    }
}
