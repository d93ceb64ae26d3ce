//! Record Store Module
//!
//! The append-only arena that chains point into. A record is addressed by
//! its record number (`recno`), assigned in append order starting at 0.
//!
//! ## Responsibilities
//! - Append immutable observation records
//! - Report the store length, which may grow between calls
//! - Hold per-record linkage fields (the only mutable bytes)
//! - Hold the append-only station table rows
//!
//! ## Record Frame Format
//! ```text
//! ┌─────────────────────────────────────────┐
//! │ Record 0                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Payload (bincode)│ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! ├─────────────────────────────────────────┤
//! │ Record 1                                │
//! │ ┌─────────┬─────────┬─────────────────┐ │
//! │ │ Len (4) │ CRC (4) │ Payload (bincode)│ │
//! │ └─────────┴─────────┴─────────────────┘ │
//! └─────────────────────────────────────────┘
//! ```
//!
//! Linkage fields live outside the frames, in fixed-width pointer arrays
//! (see [`crate::chain::codec`]), so the frames themselves are never
//! rewritten.

mod frame;
mod memory;
mod file;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::convention::{LinkField, Schema};
use crate::error::Result;
use crate::station::{StationKey, StationRow};

pub use file::FileStore;
pub use frame::{decode_frame, encode_frame, FrameRead, FRAME_HEADER_SIZE};
pub use memory::MemoryStore;

/// Record number: index of a record in the store
pub type RecNo = u64;

/// The contents of one observation record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPayload {
    /// Station this record belongs to
    pub station: StationKey,

    /// Observation time (unix millis)
    pub time: i64,

    /// Nominal (scheduled) time, when the producer supplies one
    pub nominal_time: Option<i64>,

    /// Opaque payload fields
    pub fields: BTreeMap<String, f64>,
}

impl RecordPayload {
    pub fn new(station: impl Into<StationKey>, time: i64) -> Self {
        Self {
            station: station.into(),
            time,
            nominal_time: None,
            fields: BTreeMap::new(),
        }
    }

    /// Builder method: set the nominal time
    pub fn nominal_time(mut self, nominal: i64) -> Self {
        self.nominal_time = Some(nominal);
        self
    }

    /// Builder method: add a payload field
    pub fn field(mut self, name: impl Into<String>, value: f64) -> Self {
        self.fields.insert(name.into(), value);
        self
    }
}

/// A record resolved from the store
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    pub recno: RecNo,
    pub payload: RecordPayload,
}

impl Record {
    pub fn station(&self) -> &StationKey {
        &self.payload.station
    }

    pub fn time(&self) -> i64 {
        self.payload.time
    }
}

/// Append-only record store
///
/// ## Concurrency
/// Shared-read, single-writer. All methods take `&self`; implementations
/// use interior locking. A handle caches the store length it last saw:
/// `record_count()` is cheap and may be stale, `refresh()` re-queries the
/// backing store.
pub trait RecordStore: Send + Sync {
    /// Fields present in this store
    fn schema(&self) -> &Schema;

    /// Last-known number of records
    fn record_count(&self) -> u64;

    /// Re-query the backing store and return the current length
    fn refresh(&self) -> Result<u64>;

    /// Read a record
    ///
    /// Fails with `OutOfRange` if `recno >= record_count()`.
    fn read(&self, recno: RecNo) -> Result<Record>;

    /// Append a record, returning its record number
    fn append(&self, payload: RecordPayload) -> Result<RecNo>;

    /// Read a per-record linkage field (`None` is the sentinel)
    fn read_link(&self, field: LinkField, recno: RecNo) -> Result<Option<RecNo>>;

    /// Overwrite one per-record linkage field
    fn write_link(&self, field: LinkField, recno: RecNo, target: Option<RecNo>) -> Result<()>;

    /// Overwrite a run of linkage fields starting at `start` from an
    /// encoded pointer array
    fn write_link_array(&self, field: LinkField, start: RecNo, pointers: &[u8]) -> Result<()>;

    /// All station rows, in the order they were appended
    fn station_rows(&self) -> Result<Vec<StationRow>>;

    /// Append station rows (never rewrites earlier rows)
    fn append_station_rows(&self, rows: &[StationRow]) -> Result<()>;

    /// Make appended data durable
    fn sync(&self) -> Result<()>;
}
