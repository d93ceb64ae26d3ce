//! Chain Module
//!
//! Chains link one station's records together inside the flat record
//! array. Record numbers act as pointers into the store; `-1` ends a chain.
//!
//! ## Encodings
//! ```text
//! Forward     station.firstChild ──► r0 ──nextChild──► r2 ──► -1
//! Backward    station.lastChild  ──► r2 ──prevChild──► r0 ──► -1
//! Contiguous  station.firstChild = 5, numChildren = 3  →  r5, r6, r7
//! ```
//!
//! ## Components
//! - [`ChainCodec`]: encoding detection, `head`/`next` dispatch, pointer arrays
//! - [`ChainBuilder`]: write path, extends chains as records are appended
//! - [`ChainWalker`]: read path, lazy per-station traversal
//! - [`StationMerger`]: attaches additional chains to a recurring key

pub mod codec;
mod builder;
mod merger;
mod walker;

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ObsError;
use crate::record::{RecNo, Record};
use crate::station::Inventory;

pub use builder::{Appended, ChainBuilder, FinalizeReport, StationSummary};
pub use codec::{ChainCodec, SENTINEL};
pub use merger::{MergeOutcome, StationMerger};
pub use walker::{sort_chronological, ChainWalker, Observations};

/// Observations are records resolved through a chain
pub type Observation = Record;

/// Physical chain encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Encoding {
    /// `firstChild` per station, `nextChild` per record
    Forward,
    /// `lastChild` per station, `prevChild` per record
    Backward,
    /// `firstChild` + `numChildren` per station, no per-record field
    Contiguous,
}

impl fmt::Display for Encoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Encoding::Forward => write!(f, "forward"),
            Encoding::Backward => write!(f, "backward"),
            Encoding::Contiguous => write!(f, "contiguous"),
        }
    }
}

impl FromStr for Encoding {
    type Err = ObsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "forward" => Ok(Encoding::Forward),
            "backward" => Ok(Encoding::Backward),
            "contiguous" => Ok(Encoding::Contiguous),
            other => Err(ObsError::Config(format!("unknown encoding: {}", other))),
        }
    }
}

/// One chain of a station
#[derive(Debug, Clone, PartialEq)]
pub struct Chain {
    /// First record linked (oldest)
    pub first: Option<RecNo>,
    /// Last record linked (newest)
    pub last: Option<RecNo>,
    /// Number of records, when the store records it
    pub count: Option<u64>,
    /// Slot inventory, when one was built
    pub inventory: Option<Inventory>,
}

impl Chain {
    /// Record count from the count field, else from the inventory
    pub fn known_count(&self) -> Option<u64> {
        self.count
            .or_else(|| self.inventory.as_ref().map(Inventory::count))
    }
}

/// Inclusive observation-time window (unix millis)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeRange {
    pub start: i64,
    pub end: i64,
}

impl TimeRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: i64) -> bool {
        time >= self.start && time <= self.end
    }

    /// Grow the range to include `time`
    pub fn extend(&mut self, time: i64) {
        self.start = self.start.min(time);
        self.end = self.end.max(time);
    }
}

/// Cooperative cancellation check, consulted once per produced element
pub trait Cancellation {
    fn is_cancelled(&self) -> bool;
}

impl<F: Fn() -> bool> Cancellation for F {
    fn is_cancelled(&self) -> bool {
        self()
    }
}

/// Shareable cancellation flag
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

impl Cancellation for CancelToken {
    fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
