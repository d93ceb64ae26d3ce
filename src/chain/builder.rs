//! Chain builder
//!
//! Attaches appended records to their station's chain and materializes
//! the linkage at finalize.
//!
//! ## Two-phase linking
//! A record's `nextChild` is only known once the station's *next* record
//! exists, so forward edges are collected while appending and written at
//! [`ChainBuilder::finalize`], one pointer array per run of adjacent
//! sources. Only slots this builder linked are written: records appended
//! by other writers in between keep their own pointers, and chain tails
//! keep the sentinel written at append. Backward links are known at append
//! time and returned to the caller in [`Appended`].
//!
//! ## States
//! ```text
//!   Empty ──append──► Building ──finalize──► Finalized
//!     └───────────────finalize──────────────────┘
//! ```
//! Any `append`, `register` or `finalize` after `Finalized` fails with
//! `BuilderFinalized`.

use std::collections::HashMap;

use crate::config::InventoryConfig;
use crate::convention::LinkField;
use crate::error::{ObsError, Result};
use crate::record::{RecNo, RecordStore};
use crate::station::{BoundingBox, Inventory, StationInfo, StationKey, StationRow};

use super::codec::encode_pointer_array;
use super::{ChainCodec, Encoding, TimeRange};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BuilderState {
    Empty,
    Building,
    Finalized,
}

/// Per-station state while building
struct StationTracker {
    info: StationInfo,
    head: Option<RecNo>,
    tail: Option<RecNo>,
    count: u64,
    coverage: Option<TimeRange>,
    inventory: Option<Inventory>,
}

impl StationTracker {
    fn new(info: StationInfo, inventory: Option<&InventoryConfig>) -> Self {
        Self {
            info,
            head: None,
            tail: None,
            count: 0,
            coverage: None,
            inventory: inventory.map(|cfg| Inventory::new(cfg.slots)),
        }
    }
}

/// What an append changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Appended {
    /// The station's previous tail (the record's backward link)
    pub prev: Option<RecNo>,
    /// Number of records now in the station's chain
    pub count: u64,
}

/// Per-station result of a finalized session
#[derive(Debug, Clone, PartialEq)]
pub struct StationSummary {
    pub key: StationKey,
    pub first: Option<RecNo>,
    pub last: Option<RecNo>,
    pub count: u64,
    pub coverage: Option<TimeRange>,
}

/// Result of [`ChainBuilder::finalize`]
#[derive(Debug, Clone, PartialEq)]
pub struct FinalizeReport {
    pub stations: Vec<StationSummary>,
    /// Records linked in this session
    pub records: u64,
    /// Min/max observation time over the session
    pub time_coverage: Option<TimeRange>,
    /// Box enclosing the session's located stations
    pub bounding_box: Option<BoundingBox>,
}

impl FinalizeReport {
    pub fn station(&self, key: &StationKey) -> Option<&StationSummary> {
        self.stations.iter().find(|s| &s.key == key)
    }
}

/// Incremental chain construction for one write session
///
/// Owns the station trackers and pending edges exclusively; not shared
/// between writers.
pub struct ChainBuilder {
    codec: ChainCodec,
    state: BuilderState,
    trackers: Vec<StationTracker>,
    by_key: HashMap<StationKey, usize>,
    /// Forward edges `tail -> recno`, replayed at finalize
    pending: Vec<(RecNo, RecNo)>,
    inventory: Option<InventoryConfig>,
}

impl ChainBuilder {
    pub fn new(codec: ChainCodec) -> Self {
        Self {
            codec,
            state: BuilderState::Empty,
            trackers: Vec::new(),
            by_key: HashMap::new(),
            pending: Vec::new(),
            inventory: None,
        }
    }

    /// Build a slot inventory for every chain of this session
    pub fn with_inventory(mut self, inventory: InventoryConfig) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.state == BuilderState::Finalized
    }

    /// True until the first record is appended
    pub fn is_empty(&self) -> bool {
        self.state == BuilderState::Empty
    }

    /// Forward edges collected so far
    pub fn pending_edges(&self) -> &[(RecNo, RecNo)] {
        &self.pending
    }

    /// Records linked so far for `key`
    pub fn count_of(&self, key: &StationKey) -> Option<u64> {
        self.by_key.get(key).map(|&idx| self.trackers[idx].count)
    }

    /// Declare station metadata; creates the tracker if needed
    pub fn register(&mut self, info: StationInfo) -> Result<()> {
        if self.is_finalized() {
            return Err(ObsError::BuilderFinalized);
        }
        let idx = self.tracker_index(info.key.clone());
        let tracker = &mut self.trackers[idx];
        if tracker.info.description.is_empty() {
            tracker.info.description = info.description;
        }
        if info.location.is_some() {
            tracker.info.location = info.location;
        }
        Ok(())
    }

    /// Link `recno` onto the chain of `key`
    ///
    /// Record numbers must increase per station; Contiguous stores also
    /// require each station's records to be adjacent.
    pub fn append(&mut self, key: &StationKey, recno: RecNo, time: i64) -> Result<Appended> {
        if self.is_finalized() {
            return Err(ObsError::BuilderFinalized);
        }

        // Step 1: Resolve or create the tracker
        let idx = self.tracker_index(key.clone());
        let encoding = self.codec.encoding();
        let inventory_cfg = self.inventory;
        let tracker = &mut self.trackers[idx];

        // Step 2: Pointers only ever reach backwards
        let prev = tracker.tail;
        match prev {
            None => tracker.head = Some(recno),
            Some(tail) => {
                if recno <= tail {
                    return Err(ObsError::CorruptChain {
                        station: key.to_string(),
                        reason: format!("append of record {} after tail {}", recno, tail),
                    });
                }
                if encoding == Encoding::Contiguous && recno != tail + 1 {
                    return Err(ObsError::NonContiguous {
                        station: key.to_string(),
                        recno,
                        expected: tail + 1,
                    });
                }
                self.pending.push((tail, recno));
            }
        }

        // Step 3: Advance the tail
        tracker.tail = Some(recno);
        tracker.count += 1;
        match tracker.coverage.as_mut() {
            Some(range) => range.extend(time),
            None => tracker.coverage = Some(TimeRange::new(time, time)),
        }

        // Step 4: Inventory, dropped on the first slot it cannot represent
        if let Some(cfg) = inventory_cfg {
            let fresh = match tracker.inventory.as_mut() {
                Some(inventory) => cfg.slot_of(time).map_or(false, |slot| inventory.mark(slot)),
                None => true,
            };
            if !fresh {
                tracing::warn!(station = %key, time, "dropping chain inventory");
                tracker.inventory = None;
            }
        }

        let count = tracker.count;
        self.state = BuilderState::Building;

        Ok(Appended { prev, count })
    }

    /// Pending `nextChild` edges grouped into runs of adjacent sources
    ///
    /// Each entry is the first source record of a run and the encoded
    /// targets for that run.
    pub fn forward_links(&self) -> Vec<(RecNo, bytes::Bytes)> {
        let mut edges = self.pending.clone();
        edges.sort_unstable();

        let mut runs = Vec::new();
        let mut start: Option<RecNo> = None;
        let mut targets: Vec<Option<RecNo>> = Vec::new();
        for (from, to) in edges {
            match start {
                Some(first) if first + targets.len() as u64 == from => {}
                Some(first) => {
                    runs.push((first, encode_pointer_array(&targets)));
                    targets.clear();
                    start = Some(from);
                }
                None => start = Some(from),
            }
            targets.push(Some(to));
        }
        if let Some(first) = start {
            runs.push((first, encode_pointer_array(&targets)));
        }
        runs
    }

    /// Write pointers and station rows, then seal the builder
    pub fn finalize<S: RecordStore + ?Sized>(&mut self, store: &S) -> Result<FinalizeReport> {
        if self.is_finalized() {
            return Err(ObsError::BuilderFinalized);
        }

        let schema = store.schema();
        let next_name = self.codec.convention().link_name(LinkField::NextChild);

        // Step 1: Replay forward edges (the last record of each chain stays -1)
        if schema.has_record_field(next_name) {
            for (start, pointers) in self.forward_links() {
                store.write_link_array(LinkField::NextChild, start, &pointers)?;
            }
        }

        // Step 2: One station row per tracker
        let mut rows = Vec::with_capacity(self.trackers.len());
        let mut summaries = Vec::with_capacity(self.trackers.len());
        let mut coverage: Option<TimeRange> = None;
        let mut records = 0u64;

        for tracker in &self.trackers {
            let mut row = StationRow {
                key: tracker.info.key.clone(),
                description: tracker.info.description.clone(),
                location: tracker.info.location,
                first_child: None,
                last_child: None,
                num_children: None,
                inventory: tracker.inventory.clone().filter(|_| tracker.count > 0),
            };
            self.codec
                .populate_row(schema, &mut row, tracker.head, tracker.tail, tracker.count);
            rows.push(row);

            if let Some(range) = tracker.coverage {
                match coverage.as_mut() {
                    Some(total) => {
                        total.extend(range.start);
                        total.extend(range.end);
                    }
                    None => coverage = Some(range),
                }
            }
            records += tracker.count;

            summaries.push(StationSummary {
                key: tracker.info.key.clone(),
                first: tracker.head,
                last: tracker.tail,
                count: tracker.count,
                coverage: tracker.coverage,
            });
        }

        store.append_station_rows(&rows)?;
        store.sync()?;

        let bounding_box =
            BoundingBox::enclosing(self.trackers.iter().filter_map(|t| t.info.location.as_ref()));

        tracing::info!(
            stations = rows.len(),
            records,
            edges = self.pending.len(),
            encoding = %self.codec.encoding(),
            "finalized chain builder"
        );

        self.state = BuilderState::Finalized;
        self.trackers.clear();
        self.by_key.clear();
        self.pending.clear();

        Ok(FinalizeReport {
            stations: summaries,
            records,
            time_coverage: coverage,
            bounding_box,
        })
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn tracker_index(&mut self, key: StationKey) -> usize {
        if let Some(&idx) = self.by_key.get(&key) {
            return idx;
        }
        let idx = self.trackers.len();
        self.trackers.push(StationTracker::new(
            StationInfo::new(key.clone()),
            self.inventory.as_ref(),
        ));
        self.by_key.insert(key, idx);
        idx
    }
}
