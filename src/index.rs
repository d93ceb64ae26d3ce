//! Index Module
//!
//! The entry point that ties a record store, its detected encoding and the
//! station table together.
//!
//! ## Responsibilities
//! - Detect the chain encoding from the store's schema
//! - Load and merge station rows into the station table
//! - Answer per-station observation queries (optionally time-filtered)
//! - Hand out a [`StationWriter`] for append sessions
//!
//! ## Concurrency Model
//! An `Index` is a read session: its station table is private and is not
//! updated by writers. Any number of indexes and writers may share one
//! store; each writer links only the records it appended itself. After a
//! writer finalizes, readers see the new chains via [`Index::reload`]. Records appended after the table was built are
//! still reachable from existing chains because the walker refreshes the
//! store length on demand.

use std::sync::Arc;

use crate::chain::{
    sort_chronological, Cancellation, ChainBuilder, ChainCodec, ChainWalker, Encoding,
    FinalizeReport, Observation, Observations, TimeRange,
};
use crate::config::{Config, InventoryConfig};
use crate::convention::{Convention, LinkField};
use crate::error::{ObsError, Result};
use crate::record::{FileStore, RecNo, RecordPayload, RecordStore};
use crate::station::{BoundingBox, Station, StationInfo, StationKey, StationTable};

/// Observations of one station from [`Index::scan`]
#[derive(Debug)]
pub struct StationScan {
    pub key: StationKey,
    /// Observations from every readable chain, in time order
    pub observations: Vec<Observation>,
    /// One entry per damaged chain, plus any store error that ended the walk
    pub errors: Vec<ObsError>,
}

impl StationScan {
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Result of [`Index::verify`]
#[derive(Debug, Default)]
pub struct VerifyReport {
    pub stations: usize,
    pub observations: u64,
    /// Station rows dropped while loading the table
    pub merge_faults: usize,
    /// Chain faults found while walking
    pub corruptions: Vec<ObsError>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.merge_faults == 0 && self.corruptions.is_empty()
    }
}

/// Read session over a record store
pub struct Index<S: RecordStore + ?Sized> {
    store: Arc<S>,
    codec: ChainCodec,
    table: StationTable,
    /// Rows rejected by the merger on the last load
    faults: Vec<ObsError>,
    inventory: Option<InventoryConfig>,
}

impl Index<FileStore> {
    /// Open (or create) the file store at `config.data_dir`
    pub fn open_config(config: &Config) -> Result<Self> {
        let store = Arc::new(FileStore::open_or_create(config)?);
        let mut index = Self::open(store, &config.convention)?;
        index.inventory = config.inventory;
        Ok(index)
    }
}

impl<S: RecordStore + ?Sized> Index<S> {
    /// Detect the encoding and load the station table
    ///
    /// Fails with `MissingLinkageFields` if the schema carries none of the
    /// recognised linkage combinations. Unresolvable station rows do not
    /// fail the open; see [`Index::merge_faults`].
    pub fn open(store: Arc<S>, convention: &Convention) -> Result<Self> {
        let codec = ChainCodec::detect(store.schema(), convention)?;
        let (table, faults) = StationTable::load(&*store, &codec)?;

        tracing::info!(
            encoding = %codec.encoding(),
            stations = table.len(),
            records = store.record_count(),
            faults = faults.len(),
            "opened index"
        );

        Ok(Self {
            store,
            codec,
            table,
            faults,
            inventory: None,
        })
    }

    /// Build inventory bitmasks in writers created by this index
    pub fn with_inventory(mut self, inventory: InventoryConfig) -> Self {
        self.inventory = Some(inventory);
        self
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn codec(&self) -> &ChainCodec {
        &self.codec
    }

    pub fn encoding(&self) -> Encoding {
        self.codec.encoding()
    }

    /// Every station, in first-seen order
    pub fn stations(&self) -> &[Station] {
        self.table.stations()
    }

    pub fn station(&self, key: &StationKey) -> Option<&Station> {
        self.table.lookup(key)
    }

    pub fn table(&self) -> &StationTable {
        &self.table
    }

    /// Station rows dropped while loading the table
    pub fn merge_faults(&self) -> &[ObsError] {
        &self.faults
    }

    /// Box enclosing every located station
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        self.table.bounding_box()
    }

    /// Rebuild the station table from the store
    pub fn reload(&mut self) -> Result<()> {
        self.store.refresh()?;
        let (table, faults) = StationTable::load(&*self.store, &self.codec)?;
        tracing::debug!(stations = table.len(), "reloaded station table");
        self.table = table;
        self.faults = faults;
        Ok(())
    }

    // =========================================================================
    // Read Path
    // =========================================================================

    pub fn walker(&self) -> ChainWalker<'_, S> {
        ChainWalker::new(&*self.store, &self.codec)
    }

    /// Lazy traversal of `station` in encoding order
    pub fn iter_observations<'a>(&'a self, station: &'a Station) -> Observations<'a, S> {
        ChainWalker::new(&*self.store, &self.codec).iterate(station)
    }

    /// All observations of a station, in time order
    ///
    /// `range` is inclusive at both ends. Fails on the first damaged chain;
    /// use [`Index::observations_partial`] to keep what is readable.
    pub fn observations_of(
        &self,
        key: &StationKey,
        range: Option<TimeRange>,
    ) -> Result<Vec<Observation>> {
        let station = self.require(key)?;
        let walker = self.walker();
        Self::collect(&walker, station, range)
    }

    /// Observations of a station together with the chain errors met
    ///
    /// Damaged chains contribute the records read before the damage; the
    /// station's other chains are still walked.
    pub fn observations_partial(
        &self,
        key: &StationKey,
        range: Option<TimeRange>,
    ) -> Result<StationScan> {
        let station = self.require(key)?;
        Ok(Self::scan_station(&self.walker(), station, range))
    }

    /// Like [`Index::observations_of`], stopping early once `cancel` fires
    ///
    /// A cancelled walk returns the observations produced so far.
    pub fn observations_cancellable(
        &self,
        key: &StationKey,
        range: Option<TimeRange>,
        cancel: &dyn Cancellation,
    ) -> Result<Vec<Observation>> {
        let station = self.require(key)?;
        let walker = self.walker().with_cancel(cancel);
        Self::collect(&walker, station, range)
    }

    /// Observations of every station inside `bbox` (all stations if `None`)
    ///
    /// A failing station does not stop the scan; its error is reported in
    /// its own [`StationScan`].
    pub fn scan(&self, bbox: Option<BoundingBox>, range: Option<TimeRange>) -> Vec<StationScan> {
        let walker = self.walker();
        let mut results = Vec::new();

        for station in self.table.iter() {
            if let Some(bbox) = &bbox {
                match &station.location {
                    Some(location) if bbox.contains(location) => {}
                    _ => continue,
                }
            }

            results.push(Self::scan_station(&walker, station, range));
        }

        results
    }

    /// Walk every station and check chain integrity
    ///
    /// A chain must terminate, stay within the store and, where the store
    /// records a count, produce exactly that many records.
    pub fn verify(&self) -> VerifyReport {
        let walker = self.walker();
        let mut report = VerifyReport {
            stations: self.table.len(),
            merge_faults: self.faults.len(),
            ..Default::default()
        };

        for station in self.table.iter() {
            let mut walked = 0u64;
            let mut failed = false;
            for item in walker.iterate(station) {
                match item {
                    Ok(_) => walked += 1,
                    Err(e) => {
                        report.corruptions.push(e);
                        failed = true;
                    }
                }
            }
            report.observations += walked;

            if failed {
                continue;
            }
            if let Some(expected) = station.count() {
                if expected != walked {
                    report.corruptions.push(ObsError::CorruptChain {
                        station: station.key.to_string(),
                        reason: format!("walked {} records, count says {}", walked, expected),
                    });
                }
            }
        }

        tracing::info!(
            stations = report.stations,
            observations = report.observations,
            corruptions = report.corruptions.len(),
            "verified index"
        );
        report
    }

    // =========================================================================
    // Write Path
    // =========================================================================

    /// Start an append session
    pub fn writer(&self) -> StationWriter<S> {
        StationWriter::new(Arc::clone(&self.store), self.codec.clone(), self.inventory)
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    fn require(&self, key: &StationKey) -> Result<&Station> {
        self.table
            .lookup(key)
            .ok_or_else(|| ObsError::StationNotFound(key.to_string()))
    }

    fn scan_station<'a>(
        walker: &ChainWalker<'a, S>,
        station: &'a Station,
        range: Option<TimeRange>,
    ) -> StationScan {
        let iter = match range {
            Some(r) => walker.iterate_range(station, r),
            None => walker.iterate(station),
        };

        let mut observations = Vec::new();
        let mut errors = Vec::new();
        for item in iter {
            match item {
                Ok(obs) => observations.push(obs),
                Err(e) => {
                    tracing::warn!(station = %station.key, "chain walk failed: {}", e);
                    errors.push(e);
                }
            }
        }
        sort_chronological(&mut observations);

        StationScan {
            key: station.key.clone(),
            observations,
            errors,
        }
    }

    fn collect<'a>(
        walker: &ChainWalker<'a, S>,
        station: &'a Station,
        range: Option<TimeRange>,
    ) -> Result<Vec<Observation>> {
        let iter = match range {
            Some(r) => walker.iterate_range(station, r),
            None => walker.iterate(station),
        };
        let mut observations = iter.collect::<Result<Vec<_>>>()?;
        sort_chronological(&mut observations);
        Ok(observations)
    }
}

/// One append session
///
/// Appends records, keeps backward links current as it goes and writes
/// forward links plus station rows at [`StationWriter::finalize`]. A
/// writer dropped without finalizing leaves its records in the store but
/// attached to no station.
pub struct StationWriter<S: RecordStore + ?Sized> {
    store: Arc<S>,
    builder: ChainBuilder,
    /// Store carries a per-record backward link
    backward_links: bool,
}

impl<S: RecordStore + ?Sized> StationWriter<S> {
    fn new(store: Arc<S>, codec: ChainCodec, inventory: Option<InventoryConfig>) -> Self {
        let prev_name = codec.convention().link_name(LinkField::PrevChild);
        let backward_links = store.schema().has_record_field(prev_name);

        let mut builder = ChainBuilder::new(codec);
        if let Some(inventory) = inventory {
            builder = builder.with_inventory(inventory);
        }

        Self {
            store,
            builder,
            backward_links,
        }
    }

    /// Declare station metadata for this session
    pub fn register_station(&mut self, info: StationInfo) -> Result<()> {
        self.builder.register(info)
    }

    /// Append a record and link it onto its station's chain
    ///
    /// If linking fails (out-of-order or non-adjacent record) the record
    /// has already been stored and stays unlinked.
    pub fn append(&mut self, payload: RecordPayload) -> Result<RecNo> {
        if self.builder.is_finalized() {
            return Err(ObsError::BuilderFinalized);
        }

        let key = payload.station.clone();
        let time = payload.time;
        let recno = self.store.append(payload)?;
        let appended = self.builder.append(&key, recno, time)?;

        if self.backward_links {
            self.store
                .write_link(LinkField::PrevChild, recno, appended.prev)?;
        }

        tracing::trace!(station = %key, recno, prev = ?appended.prev, "appended record");
        Ok(recno)
    }

    /// Write forward links and station rows
    pub fn finalize(&mut self) -> Result<FinalizeReport> {
        self.builder.finalize(&*self.store)
    }

    pub fn is_finalized(&self) -> bool {
        self.builder.is_finalized()
    }
}

impl<S: RecordStore + ?Sized> Drop for StationWriter<S> {
    fn drop(&mut self) {
        if !self.builder.is_finalized() && !self.builder.is_empty() {
            tracing::warn!(
                pending = self.builder.pending_edges().len(),
                "station writer dropped without finalize; appended records are unlinked"
            );
        }
    }
}
