//! Station table
//!
//! In-memory mapping from station key to station descriptor. Built once
//! when an index is opened; private to that read session.

use std::collections::HashMap;

use crate::chain::{ChainCodec, MergeOutcome, StationMerger};
use crate::error::{ObsError, Result};
use crate::record::RecordStore;

use super::{BoundingBox, Station, StationInfo, StationKey};

/// Station key → station, in first-seen order
#[derive(Debug, Default)]
pub struct StationTable {
    stations: Vec<Station>,
    by_key: HashMap<StationKey, usize>,
}

impl StationTable {
    /// Create an empty table
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the table from every station row in the store
    ///
    /// Rows sharing a key are merged into multi-chain stations. A row whose
    /// chain cannot be resolved is dropped and reported in the returned
    /// fault list; the rest of the table is still built.
    pub fn load<S: RecordStore + ?Sized>(
        store: &S,
        codec: &ChainCodec,
    ) -> Result<(Self, Vec<ObsError>)> {
        let rows = store.station_rows()?;
        let merger = StationMerger::new(store, codec);

        let mut table = Self::new();
        let mut faults = Vec::new();
        let mut merged = 0usize;

        for row in rows {
            match merger.merge(&mut table, row) {
                Ok(MergeOutcome::Merged { .. }) => merged += 1,
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("dropping chain: {}", e);
                    faults.push(e);
                }
            }
        }

        tracing::debug!(
            stations = table.len(),
            merged_chains = merged,
            faults = faults.len(),
            "loaded station table"
        );
        Ok((table, faults))
    }

    /// Look up a station by key
    pub fn lookup(&self, key: &StationKey) -> Option<&Station> {
        self.by_key.get(key).map(|&idx| &self.stations[idx])
    }

    /// All stations, in first-seen order
    pub fn stations(&self) -> &[Station] {
        &self.stations
    }

    pub fn iter(&self) -> impl Iterator<Item = &Station> {
        self.stations.iter()
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Box enclosing every located station
    pub fn bounding_box(&self) -> Option<BoundingBox> {
        BoundingBox::enclosing(self.stations.iter().filter_map(|s| s.location.as_ref()))
    }

    /// Resolve or create the station for `info.key`
    ///
    /// Returns the station and whether it was created.
    pub(crate) fn entry(&mut self, info: StationInfo) -> (&mut Station, bool) {
        match self.by_key.get(&info.key) {
            Some(&idx) => {
                let station = &mut self.stations[idx];
                station.absorb_metadata(info);
                (station, false)
            }
            None => {
                let idx = self.stations.len();
                self.by_key.insert(info.key.clone(), idx);
                self.stations.push(Station::new(info));
                (&mut self.stations[idx], true)
            }
        }
    }
}
