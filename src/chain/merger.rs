//! Station merger
//!
//! A station key that appears in several station rows (one per write
//! batch, or a re-registered key) owns several chains. The merger
//! resolves each row's chain and attaches it to the station already in
//! the table, so a read sees the union of all chains.
//!
//! A row whose chain cannot be resolved is rejected with `CorruptMerge`;
//! chains attached earlier stay attached.

use crate::error::{ObsError, Result};
use crate::record::{RecNo, RecordStore};
use crate::station::{StationInfo, StationRow, StationTable};

use super::codec::encode_link;
use super::ChainCodec;

/// What merging one row did to the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// New station with its first chain
    Created,
    /// Chain attached to an existing station, which now has `chains` chains
    Merged { chains: usize },
    /// Row carried no records; only metadata was recorded
    Registered,
}

/// Attaches station rows to a [`StationTable`]
pub struct StationMerger<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    codec: &'a ChainCodec,
}

impl<'a, S: RecordStore + ?Sized> StationMerger<'a, S> {
    pub fn new(store: &'a S, codec: &'a ChainCodec) -> Self {
        Self { store, codec }
    }

    /// Merge one station row into `table`
    pub fn merge(&self, table: &mut StationTable, row: StationRow) -> Result<MergeOutcome> {
        let head = row.first_child.or(row.last_child).unwrap_or(-1);
        let station_name = row.key.to_string();
        let reject = |reason: String| ObsError::CorruptMerge {
            station: station_name.clone(),
            head,
            reason,
        };

        // Step 1: Decode before touching the table
        let chain = self
            .codec
            .chain_from_row(&row)
            .map_err(|e| reject(e.to_string()))?;

        // Step 2: Every record the chain names must exist
        for recno in [chain.first, chain.last].into_iter().flatten() {
            self.check_in_store(recno).map_err(|len| {
                reject(format!("record {} beyond store length {}", recno, len))
            })?;
        }
        if let (Some(first), Some(last)) = (chain.first, chain.last) {
            if first > last {
                return Err(reject(format!("first {} after last {}", first, last)));
            }
        }

        // Step 3: Resolve or create the station, then attach
        let info = StationInfo {
            key: row.key,
            description: row.description,
            location: row.location,
        };
        let (station, created) = table.entry(info);

        if self.codec.head(&chain).is_none() {
            return Ok(MergeOutcome::Registered);
        }

        tracing::trace!(
            station = %station.key,
            head = encode_link(self.codec.head(&chain)),
            "attaching chain"
        );
        station.attach(chain);

        if created {
            Ok(MergeOutcome::Created)
        } else {
            Ok(MergeOutcome::Merged {
                chains: station.chains().len(),
            })
        }
    }

    /// `Err(len)` if `recno` lies beyond the store, after one refresh
    fn check_in_store(&self, recno: RecNo) -> std::result::Result<(), u64> {
        let len = self.store.record_count();
        if recno < len {
            return Ok(());
        }
        match self.store.refresh() {
            Ok(len) if recno < len => Ok(()),
            Ok(len) => Err(len),
            Err(_) => Err(len),
        }
    }
}
