//! Chain walker
//!
//! Produces a station's observations lazily by following its chains.
//!
//! ## Traversal
//! 1. Start at the head of the first chain (per the codec's encoding)
//! 2. Resolve the record, refreshing the store length once if the record
//!    number lies beyond what this handle has seen
//! 3. Yield it if it passes the time filter
//! 4. Advance via the codec until the sentinel, then move to the next chain
//!
//! Output is in encoding order: Backward chains run newest first and a
//! multi-chain station has no order across chains. Callers that need
//! chronological order apply [`sort_chronological`].

use crate::error::{ObsError, Result};
use crate::record::{RecNo, Record, RecordStore};
use crate::station::Station;

use super::{Cancellation, ChainCodec, Encoding, Observation, TimeRange};

/// Stable sort by observation time
pub fn sort_chronological(observations: &mut [Observation]) {
    observations.sort_by_key(Record::time);
}

/// Walks station chains over one store
pub struct ChainWalker<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    codec: &'a ChainCodec,
    cancel: Option<&'a dyn Cancellation>,
}

impl<'a, S: RecordStore + ?Sized> ChainWalker<'a, S> {
    pub fn new(store: &'a S, codec: &'a ChainCodec) -> Self {
        Self {
            store,
            codec,
            cancel: None,
        }
    }

    /// Stop iteration early once `cancel` reports cancellation
    pub fn with_cancel(mut self, cancel: &'a dyn Cancellation) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Fresh traversal over every chain of `station`
    pub fn iterate(&self, station: &'a Station) -> Observations<'a, S> {
        Observations::new(self.store, self.codec, station, None, self.cancel)
    }

    /// Fresh traversal yielding only observations inside `range`
    pub fn iterate_range(&self, station: &'a Station, range: TimeRange) -> Observations<'a, S> {
        Observations::new(self.store, self.codec, station, Some(range), self.cancel)
    }
}

/// Lazy observation sequence for one station
///
/// A damaged chain yields one `Err` and the walk moves on to the station's
/// next chain. Store errors that are not corruption, and cancellation, end
/// the sequence.
pub struct Observations<'a, S: RecordStore + ?Sized> {
    store: &'a S,
    codec: &'a ChainCodec,
    station: &'a Station,
    range: Option<TimeRange>,
    cancel: Option<&'a dyn Cancellation>,

    /// Index of the chain being walked
    active: usize,
    /// Index of the next chain to start
    next_chain: usize,
    /// Next record to resolve in the active chain
    cursor: Option<RecNo>,
    /// Records visited in the active chain
    chain_steps: u64,
    /// Records visited overall
    total_steps: u64,
    /// Store length as last observed by this traversal
    known_len: u64,
    done: bool,
}

impl<'a, S: RecordStore + ?Sized> Observations<'a, S> {
    fn new(
        store: &'a S,
        codec: &'a ChainCodec,
        station: &'a Station,
        range: Option<TimeRange>,
        cancel: Option<&'a dyn Cancellation>,
    ) -> Self {
        Self {
            store,
            codec,
            station,
            range,
            cancel,
            active: 0,
            next_chain: 0,
            cursor: None,
            chain_steps: 0,
            total_steps: 0,
            known_len: store.record_count(),
            done: false,
        }
    }

    /// Position the cursor at the head of the next non-empty chain
    fn start_next_chain(&mut self) -> bool {
        while let Some(chain) = self.station.chains().get(self.next_chain) {
            self.active = self.next_chain;
            self.next_chain += 1;
            self.chain_steps = 0;
            if let Some(head) = self.codec.head(chain) {
                self.cursor = Some(head);
                return true;
            }
        }
        false
    }

    fn corrupt(&self, reason: String) -> ObsError {
        ObsError::CorruptChain {
            station: self.station.key.to_string(),
            reason,
        }
    }

    fn dangling(&self, recno: RecNo) -> ObsError {
        ObsError::DanglingPointer {
            station: self.station.key.to_string(),
            recno,
            len: self.known_len,
        }
    }

    /// Read a record, refreshing the store length once if needed
    fn resolve(&mut self, recno: RecNo) -> Result<Record> {
        if recno >= self.known_len {
            self.known_len = self.store.refresh()?;
            tracing::trace!(recno, len = self.known_len, "refreshed store length");
            if recno >= self.known_len {
                return Err(self.dangling(recno));
            }
        }

        match self.store.read(recno) {
            Err(ObsError::OutOfRange { .. }) => {
                self.known_len = self.store.refresh()?;
                match self.store.read(recno) {
                    Err(ObsError::OutOfRange { .. }) => Err(self.dangling(recno)),
                    other => other,
                }
            }
            other => other,
        }
    }

    /// Visit one record; `Ok(None)` means it was filtered out
    fn visit(&mut self, recno: RecNo) -> Result<Option<Observation>> {
        let station: &'a Station = self.station;
        let chain = &station.chains()[self.active];

        let record = self.resolve(recno)?;

        self.chain_steps += 1;
        self.total_steps += 1;
        if let Some(count) = chain.known_count() {
            if self.chain_steps > count {
                return Err(self.corrupt(format!(
                    "chain {} longer than its count {}",
                    self.active, count
                )));
            }
        }
        if self.total_steps > self.known_len {
            self.known_len = self.store.refresh()?;
            if self.total_steps > self.known_len {
                return Err(self.corrupt(format!(
                    "cycle: {} steps over {} records",
                    self.total_steps, self.known_len
                )));
            }
        }

        if record.station() != &self.station.key {
            return Err(self.corrupt(format!(
                "record {} belongs to station {}",
                recno,
                record.station()
            )));
        }

        let next = self.codec.next(self.store, chain, recno)?;
        if let Some(n) = next {
            let ordered = match self.codec.encoding() {
                Encoding::Backward => n < recno,
                Encoding::Forward | Encoding::Contiguous => n > recno,
            };
            if !ordered {
                return Err(self.corrupt(format!("pointer {} -> {} runs the wrong way", recno, n)));
            }
        }
        self.cursor = next;

        let keep = self.range.map_or(true, |r| r.contains(record.time()));
        Ok(keep.then_some(record))
    }
}

impl<'a, S: RecordStore + ?Sized> Iterator for Observations<'a, S> {
    type Item = Result<Observation>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        if self.cancel.map_or(false, |c| c.is_cancelled()) {
            tracing::debug!(station = %self.station.key, "iteration cancelled");
            self.done = true;
            return None;
        }

        loop {
            let recno = match self.cursor {
                Some(recno) => recno,
                None => {
                    if !self.start_next_chain() {
                        self.done = true;
                        return None;
                    }
                    continue;
                }
            };

            match self.visit(recno) {
                Ok(Some(observation)) => return Some(Ok(observation)),
                Ok(None) => continue,
                Err(e) if e.is_corruption() => {
                    tracing::debug!(
                        station = %self.station.key,
                        chain = self.active,
                        "skipping damaged chain: {}",
                        e
                    );
                    // The damaged chain's steps do not count against the rest
                    self.total_steps -= self.chain_steps;
                    self.cursor = None;
                    return Some(Err(e));
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}
