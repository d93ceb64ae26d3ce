//! In-memory record store
//!
//! A `Vec`-backed arena shared between one writer and any number of
//! reader handles. Each handle caches the length it last observed, so a
//! reader can lag behind a writer exactly like a reader of a growing file.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chain::codec::decode_pointer_array;
use crate::convention::{Convention, LinkField, Schema};
use crate::error::{ObsError, Result};
use crate::station::StationRow;

use super::{RecNo, Record, RecordPayload, RecordStore};

/// State shared by every handle on the same store
#[derive(Default)]
struct Arena {
    records: Vec<RecordPayload>,
    links: HashMap<LinkField, Vec<Option<RecNo>>>,
    stations: Vec<StationRow>,
}

/// In-memory record store
pub struct MemoryStore {
    schema: Schema,
    arena: Arc<RwLock<Arena>>,
    /// Length this handle last observed
    known_len: AtomicU64,
}

impl MemoryStore {
    /// Create an empty store with the given schema
    pub fn new(schema: Schema, convention: &Convention) -> Self {
        let mut arena = Arena::default();
        for field in schema.link_fields(convention) {
            arena.links.insert(field, Vec::new());
        }

        Self {
            schema,
            arena: Arc::new(RwLock::new(arena)),
            known_len: AtomicU64::new(0),
        }
    }

    /// Open another handle on the same data
    ///
    /// The new handle starts with the current length and only sees later
    /// appends after `refresh()`.
    pub fn handle(&self) -> Self {
        let len = self.arena.read().records.len() as u64;
        Self {
            schema: self.schema.clone(),
            arena: Arc::clone(&self.arena),
            known_len: AtomicU64::new(len),
        }
    }

    fn check_known(&self, recno: RecNo) -> Result<()> {
        let len = self.known_len.load(Ordering::Acquire);
        if recno >= len {
            return Err(ObsError::OutOfRange { recno, len });
        }
        Ok(())
    }
}

impl RecordStore for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn record_count(&self) -> u64 {
        self.known_len.load(Ordering::Acquire)
    }

    fn refresh(&self) -> Result<u64> {
        let len = self.arena.read().records.len() as u64;
        self.known_len.fetch_max(len, Ordering::AcqRel);
        Ok(self.known_len.load(Ordering::Acquire))
    }

    fn read(&self, recno: RecNo) -> Result<Record> {
        self.check_known(recno)?;
        let arena = self.arena.read();
        let payload = arena
            .records
            .get(recno as usize)
            .cloned()
            .ok_or(ObsError::OutOfRange {
                recno,
                len: arena.records.len() as u64,
            })?;
        Ok(Record { recno, payload })
    }

    fn append(&self, payload: RecordPayload) -> Result<RecNo> {
        let mut arena = self.arena.write();

        // Link slots first, so a visible record always has its links
        for pointers in arena.links.values_mut() {
            pointers.push(None);
        }
        arena.records.push(payload);

        let len = arena.records.len() as u64;
        self.known_len.fetch_max(len, Ordering::AcqRel);
        Ok(len - 1)
    }

    fn read_link(&self, field: LinkField, recno: RecNo) -> Result<Option<RecNo>> {
        self.check_known(recno)?;
        let arena = self.arena.read();
        let pointers = arena
            .links
            .get(&field)
            .ok_or_else(|| ObsError::UnknownField(format!("{:?}", field)))?;
        pointers
            .get(recno as usize)
            .copied()
            .ok_or(ObsError::OutOfRange {
                recno,
                len: pointers.len() as u64,
            })
    }

    fn write_link(&self, field: LinkField, recno: RecNo, target: Option<RecNo>) -> Result<()> {
        let mut arena = self.arena.write();
        let pointers = arena
            .links
            .get_mut(&field)
            .ok_or_else(|| ObsError::UnknownField(format!("{:?}", field)))?;
        let len = pointers.len() as u64;
        let slot = pointers
            .get_mut(recno as usize)
            .ok_or(ObsError::OutOfRange { recno, len })?;
        *slot = target;
        Ok(())
    }

    fn write_link_array(&self, field: LinkField, start: RecNo, pointers: &[u8]) -> Result<()> {
        let decoded = decode_pointer_array(pointers)?;
        let mut arena = self.arena.write();
        let slots = arena
            .links
            .get_mut(&field)
            .ok_or_else(|| ObsError::UnknownField(format!("{:?}", field)))?;

        let end = start + decoded.len() as u64;
        if end > slots.len() as u64 {
            return Err(ObsError::OutOfRange {
                recno: end - 1,
                len: slots.len() as u64,
            });
        }
        slots[start as usize..end as usize].copy_from_slice(&decoded);
        Ok(())
    }

    fn station_rows(&self) -> Result<Vec<StationRow>> {
        Ok(self.arena.read().stations.clone())
    }

    fn append_station_rows(&self, rows: &[StationRow]) -> Result<()> {
        self.arena.write().stations.extend_from_slice(rows);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        Ok(())
    }
}
