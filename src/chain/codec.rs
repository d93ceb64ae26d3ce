//! Chain codec
//!
//! Decides which encoding a store uses and exposes uniform `head`/`next`
//! operations over all three. Also owns the on-disk pointer format.
//!
//! ## Pointer Array Format
//! ```text
//! ┌──────────────┬──────────────┬──────────────┬─────┐
//! │ recno 0 (8)  │ recno 1 (8)  │ recno 2 (8)  │ ... │
//! └──────────────┴──────────────┴──────────────┴─────┘
//!   i64 little-endian; -1 = sentinel (end of chain)
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::convention::{Convention, LinkField, Schema};
use crate::error::{ObsError, Result};
use crate::record::{RecNo, RecordStore};
use crate::station::StationRow;

use super::{Chain, Encoding};

/// Pointer value terminating every chain
pub const SENTINEL: i64 = -1;

/// Width of one encoded pointer in bytes
pub const POINTER_WIDTH: u64 = 8;

// =============================================================================
// Pointer Encoding
// =============================================================================

/// Encode an optional record number as a raw pointer
pub fn encode_link(target: Option<RecNo>) -> i64 {
    match target {
        Some(recno) => recno as i64,
        None => SENTINEL,
    }
}

/// Decode a raw pointer; negative values other than the sentinel are invalid
pub fn decode_link(raw: i64) -> Result<Option<RecNo>> {
    match raw {
        SENTINEL => Ok(None),
        r if r >= 0 => Ok(Some(r as RecNo)),
        r => Err(ObsError::RecordCorruption(format!("invalid pointer value {}", r))),
    }
}

/// Serialize a run of pointers
pub fn encode_pointer_array(pointers: &[Option<RecNo>]) -> Bytes {
    let mut buf = BytesMut::with_capacity(pointers.len() * POINTER_WIDTH as usize);
    for pointer in pointers {
        buf.put_i64_le(encode_link(*pointer));
    }
    buf.freeze()
}

/// Deserialize a run of pointers
pub fn decode_pointer_array(bytes: &[u8]) -> Result<Vec<Option<RecNo>>> {
    if bytes.len() as u64 % POINTER_WIDTH != 0 {
        return Err(ObsError::RecordCorruption(format!(
            "pointer array of {} bytes is not a multiple of {}",
            bytes.len(),
            POINTER_WIDTH
        )));
    }

    let mut buf = bytes;
    let mut pointers = Vec::with_capacity(bytes.len() / POINTER_WIDTH as usize);
    while buf.has_remaining() {
        pointers.push(decode_link(buf.get_i64_le())?);
    }
    Ok(pointers)
}

// =============================================================================
// Codec
// =============================================================================

/// Encoding-independent access to chains
#[derive(Debug, Clone)]
pub struct ChainCodec {
    encoding: Encoding,
    convention: Convention,
}

impl ChainCodec {
    pub fn new(encoding: Encoding, convention: Convention) -> Self {
        Self {
            encoding,
            convention,
        }
    }

    /// Probe the schema for linkage fields
    ///
    /// Order: `firstChild` + `numChildren` → Contiguous; `firstChild` +
    /// `nextChild` → Forward; `lastChild` + `prevChild` → Backward.
    pub fn detect(schema: &Schema, convention: &Convention) -> Result<Self> {
        let station = |name: &String| schema.has_station_field(name);
        let record = |name: &String| schema.has_record_field(name);

        let encoding = if station(&convention.first_child) && station(&convention.num_children) {
            Encoding::Contiguous
        } else if station(&convention.first_child) && record(&convention.next_child) {
            Encoding::Forward
        } else if station(&convention.last_child) && record(&convention.prev_child) {
            Encoding::Backward
        } else {
            return Err(ObsError::MissingLinkageFields);
        };

        tracing::debug!(%encoding, "detected chain encoding");
        Ok(Self::new(encoding, convention.clone()))
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    pub fn convention(&self) -> &Convention {
        &self.convention
    }

    /// Per-record field traversal follows, if any
    pub fn link_field(&self) -> Option<LinkField> {
        match self.encoding {
            Encoding::Forward => Some(LinkField::NextChild),
            Encoding::Backward => Some(LinkField::PrevChild),
            Encoding::Contiguous => None,
        }
    }

    /// Where traversal of `chain` starts
    pub fn head(&self, chain: &Chain) -> Option<RecNo> {
        match self.encoding {
            Encoding::Forward | Encoding::Contiguous => chain.first,
            Encoding::Backward => chain.last,
        }
    }

    /// The record after `current` in traversal order
    ///
    /// Contiguous chains are pure arithmetic and never touch the store.
    pub fn next<S: RecordStore + ?Sized>(
        &self,
        store: &S,
        chain: &Chain,
        current: RecNo,
    ) -> Result<Option<RecNo>> {
        match self.encoding {
            Encoding::Forward => store.read_link(LinkField::NextChild, current),
            Encoding::Backward => store.read_link(LinkField::PrevChild, current),
            Encoding::Contiguous => {
                let (first, count) = match (chain.first, chain.count) {
                    (Some(first), Some(count)) => (first, count),
                    _ => return Ok(None),
                };
                let following = current + 1;
                Ok((following < first + count).then_some(following))
            }
        }
    }

    /// Decode the chain a station row describes
    pub fn chain_from_row(&self, row: &StationRow) -> Result<Chain> {
        let first = row.first_child.map(decode_link).transpose()?.flatten();
        let last = row.last_child.map(decode_link).transpose()?.flatten();
        let count = match row.num_children {
            Some(n) if n < 0 => {
                return Err(ObsError::RecordCorruption(format!(
                    "negative {}: {}",
                    self.convention.num_children, n
                )))
            }
            Some(n) => Some(n as u64),
            None => None,
        };

        let missing = |name: &str| ObsError::RecordCorruption(format!("row lacks {}", name));
        let mut chain = Chain {
            first,
            last,
            count,
            inventory: row.inventory.clone(),
        };

        match self.encoding {
            Encoding::Forward => {
                if row.first_child.is_none() {
                    return Err(missing(&self.convention.first_child));
                }
            }
            Encoding::Backward => {
                if row.last_child.is_none() {
                    return Err(missing(&self.convention.last_child));
                }
            }
            Encoding::Contiguous => {
                let n = count.ok_or_else(|| missing(&self.convention.num_children))?;
                if row.first_child.is_none() {
                    return Err(missing(&self.convention.first_child));
                }
                if n == 0 {
                    chain.first = None;
                    chain.last = None;
                } else if let Some(first) = chain.first {
                    chain.last = Some(first + n - 1);
                } else {
                    return Err(ObsError::RecordCorruption(format!(
                        "{} records but no {}",
                        n, self.convention.first_child
                    )));
                }
            }
        }

        Ok(chain)
    }

    /// Fill the linkage columns of `row` that `schema` declares
    pub fn populate_row(
        &self,
        schema: &Schema,
        row: &mut StationRow,
        first: Option<RecNo>,
        last: Option<RecNo>,
        count: u64,
    ) {
        let c = &self.convention;
        if schema.has_station_field(&c.first_child) {
            row.first_child = Some(encode_link(first));
        }
        if schema.has_station_field(&c.last_child) {
            row.last_child = Some(encode_link(last));
        }
        if schema.has_station_field(&c.num_children) {
            row.num_children = Some(count as i64);
        }
    }
}
