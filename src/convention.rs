//! Naming convention and schema
//!
//! The convention resolves which field names carry the station key, the
//! observation times, the station location and the chain linkage. The
//! schema records which of those fields a store actually has; encoding
//! detection probes the schema through the convention.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::chain::Encoding;

/// Per-record linkage fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LinkField {
    /// Forward pointer: next record of the same station
    NextChild,
    /// Backward pointer: previous record of the same station
    PrevChild,
}

impl LinkField {
    pub const ALL: [LinkField; 2] = [LinkField::NextChild, LinkField::PrevChild];
}

/// Field names used by a dataset
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Convention {
    // -------------------------------------------------------------------------
    // Station fields
    // -------------------------------------------------------------------------
    pub station_id: String,
    pub station_description: String,
    pub latitude: String,
    pub longitude: String,
    pub altitude: String,

    // -------------------------------------------------------------------------
    // Record fields
    // -------------------------------------------------------------------------
    pub time: String,
    pub nominal_time: String,

    // -------------------------------------------------------------------------
    // Linkage fields
    // -------------------------------------------------------------------------
    pub first_child: String,
    pub last_child: String,
    pub num_children: String,
    pub next_child: String,
    pub prev_child: String,
}

impl Default for Convention {
    fn default() -> Self {
        Self {
            station_id: "station_id".to_string(),
            station_description: "station_description".to_string(),
            latitude: "latitude".to_string(),
            longitude: "longitude".to_string(),
            altitude: "altitude".to_string(),
            time: "time".to_string(),
            nominal_time: "time_nominal".to_string(),
            first_child: "firstChild".to_string(),
            last_child: "lastChild".to_string(),
            num_children: "numChildren".to_string(),
            next_child: "nextChild".to_string(),
            prev_child: "prevChild".to_string(),
        }
    }
}

impl Convention {
    /// Field name of a per-record linkage field
    pub fn link_name(&self, field: LinkField) -> &str {
        match field {
            LinkField::NextChild => &self.next_child,
            LinkField::PrevChild => &self.prev_child,
        }
    }

    /// Resolve a field name back to a linkage field
    pub fn link_field(&self, name: &str) -> Option<LinkField> {
        LinkField::ALL
            .into_iter()
            .find(|field| self.link_name(*field) == name)
    }
}

/// The set of fields present in a store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    /// Fields carried by each station row
    pub station_fields: BTreeSet<String>,
    /// Fields carried by each record
    pub record_fields: BTreeSet<String>,
}

impl Schema {
    /// Schema a writer lays down for a fresh store using `encoding`
    ///
    /// Forward stores also carry `lastChild`/`prevChild` so they can be
    /// walked backwards; the forward fields win detection.
    pub fn for_encoding(convention: &Convention, encoding: Encoding) -> Self {
        let mut schema = Self::default();

        for name in [
            &convention.station_id,
            &convention.station_description,
            &convention.latitude,
            &convention.longitude,
            &convention.altitude,
        ] {
            schema.station_fields.insert(name.clone());
        }
        schema.record_fields.insert(convention.time.clone());
        schema.record_fields.insert(convention.nominal_time.clone());

        match encoding {
            Encoding::Forward => {
                schema.station_fields.insert(convention.first_child.clone());
                schema.station_fields.insert(convention.last_child.clone());
                schema.record_fields.insert(convention.next_child.clone());
                schema.record_fields.insert(convention.prev_child.clone());
            }
            Encoding::Backward => {
                schema.station_fields.insert(convention.last_child.clone());
                schema.record_fields.insert(convention.prev_child.clone());
            }
            Encoding::Contiguous => {
                schema.station_fields.insert(convention.first_child.clone());
                schema.station_fields.insert(convention.num_children.clone());
            }
        }

        schema
    }

    pub fn has_station_field(&self, name: &str) -> bool {
        self.station_fields.contains(name)
    }

    pub fn has_record_field(&self, name: &str) -> bool {
        self.record_fields.contains(name)
    }

    /// Per-record linkage fields present in this schema
    pub fn link_fields(&self, convention: &Convention) -> Vec<LinkField> {
        LinkField::ALL
            .into_iter()
            .filter(|field| self.has_record_field(convention.link_name(*field)))
            .collect()
    }
}
