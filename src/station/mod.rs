//! Station Module
//!
//! Station identity, location and the in-memory station table.
//!
//! ## Responsibilities
//! - Station keys (string or integer identifiers)
//! - Station locations and latitude/longitude bounding boxes
//! - Persisted station rows (one per station per finalized batch)
//! - The station table: key → station with an ordered list of chains
//! - Per-chain inventory bitmasks
//!
//! ## Station Row vs Station
//! ```text
//!   stations.log                         StationTable
//! ┌──────────────────────────┐      ┌──────────────────────────────┐
//! │ A  first=0  last=2  n=2  │─┐    │ A: [chain(0..2), chain(7..9)] │
//! │ B  first=1  last=4  n=2  │ ├──► │ B: [chain(1..4)]              │
//! │ A  first=7  last=9  n=2  │─┘    │                               │
//! └──────────────────────────┘      └──────────────────────────────┘
//! ```
//! A key that recurs across batches becomes one station with several
//! chains (see [`crate::chain::StationMerger`]).

mod inventory;
mod table;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::chain::Chain;

pub use inventory::Inventory;
pub use table::StationTable;

/// Station identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StationKey {
    Id(i64),
    Name(String),
}

impl StationKey {
    /// Parse user input: integers become `Id`, anything else `Name`
    pub fn parse(input: &str) -> Self {
        match input.parse::<i64>() {
            Ok(id) => StationKey::Id(id),
            Err(_) => StationKey::Name(input.to_string()),
        }
    }
}

impl fmt::Display for StationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StationKey::Id(id) => write!(f, "{}", id),
            StationKey::Name(name) => write!(f, "{}", name),
        }
    }
}

impl From<&str> for StationKey {
    fn from(name: &str) -> Self {
        StationKey::Name(name.to_string())
    }
}

impl From<String> for StationKey {
    fn from(name: String) -> Self {
        StationKey::Name(name)
    }
}

impl From<i64> for StationKey {
    fn from(id: i64) -> Self {
        StationKey::Id(id)
    }
}

/// Station position
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
        }
    }

    /// Builder method: set the altitude
    pub fn altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }
}

/// Latitude/longitude rectangle (inclusive edges, no dateline wrap)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub lat_min: f64,
    pub lat_max: f64,
    pub lon_min: f64,
    pub lon_max: f64,
}

impl BoundingBox {
    pub fn new(lat_min: f64, lat_max: f64, lon_min: f64, lon_max: f64) -> Self {
        Self {
            lat_min,
            lat_max,
            lon_min,
            lon_max,
        }
    }

    pub fn contains(&self, location: &Location) -> bool {
        location.latitude >= self.lat_min
            && location.latitude <= self.lat_max
            && location.longitude >= self.lon_min
            && location.longitude <= self.lon_max
    }

    /// Smallest box holding every location, `None` if there are none
    pub fn enclosing<'a>(locations: impl IntoIterator<Item = &'a Location>) -> Option<Self> {
        let mut iter = locations.into_iter();
        let first = iter.next()?;
        let mut bbox = Self::new(first.latitude, first.latitude, first.longitude, first.longitude);
        for loc in iter {
            bbox.lat_min = bbox.lat_min.min(loc.latitude);
            bbox.lat_max = bbox.lat_max.max(loc.latitude);
            bbox.lon_min = bbox.lon_min.min(loc.longitude);
            bbox.lon_max = bbox.lon_max.max(loc.longitude);
        }
        Some(bbox)
    }
}

/// Descriptive station metadata supplied by a writer
#[derive(Debug, Clone, PartialEq)]
pub struct StationInfo {
    pub key: StationKey,
    pub description: String,
    pub location: Option<Location>,
}

impl StationInfo {
    pub fn new(key: impl Into<StationKey>) -> Self {
        Self {
            key: key.into(),
            description: String::new(),
            location: None,
        }
    }

    /// Builder method: set the description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder method: set the location
    pub fn location(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

/// One persisted station row
///
/// Linkage columns hold raw pointers (`-1` is the sentinel) and are only
/// populated for the fields the store's schema declares.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StationRow {
    pub key: StationKey,
    pub description: String,
    pub location: Option<Location>,
    pub first_child: Option<i64>,
    pub last_child: Option<i64>,
    pub num_children: Option<i64>,
    pub inventory: Option<Inventory>,
}

/// A station with all the chains attached to its key
#[derive(Debug, Clone, PartialEq)]
pub struct Station {
    pub key: StationKey,
    pub description: String,
    pub location: Option<Location>,
    chains: Vec<Chain>,
}

impl Station {
    pub fn new(info: StationInfo) -> Self {
        Self {
            key: info.key,
            description: info.description,
            location: info.location,
            chains: Vec::new(),
        }
    }

    /// Chains in the order they were attached
    pub fn chains(&self) -> &[Chain] {
        &self.chains
    }

    /// Total observation count: the sum over all chains
    ///
    /// `None` when some chain's length is not recorded in the store
    /// (Forward/Backward stores without a count field or inventory).
    pub fn count(&self) -> Option<u64> {
        self.chains.iter().map(Chain::known_count).sum()
    }

    pub(crate) fn attach(&mut self, chain: Chain) {
        self.chains.push(chain);
    }

    /// Fill metadata gaps from a later row of the same station
    pub(crate) fn absorb_metadata(&mut self, info: StationInfo) {
        if self.description.is_empty() {
            self.description = info.description;
        }
        if self.location.is_none() {
            self.location = info.location;
        }
    }
}
