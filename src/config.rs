//! Configuration for obschain
//!
//! Centralized configuration with sensible defaults.

use std::path::PathBuf;

use crate::chain::Encoding;
use crate::convention::Convention;

/// Main configuration for an on-disk index
#[derive(Debug, Clone)]
pub struct Config {
    // -------------------------------------------------------------------------
    // Storage Configuration
    // -------------------------------------------------------------------------
    /// Root directory for all data files
    /// Internal structure:
    ///   {data_dir}/
    ///     ├── schema.bin       (fields present, written at create)
    ///     ├── records.log      (append-only record frames)
    ///     ├── stations.log     (append-only station rows, one per batch)
    ///     └── *.ptr            (per-record pointer arrays)
    pub data_dir: PathBuf,

    /// Sync strategy: how often to fsync appended records
    pub sync_strategy: SyncStrategy,

    // -------------------------------------------------------------------------
    // Chain Configuration
    // -------------------------------------------------------------------------
    /// Encoding used when a new store is created. Ignored for existing
    /// stores, whose encoding is detected from the fields present.
    pub encoding: Encoding,

    /// Optional per-chain inventory bitmask
    pub inventory: Option<InventoryConfig>,

    /// Field naming convention
    pub convention: Convention,
}

/// Record sync strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStrategy {
    /// fsync after every append (safest, slowest)
    EveryWrite,

    /// fsync after N unsynced appends
    EveryNEntries { count: usize },
}

/// Time-slot layout for the inventory bitmask
///
/// Slot `i` covers `[origin_ms + i * slot_ms, origin_ms + (i + 1) * slot_ms)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InventoryConfig {
    pub origin_ms: i64,
    pub slot_ms: i64,
    pub slots: u32,
}

impl InventoryConfig {
    /// Map an observation time to its slot, if it falls inside the window
    pub fn slot_of(&self, time_ms: i64) -> Option<u32> {
        if self.slot_ms <= 0 || time_ms < self.origin_ms {
            return None;
        }
        let slot = (time_ms - self.origin_ms) / self.slot_ms;
        if slot < self.slots as i64 {
            Some(slot as u32)
        } else {
            None
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./obschain_data"),
            sync_strategy: SyncStrategy::EveryNEntries { count: 100 },
            encoding: Encoding::Forward,
            inventory: None,
            convention: Convention::default(),
        }
    }
}

impl Config {
    /// Create a new config builder
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Builder for Config
#[derive(Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Set the data directory (root for all storage)
    pub fn data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.data_dir = path.into();
        self
    }

    /// Set the sync strategy
    pub fn sync_strategy(mut self, strategy: SyncStrategy) -> Self {
        self.config.sync_strategy = strategy;
        self
    }

    /// Set the encoding for newly created stores
    pub fn encoding(mut self, encoding: Encoding) -> Self {
        self.config.encoding = encoding;
        self
    }

    /// Enable per-chain inventory bitmasks
    pub fn inventory(mut self, inventory: InventoryConfig) -> Self {
        self.config.inventory = Some(inventory);
        self
    }

    /// Set the field naming convention
    pub fn convention(mut self, convention: Convention) -> Self {
        self.config.convention = convention;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}
