//! # obschain
//!
//! A station-linkage index over an append-only observation record store:
//! - Three interchangeable chain encodings (Forward, Backward, Contiguous)
//! - Incremental chain building while records are appended
//! - Lazy, restartable, cancellable per-station traversal
//! - Multi-chain stations when a station recurs across ingestion batches
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Index                               │
//! │        open / stations / observations_of / writer            │
//! └───────────┬──────────────────────────────────┬──────────────┘
//!             │ read path                        │ write path
//!             ▼                                  ▼
//!   ┌───────────────────┐              ┌───────────────────┐
//!   │   StationTable    │◄── merge ────│   ChainBuilder    │
//!   │ (StationMerger)   │              │ (pending edges)   │
//!   └─────────┬─────────┘              └─────────┬─────────┘
//!             │                                  │
//!             ▼                                  ▼
//!   ┌───────────────────┐              ┌───────────────────┐
//!   │   ChainWalker     │── ChainCodec ─│  pointer arrays   │
//!   └─────────┬─────────┘              └─────────┬─────────┘
//!             │                                  │
//!             └──────────────┬───────────────────┘
//!                            ▼
//!                  ┌───────────────────┐
//!                  │    RecordStore    │
//!                  │ (append-only arena│
//!                  │  indexed by recno)│
//!                  └───────────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod convention;

pub mod record;
pub mod station;
pub mod chain;
pub mod index;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{ObsError, Result};
pub use config::{Config, InventoryConfig, SyncStrategy};
pub use convention::{Convention, Schema};
pub use chain::{CancelToken, Encoding, Observation, TimeRange};
pub use index::{Index, StationScan, StationWriter, VerifyReport};
pub use record::{FileStore, MemoryStore, RecNo, RecordPayload, RecordStore};
pub use station::{BoundingBox, Location, Station, StationInfo, StationKey};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of obschain
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
