//! File-backed record store
//!
//! Directory layout:
//! ```text
//! {dir}/
//!   ├── schema.bin      bincode Schema, written once at create
//!   ├── records.log     append-only record frames
//!   ├── stations.log    append-only station row frames
//!   └── {field}.ptr     one i64 pointer array per per-record linkage field
//! ```
//!
//! Every handle keeps its own frame offset table. A reader handle picks up
//! records appended through another handle when `refresh()` rescans the
//! log from the last offset it knew about.

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::chain::codec::{decode_link, encode_link, POINTER_WIDTH};
use crate::config::{Config, SyncStrategy};
use crate::convention::{Convention, LinkField, Schema};
use crate::error::{ObsError, Result};
use crate::station::StationRow;

use super::frame::{decode_frame, encode_frame, FrameRead};
use super::{RecNo, Record, RecordPayload, RecordStore};

/// Record log handle plus the frame offsets discovered so far
struct RecordLog {
    file: File,
    /// Byte offset of each known frame, indexed by recno
    offsets: Vec<u64>,
    /// End of the last complete frame
    scan_offset: u64,
    /// Offset of a damaged frame that stopped the last scan
    corrupt_at: Option<u64>,
    /// Appends since the last fsync
    unsynced: usize,
}

/// File-backed record store
pub struct FileStore {
    dir: PathBuf,
    schema: Schema,
    sync_strategy: SyncStrategy,
    log: Mutex<RecordLog>,
    known_len: AtomicU64,
    links: HashMap<LinkField, Mutex<File>>,
}

impl FileStore {
    // =========================================================================
    // Internal Path Constants
    // =========================================================================
    const SCHEMA_FILENAME: &'static str = "schema.bin";
    const RECORDS_FILENAME: &'static str = "records.log";
    const STATIONS_FILENAME: &'static str = "stations.log";

    /// Open the store described by `config`, creating it if needed
    ///
    /// A new store gets the schema of `config.encoding`; an existing store
    /// keeps whatever schema it was created with.
    pub fn open_or_create(config: &Config) -> Result<Self> {
        if config.data_dir.join(Self::SCHEMA_FILENAME).exists() {
            Self::open(&config.data_dir, &config.convention, config.sync_strategy)
        } else {
            let schema = Schema::for_encoding(&config.convention, config.encoding);
            Self::create(&config.data_dir, schema, &config.convention, config.sync_strategy)
        }
    }

    /// Create a new, empty store
    pub fn create(
        dir: &Path,
        schema: Schema,
        convention: &Convention,
        sync_strategy: SyncStrategy,
    ) -> Result<Self> {
        fs::create_dir_all(dir)?;

        let schema_path = dir.join(Self::SCHEMA_FILENAME);
        if schema_path.exists() {
            return Err(ObsError::Config(format!(
                "store already exists at {}",
                dir.display()
            )));
        }

        let bytes = bincode::serialize(&schema)?;
        let mut file = File::create(&schema_path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;

        tracing::info!(dir = %dir.display(), "created record store");
        Self::open(dir, convention, sync_strategy)
    }

    /// Open an existing store
    pub fn open(dir: &Path, convention: &Convention, sync_strategy: SyncStrategy) -> Result<Self> {
        let schema_bytes = fs::read(dir.join(Self::SCHEMA_FILENAME))?;
        let schema: Schema = bincode::deserialize(&schema_bytes)?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(dir.join(Self::RECORDS_FILENAME))?;

        let mut links = HashMap::new();
        for field in schema.link_fields(convention) {
            let path = dir.join(format!("{}.ptr", convention.link_name(field)));
            let link_file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .open(path)?;
            links.insert(field, Mutex::new(link_file));
        }

        let mut log = RecordLog {
            file,
            offsets: Vec::new(),
            scan_offset: 0,
            corrupt_at: None,
            unsynced: 0,
        };
        Self::scan(&mut log)?;
        let len = log.offsets.len() as u64;

        tracing::debug!(dir = %dir.display(), records = len, "opened record store");

        Ok(Self {
            dir: dir.to_path_buf(),
            schema,
            sync_strategy,
            log: Mutex::new(log),
            known_len: AtomicU64::new(len),
            links,
        })
    }

    /// Directory holding this store
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    // =========================================================================
    // Private Helpers
    // =========================================================================

    /// Discover complete frames past `scan_offset`
    ///
    /// Stops at the first damaged frame and remembers where it is; frames
    /// behind it stay on disk but are not visible.
    fn scan(log: &mut RecordLog) -> Result<()> {
        log.corrupt_at = None;
        let end = log.file.metadata()?.len();
        if end <= log.scan_offset {
            return Ok(());
        }

        log.file.seek(SeekFrom::Start(log.scan_offset))?;
        let mut buf = Vec::with_capacity((end - log.scan_offset) as usize);
        (&mut log.file)
            .take(end - log.scan_offset)
            .read_to_end(&mut buf)?;

        let mut pos = 0usize;
        loop {
            match decode_frame(&buf[pos..]) {
                FrameRead::Frame { consumed, .. } => {
                    log.offsets.push(log.scan_offset + pos as u64);
                    pos += consumed;
                }
                FrameRead::Incomplete => break,
                FrameRead::Corrupt(reason) => {
                    tracing::warn!(
                        offset = log.scan_offset + pos as u64,
                        "stopping record scan at corrupt frame: {}",
                        reason
                    );
                    log.corrupt_at = Some(log.scan_offset + pos as u64);
                    break;
                }
            }
        }

        log.scan_offset += pos as u64;
        Ok(())
    }

    fn link_file(&self, field: LinkField) -> Result<&Mutex<File>> {
        self.links
            .get(&field)
            .ok_or_else(|| ObsError::UnknownField(format!("{:?}", field)))
    }

    fn maybe_sync(&self, log: &mut RecordLog) -> Result<()> {
        log.unsynced += 1;
        let due = match self.sync_strategy {
            SyncStrategy::EveryWrite => true,
            SyncStrategy::EveryNEntries { count } => log.unsynced >= count,
        };
        if due {
            self.sync_locked(log)?;
        }
        Ok(())
    }

    fn sync_locked(&self, log: &mut RecordLog) -> Result<()> {
        for file in self.links.values() {
            file.lock().sync_data()?;
        }
        log.file.sync_data()?;
        log.unsynced = 0;
        Ok(())
    }
}

impl RecordStore for FileStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn record_count(&self) -> u64 {
        self.known_len.load(Ordering::Acquire)
    }

    fn refresh(&self) -> Result<u64> {
        let mut log = self.log.lock();
        Self::scan(&mut log)?;
        let len = log.offsets.len() as u64;
        self.known_len.store(len, Ordering::Release);
        Ok(len)
    }

    fn read(&self, recno: RecNo) -> Result<Record> {
        let mut log = self.log.lock();
        let len = log.offsets.len() as u64;
        if recno >= len {
            return Err(ObsError::OutOfRange { recno, len });
        }

        let start = log.offsets[recno as usize];
        let end = log
            .offsets
            .get(recno as usize + 1)
            .copied()
            .unwrap_or(log.scan_offset);

        let mut buf = vec![0u8; (end - start) as usize];
        log.file.seek(SeekFrom::Start(start))?;
        log.file.read_exact(&mut buf)?;

        match decode_frame(&buf) {
            FrameRead::Frame { payload, .. } => {
                let payload: RecordPayload = bincode::deserialize(&payload)?;
                Ok(Record { recno, payload })
            }
            FrameRead::Incomplete => Err(ObsError::RecordCorruption(format!(
                "record {} frame truncated",
                recno
            ))),
            FrameRead::Corrupt(reason) => Err(ObsError::RecordCorruption(format!(
                "record {}: {}",
                recno, reason
            ))),
        }
    }

    fn append(&self, payload: RecordPayload) -> Result<RecNo> {
        let data = bincode::serialize(&payload)?;
        let frame = encode_frame(&data);

        let mut log = self.log.lock();

        // Step 1: Drop a torn tail left behind by a crashed writer. A damaged
        // frame is not a torn tail: the log is never shrunk past it.
        Self::scan(&mut log)?;
        if let Some(offset) = log.corrupt_at {
            return Err(ObsError::RecordCorruption(format!(
                "record log damaged at offset {} after {} intact records; refusing to append",
                offset,
                log.offsets.len()
            )));
        }
        let file_len = log.file.metadata()?.len();
        if file_len != log.scan_offset {
            tracing::warn!(
                from = file_len,
                to = log.scan_offset,
                "truncating partial record frame"
            );
            log.file.set_len(log.scan_offset)?;
        }

        let recno = log.offsets.len() as u64;

        // Step 2: Reserve the link slots before the record becomes visible
        let sentinel = encode_link(None).to_le_bytes();
        for file in self.links.values() {
            let mut file = file.lock();
            file.seek(SeekFrom::Start(recno * POINTER_WIDTH))?;
            file.write_all(&sentinel)?;
        }

        // Step 3: Write the frame
        let offset = log.scan_offset;
        log.file.write_all(&frame)?;
        log.offsets.push(offset);
        log.scan_offset = offset + frame.len() as u64;
        self.known_len.store(recno + 1, Ordering::Release);

        self.maybe_sync(&mut log)?;
        Ok(recno)
    }

    fn read_link(&self, field: LinkField, recno: RecNo) -> Result<Option<RecNo>> {
        let len = self.record_count();
        if recno >= len {
            return Err(ObsError::OutOfRange { recno, len });
        }

        let mut file = self.link_file(field)?.lock();
        let mut raw = [0u8; POINTER_WIDTH as usize];
        file.seek(SeekFrom::Start(recno * POINTER_WIDTH))?;
        match file.read_exact(&mut raw) {
            Ok(()) => decode_link(i64::from_le_bytes(raw)),
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                Err(ObsError::OutOfRange { recno, len })
            }
            Err(e) => Err(e.into()),
        }
    }

    fn write_link(&self, field: LinkField, recno: RecNo, target: Option<RecNo>) -> Result<()> {
        let len = self.record_count();
        if recno >= len {
            return Err(ObsError::OutOfRange { recno, len });
        }

        let mut file = self.link_file(field)?.lock();
        file.seek(SeekFrom::Start(recno * POINTER_WIDTH))?;
        file.write_all(&encode_link(target).to_le_bytes())?;
        Ok(())
    }

    fn write_link_array(&self, field: LinkField, start: RecNo, pointers: &[u8]) -> Result<()> {
        if pointers.len() as u64 % POINTER_WIDTH != 0 {
            return Err(ObsError::RecordCorruption(format!(
                "pointer array of {} bytes is not a multiple of {}",
                pointers.len(),
                POINTER_WIDTH
            )));
        }

        let count = pointers.len() as u64 / POINTER_WIDTH;
        let len = self.record_count();
        if start + count > len {
            return Err(ObsError::OutOfRange {
                recno: start + count - 1,
                len,
            });
        }

        let mut file = self.link_file(field)?.lock();
        file.seek(SeekFrom::Start(start * POINTER_WIDTH))?;
        file.write_all(pointers)?;
        Ok(())
    }

    fn station_rows(&self) -> Result<Vec<StationRow>> {
        let path = self.dir.join(Self::STATIONS_FILENAME);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut rows = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            match decode_frame(&bytes[pos..]) {
                FrameRead::Frame { payload, consumed } => {
                    rows.push(bincode::deserialize(&payload)?);
                    pos += consumed;
                }
                FrameRead::Incomplete => {
                    tracing::warn!(offset = pos, "ignoring partial station row");
                    break;
                }
                FrameRead::Corrupt(reason) => {
                    tracing::warn!(offset = pos, "ignoring corrupt station rows: {}", reason);
                    break;
                }
            }
        }
        Ok(rows)
    }

    fn append_station_rows(&self, rows: &[StationRow]) -> Result<()> {
        let mut buf = Vec::new();
        for row in rows {
            buf.extend_from_slice(&encode_frame(&bincode::serialize(row)?));
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.dir.join(Self::STATIONS_FILENAME))?;
        file.write_all(&buf)?;
        file.sync_data()?;
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        let mut log = self.log.lock();
        self.sync_locked(&mut log)
    }
}
