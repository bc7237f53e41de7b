//! Append-only log engine for persistent storage.

use crate::batch::WriteBatch;
use crate::engine::KvEngine;
use crate::error::{StorageError, StorageResult};
use crate::snapshot::{MemTable, Snapshot};
use fs2::FileExt;
use parking_lot::{Mutex, RwLock};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, error, warn};

/// Magic bytes opening every log record.
pub const LOG_MAGIC: [u8; 4] = *b"NKVB";

/// Size of a record header: magic (4) + payload length (4) + crc32 (4).
pub const LOG_HEADER_SIZE: usize = 12;

/// Name of the log file inside the engine directory.
pub const LOG_FILE: &str = "data.log";

/// Name of the lock file inside the engine directory.
pub const LOCK_FILE: &str = "LOCK";

/// Options for opening a [`LogEngine`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LogOptions {
    /// Whether to create the directory if it doesn't exist.
    pub create_if_missing: bool,
    /// Whether to fsync the log after every batch.
    pub sync_on_write: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            create_if_missing: true,
            sync_on_write: true,
        }
    }
}

/// A persistent engine backed by a single append-only batch log.
///
/// Every [`KvEngine::write`] appends one framed record holding the encoded
/// batch and then applies it to an in-memory sorted table. Opening the engine
/// replays the log; a torn or corrupt tail is cut off, so a batch is either
/// fully recovered or not at all. A record whose append fails is cut back
/// out of the log before the error is returned; if that cut fails the engine
/// closes itself.
///
/// # Record Layout
///
/// ```text
/// | magic "NKVB" | payload_len u32 LE | crc32(payload) u32 LE | payload |
/// ```
///
/// # Locking
///
/// The directory is held with an exclusive OS lock for the lifetime of the
/// engine. A second open, from this or another process, fails with
/// [`StorageError::Locked`].
///
/// # Example
///
/// ```no_run
/// use nestdb_storage::{KvEngine, LogEngine, LogOptions};
/// use std::path::Path;
///
/// let engine = LogEngine::open(Path::new("data"), LogOptions::default()).unwrap();
/// engine.put(b"key", b"value").unwrap();
/// ```
#[derive(Debug)]
pub struct LogEngine {
    dir: PathBuf,
    options: LogOptions,
    log: Mutex<File>,
    table: RwLock<MemTable>,
    closed: AtomicBool,
    _lock_file: File,
}

impl LogEngine {
    /// Opens or creates a log engine in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - Another handle holds the directory lock (`Locked`)
    /// - An I/O error occurs while reading or repairing the log
    pub fn open(dir: &Path, options: LogOptions) -> StorageResult<Self> {
        if !dir.exists() {
            if !options.create_if_missing {
                return Err(StorageError::Io(io::Error::new(
                    io::ErrorKind::NotFound,
                    format!("engine directory {} does not exist", dir.display()),
                )));
            }
            fs::create_dir_all(dir)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(StorageError::Locked);
        }

        let mut log = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(dir.join(LOG_FILE))?;

        let mut bytes = Vec::new();
        log.read_to_end(&mut bytes)?;

        let replay = replay(&bytes);
        if replay.valid_len < bytes.len() as u64 {
            warn!(
                offset = replay.valid_len,
                dropped = bytes.len() as u64 - replay.valid_len,
                "truncating torn tail of batch log"
            );
            log.set_len(replay.valid_len)?;
            log.sync_all()?;
        }
        log.seek(SeekFrom::End(0))?;

        let mut table = MemTable::default();
        let batches = replay.batches.len();
        for batch in replay.batches {
            table.apply(batch);
        }
        debug!(dir = %dir.display(), batches, keys = table.len(), "replayed batch log");

        Ok(Self {
            dir: dir.to_path_buf(),
            options,
            log: Mutex::new(log),
            table: RwLock::new(table),
            closed: AtomicBool::new(false),
            _lock_file: lock_file,
        })
    }

    /// Returns the engine directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.dir
    }

    /// Returns the options the engine was opened with.
    #[must_use]
    pub fn options(&self) -> LogOptions {
        self.options
    }

    /// Returns the sequence number of the last applied batch.
    ///
    /// After a reopen this equals the number of recovered batches.
    #[must_use]
    pub fn sequence(&self) -> u64 {
        self.table.read().sequence()
    }

    /// Closes the engine. Later writes fail with [`StorageError::Closed`].
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> StorageResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.log.lock().sync_all()?;
        Ok(())
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(StorageError::Closed);
        }
        Ok(())
    }
}

impl KvEngine for LogEngine {
    fn snapshot(&self) -> Snapshot {
        self.table.read().snapshot()
    }

    fn write(&self, batch: WriteBatch) -> StorageResult<()> {
        self.ensure_open()?;
        if batch.is_empty() {
            return Ok(());
        }

        let record = encode_record(&batch.encode());

        // Hold the log lock until the table is updated so that log order
        // and apply order agree.
        let mut log = self.log.lock();
        if let Err(failure) = append_record(&mut *log, &record, self.options.sync_on_write) {
            if !failure.rolled_back {
                self.closed.store(true, Ordering::SeqCst);
                error!(dir = %self.dir.display(), "batch log could not be cut back, closing engine");
            }
            return Err(StorageError::Io(failure.error));
        }
        self.table.write().apply(batch);
        Ok(())
    }

    fn get(&self, key: &[u8]) -> StorageResult<Option<Vec<u8>>> {
        Ok(self.table.read().get(key))
    }

    fn flush(&self) -> StorageResult<()> {
        self.ensure_open()?;
        let mut log = self.log.lock();
        log.flush()?;
        log.sync_all()?;
        Ok(())
    }
}

/// Append target of the batch log.
trait LogSink: Write + Seek {
    fn sync_data(&self) -> io::Result<()>;
    fn set_len(&self, len: u64) -> io::Result<()>;
}

impl LogSink for File {
    fn sync_data(&self) -> io::Result<()> {
        File::sync_data(self)
    }

    fn set_len(&self, len: u64) -> io::Result<()> {
        File::set_len(self, len)
    }
}

#[derive(Debug)]
struct AppendFailure {
    error: io::Error,
    /// Whether the log was cut back to its length before the append.
    rolled_back: bool,
}

/// Appends one record. On any failure the sink is truncated back to where
/// the record started, so a rejected batch never reaches replay.
fn append_record<L: LogSink + ?Sized>(
    log: &mut L,
    record: &[u8],
    sync: bool,
) -> Result<(), AppendFailure> {
    let start = log.stream_position().map_err(|error| AppendFailure {
        error,
        rolled_back: true,
    })?;

    let written = log
        .write_all(record)
        .and_then(|()| log.flush())
        .and_then(|()| if sync { log.sync_data() } else { Ok(()) });
    let Err(error) = written else {
        return Ok(());
    };

    let rollback = log
        .set_len(start)
        .and_then(|()| log.seek(SeekFrom::Start(start)))
        .and_then(|_| if sync { log.sync_data() } else { Ok(()) });
    match rollback {
        Ok(()) => {
            warn!(offset = start, error = %error, "batch append failed, log cut back");
            Err(AppendFailure {
                error,
                rolled_back: true,
            })
        }
        Err(cause) => {
            error!(offset = start, error = %error, rollback = %cause, "batch log rollback failed");
            Err(AppendFailure {
                error,
                rolled_back: false,
            })
        }
    }
}

/// Frames a payload as a log record.
#[must_use]
pub fn encode_record(payload: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(LOG_HEADER_SIZE + payload.len());
    record.extend_from_slice(&LOG_MAGIC);
    record.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    record.extend_from_slice(&crc32fast::hash(payload).to_le_bytes());
    record.extend_from_slice(payload);
    record
}

/// Result of scanning a batch log.
#[derive(Debug)]
pub struct Replay {
    /// Batches recovered, in log order.
    pub batches: Vec<WriteBatch>,
    /// Length of the valid log prefix in bytes.
    pub valid_len: u64,
}

/// Scans a batch log, stopping at the first torn or corrupt record.
#[must_use]
pub fn replay(bytes: &[u8]) -> Replay {
    let mut batches = Vec::new();
    let mut offset = 0usize;

    while offset + LOG_HEADER_SIZE <= bytes.len() {
        let header = &bytes[offset..offset + LOG_HEADER_SIZE];
        if header[0..4] != LOG_MAGIC {
            break;
        }
        let len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let crc = u32::from_le_bytes([header[8], header[9], header[10], header[11]]);

        let start = offset + LOG_HEADER_SIZE;
        let Some(payload) = start.checked_add(len).and_then(|end| bytes.get(start..end)) else {
            break;
        };
        if crc32fast::hash(payload) != crc {
            break;
        }
        let Some(batch) = WriteBatch::decode(payload) else {
            break;
        };

        batches.push(batch);
        offset = start + len;
    }

    Replay {
        batches,
        valid_len: offset as u64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::{Cell, RefCell};
    use tempfile::TempDir;

    fn open(dir: &Path) -> LogEngine {
        LogEngine::open(dir, LogOptions::default()).unwrap()
    }

    #[test]
    fn log_data_survives_reopen() {
        let temp = TempDir::new().unwrap();
        {
            let engine = open(temp.path());
            engine.put(b"a", b"1").unwrap();
            engine.put(b"b", b"2").unwrap();
            engine.delete(b"a").unwrap();
        }

        let engine = open(temp.path());
        assert_eq!(engine.get(b"a").unwrap(), None);
        assert_eq!(engine.get(b"b").unwrap(), Some(b"2".to_vec()));
        assert_eq!(engine.sequence(), 3);
    }

    #[test]
    fn log_second_open_is_locked() {
        let temp = TempDir::new().unwrap();
        let _engine = open(temp.path());

        let result = LogEngine::open(temp.path(), LogOptions::default());
        assert!(matches!(result, Err(StorageError::Locked)));
    }

    #[test]
    fn log_missing_dir_without_create_fails() {
        let temp = TempDir::new().unwrap();
        let options = LogOptions {
            create_if_missing: false,
            ..LogOptions::default()
        };
        assert!(LogEngine::open(&temp.path().join("absent"), options).is_err());
    }

    #[test]
    fn log_torn_tail_is_truncated() {
        let temp = TempDir::new().unwrap();
        {
            let engine = open(temp.path());
            let mut batch = WriteBatch::new();
            batch.put(b"x".to_vec(), b"1".to_vec());
            batch.put(b"y".to_vec(), b"2".to_vec());
            engine.write(batch).unwrap();
        }

        let log_path = temp.path().join(LOG_FILE);
        let good_len = fs::metadata(&log_path).unwrap().len();

        // Append half of a second record.
        let mut batch = WriteBatch::new();
        batch.put(b"z".to_vec(), b"3".to_vec());
        let record = encode_record(&batch.encode());
        let mut file = OpenOptions::new().append(true).open(&log_path).unwrap();
        file.write_all(&record[..record.len() / 2]).unwrap();
        drop(file);

        let engine = open(temp.path());
        assert_eq!(engine.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(engine.get(b"z").unwrap(), None);
        assert_eq!(fs::metadata(&log_path).unwrap().len(), good_len);
    }

    #[test]
    fn replay_stops_at_bad_checksum() {
        let mut first = WriteBatch::new();
        first.put(b"a".to_vec(), b"1".to_vec());
        let mut second = WriteBatch::new();
        second.put(b"b".to_vec(), b"2".to_vec());

        let mut bytes = encode_record(&first.encode());
        let first_len = bytes.len();
        let mut corrupt = encode_record(&second.encode());
        let last = corrupt.len() - 1;
        corrupt[last] ^= 0xFF;
        bytes.extend_from_slice(&corrupt);

        let replay = replay(&bytes);
        assert_eq!(replay.batches, vec![first]);
        assert_eq!(replay.valid_len, first_len as u64);
    }

    /// In-memory log that can fail writes, syncs, or truncation.
    struct FlakySink {
        data: RefCell<Vec<u8>>,
        pos: u64,
        budget: usize,
        sync_failures: Cell<usize>,
        fail_truncate: bool,
    }

    impl FlakySink {
        fn new() -> Self {
            Self {
                data: RefCell::new(Vec::new()),
                pos: 0,
                budget: usize::MAX,
                sync_failures: Cell::new(0),
                fail_truncate: false,
            }
        }

        fn len(&self) -> usize {
            self.data.borrow().len()
        }
    }

    impl Write for FlakySink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.budget == 0 {
                return Err(io::Error::other("device full"));
            }
            let n = buf.len().min(self.budget);
            self.budget -= n;
            let data = self.data.get_mut();
            data.truncate(self.pos as usize);
            data.extend_from_slice(&buf[..n]);
            self.pos += n as u64;
            Ok(n)
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Seek for FlakySink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
            self.pos = match pos {
                SeekFrom::Start(offset) => offset,
                SeekFrom::End(delta) => (self.len() as i64 + delta) as u64,
                SeekFrom::Current(delta) => (self.pos as i64 + delta) as u64,
            };
            Ok(self.pos)
        }
    }

    impl LogSink for FlakySink {
        fn sync_data(&self) -> io::Result<()> {
            let left = self.sync_failures.get();
            if left > 0 {
                self.sync_failures.set(left - 1);
                return Err(io::Error::other("sync failed"));
            }
            Ok(())
        }

        fn set_len(&self, len: u64) -> io::Result<()> {
            if self.fail_truncate {
                return Err(io::Error::other("truncate failed"));
            }
            self.data.borrow_mut().truncate(len as usize);
            Ok(())
        }
    }

    fn record(key: &[u8]) -> (WriteBatch, Vec<u8>) {
        let mut batch = WriteBatch::new();
        batch.put(key.to_vec(), b"v".to_vec());
        let record = encode_record(&batch.encode());
        (batch, record)
    }

    #[test]
    fn partial_append_is_cut_back() {
        let mut sink = FlakySink::new();
        let (first, first_record) = record(b"a");
        let (_, torn_record) = record(b"b");
        let (third, third_record) = record(b"c");

        append_record(&mut sink, &first_record, true).unwrap();
        sink.budget = 6;
        let failure = append_record(&mut sink, &torn_record, true).unwrap_err();
        assert!(failure.rolled_back);
        assert_eq!(sink.len(), first_record.len());

        sink.budget = usize::MAX;
        append_record(&mut sink, &third_record, true).unwrap();

        let replay = replay(&sink.data.borrow());
        assert_eq!(replay.batches, vec![first, third]);
    }

    #[test]
    fn failed_sync_does_not_resurrect_batch() {
        let mut sink = FlakySink::new();
        let (first, first_record) = record(b"a");
        let (_, unsynced_record) = record(b"b");
        let (third, third_record) = record(b"c");

        append_record(&mut sink, &first_record, true).unwrap();
        sink.sync_failures.set(1);
        let failure = append_record(&mut sink, &unsynced_record, true).unwrap_err();
        assert!(failure.rolled_back);
        assert_eq!(sink.len(), first_record.len());

        append_record(&mut sink, &third_record, true).unwrap();
        let replay = replay(&sink.data.borrow());
        assert_eq!(replay.batches, vec![first, third]);
    }

    #[test]
    fn unconfirmed_cut_is_reported() {
        let mut sink = FlakySink::new();
        let (_, record) = record(b"a");

        // The sync after truncation fails as well.
        sink.sync_failures.set(2);
        let failure = append_record(&mut sink, &record, true).unwrap_err();
        assert!(!failure.rolled_back);

        let mut sink = FlakySink::new();
        sink.budget = 5;
        sink.fail_truncate = true;
        let failure = append_record(&mut sink, &record, false).unwrap_err();
        assert!(!failure.rolled_back);
    }

    #[test]
    fn unsynced_append_rolls_back() {
        let mut sink = FlakySink::new();
        let (_, record) = record(b"a");

        sink.budget = 3;
        let failure = append_record(&mut sink, &record, false).unwrap_err();
        assert!(failure.rolled_back);
        assert_eq!(sink.len(), 0);
    }

    #[test]
    fn log_write_after_close_fails() {
        let temp = TempDir::new().unwrap();
        let engine = open(temp.path());
        engine.close().unwrap();

        assert!(matches!(engine.put(b"k", b"v"), Err(StorageError::Closed)));
    }
}
