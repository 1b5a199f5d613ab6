//! File-backed write-ahead log.
//!
//! Entries are stored as newline-delimited JSON in a single log file, with
//! fsync on every flush for durability. Truncation rewrites the surviving
//! suffix to a sibling temp file and renames it over the log, so a crash
//! observes either the old log or the new one, never a torn state.

use std::ffi::OsString;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use docstore_core::{CoreError, CoreResult};

use crate::checksum;
use crate::compression::{self, StoredEntry};
use crate::entry::{SequenceNumber, WalEntry};
use crate::store::{LogStore, WalOptions};

use async_trait::async_trait;

/// File-backed [`LogStore`].
///
/// # File Format
/// One JSON object per line, UTF-8, exactly the wire form of a plain or
/// compressed entry. Trailing partial lines are ignored on read. An absent
/// file is an empty log.
///
/// # Crash Recovery
/// On open, the log is scanned once to seed the sequence counter from the
/// highest sequence number observed; corrupt lines are tolerated.
///
/// # Thread Safety
/// A single `parking_lot::Mutex` guards the counter, the write buffer, and
/// the file handle. It is never held across an await point; all file I/O
/// under the lock is synchronous, as in the append path of the upstream
/// storage engine this mirrors.
pub struct FileWal {
    path: PathBuf,
    options: WalOptions,
    inner: Mutex<Inner>,
}

struct Inner {
    /// Append handle, opened lazily so a truncated-away file is recreated
    /// transparently on the next flush.
    writer: Option<BufWriter<File>>,
    buffer: Vec<WalEntry>,
    sequence: SequenceNumber,
    closed: bool,
}

impl FileWal {
    /// Opens (or creates) the log at `options.wal_path`.
    ///
    /// Ensures the containing directory exists and seeds the sequence
    /// counter from any existing log content.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the directory cannot be created or the log cannot be
    /// scanned.
    pub async fn open(options: WalOptions) -> CoreResult<Self> {
        let path = options.wal_path.clone();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let sequence = Self::scan_last_sequence(&path)?;
        info!(
            path = %path.display(),
            sequence = sequence.value(),
            "opened write-ahead log"
        );

        Ok(Self {
            path,
            options,
            inner: Mutex::new(Inner {
                writer: None,
                buffer: Vec::new(),
                sequence,
                closed: false,
            }),
        })
    }

    /// Highest sequence number present in the log file, or zero.
    fn scan_last_sequence(path: &Path) -> CoreResult<SequenceNumber> {
        let mut max = SequenceNumber::ZERO;
        for (_, stored) in Self::read_lines(path)? {
            if stored.sequence() > max {
                max = stored.sequence();
            }
        }
        Ok(max)
    }

    /// Reads all parseable records with their raw lines. Malformed lines are
    /// skipped with a warning; an unreadable tail stops the scan.
    fn read_lines(path: &Path) -> CoreResult<Vec<(String, StoredEntry)>> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut records = Vec::new();
        for line in BufReader::new(file).lines() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("unreadable log tail, stopping scan: {e}");
                    break;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<StoredEntry>(&line) {
                Ok(stored) => records.push((line, stored)),
                Err(e) => warn!("skipping malformed log line: {e}"),
            }
        }
        Ok(records)
    }

    /// Assigns the next sequence number, signs if enabled, and buffers.
    fn enqueue(&self, inner: &mut Inner, mut entry: WalEntry) -> CoreResult<SequenceNumber> {
        inner.sequence = inner.sequence.next();
        entry.sequence = inner.sequence;
        if self.options.enable_checksums {
            entry.checksum = checksum::sign(&entry)?;
        }
        inner.buffer.push(entry);
        Ok(inner.sequence)
    }

    /// Writes the buffer to the log file and fsyncs. On failure the buffer
    /// is preserved for retry and the file handle is dropped so the retry
    /// starts from a fresh one.
    fn flush_locked(&self, inner: &mut Inner) -> CoreResult<()> {
        if inner.buffer.is_empty() {
            return Ok(());
        }

        let mut chunk = String::new();
        for entry in &inner.buffer {
            let stored = if self.options.enable_compression {
                compression::compress(entry, &self.options.compression)
            } else {
                StoredEntry::Plain(entry.clone())
            };
            chunk.push_str(&serde_json::to_string(&stored)?);
            chunk.push('\n');
        }

        let mut writer = match inner.writer.take() {
            Some(w) => w,
            None => {
                let file = OpenOptions::new()
                    .create(true)
                    .append(true)
                    .open(&self.path)?;
                BufWriter::new(file)
            }
        };

        match write_chunk(&mut writer, chunk.as_bytes()) {
            Ok(()) => {
                inner.writer = Some(writer);
                let flushed = inner.buffer.len();
                inner.buffer.clear();
                debug!(entries = flushed, "flushed write-ahead log buffer");
                Ok(())
            }
            // The handle is dropped so the retry starts from a fresh one.
            Err(e) => Err(e.into()),
        }
    }

    /// Reads, decompresses, and verifies entries with `sequence >= since`.
    fn read_entries(&self, since: SequenceNumber) -> CoreResult<Vec<WalEntry>> {
        let mut entries = Vec::new();

        for (_, stored) in Self::read_lines(&self.path)? {
            if stored.sequence() < since {
                continue;
            }

            let entry = match compression::decompress(stored) {
                Ok(e) => e,
                Err(e) => {
                    warn!("skipping entry that failed to decompress: {e}");
                    continue;
                }
            };

            if self.options.enable_checksums && !entry.checksum.is_empty() {
                match checksum::verify(&entry) {
                    Ok(true) => {}
                    Ok(false) => {
                        warn!(
                            sequence = entry.sequence.value(),
                            "skipping entry with checksum mismatch"
                        );
                        continue;
                    }
                    Err(e) => {
                        warn!("skipping entry that failed verification: {e}");
                        continue;
                    }
                }
            }

            entries.push(entry);
        }

        entries.sort_by_key(|e| e.sequence);
        Ok(entries)
    }
}

fn write_chunk(writer: &mut BufWriter<File>, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes)?;
    writer.flush()?;
    writer.get_ref().sync_all()
}

fn sibling_temp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[async_trait]
impl LogStore for FileWal {
    async fn append(&self, entry: WalEntry) -> CoreResult<SequenceNumber> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }

        let force = entry.forces_flush();
        let sequence = self.enqueue(&mut inner, entry)?;

        if force || inner.buffer.len() >= self.options.max_buffer_size {
            self.flush_locked(&mut inner)?;
        }

        debug!(sequence = sequence.value(), "appended log entry");
        Ok(sequence)
    }

    async fn append_batch(&self, entries: Vec<WalEntry>) -> CoreResult<Vec<SequenceNumber>> {
        if entries.is_empty() {
            return Ok(Vec::new());
        }

        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }

        let mut sequences = Vec::with_capacity(entries.len());
        let mut force = false;
        for entry in entries {
            force |= entry.forces_flush();
            sequences.push(self.enqueue(&mut inner, entry)?);
        }

        if force || inner.buffer.len() >= self.options.max_buffer_size {
            self.flush_locked(&mut inner)?;
        }

        Ok(sequences)
    }

    async fn read_from(&self, since: SequenceNumber) -> CoreResult<Vec<WalEntry>> {
        // Hold the lock so reads do not interleave with a flush or truncate.
        let _inner = self.inner.lock();
        self.read_entries(since)
    }

    async fn truncate_below(&self, boundary: SequenceNumber) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }

        // Buffered entries take part in the rewrite.
        self.flush_locked(&mut inner)?;

        let records = Self::read_lines(&self.path)?;
        let survivors: Vec<&str> = records
            .iter()
            .filter(|(_, stored)| stored.sequence() >= boundary)
            .map(|(line, _)| line.as_str())
            .collect();

        // Release the append handle before replacing the file underneath it.
        inner.writer = None;

        if survivors.is_empty() {
            match std::fs::remove_file(&self.path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            info!(boundary = boundary.value(), "truncated write-ahead log to empty");
            return Ok(());
        }

        let tmp_path = sibling_temp_path(&self.path);
        {
            let mut writer = BufWriter::new(File::create(&tmp_path)?);
            for line in &survivors {
                writeln!(writer, "{line}")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;

        info!(
            boundary = boundary.value(),
            surviving = survivors.len(),
            "truncated write-ahead log"
        );
        Ok(())
    }

    async fn flush(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }
        self.flush_locked(&mut inner)
    }

    async fn tick(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(CoreError::Closed);
        }
        if inner.buffer.is_empty() {
            return Ok(());
        }
        self.flush_locked(&mut inner)
    }

    async fn current_sequence(&self) -> CoreResult<SequenceNumber> {
        Ok(self.inner.lock().sequence)
    }

    async fn close(&self) -> CoreResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Ok(());
        }
        self.flush_locked(&mut inner)?;
        inner.writer = None;
        inner.closed = true;
        info!(path = %self.path.display(), "closed write-ahead log");
        Ok(())
    }
}
