//! # Audit Sinks
//!
//! Append-only storage for [`DiagnosticRecord`]s. Records are never mutated
//! or removed once appended (the in-memory sink only forgets the oldest ones
//! past its history limit).
//!
//! ## Audit Log Format
//!
//! ```text
//! [4 bytes: magic "RAUD"]
//! [4 bytes: version]
//!
//! Frame format:
//! [8 bytes: frame sequence number]
//! [4 bytes: payload length]
//! [N bytes: payload (JSON-encoded DiagnosticRecord)]
//! [4 bytes: CRC32 of above]
//! ```
//!
//! On open the log is replayed up to the first torn or corrupt frame; the
//! next append continues after the highest sequence number seen and
//! overwrites the damaged tail.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{info, warn};

use crate::diagnostics::DiagnosticRecord;
use crate::error::{SyncError, SyncResult};

/// Magic bytes identifying an audit log file.
const AUDIT_MAGIC: &[u8; 4] = b"RAUD";

/// Current audit log format version.
const AUDIT_VERSION: u32 = 1;

/// Header length in bytes.
const HEADER_LEN: u64 = 8;

/// Destination for diagnostic records.
pub trait AuditSink: Send + Sync {
    /// Appends a record.
    ///
    /// # Errors
    ///
    /// [`SyncError::Audit`] when the record could not be stored.
    fn append(&self, record: &DiagnosticRecord) -> SyncResult<()>;

    /// First record sequence a new writer should use: one past the highest
    /// record sequence already held.
    fn resume_sequence(&self) -> u64 {
        0
    }
}

fn next_record_sequence<'a>(records: impl IntoIterator<Item = &'a DiagnosticRecord>) -> u64 {
    records.into_iter().map(|r| r.sequence.saturating_add(1)).max().unwrap_or(0)
}

/// In-memory sink keeping the most recent records.
#[derive(Debug)]
pub struct MemoryAuditSink {
    records: Mutex<VecDeque<DiagnosticRecord>>,
    capacity: usize,
}

impl MemoryAuditSink {
    /// Sink keeping at most `capacity` records.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity: capacity.max(1),
        }
    }

    /// Retained records, oldest first.
    #[must_use]
    pub fn records(&self) -> Vec<DiagnosticRecord> {
        self.records.lock().iter().cloned().collect()
    }

    /// Number of retained records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    /// True when nothing was recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn append(&self, record: &DiagnosticRecord) -> SyncResult<()> {
        let mut records = self.records.lock();
        while records.len() >= self.capacity {
            records.pop_front();
        }
        records.push_back(record.clone());
        Ok(())
    }

    fn resume_sequence(&self) -> u64 {
        next_record_sequence(self.records.lock().iter())
    }
}

fn io_error(context: &str, error: &std::io::Error) -> SyncError {
    SyncError::Audit(format!("{context}: {error}"))
}

/// File-backed, CRC32-framed audit log.
pub struct AuditLog {
    /// Path to the log file.
    path: PathBuf,
    /// Sequence number of the next frame.
    next_sequence: AtomicU64,
    /// One past the highest record sequence stored.
    next_record_sequence: AtomicU64,
    /// File handle (protected by mutex for writes).
    file: Mutex<BufWriter<File>>,
}

impl AuditLog {
    /// Opens or creates a log file and replays it.
    ///
    /// Returns the log and the records it already held.
    ///
    /// # Errors
    ///
    /// [`SyncError::Audit`] when the file cannot be opened or written, or
    /// carries a foreign magic or version.
    pub fn open(path: impl AsRef<Path>) -> SyncResult<(Self, Vec<DiagnosticRecord>)> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| io_error("failed to open audit log", &e))?;

        let len = file
            .metadata()
            .map_err(|e| io_error("failed to read audit log metadata", &e))?
            .len();

        if len == 0 {
            file.write_all(AUDIT_MAGIC)
                .map_err(|e| io_error("failed to write magic", &e))?;
            file.write_all(&AUDIT_VERSION.to_le_bytes())
                .map_err(|e| io_error("failed to write version", &e))?;
            file.flush().map_err(|e| io_error("failed to flush", &e))?;
        }

        let (records, next_sequence, valid_len) = Self::replay(&path)?;
        if records.is_empty() && len == 0 {
            info!(path = %path.display(), "created audit log");
        } else {
            info!(path = %path.display(), records = records.len(), "replayed audit log");
        }

        // Continue writing after the last good frame.
        file.set_len(valid_len)
            .map_err(|e| io_error("failed to truncate torn tail", &e))?;
        file.seek(SeekFrom::Start(valid_len))
            .map_err(|e| io_error("failed to seek audit log", &e))?;

        let log = Self {
            path,
            next_sequence: AtomicU64::new(next_sequence),
            next_record_sequence: AtomicU64::new(next_record_sequence(&records)),
            file: Mutex::new(BufWriter::new(file)),
        };
        Ok((log, records))
    }

    /// Path of the underlying file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads every intact record of a log file.
    ///
    /// # Errors
    ///
    /// [`SyncError::Audit`] when the file cannot be read or has a bad header.
    pub fn read_all(path: impl AsRef<Path>) -> SyncResult<Vec<DiagnosticRecord>> {
        Self::replay(path.as_ref()).map(|(records, _, _)| records)
    }

    /// Flushes buffered frames and syncs the file to disk.
    ///
    /// # Errors
    ///
    /// [`SyncError::Audit`] on I/O failure.
    pub fn sync(&self) -> SyncResult<()> {
        let mut file = self.file.lock();
        file.flush().map_err(|e| io_error("audit flush failed", &e))?;
        file.get_ref()
            .sync_all()
            .map_err(|e| io_error("audit sync failed", &e))?;
        Ok(())
    }

    fn write_frame(&self, payload: &[u8]) -> SyncResult<u64> {
        let payload_len = u32::try_from(payload.len())
            .map_err(|_| SyncError::Audit("record too large for one frame".to_string()))?;

        let mut file = self.file.lock();
        let sequence = self.next_sequence.fetch_add(1, Ordering::SeqCst);

        let mut frame = Vec::with_capacity(8 + 4 + payload.len() + 4);
        frame.extend_from_slice(&sequence.to_le_bytes());
        frame.extend_from_slice(&payload_len.to_le_bytes());
        frame.extend_from_slice(payload);
        let crc = crc32fast::hash(&frame);
        frame.extend_from_slice(&crc.to_le_bytes());

        file.write_all(&frame)
            .map_err(|e| io_error("audit write failed", &e))?;
        file.flush().map_err(|e| io_error("audit flush failed", &e))?;
        Ok(sequence)
    }

    /// Replays a log: records, next sequence number, length of the intact prefix.
    fn replay(path: &Path) -> SyncResult<(Vec<DiagnosticRecord>, u64, u64)> {
        let file = File::open(path).map_err(|e| io_error("failed to open audit log for replay", &e))?;
        let mut reader = BufReader::new(file);

        let mut magic = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .map_err(|e| io_error("failed to read magic", &e))?;
        if &magic != AUDIT_MAGIC {
            return Err(SyncError::Audit("invalid audit log magic".to_string()));
        }

        let mut version_bytes = [0u8; 4];
        reader
            .read_exact(&mut version_bytes)
            .map_err(|e| io_error("failed to read version", &e))?;
        let version = u32::from_le_bytes(version_bytes);
        if version != AUDIT_VERSION {
            return Err(SyncError::Audit(format!("unsupported audit log version: {version}")));
        }

        let mut records = Vec::new();
        let mut next_sequence = 0;
        let mut valid_len = HEADER_LEN;

        while let Some((sequence, payload)) = Self::read_frame(&mut reader) {
            match serde_json::from_slice::<DiagnosticRecord>(&payload) {
                Ok(record) => records.push(record),
                Err(e) => {
                    warn!(sequence, error = %e, "audit frame intact but undecodable, skipping");
                }
            }
            next_sequence = sequence + 1;
            valid_len += 8 + 4 + payload.len() as u64 + 4;
        }

        Ok((records, next_sequence, valid_len))
    }

    /// Reads one frame; `None` at end of file or on a torn/corrupt frame.
    fn read_frame(reader: &mut BufReader<File>) -> Option<(u64, Vec<u8>)> {
        let mut sequence_bytes = [0u8; 8];
        reader.read_exact(&mut sequence_bytes).ok()?;

        let mut len_bytes = [0u8; 4];
        reader.read_exact(&mut len_bytes).ok()?;
        let payload_len = u32::from_le_bytes(len_bytes) as usize;

        let mut payload = vec![0u8; payload_len];
        reader.read_exact(&mut payload).ok()?;

        let mut crc_bytes = [0u8; 4];
        reader.read_exact(&mut crc_bytes).ok()?;
        let stored_crc = u32::from_le_bytes(crc_bytes);

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(&sequence_bytes);
        hasher.update(&len_bytes);
        hasher.update(&payload);
        if hasher.finalize() != stored_crc {
            warn!("audit log CRC mismatch, ignoring the tail");
            return None;
        }

        Some((u64::from_le_bytes(sequence_bytes), payload))
    }
}

impl AuditSink for AuditLog {
    fn append(&self, record: &DiagnosticRecord) -> SyncResult<()> {
        let payload = serde_json::to_vec(record)
            .map_err(|e| SyncError::Audit(format!("failed to encode record: {e}")))?;
        self.write_frame(&payload)?;
        self.next_record_sequence
            .fetch_max(record.sequence.saturating_add(1), Ordering::SeqCst);
        Ok(())
    }

    fn resume_sequence(&self) -> u64 {
        self.next_record_sequence.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::{ActionDetails, CollectionSummary, ValidationStatus, Verdict};
    use reliquary_economy::{ActorId, OutcomeKind};

    fn temp_log_path() -> PathBuf {
        let id = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!("test_audit_{id}.log"))
    }

    fn record(sequence: u64) -> DiagnosticRecord {
        DiagnosticRecord::new(
            sequence,
            ActorId::new("alice"),
            CollectionSummary::default(),
            CollectionSummary::default(),
            ActionDetails::new(OutcomeKind::Nothing),
            Verdict { status: ValidationStatus::Ok, notes: "All validations passed".to_string() },
        )
    }

    #[test]
    fn test_memory_sink_drops_oldest() {
        let sink = MemoryAuditSink::new(2);
        for sequence in 0..3 {
            sink.append(&record(sequence)).unwrap();
        }
        let kept: Vec<u64> = sink.records().iter().map(|r| r.sequence).collect();
        assert_eq!(kept, vec![1, 2]);
    }

    #[test]
    fn test_log_replays_after_reopen() {
        let path = temp_log_path();
        {
            let (log, existing) = AuditLog::open(&path).unwrap();
            assert!(existing.is_empty());
            log.append(&record(1)).unwrap();
            log.append(&record(2)).unwrap();
            log.sync().unwrap();
        }

        let (log, existing) = AuditLog::open(&path).unwrap();
        assert_eq!(existing.len(), 2);
        assert_eq!(existing[1].sequence, 2);

        log.append(&record(3)).unwrap();
        log.sync().unwrap();
        drop(log);

        let all = AuditLog::read_all(&path).unwrap();
        assert_eq!(all.iter().map(|r| r.sequence).collect::<Vec<_>>(), vec![1, 2, 3]);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_resume_sequence_survives_reopen() {
        let path = temp_log_path();
        {
            let (log, _) = AuditLog::open(&path).unwrap();
            assert_eq!(log.resume_sequence(), 0);
            log.append(&record(0)).unwrap();
            log.append(&record(4)).unwrap();
            assert_eq!(log.resume_sequence(), 5);
        }

        let (log, _) = AuditLog::open(&path).unwrap();
        assert_eq!(log.resume_sequence(), 5);

        let sink = MemoryAuditSink::new(4);
        assert_eq!(sink.resume_sequence(), 0);
        sink.append(&record(7)).unwrap();
        assert_eq!(sink.resume_sequence(), 8);

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_torn_tail_is_dropped() {
        let path = temp_log_path();
        {
            let (log, _) = AuditLog::open(&path).unwrap();
            log.append(&record(1)).unwrap();
            log.sync().unwrap();
        }

        // Simulate a crash halfway through the next frame.
        {
            let mut file = OpenOptions::new().append(true).open(&path).unwrap();
            file.write_all(&[7u8; 9]).unwrap();
        }

        let (log, existing) = AuditLog::open(&path).unwrap();
        assert_eq!(existing.len(), 1);
        log.append(&record(2)).unwrap();
        log.sync().unwrap();
        drop(log);

        let all = AuditLog::read_all(&path).unwrap();
        assert_eq!(all.len(), 2, "new frame replaces the torn tail");

        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_bad_magic_rejected() {
        let path = temp_log_path();
        std::fs::write(&path, b"NOPE\x01\x00\x00\x00").unwrap();
        assert!(matches!(AuditLog::open(&path), Err(SyncError::Audit(_))));
        std::fs::remove_file(&path).ok();
    }
}
