//! The persistent, fixed-size binary ring buffer (§3, §4.1).
//!
//! A plain, positioned-file-I/O circular *log* buffer: every record carries
//! its own length prefix on both ends so that a `tail` scan can walk
//! backwards from `lastEnd` without any index, tolerating arbitrary
//! corruption by simply stopping (§9 "Reverse scan without an index").

use crate::clock::Clock;
use crate::codec;
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use std::path::Path;

/// On-disk magic number ("KLOG"), big-endian `i32` at file offset 0.
pub const MAGIC: i32 = 0x4B4C_4F47;

/// Size of the fixed header in bytes (§3.1).
pub const HEADER_SIZE: i32 = 16;

/// Minimum payload length: 8-byte timestamp + 1-byte level + 0 message bytes (§3.2).
const MIN_PAYLOAD_LEN: i32 = 9;

/// Immutable configuration for a Ring Store (§3.3).
#[derive(Debug, Clone, Copy)]
pub struct LogConfig {
    pub max_bytes: i32,
    pub format_version: i32,
    pub dedup_enabled: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_bytes: 0,
            format_version: 1,
            dedup_enabled: true,
        }
    }
}

impl LogConfig {
    pub fn new(max_bytes: i32) -> Self {
        Self {
            max_bytes,
            ..Self::default()
        }
    }

    /// Rejects a `maxBytes` too small to ever hold the header plus one
    /// minimal record. This is not part of the bare data model (which only defines
    /// the struct) — see SPEC_FULL.md §12.
    pub fn validate(&self) -> Result<()> {
        let min_total = HEADER_SIZE + MIN_PAYLOAD_LEN + 4;
        if self.max_bytes < min_total {
            return Err(Error::Configuration(format!(
                "maxBytes ({}) must be at least {} bytes (header + one minimal record)",
                self.max_bytes, min_total
            )));
        }
        Ok(())
    }
}

/// An immutable, decoded log record (§3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_millis: i64,
    pub level: u8,
    pub message: String,
}

/// In-memory mirror of the 16-byte on-disk header (§3.1). Never cached
/// across operations — every Ring Store operation re-reads it from disk so
/// that external truncation/replacement is tolerated (§3.3).
#[derive(Debug, Clone, Copy)]
struct Header {
    magic: i32,
    format_version: i32,
    body_size: i32,
    last_end: i32,
}

/// The persistent, fixed-size binary ring buffer.
pub struct RingStore {
    file: Box<dyn crate::filesystem::FileHandle>,
    clock: Box<dyn Clock>,
}

impl RingStore {
    /// Opens (creating if absent) the ring-buffer file at `path` (§4.1 `open`).
    ///
    /// `clock` supplies `timestampMillis` for each appended record. This is
    /// an explicit deviation from the bare `(path, config, fs)` signature in
    /// §6.3's interface table — see DESIGN.md's "timestamp source" entry.
    pub fn open<FS: Filesystem>(
        path: &Path,
        config: LogConfig,
        fs: &FS,
        clock: Box<dyn Clock>,
    ) -> Result<Self> {
        config.validate()?;

        if !fs.exists(path) {
            fs.create_directories(path)?;
            fs.create_empty_file(path)?;
        }

        let mut file = fs.open_read_write(path)?;
        let current_size = file.size()?;
        if current_size < config.max_bytes as u64 {
            file.resize(config.max_bytes as u64)?;
        }

        let mut header_buf = [0u8; HEADER_SIZE as usize];
        file.read_at(0, &mut header_buf)?;
        let magic = codec::read_i32_be(&header_buf, 0);

        if magic != MAGIC {
            let body_size = config.max_bytes - HEADER_SIZE;
            let mut fresh = [0u8; HEADER_SIZE as usize];
            codec::write_i32_be(&mut fresh, 0, MAGIC);
            codec::write_i32_be(&mut fresh, 4, config.format_version);
            codec::write_i32_be(&mut fresh, 8, body_size);
            codec::write_i32_be(&mut fresh, 12, 0);
            file.write_at(0, &fresh)?;
            file.flush()?;
            tracing::debug!(body_size, "initialized fresh ring store header");
        }

        Ok(Self { file, clock })
    }

    fn read_header(file: &mut dyn crate::filesystem::FileHandle) -> Result<Header> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        file.read_at(0, &mut buf)?;
        Ok(Header {
            magic: codec::read_i32_be(&buf, 0),
            format_version: codec::read_i32_be(&buf, 4),
            body_size: codec::read_i32_be(&buf, 8),
            last_end: codec::read_i32_be(&buf, 12),
        })
    }

    fn write_last_end(file: &mut dyn crate::filesystem::FileHandle, new_end: i32) -> Result<()> {
        let mut buf = [0u8; 4];
        codec::write_i32_be(&mut buf, 0, new_end);
        file.write_at(12, &buf)?;
        file.flush()?;
        Ok(())
    }

    /// Writes `data` into the body starting at body-relative `start`,
    /// splitting at the `bodySize` boundary if it would overrun (§4.1 step 5).
    fn write_body(
        file: &mut dyn crate::filesystem::FileHandle,
        body_size: i32,
        start: i32,
        data: &[u8],
    ) -> std::io::Result<()> {
        let len = data.len() as i32;
        if start + len <= body_size {
            file.write_at((HEADER_SIZE + start) as u64, data)
        } else {
            let first_len = (body_size - start) as usize;
            file.write_at((HEADER_SIZE + start) as u64, &data[..first_len])?;
            file.write_at(HEADER_SIZE as u64, &data[first_len..])
        }
    }

    /// Reads `len` body bytes starting at body-relative `start`, splitting
    /// at the `bodySize` boundary if necessary (Wrap, §4.1 / Glossary).
    fn read_body(
        file: &mut dyn crate::filesystem::FileHandle,
        body_size: i32,
        start: i32,
        len: i32,
    ) -> std::io::Result<Vec<u8>> {
        let mut buf = vec![0u8; len as usize];
        if start + len <= body_size {
            file.read_at((HEADER_SIZE + start) as u64, &mut buf)?;
        } else {
            let first_len = (body_size - start) as usize;
            file.read_at((HEADER_SIZE + start) as u64, &mut buf[..first_len])?;
            file.read_at(HEADER_SIZE as u64, &mut buf[first_len..])?;
        }
        Ok(buf)
    }

    /// Appends `message` at `level`. Returns the number of body bytes
    /// written, or `0` if the record was rejected for being oversized
    /// (§4.1 `append`, §7 `OversizedRecord`).
    pub fn append(&mut self, message: &str, level: u8) -> Result<i32> {
        let msg_bytes = message.as_bytes();
        let payload_len = MIN_PAYLOAD_LEN + msg_bytes.len() as i32;

        let header = Self::read_header(self.file.as_mut())?;

        if payload_len + 4 > header.body_size {
            tracing::warn!(
                payload_len,
                body_size = header.body_size,
                "rejecting oversized record"
            );
            return Ok(0);
        }

        let record_size = payload_len + 4;
        let mut frame = vec![0u8; record_size as usize];
        codec::write_u16_be(&mut frame, 0, payload_len as u16);
        codec::write_i64_be(&mut frame, 2, self.clock.now_millis());
        frame[10] = level;
        frame[11..11 + msg_bytes.len()].copy_from_slice(msg_bytes);
        codec::write_u16_be(&mut frame, (payload_len + 2) as usize, payload_len as u16);

        Self::write_body(self.file.as_mut(), header.body_size, header.last_end, &frame)?;
        self.file.flush()?;

        let new_end = wrap_add(header.body_size, header.last_end, record_size);
        Self::write_last_end(self.file.as_mut(), new_end)?;

        Ok(record_size)
    }

    /// Returns up to `count` records, newest first (§4.1 `tail`).
    pub fn tail(&mut self, count: i32) -> Result<Vec<LogRecord>> {
        self.scan(count, None)
    }

    /// Like `tail`, but additionally stops once a record older than
    /// `cutoff_millis` is reached (§4.1 `since`).
    pub fn since(&mut self, cutoff_millis: i64, limit: i32) -> Result<Vec<LogRecord>> {
        self.scan(limit, Some(cutoff_millis))
    }

    fn scan(&mut self, limit: i32, cutoff_millis: Option<i64>) -> Result<Vec<LogRecord>> {
        let header = Self::read_header(self.file.as_mut())?;
        let mut results = Vec::new();

        if header.body_size <= 0 || limit <= 0 {
            return Ok(results);
        }

        let mut cursor = header.last_end;

        for _ in 0..limit {
            let trailer_offset = wrap_sub(header.body_size, cursor, 2);
            // A failed read here is an IoError (§7), not corruption — it must bubble up via `?`
            // rather than being absorbed like a length/UTF-8 mismatch.
            let trailer_bytes =
                Self::read_body(self.file.as_mut(), header.body_size, trailer_offset, 2)?;
            let payload_len = codec::read_u16_be(&trailer_bytes, 0) as i32;

            if payload_len < MIN_PAYLOAD_LEN || payload_len > header.body_size {
                break;
            }

            let record_size = payload_len + 4;
            let record_start = wrap_sub(header.body_size, cursor, record_size);
            let frame = Self::read_body(
                self.file.as_mut(),
                header.body_size,
                record_start,
                record_size,
            )?;

            let leading = codec::read_u16_be(&frame, 0) as i32;
            let trailing = codec::read_u16_be(&frame, (payload_len + 2) as usize) as i32;
            if leading != payload_len || trailing != payload_len {
                tracing::debug!(offset = record_start, "stopping scan: frame length mismatch");
                break;
            }

            let timestamp_millis = codec::read_i64_be(&frame, 2);
            let level = frame[10];
            let msg_bytes = &frame[11..(payload_len + 2) as usize];
            let message = match std::str::from_utf8(msg_bytes) {
                Ok(s) => s.to_string(),
                Err(_) => {
                    tracing::debug!(offset = record_start, "stopping scan: invalid utf8 payload");
                    break;
                }
            };

            if let Some(cutoff) = cutoff_millis {
                if timestamp_millis < cutoff {
                    break;
                }
            }

            results.push(LogRecord {
                timestamp_millis,
                level,
                message,
            });
            cursor = record_start;
        }

        Ok(results)
    }

    /// Closes the underlying file handle (§4.1 `close`).
    pub fn close(&mut self) -> Result<()> {
        self.file.close()?;
        Ok(())
    }

    #[cfg(test)]
    fn format_version_for_test(&mut self) -> Result<i32> {
        Ok(Self::read_header(self.file.as_mut())?.format_version)
    }
}

/// `(pos + amount) mod body_size`, for `body_size > 0`.
fn wrap_add(body_size: i32, pos: i32, amount: i32) -> i32 {
    ((pos as i64 + amount as i64).rem_euclid(body_size as i64)) as i32
}

/// `(pos - amount) mod body_size`, for `body_size > 0`.
fn wrap_sub(body_size: i32, pos: i32, amount: i32) -> i32 {
    ((pos as i64 - amount as i64).rem_euclid(body_size as i64)) as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::filesystem::InMemoryFilesystem;
    use std::path::PathBuf;

    fn open_store(max_bytes: i32, clock_start: i64) -> (RingStore, PathBuf, InMemoryFilesystem) {
        let fs = InMemoryFilesystem::new();
        let path = PathBuf::from("/ring.log");
        let store = RingStore::open(
            &path,
            LogConfig::new(max_bytes),
            &fs,
            Box::new(ManualClock::new(clock_start)),
        )
        .unwrap();
        (store, path, fs)
    }

    #[test]
    fn header_is_initialized_on_first_open() {
        let (mut store, _path, _fs) = open_store(1024, 0);
        assert_eq!(store.format_version_for_test().unwrap(), 1);
        let header = RingStore::read_header(store.file.as_mut()).unwrap();
        assert_eq!(header.magic, MAGIC);
        assert_eq!(header.body_size, 1024 - HEADER_SIZE);
        assert_eq!(header.last_end, 0);
    }

    #[test]
    fn reopen_preserves_existing_header() {
        let fs = InMemoryFilesystem::new();
        let path = PathBuf::from("/ring.log");
        {
            let mut store = RingStore::open(
                &path,
                LogConfig::new(1024),
                &fs,
                Box::new(ManualClock::new(0)),
            )
            .unwrap();
            store.append("hello", 1).unwrap();
        }
        let mut store = RingStore::open(
            &path,
            LogConfig::new(1024),
            &fs,
            Box::new(ManualClock::new(0)),
        )
        .unwrap();
        let records = store.tail(5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "hello");
    }

    #[test]
    fn s1_basic_tail_ordering() {
        let (mut store, _path, _fs) = open_store(1024, 0);
        store.append("a", 1).unwrap();
        store.append("b", 1).unwrap();
        store.append("c", 1).unwrap();

        let records = store.tail(2).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message, "c");
        assert_eq!(records[1].message, "b");
    }

    #[test]
    fn s2_wrap_around_keeps_newest_first() {
        // A small body so that 50 short records force several wraps.
        let (mut store, _path, _fs) = open_store(256, 0);
        for i in 0..50 {
            store.append(&format!("msg-{i}"), 1).unwrap();
        }

        let records = store.tail(5).unwrap();
        assert_eq!(records.len(), 5);
        for record in &records {
            assert!(record.message.starts_with("msg-"));
        }
        let suffixes: Vec<i32> = records
            .iter()
            .map(|r| r.message.trim_start_matches("msg-").parse().unwrap())
            .collect();
        for window in suffixes.windows(2) {
            assert!(window[0] > window[1]);
        }
        assert_eq!(suffixes[0], 49);
    }

    #[test]
    fn s3_since_cutoff() {
        let fs = InMemoryFilesystem::new();
        let path = PathBuf::from("/ring.log");
        let clock = std::sync::Arc::new(ManualClock::new(0));

        let mut store = RingStore::open(
            &path,
            LogConfig::new(1024),
            &fs,
            Box::new(clock.clone()),
        )
        .unwrap();

        store.append("old", 1).unwrap();
        clock.advance(50);
        let cutoff = clock.now_millis();
        clock.advance(50);
        store.append("new", 1).unwrap();

        let records = store.since(cutoff, 5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "new");
    }

    #[test]
    fn s4_corruption_stops_scan_without_failing() {
        let fs = InMemoryFilesystem::new();
        let path = PathBuf::from("/ring.log");
        {
            let mut store = RingStore::open(
                &path,
                LogConfig::new(1024),
                &fs,
                Box::new(ManualClock::new(0)),
            )
            .unwrap();
            store.append("good", 1).unwrap();
            store.append("bad", 1).unwrap();
            store.close().unwrap();
        }

        // Corrupt the leading length prefix of the first ("good") record,
        // which sits at body offset 0..2.
        let mut handle = fs.open_read_write(&path).unwrap();
        handle
            .write_at(HEADER_SIZE as u64, &[0x7F, 0x7F])
            .unwrap();

        let mut store = RingStore::open(
            &path,
            LogConfig::new(1024),
            &fs,
            Box::new(ManualClock::new(0)),
        )
        .unwrap();
        let records = store.tail(5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "bad");
    }

    #[test]
    fn oversize_record_is_rejected_without_writing() {
        // body_size = 48; the largest payload that still leaves room for the
        // trailing length prefix is body_size - 4 = 44 (msg len 35).
        let (mut store, _path, _fs) = open_store(64, 0);
        let body_size = 64 - HEADER_SIZE;
        let too_big = "x".repeat((body_size - 4 - MIN_PAYLOAD_LEN + 1) as usize);
        let written = store.append(&too_big, 1).unwrap();
        assert_eq!(written, 0);
        assert!(store.tail(5).unwrap().is_empty());
    }

    #[test]
    fn exactly_fits_record_leaves_ring_readable() {
        // body_size - 4 == payload_len, i.e. record fills the body exactly
        // (§9 Design Notes: "Exactly-fits pathology").
        let max_bytes = HEADER_SIZE + 21;
        let (mut store, _path, _fs) = open_store(max_bytes, 0);
        let written = store.append("12345678", 1).unwrap();
        assert_eq!(written, 21);

        let records = store.tail(5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "12345678");

        // A subsequent append overwrites from lastEnd (which equals 0 again).
        store.append("next", 1).unwrap();
        let records = store.tail(5).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message, "next");
    }

    #[test]
    fn empty_ring_returns_no_records() {
        let (mut store, _path, _fs) = open_store(1024, 0);
        assert!(store.tail(5).unwrap().is_empty());
        assert!(store.since(0, 5).unwrap().is_empty());
    }

    #[test]
    fn header_fields_are_stable_across_appends() {
        let (mut store, _path, _fs) = open_store(1024, 0);
        let before = RingStore::read_header(store.file.as_mut()).unwrap();
        for i in 0..20 {
            store.append(&format!("entry-{i}"), 1).unwrap();
        }
        let after = RingStore::read_header(store.file.as_mut()).unwrap();
        assert_eq!(before.magic, after.magic);
        assert_eq!(before.format_version, after.format_version);
        assert_eq!(before.body_size, after.body_size);
        assert_ne!(before.last_end, after.last_end);
    }
}
