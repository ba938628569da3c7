//! The Façade (§4.4): formats a display line and routes it to both the
//! console sink and the Ring Store, via the Dedup Buffer.
//!
//! This module is `klog`'s concrete implementation of that interface, wiring
//! together the Ring Store, Dedup Buffer, console sink, clock, and UUID
//! generator that the rest of the crate only specifies as traits.

use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use chrono::{Local, TimeZone};

use crate::clock::Clock;
use crate::console::ConsoleSink;
use crate::dedup::{DedupBuffer, Pending};
use crate::error::{Error, Result};
use crate::filesystem::Filesystem;
use crate::ring_store::{LogConfig, RingStore};
use crate::scheduler::Scheduler;
use crate::uuid_gen::UuidGenerator;

/// Log level constants (§4.4): `INFO` carries no level token in the
/// formatted line, `WARNING`/`ERROR` do.
pub const LEVEL_INFO: u8 = 1;
pub const LEVEL_WARNING: u8 = 2;
pub const LEVEL_ERROR: u8 = 3;

fn level_token(level: u8) -> Option<&'static str> {
    match level {
        LEVEL_WARNING => Some("WARNING"),
        LEVEL_ERROR => Some("ERROR"),
        _ => None,
    }
}

/// Formats `"[yyyy-MM-dd HH:mm:ss.SSS] [LEVEL ]?[tag] message"`, appending
/// `" (repeat N times)"` when `count > 1` (§4.4).
fn format_line(timestamp_millis: i64, level: u8, tag: &str, message: &str, count: u32) -> String {
    let datetime = Local
        .timestamp_millis_opt(timestamp_millis)
        .single()
        .unwrap_or_else(|| Local.timestamp_millis_opt(0).single().expect("epoch is representable"));
    let mut line = format!("[{}] ", datetime.format("%Y-%m-%d %H:%M:%S%.3f"));
    if let Some(token) = level_token(level) {
        line.push_str(token);
        line.push(' ');
    }
    line.push_str(&format!("[{tag}] {message}"));
    if count > 1 {
        line.push_str(&format!(" (repeat {count} times)"));
    }
    line
}

fn route_to_console(console: &Arc<dyn ConsoleSink>, level: u8, tag: &str, formatted: &str) {
    match level {
        LEVEL_WARNING => console.log_w(tag, formatted),
        LEVEL_ERROR => console.log_e(tag, formatted, None),
        _ => console.log(tag, formatted),
    }
}

fn flush_pending(ring: &Arc<Mutex<RingStore>>, console: &Arc<dyn ConsoleSink>, pending: Pending) {
    let formatted = format_line(
        pending.last_timestamp_millis,
        pending.level,
        &pending.tag,
        &pending.message,
        pending.count,
    );
    route_to_console(console, pending.level, &pending.tag, &formatted);

    let mut guard = ring.lock().unwrap_or_else(|poisoned| {
        tracing::error!(tag = %pending.tag, "ring store mutex poisoned, recovering");
        poisoned.into_inner()
    });
    if let Err(err) = guard.append(&formatted, pending.level) {
        tracing::error!(tag = %pending.tag, error = %err, "failed to persist flushed line to ring store");
    }
}

/// Owns a Ring Store, a Dedup Buffer, and the collaborators named in §6.2.
/// Not a singleton itself — see [`initialize`]/[`global`] for the optional
/// process-wide convenience §9 describes.
pub struct Facade {
    ring: Arc<Mutex<RingStore>>,
    console: Arc<dyn ConsoleSink>,
    dedup: DedupBuffer,
    dedup_enabled: bool,
    clock: Arc<dyn Clock>,
    device_id: String,
}

impl Facade {
    /// Opens the Ring Store at `path` and wires up a Dedup Buffer using
    /// `scheduler` for the silence timer. `clock` is shared between the Ring
    /// Store, the Dedup Buffer, and the `dedupEnabled = false` bypass path so
    /// all three agree on "now".
    pub fn new<FS: Filesystem>(
        path: &Path,
        config: LogConfig,
        fs: &FS,
        clock: Arc<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
        uuid_gen: &dyn UuidGenerator,
        console: Arc<dyn ConsoleSink>,
    ) -> Result<Self> {
        config.validate()?;
        let dedup_enabled = config.dedup_enabled;
        let ring_store = RingStore::open(path, config, fs, Box::new(clock.clone()))?;
        let ring = Arc::new(Mutex::new(ring_store));

        let ring_for_flush = ring.clone();
        let console_for_flush = console.clone();
        let dedup = DedupBuffer::new(Box::new(clock.clone()), scheduler, move |pending| {
            flush_pending(&ring_for_flush, &console_for_flush, pending);
        });

        Ok(Self {
            ring,
            console,
            dedup,
            dedup_enabled,
            clock,
            device_id: uuid_gen.generate(),
        })
    }

    /// RFC 4122 v4 string generated once at construction (§6.2 UUID generator).
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn log(&self, tag: &str, message: &str) {
        self.add(tag, message, LEVEL_INFO);
    }

    pub fn log_w(&self, tag: &str, message: &str) {
        self.add(tag, message, LEVEL_WARNING);
    }

    pub fn log_e(&self, tag: &str, message: &str, throwable: Option<&str>) {
        match throwable {
            Some(cause) => self.add(tag, &format!("{message}: {cause}"), LEVEL_ERROR),
            None => self.add(tag, message, LEVEL_ERROR),
        }
    }

    fn add(&self, tag: &str, message: &str, level: u8) {
        if self.dedup_enabled {
            self.dedup.add(tag, message, level);
        } else {
            // §4.4: "every add is emitted immediately" — equivalent to a
            // Dedup Buffer with no coalescing, so build the one-shot
            // Pending directly instead of routing through the state machine.
            let pending = Pending {
                tag: tag.to_string(),
                message: message.to_string(),
                level,
                count: 1,
                last_timestamp_millis: self.clock.now_millis(),
            };
            flush_pending(&self.ring, &self.console, pending);
        }
    }

    pub fn tail(&self, count: i32) -> Result<Vec<crate::ring_store::LogRecord>> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).tail(count)
    }

    pub fn since(&self, cutoff_millis: i64, limit: i32) -> Result<Vec<crate::ring_store::LogRecord>> {
        self.ring
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .since(cutoff_millis, limit)
    }

    pub fn close(&self) -> Result<()> {
        self.ring.lock().unwrap_or_else(|e| e.into_inner()).close()
    }
}

static GLOBAL: OnceLock<Arc<Facade>> = OnceLock::new();

/// Installs the process-wide Façade instance (§9 "Singleton façade"). A
/// second call after the first is a no-op — the first instance installed
/// wins — returning that instance either way.
pub fn initialize(facade: Facade) -> Arc<Facade> {
    let arc = Arc::new(facade);
    GLOBAL.get_or_init(|| arc.clone()).clone()
}

/// Returns the process-wide instance, or [`Error::NotInitialized`] if
/// [`initialize`] has not yet been called.
pub fn global() -> Result<Arc<Facade>> {
    GLOBAL.get().cloned().ok_or(Error::NotInitialized)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::console::ConsoleSink;
    use crate::filesystem::InMemoryFilesystem;
    use crate::scheduler::ManualScheduler;
    use crate::uuid_gen::DefaultUuidGenerator;
    use std::path::Path;
    use std::sync::Mutex as StdMutex;

    #[derive(Clone, Default)]
    struct RecordingSink {
        lines: Arc<StdMutex<Vec<String>>>,
    }

    impl ConsoleSink for RecordingSink {
        fn log(&self, _tag: &str, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
        fn log_w(&self, _tag: &str, message: &str) {
            self.lines.lock().unwrap().push(message.to_string());
        }
        fn log_e(&self, _tag: &str, message: &str, _throwable: Option<&str>) {
            self.lines.lock().unwrap().push(message.to_string());
        }
    }

    fn new_facade(
        dedup_enabled: bool,
    ) -> (Facade, Arc<ManualClock>, Arc<ManualScheduler>, RecordingSink) {
        let fs = InMemoryFilesystem::new();
        let path = Path::new("/device.klog");
        fs.create_directories(path).unwrap();
        fs.create_empty_file(path).unwrap();

        let clock = Arc::new(ManualClock::new(1_000));
        let scheduler = Arc::new(ManualScheduler::new());
        let sink = RecordingSink::default();

        let mut config = LogConfig::new(1024);
        config.dedup_enabled = dedup_enabled;

        let facade = Facade::new(
            path,
            config,
            &fs,
            clock.clone(),
            Box::new(scheduler.clone()),
            &DefaultUuidGenerator,
            Arc::new(sink.clone()),
        )
        .unwrap();

        (facade, clock, scheduler, sink)
    }

    #[test]
    fn info_line_carries_no_level_token() {
        let (facade, _clock, _scheduler, sink) = new_facade(false);
        facade.log("T", "hello");
        let lines = sink.lines.lock().unwrap();
        assert!(lines[0].contains("[T] hello"));
        assert!(!lines[0].contains("INFO"));
    }

    #[test]
    fn warning_and_error_carry_their_level_token() {
        let (facade, _clock, _scheduler, sink) = new_facade(false);
        facade.log_w("T", "careful");
        facade.log_e("T", "boom", Some("cause"));
        let lines = sink.lines.lock().unwrap();
        assert!(lines[0].contains("WARNING [T] careful"));
        assert!(lines[1].contains("ERROR [T] boom: cause"));
    }

    #[test]
    fn disabled_dedup_emits_every_call_immediately() {
        let (facade, _clock, _scheduler, sink) = new_facade(false);
        facade.log("T", "m");
        facade.log("T", "m");
        facade.log("T", "m");

        assert_eq!(sink.lines.lock().unwrap().len(), 3);
        let records = facade.tail(10).unwrap();
        assert_eq!(records.len(), 3);
    }

    #[test]
    fn enabled_dedup_coalesces_until_the_timer_fires() {
        let (facade, _clock, scheduler, sink) = new_facade(true);
        facade.log("T", "m");
        facade.log("T", "m");
        facade.log("T", "m");

        assert!(sink.lines.lock().unwrap().is_empty());
        assert!(facade.tail(10).unwrap().is_empty());

        scheduler.fire_latest();

        let lines = sink.lines.lock().unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].contains("(repeat 3 times)"));

        let records = facade.tail(10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].message.contains("(repeat 3 times)"));
    }

    #[test]
    fn device_id_is_a_stable_v4_uuid_string() {
        let (facade, _clock, _scheduler, _sink) = new_facade(true);
        assert_eq!(facade.device_id().len(), 36);
        assert_eq!(facade.device_id(), facade.device_id());
    }
}
