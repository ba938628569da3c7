//! Delayed-callback scheduler (§4.3 Delayed callback interface, §9 "Global
//! timer executor").
//!
//! The Dedup Buffer only needs to arm a cancellable one-shot callback; it
//! never assumes a particular runtime. [`ThreadScheduler`] picks one of the
//! three shapes the design notes call out as acceptable: a single dedicated
//! timer thread servicing a sorted queue of pending callbacks, rather than a
//! thread per timer.

use std::cmp::Reverse;
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread;
use std::time::{Duration, Instant};

/// A handle that can cancel a previously scheduled callback.
///
/// Per §4.3: cancelling strictly before the callback begins prevents it from
/// running; cancelling after it has started (or finished) is a no-op, and
/// repeated `cancel()` calls are idempotent.
pub trait Cancellable: Send + Sync {
    fn cancel(&self);
}

/// Schedules a one-shot callback to run after `delay_millis`.
///
/// Implementations may run `block` on any thread (§4.3); callers that need
/// exclusion with other state must synchronize themselves.
pub trait Scheduler: Send + Sync {
    fn schedule(&self, delay_millis: i64, block: Box<dyn FnOnce() + Send>) -> Box<dyn Cancellable>;
}

impl<T: Scheduler + ?Sized> Scheduler for Arc<T> {
    fn schedule(&self, delay_millis: i64, block: Box<dyn FnOnce() + Send>) -> Box<dyn Cancellable> {
        (**self).schedule(delay_millis, block)
    }
}

struct TimerEntry {
    fire_at: Instant,
    id: u64,
    cancelled: Arc<AtomicBool>,
    block: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.fire_at == other.fire_at && self.id == other.id
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.fire_at.cmp(&other.fire_at).then(self.id.cmp(&other.id))
    }
}

struct QueueHandle {
    cancelled: Arc<AtomicBool>,
}

impl Cancellable for QueueHandle {
    fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }
}

struct SharedState {
    heap: Mutex<BinaryHeap<Reverse<TimerEntry>>>,
    wakeup: Condvar,
}

fn run(state: Arc<SharedState>) {
    loop {
        let mut heap = state.heap.lock().unwrap_or_else(|e| e.into_inner());
        let entry = loop {
            match heap.peek() {
                None => {
                    heap = state.wakeup.wait(heap).unwrap_or_else(|e| e.into_inner());
                }
                Some(Reverse(next)) => {
                    let now = Instant::now();
                    if next.fire_at <= now {
                        let Reverse(entry) = heap.pop().expect("peeked entry must still be present");
                        break entry;
                    }
                    let (new_heap, _timeout) = state
                        .wakeup
                        .wait_timeout(heap, next.fire_at - now)
                        .unwrap_or_else(|e| e.into_inner());
                    heap = new_heap;
                }
            }
        };
        drop(heap);
        if !entry.cancelled.load(Ordering::SeqCst) {
            let block = entry
                .block
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            if let Some(block) = block {
                block();
            }
        }
    }
}

/// A scheduler backed by one dedicated background thread and a min-heap of
/// pending callbacks, ordered by fire time.
pub struct ThreadScheduler {
    state: Arc<SharedState>,
    next_id: AtomicU64,
}

impl ThreadScheduler {
    pub fn new() -> Self {
        let state = Arc::new(SharedState {
            heap: Mutex::new(BinaryHeap::new()),
            wakeup: Condvar::new(),
        });
        let worker_state = state.clone();
        thread::spawn(move || run(worker_state));
        Self {
            state,
            next_id: AtomicU64::new(0),
        }
    }
}

impl Default for ThreadScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay_millis: i64, block: Box<dyn FnOnce() + Send>) -> Box<dyn Cancellable> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = TimerEntry {
            fire_at: Instant::now() + Duration::from_millis(delay_millis.max(0) as u64),
            id,
            cancelled: cancelled.clone(),
            block: Mutex::new(Some(block)),
        };
        {
            let mut heap = self.state.heap.lock().unwrap_or_else(|e| e.into_inner());
            heap.push(Reverse(entry));
        }
        self.state.wakeup.notify_one();
        Box::new(QueueHandle { cancelled })
    }
}

struct ManualEntry {
    id: u64,
    cancelled: Arc<AtomicBool>,
    block: Mutex<Option<Box<dyn FnOnce() + Send>>>,
}

/// A scheduler double for deterministic tests (SPEC_FULL.md §13).
///
/// Nothing here waits on real time: `schedule` just records the callback,
/// and a test drives time forward explicitly by calling [`fire_latest`].
/// This plays the same role for the Dedup Buffer's silence timer that
/// [`crate::clock::ManualClock`] plays for timestamps.
///
/// [`fire_latest`]: ManualScheduler::fire_latest
#[derive(Default)]
pub struct ManualScheduler {
    pending: Mutex<Vec<ManualEntry>>,
    next_id: AtomicU64,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the most recently scheduled timer that has not been cancelled,
    /// as if its delay had fully elapsed. No-op if nothing is armed.
    pub fn fire_latest(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(|e| e.into_inner());
        while let Some(entry) = pending.pop() {
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            let block = entry
                .block
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .take();
            drop(pending);
            if let Some(block) = block {
                block();
            }
            return;
        }
    }

    /// Number of scheduled callbacks that have not been cancelled or fired.
    pub fn armed_count(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|e| !e.cancelled.load(Ordering::SeqCst))
            .count()
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, _delay_millis: i64, block: Box<dyn FnOnce() + Send>) -> Box<dyn Cancellable> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let cancelled = Arc::new(AtomicBool::new(false));
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(ManualEntry {
                id,
                cancelled: cancelled.clone(),
                block: Mutex::new(Some(block)),
            });
        Box::new(QueueHandle { cancelled })
    }
}
