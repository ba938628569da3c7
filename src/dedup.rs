//! Dedup Buffer (§4.2): a single-slot coalescing buffer with a silence timer.
//!
//! Consecutive `(tag, message, level)` triples collapse into one `onFlush`
//! call carrying a repetition count. A triple flushes either when a
//! different triple arrives or after [`SILENCE_TIMEOUT_MILLIS`] of silence.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::clock::Clock;
use crate::scheduler::{Cancellable, Scheduler};

/// Silence timeout after which a pending slot flushes on its own (§4.2, §GLOSSARY).
pub const SILENCE_TIMEOUT_MILLIS: i64 = 20_000;

/// A coalesced run of identical `(tag, message, level)` triples, handed to
/// the `onFlush` callback exactly once per run (§3.3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pending {
    pub tag: String,
    pub message: String,
    pub level: u8,
    pub count: u32,
    pub last_timestamp_millis: i64,
}

enum State {
    Empty,
    Pending {
        slot: Pending,
        timer: Box<dyn Cancellable>,
        /// Identifies which arming of the timer this slot is currently
        /// covered by. A fired timer only flushes if its generation still
        /// matches — see `on_timer_fire`.
        generation: u64,
    },
}

struct Inner {
    clock: Box<dyn Clock>,
    scheduler: Box<dyn Scheduler>,
    state: Mutex<State>,
    next_generation: AtomicU64,
    on_flush: Box<dyn Fn(Pending) + Send + Sync>,
}

impl Inner {
    fn next_generation(self_arc: &Arc<Inner>) -> u64 {
        self_arc.next_generation.fetch_add(1, Ordering::SeqCst)
    }

    fn arm_timer(self_arc: &Arc<Inner>, generation: u64) -> Box<dyn Cancellable> {
        let weak: Weak<Inner> = Arc::downgrade(self_arc);
        self_arc
            .scheduler
            .schedule(SILENCE_TIMEOUT_MILLIS, Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    Inner::on_timer_fire(&inner, generation);
                }
            }))
    }

    /// Fires for a specific arming of the timer. §4.3 allows `cancel()` to
    /// lose the race against an already-started `block`; when that happens
    /// here the slot has since been re-armed (coalesce) or replaced
    /// (mismatch) under a newer generation, so this stale fire must not
    /// flush it — only the generation that scheduled this callback may.
    fn on_timer_fire(self_arc: &Arc<Inner>, fired_generation: u64) {
        let mut guard = self_arc.state.lock().unwrap_or_else(|e| e.into_inner());
        let is_current = matches!(
            &*guard,
            State::Pending { generation, .. } if *generation == fired_generation
        );
        if !is_current {
            return;
        }
        let previous = std::mem::replace(&mut *guard, State::Empty);
        drop(guard);
        if let State::Pending { slot, .. } = previous {
            (self_arc.on_flush)(slot);
        }
    }

    fn add(self_arc: &Arc<Inner>, tag: &str, message: &str, level: u8) {
        let now = self_arc.clock.now_millis();
        let mut guard = self_arc.state.lock().unwrap_or_else(|e| e.into_inner());
        let previous = std::mem::replace(&mut *guard, State::Empty);

        let (next_state, flushed) = match previous {
            State::Empty => {
                let generation = Inner::next_generation(self_arc);
                let timer = Inner::arm_timer(self_arc, generation);
                let slot = Pending {
                    tag: tag.to_string(),
                    message: message.to_string(),
                    level,
                    count: 1,
                    last_timestamp_millis: now,
                };
                (
                    State::Pending {
                        slot,
                        timer,
                        generation,
                    },
                    None,
                )
            }
            State::Pending {
                mut slot, timer, ..
            } => {
                if slot.tag == tag && slot.message == message && slot.level == level {
                    timer.cancel();
                    slot.count += 1;
                    slot.last_timestamp_millis = now;
                    let generation = Inner::next_generation(self_arc);
                    let timer = Inner::arm_timer(self_arc, generation);
                    (
                        State::Pending {
                            slot,
                            timer,
                            generation,
                        },
                        None,
                    )
                } else {
                    timer.cancel();
                    let new_slot = Pending {
                        tag: tag.to_string(),
                        message: message.to_string(),
                        level,
                        count: 1,
                        last_timestamp_millis: now,
                    };
                    let generation = Inner::next_generation(self_arc);
                    let new_timer = Inner::arm_timer(self_arc, generation);
                    (
                        State::Pending {
                            slot: new_slot,
                            timer: new_timer,
                            generation,
                        },
                        Some(slot),
                    )
                }
            }
        };

        *guard = next_state;
        drop(guard);
        if let Some(flushed) = flushed {
            (self_arc.on_flush)(flushed);
        }
    }
}

/// Single-slot coalescing buffer (§4.2). Cheap to clone: internally an
/// `Arc`, so a clone shares the same pending slot and timer as the original.
#[derive(Clone)]
pub struct DedupBuffer {
    inner: Arc<Inner>,
}

impl DedupBuffer {
    /// Builds a buffer that calls `on_flush` exactly once per coalesced run.
    pub fn new(
        clock: Box<dyn Clock>,
        scheduler: Box<dyn Scheduler>,
        on_flush: impl Fn(Pending) + Send + Sync + 'static,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                clock,
                scheduler,
                state: Mutex::new(State::Empty),
                next_generation: AtomicU64::new(0),
                on_flush: Box::new(on_flush),
            }),
        }
    }

    /// Records one occurrence of `(tag, message, level)` (§4.2 transitions).
    pub fn add(&self, tag: &str, message: &str, level: u8) {
        Inner::add(&self.inner, tag, message, level);
    }

    /// `true` while a slot is pending (exposed for the Façade's `dedupEnabled = false`
    /// bypass, which never needs to consult this, and for tests asserting
    /// dedup-timer discipline, §8.1 property 9).
    pub fn has_pending(&self) -> bool {
        matches!(
            *self.inner.state.lock().unwrap_or_else(|e| e.into_inner()),
            State::Pending { .. }
        )
    }
}
