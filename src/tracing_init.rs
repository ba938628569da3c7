//! One-shot, idempotent `tracing` subscriber installer (§10).
//!
//! `klog` never requires this: any host application is free to install its
//! own subscriber before using the crate, and every internal breadcrumb
//! (`RingStore` scan termination, oversized-record rejection, dedup timer
//! rearm) goes through the ordinary `tracing` macros regardless of whether a
//! subscriber is installed. This module exists for example binaries and
//! `klog`'s own integration tests, the same role the teacher's
//! `tracing_v4::init` plays for its own examples — scaled down to what a
//! small embedded library needs (no span-event/JSON/compact format
//! switching, no app-level config struct to read a level from).

use tracing_subscriber::{fmt, EnvFilter};

/// Installs a `fmt` subscriber filtered by `RUST_LOG` (or `info` if unset).
///
/// Safe to call more than once, including from multiple test binaries
/// running in the same process: a subscriber already installed by an
/// earlier call (or by the host application) is left in place.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
