//! # klog
//!
//! An embedded, fixed-size, append-only log store: a persistent binary ring
//! buffer on disk plus an in-memory deduplication buffer that coalesces
//! repeated log lines into one entry with a repetition count.
//!
//! ## Crate structure
//!
//! - **`ring_store`**: the on-disk ring buffer — header, framed records,
//!   wrap-around append, reverse `tail`/`since` scans, corruption tolerance.
//!   This is the core of the crate.
//! - **`dedup`**: the single-slot coalescing buffer with a 20-second silence
//!   timer.
//! - **`scheduler`**: the delayed-callback primitive the Dedup Buffer arms
//!   its silence timer through (`ThreadScheduler` for production,
//!   `ManualScheduler` for tests).
//! - **`facade`**: wires the Ring Store, Dedup Buffer, console sink, clock,
//!   and UUID generator together into the single object an embedding
//!   application talks to.
//! - **`filesystem`**, **`clock`**, **`uuid_gen`**: the injectable seams the
//!   core is built against, so tests never touch real files, real time, or
//!   real randomness.
//! - **`console`**: the console sink trait plus a `tracing`-backed default.
//! - **`codec`**: fixed-endian integer read/write helpers shared by the
//!   on-disk format.
//! - **`config`**: loads [`ring_store::LogConfig`] from TOML and environment
//!   variables.
//! - **`error`**: the crate-wide error type.
//! - **`tracing_init`**: an optional, idempotent `tracing` subscriber
//!   installer for example binaries and integration tests.

pub mod clock;
pub mod codec;
pub mod config;
pub mod console;
pub mod dedup;
pub mod error;
pub mod facade;
pub mod filesystem;
pub mod ring_store;
pub mod scheduler;
pub mod tracing_init;
pub mod uuid_gen;

pub use error::{Error, Result};
pub use facade::Facade;
pub use ring_store::{LogConfig, LogRecord, RingStore};
