//! Crate-wide error type.
//!
//! A single `thiserror`-derived enum with `#[from]` conversions, scoped to
//! the error kinds the storage engine actually produces (§7, §11).
//! `OversizedRecord` is intentionally not a variant here — it is signalled by
//! `RingStore::append` returning `0`, not by an `Err`, and
//! `CorruptFrame`/`InvalidUtf8` are absorbed internally by scans and never
//! surfaced as values.

use thiserror::Error;

/// Convenience alias for results using the crate error type.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("log store used before initialization")]
    NotInitialized,
}
