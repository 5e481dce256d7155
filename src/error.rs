//! Error handling for Tenebra operations.
//!
//! All public APIs return `Result<T, EngineError>` for consistent error
//! handling. Errors surface to the immediate caller; nothing is retried or
//! swallowed inside the engine.

use std::io;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur during storage engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// I/O error from the underlying medium.
    ///
    /// Raised on seek, read, or write failure, including short reads of a
    /// page. Fatal to the in-flight operation; the engine never retries.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A page's internal lengths, offsets, or counts are inconsistent with
    /// the page buffer.
    ///
    /// Detected by bounds-checking during deserialization, never by
    /// out-of-bounds access.
    #[error("corrupt page: {0}")]
    CorruptPage(String),

    /// A collection header failed to parse.
    #[error("corrupt collection header: {0}")]
    CorruptCollection(String),

    /// Find or Delete was called with a key that is not present.
    #[error("key not found")]
    KeyNotFound,

    /// Insert was called with a key that already exists in the collection.
    #[error("duplicate key")]
    DuplicateKey,

    /// Invalid argument or operation.
    ///
    /// Covers oversized keys/values, empty keys, and reopening a file with
    /// a mismatched page size.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
