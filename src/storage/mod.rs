//! Durable key/value storage for fetched feed content and watermarks.
//!
//! Every piece of state that must survive a restart goes through the [`Store`]
//! trait: raw feed bodies written by the fetcher and the per-location
//! watermark written by the parser. Three backends are provided:
//!
//! - [`FileStore`] - one file per key under a root directory
//! - [`SqliteStore`] - a single SQLite table via `sqlx`
//! - [`MemoryStore`] - process-local map for tests and embedding
//!
//! [`WatermarkStore`] layers the watermark semantics (sidecar key, epoch-zero
//! fallback) on top of any backend.

mod file;
mod memory;
mod sqlite;
mod watermark;

use async_trait::async_trait;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
pub use watermark::{watermark_key, Watermark, WatermarkStore, WATERMARK_SUFFIX};

/// Errors raised by a storage backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem read or write failed
    #[error("Storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite operation failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Key cannot be mapped onto the backend (e.g. path traversal)
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),
}

/// A durable key to bytes mapping.
///
/// Writes overwrite any previous value for the key. A missing key is not an
/// error: `read` returns `Ok(None)`.
#[async_trait]
pub trait Store: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    async fn write(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}
