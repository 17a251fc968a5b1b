use std::fmt;
use std::sync::Arc;

use super::{Store, StoreError};

/// Suffix appended to a content key to form its watermark key.
pub const WATERMARK_SUFFIX: &str = ".updated";

/// Key under which the watermark for `location` is persisted.
pub fn watermark_key(location: &str) -> String {
    format!("{location}{WATERMARK_SUFFIX}")
}

/// Timestamp of the most recently announced entry for one storage location.
///
/// Compared as a string. Timestamps produced by the parser are fixed-width
/// RFC 3339 UTC, so lexical order is chronological order. A value persisted
/// in some other format is still compared lexically, which can misorder.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Watermark(String);

impl Watermark {
    const EPOCH: &'static str = "0";

    /// Sentinel used when nothing has been announced yet. Sorts before any
    /// RFC 3339 timestamp.
    pub fn epoch() -> Self {
        Self(Self::EPOCH.to_string())
    }

    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_epoch(&self) -> bool {
        self.0 == Self::EPOCH
    }
}

impl Default for Watermark {
    fn default() -> Self {
        Self::epoch()
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reads and writes watermarks through any [`Store`].
#[derive(Clone)]
pub struct WatermarkStore {
    store: Arc<dyn Store>,
}

impl WatermarkStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Current watermark for `location`.
    ///
    /// Never fails. A missing, empty, non-UTF-8 or unreadable value degrades
    /// to [`Watermark::epoch`], which may cause old entries to be announced
    /// again (still bounded by the staleness horizon).
    pub async fn read(&self, location: &str) -> Watermark {
        let key = watermark_key(location);
        match self.store.read(&key).await {
            Ok(Some(bytes)) => match String::from_utf8(bytes) {
                Ok(text) if !text.trim().is_empty() => Watermark::new(text.trim()),
                Ok(_) => {
                    tracing::warn!(location = %location, "Empty watermark, treating as epoch");
                    Watermark::epoch()
                }
                Err(_) => {
                    tracing::warn!(location = %location, "Watermark is not UTF-8, treating as epoch");
                    Watermark::epoch()
                }
            },
            Ok(None) => {
                tracing::trace!(location = %location, "No watermark yet");
                Watermark::epoch()
            }
            Err(e) => {
                tracing::warn!(
                    location = %location,
                    error = %e,
                    "Failed to read watermark, treating as epoch (old entries may be repeated)"
                );
                Watermark::epoch()
            }
        }
    }

    /// Persist `watermark` for `location`. Errors are returned, not retried.
    pub async fn write(&self, location: &str, watermark: &Watermark) -> Result<(), StoreError> {
        self.store
            .write(&watermark_key(location), watermark.as_str().as_bytes())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    #[test]
    fn test_epoch_sorts_before_timestamps() {
        assert!(Watermark::epoch() < Watermark::new("1970-01-01T00:00:00Z"));
        assert!(Watermark::epoch() < Watermark::new("2026-10-16T08:00:00Z"));
    }

    #[tokio::test]
    async fn test_missing_watermark_is_epoch() {
        let store = WatermarkStore::new(Arc::new(MemoryStore::new()));
        assert!(store.read("news.0.feed").await.is_epoch());
    }

    #[tokio::test]
    async fn test_write_uses_sidecar_key() {
        let backend = Arc::new(MemoryStore::new());
        let store = WatermarkStore::new(backend.clone());

        store
            .write("news.0.feed", &Watermark::new("2026-10-16T08:00:00Z"))
            .await
            .unwrap();

        assert_eq!(backend.keys(), vec!["news.0.feed.updated".to_string()]);
        assert_eq!(
            store.read("news.0.feed").await,
            Watermark::new("2026-10-16T08:00:00Z")
        );
    }

    #[tokio::test]
    async fn test_garbage_degrades_to_epoch() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .write("news.0.feed.updated", &[0xff, 0xfe, 0x00])
            .await
            .unwrap();
        backend.write("blank.0.feed.updated", b"  \n").await.unwrap();

        let store = WatermarkStore::new(backend);
        assert!(store.read("news.0.feed").await.is_epoch());
        assert!(store.read("blank.0.feed").await.is_epoch());
    }

    #[tokio::test]
    async fn test_value_is_trimmed() {
        let backend = Arc::new(MemoryStore::new());
        backend
            .write("news.0.feed.updated", b"2026-10-16T08:00:00Z\n")
            .await
            .unwrap();

        let store = WatermarkStore::new(backend);
        assert_eq!(
            store.read("news.0.feed").await.as_str(),
            "2026-10-16T08:00:00Z"
        );
    }
}
