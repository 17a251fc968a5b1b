use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::notify::Template;

/// One configured feed.
///
/// `locations[i]` is the storage key for the content fetched from `urls[i]`.
/// Only `last_fetch` changes after construction, and only from the update
/// cycle's coordinating task.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedSource {
    pub name: String,
    pub urls: Vec<String>,
    pub locations: Vec<String>,
    pub fmt: Template,
    pub channels: Vec<String>,
    /// Minimum time between two fetches of this feed
    pub delay: Duration,
    pub last_fetch: Option<DateTime<Utc>>,
}

impl FeedSource {
    pub fn new(
        name: impl Into<String>,
        urls: Vec<String>,
        channels: Vec<String>,
        fmt: Template,
        delay: Duration,
    ) -> Self {
        let name = name.into();
        let locations = (0..urls.len())
            .map(|i| storage_key(&name, i))
            .collect();
        Self {
            name,
            urls,
            locations,
            fmt,
            channels,
            delay,
            last_fetch: None,
        }
    }

    /// True when the feed has never been fetched or `delay` has elapsed
    /// since the last fetch.
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.last_fetch {
            None => true,
            Some(last) => {
                // A delay too large for chrono can never elapse.
                match chrono::Duration::from_std(self.delay) {
                    Ok(delay) => now - last >= delay,
                    Err(_) => false,
                }
            }
        }
    }
}

/// Storage key for the `index`-th URL of feed `name`.
///
/// `/` is common in feed names (`github/project`) and is flattened so the key
/// stays a single path component. A leading `.` becomes `_` so the key never
/// names a hidden file.
pub fn storage_key(name: &str, index: usize) -> String {
    let mut base = name.replace(['/', '\\'], "_");
    if base.starts_with('.') {
        base.replace_range(..1, "_");
    }
    format!("{base}.{index}.feed")
}

/// All configured feeds, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct FeedRegistry {
    feeds: BTreeMap<String, FeedSource>,
}

impl FeedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a feed, replacing any feed with the same name.
    pub fn insert(&mut self, feed: FeedSource) -> Option<FeedSource> {
        self.feeds.insert(feed.name.clone(), feed)
    }

    pub fn get(&self, name: &str) -> Option<&FeedSource> {
        self.feeds.get(name)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeedSource> {
        self.feeds.values()
    }

    /// Snapshot of every feed whose fetch interval has elapsed at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<FeedSource> {
        self.feeds
            .values()
            .filter(|f| f.is_due(now))
            .cloned()
            .collect()
    }

    /// Record that `name` was fetched at `at`. Unknown names are ignored.
    pub fn mark_fetched(&mut self, name: &str, at: DateTime<Utc>) {
        match self.feeds.get_mut(name) {
            Some(feed) => feed.last_fetch = Some(at),
            None => tracing::warn!(feed = %name, "Fetch result for unknown feed"),
        }
    }
}
