use crate::feed::{Entry, FeedSource};

/// Filter/transform applied to each candidate before formatting.
///
/// `index` is the candidate's position in the cycle's globally sorted
/// sequence. Returning `None` drops the candidate silently; returning a pair
/// (possibly rewritten) sends it on to formatting.
///
/// Any `Fn(usize, FeedSource, Entry) -> Option<(FeedSource, Entry)>` closure
/// is a hook.
pub trait Hook: Send + Sync {
    fn apply(&self, index: usize, feed: FeedSource, entry: Entry) -> Option<(FeedSource, Entry)>;
}

impl<F> Hook for F
where
    F: Fn(usize, FeedSource, Entry) -> Option<(FeedSource, Entry)> + Send + Sync,
{
    fn apply(&self, index: usize, feed: FeedSource, entry: Entry) -> Option<(FeedSource, Entry)> {
        self(index, feed, entry)
    }
}

/// Passes every candidate through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityHook;

impl Hook for IdentityHook {
    fn apply(&self, _index: usize, feed: FeedSource, entry: Entry) -> Option<(FeedSource, Entry)> {
        Some((feed, entry))
    }
}

/// Drops entries whose title contains any of the given words
/// (case-insensitive).
#[derive(Debug, Clone, Default)]
pub struct ExcludeHook {
    needles: Vec<String>,
}

impl ExcludeHook {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            needles: words
                .into_iter()
                .map(|w| w.as_ref().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }
}

impl Hook for ExcludeHook {
    fn apply(&self, _index: usize, feed: FeedSource, entry: Entry) -> Option<(FeedSource, Entry)> {
        let title = entry.title.to_lowercase();
        if let Some(word) = self.needles.iter().find(|w| title.contains(w.as_str())) {
            tracing::debug!(feed = %feed.name, title = %entry.title, word = %word, "Entry excluded by hook");
            return None;
        }
        Some((feed, entry))
    }
}

/// Announces at most `limit` candidates per cycle: the oldest ones.
#[derive(Debug, Clone, Copy)]
pub struct MaxPerCycleHook {
    limit: usize,
}

impl MaxPerCycleHook {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Hook for MaxPerCycleHook {
    fn apply(&self, index: usize, feed: FeedSource, entry: Entry) -> Option<(FeedSource, Entry)> {
        if index >= self.limit {
            if index == self.limit {
                tracing::info!(limit = self.limit, "Per-cycle notification limit reached, dropping the rest");
            }
            return None;
        }
        Some((feed, entry))
    }
}
