//! Ordering, filtering, formatting and fan-out of newly accepted entries.
//!
//! After the parse phase every feed's new entries are merged into one
//! sequence of [`Candidate`]s, sorted by entry timestamp (stable, so ties keep
//! discovery order). Each candidate then goes through the [`Hook`], is rendered
//! with its feed's [`Template`] and becomes one [`Notification`] per channel.
//! The full batch is handed to a [`Dispatcher`] in a single call.

mod dispatch;
mod format;
mod hook;

pub use dispatch::{ChannelDispatcher, DispatchError, Dispatcher, Notification, StdoutDispatcher};
pub use format::{Template, TemplateError, DEFAULT_FORMAT};
pub use hook::{ExcludeHook, Hook, IdentityHook, MaxPerCycleHook};

use crate::feed::{Entry, FeedSource};

/// An accepted entry together with the feed it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    pub source: FeedSource,
    pub entry: Entry,
}

impl Candidate {
    /// Global sort key.
    pub fn sort_key(&self) -> &str {
        &self.entry.updated
    }
}

/// Sort candidates from all feeds into one chronological sequence.
pub fn order_candidates(mut candidates: Vec<Candidate>) -> Vec<Candidate> {
    // sort_by is stable: equal timestamps keep discovery order
    candidates.sort_by(|a, b| a.sort_key().cmp(b.sort_key()));
    candidates
}

/// Run the hook over the ordered candidates and expand the survivors into
/// per-channel notifications, preserving order.
pub fn build_notifications(candidates: Vec<Candidate>, hook: &dyn Hook) -> Vec<Notification> {
    let mut out = Vec::new();
    for (index, Candidate { source, entry }) in candidates.into_iter().enumerate() {
        let Some((source, entry)) = hook.apply(index, source, entry) else {
            continue;
        };
        let message = source.fmt.render(&source, &entry);
        for channel in &source.channels {
            out.push(Notification::new(channel.clone(), message.clone()));
        }
    }
    out
}
