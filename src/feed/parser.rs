//! Decoding stored feed content and selecting entries newer than the watermark.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use feed_rs::parser;
use thiserror::Error;

use crate::feed::FeedSource;
use crate::notify::Candidate;
use crate::storage::{Store, StoreError, Watermark, WatermarkStore};

/// Entries older than this, relative to the cycle time, are never announced.
pub const STALENESS_HORIZON_DAYS: i64 = 2;

/// Stored content could not be decoded as RSS or Atom.
#[derive(Debug, Error)]
#[error("Parse error: {0}")]
pub struct DecodeError(#[from] parser::ParseFeedError);

/// Per-location failures collected during the parse phase. None of these
/// abort the phase.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("{location}: failed to read stored content: {source}")]
    Read {
        location: String,
        #[source]
        source: StoreError,
    },

    #[error("{location}: {source}")]
    Decode {
        location: String,
        #[source]
        source: DecodeError,
    },

    #[error("{location}: failed to write watermark: {source}")]
    WatermarkWrite {
        location: String,
        #[source]
        source: StoreError,
    },
}

/// One decoded item, before watermark filtering.
#[derive(Debug, Clone, PartialEq)]
pub struct RawEntry {
    pub updated: Option<DateTime<Utc>>,
    pub title: String,
    pub link: String,
}

/// An accepted feed item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Fixed-width RFC 3339 UTC timestamp; doubles as the watermark value
    pub updated: String,
    pub title: String,
    pub link: String,
    /// Storage key of the content this entry was decoded from
    pub location: String,
}

/// Outcome of parsing every configured feed.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    /// Accepted entries in discovery order (feed by feed, location by location)
    pub candidates: Vec<Candidate>,
    pub errors: Vec<ParseError>,
}

/// Decode RSS/Atom bytes into raw entries, in document order.
pub fn decode(bytes: &[u8]) -> Result<Vec<RawEntry>, DecodeError> {
    let feed = parser::parse(bytes)?;

    let entries = feed
        .entries
        .into_iter()
        .map(|entry| {
            let link = entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default();
            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string());

            RawEntry {
                updated: entry.updated.or(entry.published),
                title,
                link,
            }
        })
        .collect();

    Ok(entries)
}

/// Canonical string form of an entry timestamp.
///
/// Always nine fractional digits and a `Z` suffix, so string order matches
/// time order. Sub-second precision is kept: two entries in the same second
/// must still compare as distinct.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Select the entries of one location that should be announced.
///
/// An entry is accepted when its timestamp is strictly greater than
/// `watermark` and not older than `now - 2 days`. Returns the accepted
/// entries in document order plus the new watermark, which is `Some` only if
/// something was accepted and is then the maximum accepted timestamp.
pub fn select_new(
    raw: Vec<RawEntry>,
    watermark: &Watermark,
    location: &str,
    now: DateTime<Utc>,
) -> (Vec<Entry>, Option<Watermark>) {
    let horizon = now - Duration::days(STALENESS_HORIZON_DAYS);
    let mut accepted = Vec::new();

    for entry in raw {
        let Some(ts) = entry.updated else {
            tracing::debug!(location = %location, title = %entry.title, "Entry without timestamp skipped");
            continue;
        };
        let updated = format_timestamp(ts);
        if updated.as_str() <= watermark.as_str() {
            continue;
        }
        if ts < horizon {
            tracing::trace!(location = %location, updated = %updated, "Entry older than horizon skipped");
            continue;
        }
        accepted.push(Entry {
            updated,
            title: entry.title,
            link: entry.link,
            location: location.to_string(),
        });
    }

    let next = accepted
        .iter()
        .map(|e| e.updated.as_str())
        .max()
        .map(Watermark::new);

    (accepted, next)
}

/// Parse every location of one feed, advancing watermarks as entries are
/// accepted. Failures are pushed onto `outcome.errors` and never stop the
/// remaining locations.
pub async fn parse_source(
    source: &FeedSource,
    store: &dyn Store,
    watermarks: &WatermarkStore,
    now: DateTime<Utc>,
    outcome: &mut ParseOutcome,
) {
    for location in &source.locations {
        let watermark = watermarks.read(location).await;

        let bytes = match store.read(location).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(feed = %source.name, location = %location, "Nothing fetched yet");
                continue;
            }
            Err(e) => {
                tracing::warn!(feed = %source.name, location = %location, error = %e, "Failed to read stored feed");
                outcome.errors.push(ParseError::Read {
                    location: location.clone(),
                    source: e,
                });
                continue;
            }
        };

        let raw = match decode(&bytes) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(feed = %source.name, location = %location, error = %e, "Failed to decode feed");
                outcome.errors.push(ParseError::Decode {
                    location: location.clone(),
                    source: e,
                });
                continue;
            }
        };

        let (entries, next) = select_new(raw, &watermark, location, now);

        if let Some(next) = next {
            tracing::debug!(
                feed = %source.name,
                location = %location,
                new_entries = entries.len(),
                watermark = %next,
                "Advancing watermark"
            );
            if let Err(e) = watermarks.write(location, &next).await {
                tracing::error!(feed = %source.name, location = %location, error = %e, "Failed to write watermark");
                outcome.errors.push(ParseError::WatermarkWrite {
                    location: location.clone(),
                    source: e,
                });
            }
        }

        outcome
            .candidates
            .extend(entries.into_iter().map(|entry| Candidate {
                source: source.clone(),
                entry,
            }));
    }
}

/// Parse all feeds in iteration order.
pub async fn parse_all<'a>(
    sources: impl IntoIterator<Item = &'a FeedSource>,
    store: &dyn Store,
    watermarks: &WatermarkStore,
    now: DateTime<Utc>,
) -> ParseOutcome {
    let mut outcome = ParseOutcome::default();
    for source in sources {
        parse_source(source, store, watermarks, now, &mut outcome).await;
    }
    outcome
}
