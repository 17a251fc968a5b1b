//! Feed sources, fetching and parsing.
//!
//! - [`source`] - configured feeds and the registry the scheduler owns
//! - [`fetcher`] - bounded concurrent download of raw feed content into storage
//! - [`parser`] - decoding stored content and selecting entries newer than the watermark

mod fetcher;
mod parser;
mod source;

pub use fetcher::{
    fetch_batch, fetch_source, FeedClient, FetchError, FetchResult, HttpClient,
    DEFAULT_MAX_WORKERS, DEFAULT_USER_AGENT,
};
pub use parser::{
    decode, format_timestamp, parse_all, parse_source, select_new, DecodeError, Entry,
    ParseError, ParseOutcome, RawEntry, STALENESS_HORIZON_DAYS,
};
pub use source::{storage_key, FeedRegistry, FeedSource};
