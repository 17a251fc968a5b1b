//! Feed polling and notification fan-out.
//!
//! `feedcast` periodically downloads a set of RSS/Atom feeds, finds the
//! entries that have not been announced yet (per-location watermark), orders
//! them across all feeds, lets a [`notify::Hook`] filter or rewrite them and
//! hands one formatted message per entry per channel to a
//! [`notify::Dispatcher`].
//!
//! The pieces, leaves first:
//!
//! - [`storage`] - durable key/value store and watermarks
//! - [`feed`] - feed registry, bounded concurrent fetcher, parser
//! - [`notify`] - ordering, hooks, templates, dispatch
//! - [`scheduler`] - the fault-tolerant recurring update loop
//! - [`config`] - TOML configuration

pub mod config;
pub mod feed;
pub mod notify;
pub mod scheduler;
pub mod storage;
pub mod util;
