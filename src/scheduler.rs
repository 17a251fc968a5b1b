//! The recurring fetch → parse → notify cycle.
//!
//! A cycle has two phases, each guarded on its own: a failing (or panicking)
//! fetch phase is logged and the parse phase still runs; a failing parse
//! phase is logged and the loop still reschedules. Nothing here stops the
//! process except the shutdown future passed to [`Scheduler::run`].

use chrono::{DateTime, Utc};
use futures::FutureExt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::feed::{fetch_batch, parse_all, FeedClient, FeedRegistry, ParseError};
use crate::notify::{
    build_notifications, order_candidates, DispatchError, Dispatcher, Hook, IdentityHook,
};
use crate::storage::{Store, WatermarkStore};
use crate::util::panic_message;

/// Loop timing and fetch concurrency, fixed for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settings {
    /// Time between the end of one cycle and the start of the next
    pub delay: Duration,
    /// Idle time before the first cycle
    pub initial_delay: Duration,
    pub max_workers: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5 * 60),
            initial_delay: Duration::from_secs(10),
            max_workers: crate::feed::DEFAULT_MAX_WORKERS,
        }
    }
}

/// A phase that did not complete.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("{phase} phase panicked: {message}")]
    Panicked { phase: &'static str, message: String },

    #[error("Dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Feeds in this cycle's batch
    pub attempted: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
pub struct NotifySummary {
    pub new_entries: usize,
    pub dispatched: usize,
    pub errors: Vec<ParseError>,
}

/// What happened during one cycle.
#[derive(Debug)]
pub struct CycleReport {
    pub fetch: Result<FetchSummary, CycleError>,
    pub notify: Result<NotifySummary, CycleError>,
}

impl CycleReport {
    pub fn log(&self) {
        match &self.fetch {
            Ok(s) if s.failed > 0 => {
                tracing::warn!(attempted = s.attempted, failed = s.failed, "Fetch phase finished with failures")
            }
            Ok(s) if s.attempted > 0 => tracing::debug!(attempted = s.attempted, "Fetch phase finished"),
            Ok(_) => {}
            Err(e) => tracing::error!(error = %e, "Fetch phase failed"),
        }
        match &self.notify {
            Ok(s) => {
                for e in &s.errors {
                    tracing::warn!(error = %e, "Parse failure");
                }
                if s.new_entries > 0 {
                    tracing::info!(new_entries = s.new_entries, dispatched = s.dispatched, "Announced new entries");
                }
            }
            Err(e) => tracing::error!(error = %e, "Parse/notify phase failed"),
        }
    }
}

/// Owns the feed registry and every collaborator of the update cycle.
pub struct Scheduler {
    registry: FeedRegistry,
    store: Arc<dyn Store>,
    watermarks: WatermarkStore,
    client: Arc<dyn FeedClient>,
    dispatcher: Arc<dyn Dispatcher>,
    hook: Box<dyn Hook>,
    settings: Settings,
}

impl Scheduler {
    /// Create a scheduler using the identity hook.
    pub fn new(
        registry: FeedRegistry,
        store: Arc<dyn Store>,
        client: Arc<dyn FeedClient>,
        dispatcher: Arc<dyn Dispatcher>,
        settings: Settings,
    ) -> Self {
        Self {
            registry,
            watermarks: WatermarkStore::new(store.clone()),
            store,
            client,
            dispatcher,
            hook: Box::new(IdentityHook),
            settings,
        }
    }

    pub fn with_hook(mut self, hook: Box<dyn Hook>) -> Self {
        self.hook = hook;
        self
    }

    pub fn registry(&self) -> &FeedRegistry {
        &self.registry
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Fetch every feed that is due at `now`.
    ///
    /// Returns only after every fetch of the batch has finished. Each fetched
    /// feed gets `last_fetch = now`, whether or not its URLs succeeded or its
    /// worker panicked.
    pub async fn fetch(&mut self, now: DateTime<Utc>) -> FetchSummary {
        let batch = self.registry.due(now);
        if batch.is_empty() {
            tracing::trace!("No feeds due");
            return FetchSummary::default();
        }

        let results = fetch_batch(
            self.client.as_ref(),
            self.store.as_ref(),
            batch,
            self.settings.max_workers,
            now,
        )
        .await;

        let mut summary = FetchSummary {
            attempted: results.len(),
            failed: 0,
        };
        for r in &results {
            if r.result.is_err() {
                summary.failed += 1;
            }
            self.registry.mark_fetched(&r.name, r.started_at);
        }
        summary
    }

    /// Parse stored content of every feed, order the new entries globally,
    /// run them through the hook and dispatch the resulting batch.
    pub async fn parse_and_notify(
        &mut self,
        now: DateTime<Utc>,
    ) -> Result<NotifySummary, CycleError> {
        let outcome = parse_all(
            self.registry.iter(),
            self.store.as_ref(),
            &self.watermarks,
            now,
        )
        .await;

        let new_entries = outcome.candidates.len();
        let candidates = order_candidates(outcome.candidates);
        let notifications = build_notifications(candidates, self.hook.as_ref());
        let dispatched = notifications.len();

        let summary = NotifySummary {
            new_entries,
            dispatched,
            errors: outcome.errors,
        };

        if !notifications.is_empty() {
            self.dispatcher.dispatch(notifications).await?;
        }
        Ok(summary)
    }

    /// One full cycle at `now`. Never fails: phase failures are captured in
    /// the report.
    pub async fn run_cycle(&mut self, now: DateTime<Utc>) -> CycleReport {
        let fetch = AssertUnwindSafe(self.fetch(now))
            .catch_unwind()
            .await
            .map_err(|panic| CycleError::Panicked {
                phase: "fetch",
                message: panic_message(panic),
            });

        let notify = match AssertUnwindSafe(self.parse_and_notify(now))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(panic) => Err(CycleError::Panicked {
                phase: "parse",
                message: panic_message(panic),
            }),
        };

        CycleReport { fetch, notify }
    }

    /// Run cycles forever: wait `initial_delay`, then cycle, wait `delay`,
    /// cycle, ... until `shutdown` resolves. A cycle in progress always
    /// completes; shutdown is only observed between cycles.
    pub async fn run<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut wait = self.settings.initial_delay;

        tracing::info!(
            feeds = self.registry.len(),
            delay_secs = self.settings.delay.as_secs(),
            max_workers = self.settings.max_workers,
            "Update loop started"
        );

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => {
                    tracing::info!("Update loop stopped");
                    break;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            let report = self.run_cycle(Utc::now()).await;
            report.log();
            wait = self.settings.delay;
        }
    }
}
