// ABOUTME: Poll cycle: fetch one page, classify failures, dedup, and pick the next delay.
// ABOUTME: Driven by a one-shot timer rearmed after every cycle, never a fixed-rate tick.

use crate::engine::Shared;
use crate::events::ChatEvent;
use crate::ledger::DedupLedger;
use crate::traits::ListRequest;
use std::sync::Weak;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Pagination position plus the server's last suggested interval.
///
/// Only the poll cycle mutates this, and only after a successful fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollCursor {
    /// Absent means "first page"
    pub page_token: Option<String>,
    /// Interval the server suggested on the last page
    pub polling_interval: Option<Duration>,
}

impl PollCursor {
    fn advance(&mut self, next_page_token: Option<String>, polling_interval: Duration) {
        if self.page_token != next_page_token {
            tracing::trace!(page_token = ?next_page_token, "cursor advanced");
        }
        self.page_token = next_page_token;
        self.polling_interval = Some(polling_interval);
    }
}

/// Cursor and ledger for the feed. Survives reconnects.
#[derive(Debug, Default)]
pub(crate) struct FeedState {
    pub(crate) cursor: PollCursor,
    pub(crate) ledger: DedupLedger,
}

impl FeedState {
    pub(crate) fn new(dedup_capacity: Option<usize>) -> Self {
        Self {
            cursor: PollCursor::default(),
            ledger: match dedup_capacity {
                Some(capacity) => DedupLedger::with_capacity(capacity),
                None => DedupLedger::new(),
            },
        }
    }
}

/// Delay before the next cycle.
///
/// With a response, the larger of the caller's minimum and the server's
/// suggestion; without one, the fixed fallback.
pub fn next_interval(minimum: Duration, fallback: Duration, server: Option<Duration>) -> Duration {
    match server {
        Some(suggested) => minimum.max(suggested),
        None => fallback,
    }
}

/// Scheduling result of one completed cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CycleOutcome {
    pub(crate) next_interval: Duration,
}

impl Shared {
    /// Run one cycle. Returns `None` when the session was cancelled, in
    /// which case nothing was emitted after the cancellation and no further
    /// cycle may be scheduled.
    pub(crate) async fn cycle(&self, cancel: &CancellationToken) -> Option<CycleOutcome> {
        let (credentials, request) = {
            let lifecycle = self.lock_lifecycle();
            if cancel.is_cancelled() {
                return None;
            }
            let credentials = lifecycle.session_credentials()?;
            self.events.emit(ChatEvent::Polling);

            let feed = self.lock_feed();
            let request = ListRequest {
                live_chat_id: self.config.live_chat_id.clone(),
                page_token: feed.cursor.page_token.clone(),
                max_results: self.config.max_results,
                parts: self.config.parts.clone(),
            };
            (credentials, request)
        };

        tracing::debug!(
            live_chat_id = %request.live_chat_id,
            page_token = ?request.page_token,
            "Polling chat messages"
        );

        let result = tokio::select! {
            _ = cancel.cancelled() => return None,
            result = self.transport.list(&credentials, &request) => result,
        };

        // Commit under the lifecycle lock so a concurrent disconnect either
        // happens entirely before or entirely after this block.
        let _lifecycle = self.lock_lifecycle();
        if cancel.is_cancelled() {
            tracing::debug!("Discarding poll result that completed after disconnect");
            return None;
        }

        let outcome = match result {
            Ok(page) => {
                let mut feed = self.lock_feed();
                let seeded = !feed.ledger.is_primed();
                let server_interval = page.polling_interval;

                let fresh = feed.ledger.ingest(page.items);
                let emitted = fresh.len();
                for message in fresh {
                    self.events.chat(message);
                }
                feed.cursor.advance(page.next_page_token, server_interval);

                let next_interval = next_interval(
                    self.config.minimum_interval(),
                    self.config.fallback_interval(),
                    Some(server_interval),
                );
                tracing::debug!(
                    emitted,
                    seeded,
                    known = feed.ledger.len(),
                    interval_ms = next_interval.as_millis() as u64,
                    "Poll cycle complete"
                );
                CycleOutcome { next_interval }
            }
            Err(error) => {
                self.handle_failure(error);
                let next_interval = next_interval(
                    self.config.minimum_interval(),
                    self.config.fallback_interval(),
                    None,
                );
                CycleOutcome { next_interval }
            }
        };

        Some(outcome)
    }
}

/// Poll loop for one connected session.
///
/// Holds only a weak reference so dropping the engine stops the loop.
pub(crate) async fn run(shared: Weak<Shared>, cancel: CancellationToken) {
    loop {
        let Some(engine) = shared.upgrade() else {
            break;
        };
        let Some(outcome) = engine.cycle(&cancel).await else {
            break;
        };
        drop(engine);

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(outcome.next_interval) => {}
        }
    }
    tracing::debug!("Poll loop stopped");
}
