//! Card sync engine: deduplicated, crash-safe delivery to the deck store.
//!
//! # Delivery cascade
//!
//! ```text
//!             ┌─────────┐  ok   ┌────────────────┐
//! pending ───▶│ live API│──────▶│ delivered_live │
//!             └────┬────┘       └────────────────┘
//!        transient │ permanent ─────────────▶ failed_permanent
//!                  ▼
//!             ┌─────────┐  ok   ┌────────────────┐
//!             │  file   │──────▶│ delivered_file │
//!             └────┬────┘       └────────────────┘
//!                  │ fail
//!                  ▼
//!     queued_retry (or failed_permanent once attempts hit max_attempts)
//! ```
//!
//! Payload validation runs before the live call; an invalid payload goes
//! straight to `failed_permanent`.
//!
//! # Durability
//!
//! The state is persisted as `pending` before the first attempt and again
//! after every attempt. A crash between the two leaves a `pending` row that
//! [`SyncEngine::recover`] moves to `queued_retry`, so the card is retried
//! rather than lost. Delivery is therefore at-least-once across crashes.
//!
//! # Deduplication
//!
//! Any existing row for a card's `content_hash` (whatever its status)
//! causes the card to be skipped with `DUPLICATE_FOUND`. The hash covers
//! the module id, so duplicates are scoped per module. The check, the
//! attempt, and the write all happen under [`DeckLock`].

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use serde::Serialize;
use tracing::{error, info, warn};

use deckforge_core::error::DeliveryError;
use deckforge_core::models::{CardRecord, SyncState, SyncStatus};
use deckforge_core::store::{DeckApi, FallbackSink, SyncStateStore};

use crate::config::Config;
use crate::deck_api::HttpDeckApi;
use crate::fallback::JsonlFallback;
use crate::lock::DeckLock;
use crate::queue::SqliteSyncStore;
use crate::{db, migrate};

/// Result of delivering (or retrying) one card.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncOutcome {
    DeliveredLive { note_id: i64 },
    DeliveredFile { location: String },
    QueuedRetry { attempt_count: u32, error: String },
    FailedPermanent { error: String },
    /// A row for this content hash already existed.
    DuplicateSkipped { existing: SyncStatus },
    /// Retry found the entry already finished (or gone).
    AlreadySettled,
}

/// Per-outcome counts for a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub delivered_live: usize,
    pub delivered_file: usize,
    pub queued_retry: usize,
    pub failed_permanent: usize,
    pub duplicates: usize,
    pub already_settled: usize,
}

impl SyncReport {
    pub fn record(&mut self, outcome: &SyncOutcome) {
        match outcome {
            SyncOutcome::DeliveredLive { .. } => self.delivered_live += 1,
            SyncOutcome::DeliveredFile { .. } => self.delivered_file += 1,
            SyncOutcome::QueuedRetry { .. } => self.queued_retry += 1,
            SyncOutcome::FailedPermanent { .. } => self.failed_permanent += 1,
            SyncOutcome::DuplicateSkipped { .. } => self.duplicates += 1,
            SyncOutcome::AlreadySettled => self.already_settled += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.delivered_live
            + self.delivered_file
            + self.queued_retry
            + self.failed_permanent
            + self.duplicates
            + self.already_settled
    }
}

pub struct SyncEngine {
    api: Arc<dyn DeckApi>,
    fallback: Arc<dyn FallbackSink>,
    store: Arc<dyn SyncStateStore>,
    lock: DeckLock,
    max_attempts: u32,
}

impl SyncEngine {
    pub fn new(
        api: Arc<dyn DeckApi>,
        fallback: Arc<dyn FallbackSink>,
        store: Arc<dyn SyncStateStore>,
        lock: DeckLock,
        max_attempts: u32,
    ) -> Self {
        Self {
            api,
            fallback,
            store,
            lock,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Wire up the HTTP deck API, JSONL fallback, and SQLite queue from config.
    ///
    /// Creates the `sync_state` table if it does not exist yet.
    pub async fn open(config: &Config) -> Result<Self> {
        let pool = db::connect(config).await?;
        migrate::apply(&pool).await?;

        let lock = DeckLock::new(
            config.lock_path(),
            Duration::from_secs(config.sync.lock_timeout_secs),
            Duration::from_secs(config.sync.stale_lock_secs),
        );

        Ok(Self::new(
            Arc::new(HttpDeckApi::new(&config.deck)?),
            Arc::new(JsonlFallback::new(&config.deck.fallback_dir)),
            Arc::new(SqliteSyncStore::new(pool)),
            lock,
            config.sync.max_attempts,
        ))
    }

    pub fn store(&self) -> &Arc<dyn SyncStateStore> {
        &self.store
    }

    /// Deliver one card unless its content hash is already known.
    pub async fn deliver(&self, card: &CardRecord) -> Result<SyncOutcome> {
        let _guard = self.lock.acquire().await?;

        if let Some(existing) = self.store.get(&card.content_hash).await? {
            info!(
                "DUPLICATE_FOUND: {} in {}",
                card.content_hash, card.module_id
            );
            return Ok(SyncOutcome::DuplicateSkipped {
                existing: existing.status,
            });
        }

        let mut state = SyncState::pending(card.clone());
        self.store.upsert(&state).await?;

        let outcome = self.attempt(&mut state).await;
        self.store.upsert(&state).await?;
        Ok(outcome)
    }

    /// Deliver a batch. Per-card delivery failures become outcomes; only
    /// storage and lock errors abort the batch.
    pub async fn deliver_all(&self, cards: &[CardRecord]) -> Result<SyncReport> {
        let mut report = SyncReport::default();
        for card in cards {
            let outcome = self.deliver(card).await?;
            report.record(&outcome);
        }
        Ok(report)
    }

    /// Startup recovery: move entries a crash left in `pending` to
    /// `queued_retry`. Returns the number of entries moved.
    pub async fn recover(&self) -> Result<usize> {
        let _guard = self.lock.acquire().await?;

        let mut recovered = 0;
        for mut state in self.store.list_non_terminal().await? {
            if state.status == SyncStatus::Pending {
                warn!(
                    hash = %state.content_hash(),
                    module = %state.card.module_id,
                    "recovering card left pending by an interrupted run"
                );
                state.transition(SyncStatus::QueuedRetry);
                self.store.upsert(&state).await?;
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    /// Run one retry cycle over every non-terminal entry.
    pub async fn retry_pending(&self) -> Result<SyncReport> {
        let mut report = SyncReport::default();

        for snapshot in self.store.list_non_terminal().await? {
            let _guard = self.lock.acquire().await?;

            // Another process may have finished this entry since the listing.
            let current = self.store.get(snapshot.content_hash()).await?;
            let outcome = match current {
                Some(mut state) if !state.status.is_terminal() => {
                    let outcome = self.attempt(&mut state).await;
                    self.store.upsert(&state).await?;
                    outcome
                }
                _ => SyncOutcome::AlreadySettled,
            };
            report.record(&outcome);
        }

        Ok(report)
    }

    /// Run the cascade once, updating `state` in place.
    async fn attempt(&self, state: &mut SyncState) -> SyncOutcome {
        state.attempt_count += 1;
        let hash = state.card.content_hash.clone();

        if let Err(e) = state.card.validate() {
            return self.fail_permanent(state, e.to_string());
        }

        let live_err = match self.api.create_note(&state.card).await {
            Ok(note_id) => {
                state.note_id = Some(note_id);
                state.last_error = None;
                state.transition(SyncStatus::DeliveredLive);
                info!("DELIVERY_SUCCESS: noteId={}", note_id);
                return SyncOutcome::DeliveredLive { note_id };
            }
            Err(DeliveryError::PermanentValidation(msg)) => {
                return self.fail_permanent(state, msg);
            }
            Err(DeliveryError::Transient(msg)) => msg,
        };

        warn!(hash = %hash, error = %live_err, "live delivery failed; writing file fallback");

        match self.fallback.write_card(&state.card).await {
            Ok(location) => {
                state.file_location = Some(location.clone());
                state.last_error = Some(live_err);
                state.transition(SyncStatus::DeliveredFile);
                info!("DELIVERY_SUCCESS: file={}", location);
                SyncOutcome::DeliveredFile { location }
            }
            Err(DeliveryError::PermanentValidation(msg)) => self.fail_permanent(state, msg),
            Err(DeliveryError::Transient(file_err)) => {
                let message = format!("live: {}; file: {}", live_err, file_err);
                if state.attempt_count >= self.max_attempts {
                    return self.fail_permanent(state, message);
                }
                warn!(
                    hash = %hash,
                    attempt = state.attempt_count,
                    max_attempts = self.max_attempts,
                    "both delivery paths failed; queued for retry"
                );
                state.last_error = Some(message.clone());
                state.transition(SyncStatus::QueuedRetry);
                SyncOutcome::QueuedRetry {
                    attempt_count: state.attempt_count,
                    error: message,
                }
            }
        }
    }

    fn fail_permanent(&self, state: &mut SyncState, message: String) -> SyncOutcome {
        error!(
            hash = %state.content_hash(),
            module = %state.card.module_id,
            attempts = state.attempt_count,
            error = %message,
            "card delivery failed permanently"
        );
        state.last_error = Some(message.clone());
        state.transition(SyncStatus::FailedPermanent);
        SyncOutcome::FailedPermanent { error: message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_counts() {
        let mut report = SyncReport::default();
        report.record(&SyncOutcome::DeliveredLive { note_id: 1 });
        report.record(&SyncOutcome::DuplicateSkipped {
            existing: SyncStatus::DeliveredLive,
        });
        report.record(&SyncOutcome::QueuedRetry {
            attempt_count: 1,
            error: "down".to_string(),
        });
        assert_eq!(report.delivered_live, 1);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.queued_retry, 1);
        assert_eq!(report.total(), 3);
    }
}
