//! Delivery collaborators for the card sync engine.
//!
//! The sync engine talks to three pluggable backends through these traits:
//!
//! | Trait | Role |
//! |-------|------|
//! | [`DeckApi`] | Live deck store (primary delivery path) |
//! | [`FallbackSink`] | File fallback used when the live path is down |
//! | [`SyncStateStore`] | Durable per-card delivery state, keyed by content hash |
//!
//! Implementations must be `Send + Sync` to work with async runtimes. The
//! application crate provides HTTP, JSONL and SQLite backends; the
//! [`memory`] module provides in-memory doubles for tests.

pub mod memory;

use std::collections::BTreeMap;

use anyhow::Result;
use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::models::{CardRecord, SyncState, SyncStatus};

/// Live deck store.
#[async_trait]
pub trait DeckApi: Send + Sync {
    /// Create a note for `card`, returning the store's note id.
    async fn create_note(&self, card: &CardRecord) -> std::result::Result<i64, DeliveryError>;
}

/// Local fallback for cards the live store could not take.
#[async_trait]
pub trait FallbackSink: Send + Sync {
    /// Write `card` and return where it was written.
    async fn write_card(&self, card: &CardRecord) -> std::result::Result<String, DeliveryError>;
}

/// Durable delivery state, one entry per `content_hash`.
///
/// Errors from this trait are storage failures and are never swallowed by
/// the sync engine.
#[async_trait]
pub trait SyncStateStore: Send + Sync {
    async fn get(&self, content_hash: &str) -> Result<Option<SyncState>>;

    /// Insert or replace the entry for `state.card.content_hash`.
    async fn upsert(&self, state: &SyncState) -> Result<()>;

    /// Entries in `pending` or `queued_retry`, oldest first.
    async fn list_non_terminal(&self) -> Result<Vec<SyncState>>;

    async fn status_counts(&self) -> Result<BTreeMap<SyncStatus, usize>>;
}
