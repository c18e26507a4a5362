//! In-memory delivery backends for tests.
//!
//! [`InMemorySyncStore`] keeps sync state in a `HashMap` behind
//! `std::sync::RwLock`. [`ScriptedDeckApi`] and [`MemoryFallback`] replay a
//! queue of canned outcomes and record every card they were handed, so
//! tests can drive the delivery cascade through each branch.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, RwLock};

use anyhow::{anyhow, Result};
use async_trait::async_trait;

use crate::error::DeliveryError;
use crate::models::{CardRecord, SyncState, SyncStatus};

use super::{DeckApi, FallbackSink, SyncStateStore};

/// In-memory [`SyncStateStore`].
pub struct InMemorySyncStore {
    states: RwLock<HashMap<String, SyncState>>,
}

impl InMemorySyncStore {
    pub fn new() -> Self {
        Self {
            states: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemorySyncStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SyncStateStore for InMemorySyncStore {
    async fn get(&self, content_hash: &str) -> Result<Option<SyncState>> {
        let states = self.states.read().map_err(|e| anyhow!("{}", e))?;
        Ok(states.get(content_hash).cloned())
    }

    async fn upsert(&self, state: &SyncState) -> Result<()> {
        let mut states = self.states.write().map_err(|e| anyhow!("{}", e))?;
        states.insert(state.content_hash().to_string(), state.clone());
        Ok(())
    }

    async fn list_non_terminal(&self) -> Result<Vec<SyncState>> {
        let states = self.states.read().map_err(|e| anyhow!("{}", e))?;
        let mut open: Vec<SyncState> = states
            .values()
            .filter(|s| !s.status.is_terminal())
            .cloned()
            .collect();
        open.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.content_hash().cmp(b.content_hash()))
        });
        Ok(open)
    }

    async fn status_counts(&self) -> Result<BTreeMap<SyncStatus, usize>> {
        let states = self.states.read().map_err(|e| anyhow!("{}", e))?;
        let mut counts = BTreeMap::new();
        for state in states.values() {
            *counts.entry(state.status).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

/// A [`DeckApi`] that replays scripted results.
///
/// Once the script runs out every call succeeds with an increasing note id.
pub struct ScriptedDeckApi {
    script: Mutex<VecDeque<std::result::Result<i64, DeliveryError>>>,
    received: Mutex<Vec<CardRecord>>,
    next_id: Mutex<i64>,
}

impl ScriptedDeckApi {
    pub fn new(script: Vec<std::result::Result<i64, DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            received: Mutex::new(Vec::new()),
            next_id: Mutex::new(1000),
        }
    }

    /// An API that is always down.
    pub fn unavailable(times: usize) -> Self {
        Self::new(
            (0..times)
                .map(|_| Err(DeliveryError::Transient("connection refused".to_string())))
                .collect(),
        )
    }

    pub fn received(&self) -> Vec<CardRecord> {
        self.received.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl DeckApi for ScriptedDeckApi {
    async fn create_note(&self, card: &CardRecord) -> std::result::Result<i64, DeliveryError> {
        if let Ok(mut received) = self.received.lock() {
            received.push(card.clone());
        }
        let scripted = self
            .script
            .lock()
            .map_err(|e| DeliveryError::Transient(e.to_string()))?
            .pop_front();
        match scripted {
            Some(result) => result,
            None => {
                let mut next = self
                    .next_id
                    .lock()
                    .map_err(|e| DeliveryError::Transient(e.to_string()))?;
                *next += 1;
                Ok(*next)
            }
        }
    }
}

/// A [`FallbackSink`] that keeps written cards in memory.
pub struct MemoryFallback {
    script: Mutex<VecDeque<std::result::Result<(), DeliveryError>>>,
    written: Mutex<Vec<CardRecord>>,
}

impl MemoryFallback {
    pub fn new() -> Self {
        Self::scripted(Vec::new())
    }

    /// Replay `script` before accepting every further write.
    pub fn scripted(script: Vec<std::result::Result<(), DeliveryError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            written: Mutex::new(Vec::new()),
        }
    }

    /// A fallback whose writes keep failing `times` times.
    pub fn failing(times: usize) -> Self {
        Self::scripted(
            (0..times)
                .map(|_| Err(DeliveryError::Transient("disk full".to_string())))
                .collect(),
        )
    }

    pub fn written(&self) -> Vec<CardRecord> {
        self.written.lock().map(|w| w.clone()).unwrap_or_default()
    }
}

impl Default for MemoryFallback {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FallbackSink for MemoryFallback {
    async fn write_card(&self, card: &CardRecord) -> std::result::Result<String, DeliveryError> {
        let scripted = self
            .script
            .lock()
            .map_err(|e| DeliveryError::Transient(e.to_string()))?
            .pop_front();
        if let Some(Err(e)) = scripted {
            return Err(e);
        }
        let mut written = self
            .written
            .lock()
            .map_err(|e| DeliveryError::Transient(e.to_string()))?;
        written.push(card.clone());
        Ok(format!("memory://{}/{}", card.deck_path, written.len()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CardPayload, VerificationTier};

    fn card(front: &str) -> CardRecord {
        CardRecord::new(
            "wk09",
            "Anatomy::wk09",
            CardPayload {
                front: front.to_string(),
                back: "back".to_string(),
                tags: Vec::new(),
                fact_ids: Vec::new(),
                tier: VerificationTier::Verified,
            },
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_upsert_replaces_by_hash() {
        let store = InMemorySyncStore::new();
        let mut state = SyncState::pending(card("a"));
        store.upsert(&state).await.unwrap();
        state.transition(SyncStatus::DeliveredLive);
        store.upsert(&state).await.unwrap();

        let loaded = store.get(state.content_hash()).await.unwrap().unwrap();
        assert_eq!(loaded.status, SyncStatus::DeliveredLive);
        let counts = store.status_counts().await.unwrap();
        assert_eq!(counts.get(&SyncStatus::DeliveredLive), Some(&1));
        assert_eq!(counts.get(&SyncStatus::Pending), None);
    }

    #[tokio::test]
    async fn test_list_non_terminal() {
        let store = InMemorySyncStore::new();
        let pending = SyncState::pending(card("a"));
        let mut queued = SyncState::pending(card("b"));
        queued.transition(SyncStatus::QueuedRetry);
        let mut done = SyncState::pending(card("c"));
        done.transition(SyncStatus::DeliveredFile);
        for s in [&pending, &queued, &done] {
            store.upsert(s).await.unwrap();
        }

        let open = store.list_non_terminal().await.unwrap();
        assert_eq!(open.len(), 2);
        assert!(open.iter().all(|s| !s.status.is_terminal()));
    }

    #[tokio::test]
    async fn test_scripted_api_then_succeeds() {
        let api = ScriptedDeckApi::unavailable(1);
        assert!(api.create_note(&card("a")).await.is_err());
        assert!(api.create_note(&card("a")).await.is_ok());
        assert_eq!(api.received().len(), 2);
    }

    #[tokio::test]
    async fn test_memory_fallback_failing() {
        let sink = MemoryFallback::failing(1);
        assert!(sink.write_card(&card("a")).await.is_err());
        let location = sink.write_card(&card("a")).await.unwrap();
        assert!(location.starts_with("memory://Anatomy::wk09/"));
        assert_eq!(sink.written().len(), 1);
    }
}
