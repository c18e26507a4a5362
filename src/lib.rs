//! # Deckforge
//!
//! Turns lecture material into verified flashcards.
//!
//! Deckforge aligns a module's slides with its lecture transcript, grades
//! each extracted fact by whether both sources corroborate it, builds cloze
//! cards for the tiers the config admits, and syncs those cards to a deck
//! store with deduplication and a file fallback.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐   ┌────────────┐   ┌────────────┐   ┌──────────────┐
//! │  Windowing │──▶│  Alignment │──▶│Verification│──▶│ Card builder │
//! └────────────┘   └────────────┘   └────────────┘   └──────┬───────┘
//!                                                           │
//!                  ┌──────────┐      ┌──────────┐           │
//!                  │ Deck API │◀─────│   Sync   │◀──────────┘
//!                  │  (HTTP)  │      │  engine  │─────▶ SQLite queue
//!                  └──────────┘      └────┬─────┘
//!                                         │ transient failure
//!                                         ▼
//!                                    JSONL fallback
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |
//! | [`queue`] | SQLite sync-state store |
//! | [`deck_api`] | AnkiConnect-compatible HTTP client |
//! | [`fallback`] | JSONL file fallback |
//! | [`lock`] | Deck-store lock |
//! | [`sync`] | Delivery cascade, dedup, recovery, retry |
//! | [`ingest`] | Pipeline orchestration |
//!
//! The pure pipeline stages are re-exported from `deckforge-core`.

pub mod config;
pub mod db;
pub mod deck_api;
pub mod fallback;
pub mod ingest;
pub mod lock;
pub mod migrate;
pub mod queue;
pub mod sync;

pub use deckforge_core::{align, card, error, models, store, text, tfidf, verify, window};
