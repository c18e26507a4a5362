//! # Deckforge Core
//!
//! Shared, I/O-free logic for Deckforge: data models, slide/transcript
//! windowing, the two-pass alignment engine, fact verification, card
//! records with content hashing, and the delivery/persistence traits the
//! card sync engine is written against.
//!
//! This crate contains no tokio, sqlx, HTTP, or filesystem code. The
//! application crate supplies the concrete deck API client, file fallback,
//! and SQLite retry queue.

pub mod align;
pub mod card;
pub mod error;
pub mod models;
pub mod store;
pub mod text;
pub mod tfidf;
pub mod verify;
pub mod window;
