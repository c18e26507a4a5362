//! JSONL file fallback for cards the live deck store could not take.
//!
//! Appends one JSON object per line to `<fallback_dir>/<deck>.jsonl`, where
//! `<deck>` is the deck path with every character outside `[A-Za-z0-9_-]`
//! replaced by `_` (so `Anatomy::wk09` becomes `Anatomy__wk09.jsonl`).
//! The files can be imported into the deck store by hand once it is back.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Utc;
use serde::Serialize;
use tokio::io::AsyncWriteExt;

use deckforge_core::error::DeliveryError;
use deckforge_core::models::{CardRecord, VerificationTier};
use deckforge_core::store::FallbackSink;

/// One line of a fallback file.
#[derive(Debug, Serialize)]
struct FallbackRecord<'a> {
    content_hash: &'a str,
    module_id: &'a str,
    deck_path: &'a str,
    front: &'a str,
    back: &'a str,
    tags: &'a [String],
    fact_ids: &'a [String],
    tier: VerificationTier,
    written_at: String,
}

pub struct JsonlFallback {
    dir: PathBuf,
}

impl JsonlFallback {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File that cards for `deck_path` are appended to.
    pub fn file_for(&self, deck_path: &str) -> PathBuf {
        self.dir.join(format!("{}.jsonl", sanitize_deck(deck_path)))
    }
}

fn sanitize_deck(deck_path: &str) -> String {
    let name: String = deck_path
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if name.is_empty() {
        "deck".to_string()
    } else {
        name
    }
}

fn transient(context: &str, path: &Path, e: impl std::fmt::Display) -> DeliveryError {
    DeliveryError::Transient(format!("{} {}: {}", context, path.display(), e))
}

#[async_trait]
impl FallbackSink for JsonlFallback {
    async fn write_card(&self, card: &CardRecord) -> std::result::Result<String, DeliveryError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| transient("cannot create fallback dir", &self.dir, e))?;

        let path = self.file_for(&card.deck_path);
        let record = FallbackRecord {
            content_hash: &card.content_hash,
            module_id: &card.module_id,
            deck_path: &card.deck_path,
            front: &card.payload.front,
            back: &card.payload.back,
            tags: &card.payload.tags,
            fact_ids: &card.payload.fact_ids,
            tier: card.payload.tier,
            written_at: Utc::now().to_rfc3339(),
        };
        let mut line = serde_json::to_string(&record)
            .map_err(|e| DeliveryError::PermanentValidation(format!("unserializable card: {}", e)))?;
        line.push('\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|e| transient("cannot open fallback file", &path, e))?;
        file.write_all(line.as_bytes())
            .await
            .map_err(|e| transient("cannot write fallback file", &path, e))?;
        file.flush()
            .await
            .map_err(|e| transient("cannot flush fallback file", &path, e))?;

        Ok(path.display().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deckforge_core::models::CardPayload;
    use tempfile::TempDir;

    fn card(front: &str) -> CardRecord {
        CardRecord::new(
            "wk09",
            "Anatomy::wk09",
            CardPayload {
                front: front.to_string(),
                back: "quadriceps".to_string(),
                tags: vec!["tier::verified".to_string()],
                fact_ids: vec!["f1".to_string()],
                tier: VerificationTier::Verified,
            },
        )
        .unwrap()
    }

    #[test]
    fn test_sanitize_deck() {
        assert_eq!(sanitize_deck("Anatomy::wk09"), "Anatomy__wk09");
        assert_eq!(sanitize_deck("../etc/passwd"), "___etc_passwd");
        assert_eq!(sanitize_deck("  "), "deck");
    }

    #[tokio::test]
    async fn test_appends_one_line_per_card() {
        let tmp = TempDir::new().unwrap();
        let sink = JsonlFallback::new(tmp.path().join("fallback"));

        let first = sink.write_card(&card("[...] has four heads")).await.unwrap();
        let second = sink.write_card(&card("[...] extends the knee")).await.unwrap();
        assert_eq!(first, second);
        assert!(first.ends_with("Anatomy__wk09.jsonl"));

        let content = std::fs::read_to_string(&first).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        let parsed: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(parsed["front"], "[...] extends the knee");
        assert_eq!(parsed["tier"], "verified");
        assert_eq!(parsed["module_id"], "wk09");
    }

    #[tokio::test]
    async fn test_unwritable_dir_is_transient() {
        let tmp = TempDir::new().unwrap();
        let blocker = tmp.path().join("not-a-dir");
        std::fs::write(&blocker, "x").unwrap();
        let sink = JsonlFallback::new(blocker.join("fallback"));
        let err = sink.write_card(&card("front")).await.unwrap_err();
        assert!(err.is_transient());
    }
}
