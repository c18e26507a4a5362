//! HTTP client for an AnkiConnect-compatible deck store.
//!
//! Each call makes exactly one request; retrying is the sync engine's job.
//!
//! # Request
//!
//! ```json
//! {"action": "addNote", "version": 6,
//!  "params": {"note": {"deckName": "...", "modelName": "Basic",
//!                      "fields": {"Front": "...", "Back": "..."},
//!                      "tags": ["tier::verified", "module::wk09"]}}}
//! ```
//!
//! # Error classification
//!
//! | Outcome | Result |
//! |---------|--------|
//! | `{"result": <id>, "error": null}` | `Ok(id)` |
//! | Timeout or connection error | `Transient` |
//! | HTTP 429 or 5xx | `Transient` |
//! | HTTP 4xx (not 429) | `PermanentValidation` |
//! | `error` string naming a rejected note (see [`REJECTION_MARKERS`]) | `PermanentValidation` |
//! | Any other `error` string in a 2xx body | `Transient` |
//! | Unparseable 2xx body | `Transient` |
//!
//! AnkiConnect answers HTTP 200 even when it refuses a note, so the
//! `error` string is the only signal that resending will not help.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use deckforge_core::error::DeliveryError;
use deckforge_core::models::CardRecord;
use deckforge_core::store::DeckApi;

use crate::config::DeckConfig;

/// AnkiConnect protocol version sent with every request.
const API_VERSION: u32 = 6;

/// Lowercased fragments of AnkiConnect errors that reject the note itself.
/// Anything else (e.g. "collection is not available") is worth retrying.
pub const REJECTION_MARKERS: &[&str] = &[
    "cannot create note",
    "duplicate",
    "model was not found",
    "deck was not found",
    "first field is empty",
    "note is empty",
    "was not found in model",
];

pub struct HttpDeckApi {
    client: reqwest::Client,
    url: String,
    model_name: String,
}

impl HttpDeckApi {
    pub fn new(config: &DeckConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            client,
            url: config.api_url.clone(),
            model_name: config.model_name.clone(),
        })
    }

    fn add_note_body(&self, card: &CardRecord) -> Value {
        json!({
            "action": "addNote",
            "version": API_VERSION,
            "params": {
                "note": {
                    "deckName": card.deck_path,
                    "modelName": self.model_name,
                    "fields": {
                        "Front": card.payload.front,
                        "Back": card.payload.back,
                    },
                    "tags": card.payload.tags,
                }
            }
        })
    }
}

#[async_trait]
impl DeckApi for HttpDeckApi {
    async fn create_note(&self, card: &CardRecord) -> std::result::Result<i64, DeliveryError> {
        let body = self.add_note_body(card);

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| DeliveryError::Transient(format!("deck API unreachable: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Transient(format!(
                "deck API error {}: {}",
                status, text
            )));
        }
        if status.is_client_error() {
            let text = response.text().await.unwrap_or_default();
            return Err(DeliveryError::PermanentValidation(format!(
                "deck API rejected card {}: {}",
                status, text
            )));
        }

        let json: Value = response
            .json()
            .await
            .map_err(|e| DeliveryError::Transient(format!("invalid deck API response: {}", e)))?;
        let note_id = parse_add_note_response(&json)?;
        debug!(hash = %card.content_hash, note_id, "note created");
        Ok(note_id)
    }
}

/// Extract the note id from an `addNote` response body.
fn parse_add_note_response(json: &Value) -> std::result::Result<i64, DeliveryError> {
    if let Some(error) = json.get("error").and_then(Value::as_str) {
        return Err(classify_api_error(error));
    }
    json.get("result")
        .and_then(Value::as_i64)
        .ok_or_else(|| DeliveryError::Transient("deck API response missing result".to_string()))
}

fn classify_api_error(error: &str) -> DeliveryError {
    let lowered = error.to_lowercase();
    if REJECTION_MARKERS.iter().any(|m| lowered.contains(m)) {
        DeliveryError::PermanentValidation(format!("deck API rejected note: {}", error))
    } else {
        DeliveryError::Transient(format!("deck API error: {}", error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_success() {
        let json = json!({"result": 1496198395707i64, "error": null});
        assert_eq!(parse_add_note_response(&json).unwrap(), 1496198395707);
    }

    #[test]
    fn test_parse_api_error_is_transient() {
        let json = json!({"result": null, "error": "collection is not available"});
        assert!(matches!(
            parse_add_note_response(&json),
            Err(DeliveryError::Transient(_))
        ));
    }

    #[test]
    fn test_parse_note_rejections_are_permanent() {
        for error in [
            "cannot create note because it is a duplicate",
            "model was not found: Basic",
            "deck was not found: Anatomy::wk09",
            "cannot create note because it is empty",
        ] {
            let json = json!({"result": null, "error": error});
            assert!(
                matches!(
                    parse_add_note_response(&json),
                    Err(DeliveryError::PermanentValidation(_))
                ),
                "expected permanent rejection for {}",
                error
            );
        }
    }

    #[test]
    fn test_parse_missing_result() {
        assert!(parse_add_note_response(&json!({})).is_err());
    }
}
