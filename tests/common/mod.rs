//! Shared fixtures: temp configs and a mock AnkiConnect server.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use serde_json::{json, Value};
use tempfile::TempDir;

use deckforge::config::Config;

/// How the mock deck store answers `addNote`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Mode {
    Accept,
    ServerError,
    BadRequest,
    ApiError,
    /// HTTP 200 with an error string refusing the note itself.
    Rejected,
}

#[derive(Clone)]
pub struct MockDeck {
    inner: Arc<Mutex<MockState>>,
    pub url: String,
}

struct MockState {
    mode: Mode,
    next_id: i64,
    notes: Vec<Value>,
}

impl MockDeck {
    pub fn set_mode(&self, mode: Mode) {
        self.inner.lock().unwrap().mode = mode;
    }

    /// Every `params.note` object the server accepted.
    pub fn notes(&self) -> Vec<Value> {
        self.inner.lock().unwrap().notes.clone()
    }
}

async fn add_note(State(mock): State<MockDeck>, Json(body): Json<Value>) -> (StatusCode, Json<Value>) {
    let mut state = mock.inner.lock().unwrap();
    match state.mode {
        Mode::ServerError => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"result": null, "error": "busy"})),
        ),
        Mode::BadRequest => (
            StatusCode::BAD_REQUEST,
            Json(json!({"result": null, "error": "bad note"})),
        ),
        Mode::ApiError => (
            StatusCode::OK,
            Json(json!({"result": null, "error": "collection is not available"})),
        ),
        Mode::Rejected => (
            StatusCode::OK,
            Json(json!({"result": null, "error": "cannot create note because it is a duplicate"})),
        ),
        Mode::Accept => {
            assert_eq!(body["action"], "addNote");
            assert_eq!(body["version"], 6);
            state.next_id += 1;
            let id = state.next_id;
            state.notes.push(body["params"]["note"].clone());
            (StatusCode::OK, Json(json!({"result": id, "error": null})))
        }
    }
}

/// Start a mock AnkiConnect server on an ephemeral port.
pub async fn start_mock_deck(mode: Mode) -> MockDeck {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let mock = MockDeck {
        inner: Arc::new(Mutex::new(MockState {
            mode,
            next_id: 1_700_000_000_000,
            notes: Vec::new(),
        })),
        url: format!("http://{}", addr),
    };
    let app = Router::new()
        .route("/", post(add_note))
        .with_state(mock.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    mock
}

/// A URL nothing listens on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}", port)
}

pub fn test_config(tmp: &TempDir, api_url: &str) -> Config {
    let root = tmp.path();
    let content = format!(
        r#"[db]
path = "{root}/data/deckforge.sqlite"

[windowing]
transcript_window_tokens = 150

[deck]
api_url = "{api_url}"
timeout_secs = 2
fallback_dir = "{root}/data/fallback"

[sync]
max_attempts = 3
lock_timeout_secs = 5
stale_lock_secs = 300
"#,
        root = root.display(),
        api_url = api_url,
    );
    toml::from_str(&content).unwrap()
}
