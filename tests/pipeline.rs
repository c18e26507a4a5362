//! End-to-end runs against a mock AnkiConnect server and a real SQLite queue.

use std::fs;
use std::path::PathBuf;

use tempfile::TempDir;

use deckforge::deck_api::HttpDeckApi;
use deckforge::ingest::{run_ingest, IngestRequest};
use deckforge::sync::{SyncEngine, SyncOutcome};
use deckforge_core::error::DeliveryError;
use deckforge_core::models::{CardPayload, CardRecord, SyncStatus, VerificationTier};
use deckforge_core::store::DeckApi;

mod common;
use common::{start_mock_deck, test_config, Mode};

const SLIDES: &str = "\
# Muscles of the Thigh
Quadriceps femoris has four heads
Sartorius is the longest muscle in the body

# Zygomatic Arch
Temporal process meets zygomatic process
";

const TRANSCRIPT: &str = "Good morning everyone. Today we discuss the muscles of the thigh \
in some detail. The quadriceps femoris has four heads, and together they extend the knee. \
Next week we will look at the skull.";

const FACTS: &str = r#"[
  {"id": "f1", "text": "Quadriceps femoris has four heads", "source_window_index": 0,
   "entity_tags": ["quadriceps femoris"]},
  {"id": "f2", "text": "Sartorius is the longest muscle in the body", "source_window_index": 0,
   "entity_tags": ["sartorius"]},
  {"id": "f3", "text": "Temporal process meets zygomatic process", "source_window_index": 1,
   "entity_tags": ["zygomatic"]}
]"#;

const TRANSCRIPT_FACTS: &str = r#"[
  {"id": "t1", "text": "together they extend the knee", "source_window_index": 0,
   "entity_tags": ["knee"]}
]"#;

fn write_inputs(tmp: &TempDir) -> IngestRequest {
    let dir = tmp.path().join("wk09");
    fs::create_dir_all(&dir).unwrap();
    let path = |name: &str, content: &str| -> PathBuf {
        let p = dir.join(name);
        fs::write(&p, content).unwrap();
        p
    };
    IngestRequest {
        slides: path("slides.txt", SLIDES),
        transcript: path("lecture.txt", TRANSCRIPT),
        facts: path("facts.json", FACTS),
        transcript_facts: Some(path("transcript_facts.json", TRANSCRIPT_FACTS)),
        module_id: "wk09".to_string(),
        deck_path: "Anatomy::wk09".to_string(),
    }
}

#[tokio::test]
async fn test_muscles_of_the_thigh_delivered_once() {
    let tmp = TempDir::new().unwrap();
    let mock = start_mock_deck(Mode::Accept).await;
    let cfg = test_config(&tmp, &mock.url);
    let request = write_inputs(&tmp);
    let engine = SyncEngine::open(&cfg).await.unwrap();

    let report = run_ingest(&cfg, &engine, &request).await.unwrap();
    assert_eq!(report.slide_windows, 2);
    assert_eq!(report.anchors, 1);
    assert_eq!(report.unaligned, 1);
    assert_eq!(report.tiers[&VerificationTier::Verified], 1);
    assert_eq!(report.tiers[&VerificationTier::SlideOnly], 1);
    assert_eq!(report.tiers[&VerificationTier::TranscriptOnly], 1);
    assert_eq!(report.tiers[&VerificationTier::Unverifiable], 1);
    assert_eq!(report.cards_built, 3);
    assert_eq!(report.sync.delivered_live, 3);

    let notes = mock.notes();
    assert_eq!(notes.len(), 3);
    let quad = notes
        .iter()
        .find(|n| n["fields"]["Back"] == "Quadriceps femoris")
        .unwrap();
    assert_eq!(quad["deckName"], "Anatomy::wk09");
    assert_eq!(quad["modelName"], "Basic");
    assert_eq!(quad["fields"]["Front"], "[...] has four heads");
    let tags: Vec<&str> = quad["tags"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t.as_str().unwrap())
        .collect();
    assert!(tags.contains(&"tier::verified"));
    assert!(tags.contains(&"module::wk09"));

    // Same module again: every card is a duplicate, nothing new is sent.
    let again = run_ingest(&cfg, &engine, &request).await.unwrap();
    assert_eq!(again.sync.duplicates, 3);
    assert_eq!(again.sync.delivered_live, 0);
    assert_eq!(mock.notes().len(), 3);

    let counts = engine.store().status_counts().await.unwrap();
    assert_eq!(counts.get(&SyncStatus::DeliveredLive), Some(&3));
}

#[tokio::test]
async fn test_same_material_in_another_module_is_not_a_duplicate() {
    let tmp = TempDir::new().unwrap();
    let mock = start_mock_deck(Mode::Accept).await;
    let cfg = test_config(&tmp, &mock.url);
    let mut request = write_inputs(&tmp);
    let engine = SyncEngine::open(&cfg).await.unwrap();

    run_ingest(&cfg, &engine, &request).await.unwrap();
    request.module_id = "wk10".to_string();
    request.deck_path = "Anatomy::wk10".to_string();
    let report = run_ingest(&cfg, &engine, &request).await.unwrap();
    assert_eq!(report.sync.duplicates, 0);
    assert_eq!(report.sync.delivered_live, 3);
    assert_eq!(mock.notes().len(), 6);
}

#[tokio::test]
async fn test_deck_store_down_uses_fallback_files() {
    let tmp = TempDir::new().unwrap();
    let cfg = test_config(&tmp, &common::dead_url());
    let request = write_inputs(&tmp);
    let engine = SyncEngine::open(&cfg).await.unwrap();

    let report = run_ingest(&cfg, &engine, &request).await.unwrap();
    assert_eq!(report.sync.delivered_file, 3);

    let file = cfg.deck.fallback_dir.join("Anatomy__wk09.jsonl");
    let content = fs::read_to_string(&file).unwrap();
    assert_eq!(content.lines().count(), 3);

    let counts = engine.store().status_counts().await.unwrap();
    assert_eq!(counts.get(&SyncStatus::DeliveredFile), Some(&3));
}

#[tokio::test]
async fn test_rerun_from_fresh_engine_sees_persisted_hashes() {
    let tmp = TempDir::new().unwrap();
    let mock = start_mock_deck(Mode::Accept).await;
    let cfg = test_config(&tmp, &mock.url);
    let request = write_inputs(&tmp);

    {
        let engine = SyncEngine::open(&cfg).await.unwrap();
        run_ingest(&cfg, &engine, &request).await.unwrap();
    }
    let engine = SyncEngine::open(&cfg).await.unwrap();
    let report = run_ingest(&cfg, &engine, &request).await.unwrap();
    assert_eq!(report.sync.duplicates, 3);
    assert_eq!(mock.notes().len(), 3);
}

fn sample_card() -> CardRecord {
    CardRecord::new(
        "wk09",
        "Anatomy::wk09",
        CardPayload {
            front: "[...] has four heads".to_string(),
            back: "Quadriceps femoris".to_string(),
            tags: vec!["tier::verified".to_string()],
            fact_ids: vec!["f1".to_string()],
            tier: VerificationTier::Verified,
        },
    )
    .unwrap()
}

#[tokio::test]
async fn test_http_error_classification() {
    let tmp = TempDir::new().unwrap();
    let mock = start_mock_deck(Mode::Accept).await;
    let cfg = test_config(&tmp, &mock.url);
    let api = HttpDeckApi::new(&cfg.deck).unwrap();
    let card = sample_card();

    assert!(api.create_note(&card).await.unwrap() > 0);

    mock.set_mode(Mode::ServerError);
    assert!(matches!(
        api.create_note(&card).await,
        Err(DeliveryError::Transient(_))
    ));

    mock.set_mode(Mode::ApiError);
    assert!(matches!(
        api.create_note(&card).await,
        Err(DeliveryError::Transient(_))
    ));

    mock.set_mode(Mode::Rejected);
    assert!(matches!(
        api.create_note(&card).await,
        Err(DeliveryError::PermanentValidation(_))
    ));

    mock.set_mode(Mode::BadRequest);
    assert!(matches!(
        api.create_note(&card).await,
        Err(DeliveryError::PermanentValidation(_))
    ));

    let dead = test_config(&tmp, &common::dead_url());
    let api = HttpDeckApi::new(&dead.deck).unwrap();
    assert!(matches!(
        api.create_note(&card).await,
        Err(DeliveryError::Transient(_))
    ));
}

#[tokio::test]
async fn test_rejected_note_fails_permanently_without_fallback() {
    let tmp = TempDir::new().unwrap();
    let mock = start_mock_deck(Mode::Rejected).await;
    let cfg = test_config(&tmp, &mock.url);
    let engine = SyncEngine::open(&cfg).await.unwrap();
    let card = sample_card();

    let outcome = engine.deliver(&card).await.unwrap();
    match outcome {
        SyncOutcome::FailedPermanent { error } => assert!(error.contains("duplicate"), "{}", error),
        other => panic!("expected FailedPermanent, got {:?}", other),
    }
    assert!(!cfg.deck.fallback_dir.join("Anatomy__wk09.jsonl").exists());

    let state = engine.store().get(&card.content_hash).await.unwrap().unwrap();
    assert_eq!(state.status, SyncStatus::FailedPermanent);
    assert_eq!(state.attempt_count, 1);
    assert_eq!(engine.retry_pending().await.unwrap().total(), 0);
}
