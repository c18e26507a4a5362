//! Ingestion pipeline orchestration.
//!
//! One run takes a module's slide text, transcript text, and extracted
//! facts through the whole pipeline:
//!
//! ```text
//! slides ──▶ slide windows ─┐
//!                           ├─▶ align ─▶ verify facts ─▶ build cards ─▶ sync
//! transcript ─▶ windows ────┘
//! ```
//!
//! Windowing through card building is pure and lives in
//! [`deckforge_core`]; this module reads the inputs, applies config, hands
//! the cards to the [`SyncEngine`], and gathers an [`IngestReport`].

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use deckforge_core::align::align;
use deckforge_core::card::card_from_fact;
use deckforge_core::models::{AlignmentConfidence, CardRecord, Fact, SourceKind, VerificationTier};
use deckforge_core::verify::{tier_counts, verify_facts};
use deckforge_core::window::{slide_windows, transcript_windows};

use crate::config::Config;
use crate::sync::{SyncEngine, SyncReport};

/// Inputs for one ingestion run.
#[derive(Debug, Clone)]
pub struct IngestRequest {
    pub slides: PathBuf,
    pub transcript: PathBuf,
    /// Facts extracted from the slides.
    pub facts: PathBuf,
    /// Facts extracted from the transcript, for dual-source runs.
    pub transcript_facts: Option<PathBuf>,
    pub module_id: String,
    pub deck_path: String,
}

/// Summary of one ingestion run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IngestReport {
    pub run_id: String,
    pub module_id: String,
    pub slide_windows: usize,
    pub transcript_windows: usize,
    pub anchors: usize,
    pub fuzzy: usize,
    pub unaligned: usize,
    pub tiers: BTreeMap<VerificationTier, usize>,
    pub cards_built: usize,
    /// Facts whose tier is excluded by policy or that had no usable entity tag.
    pub facts_without_card: usize,
    pub sync: SyncReport,
}

impl IngestReport {
    pub fn print(&self) {
        println!("ingest {} (run {})", self.module_id, self.run_id);
        println!(
            "  windows: {} slide, {} transcript",
            self.slide_windows, self.transcript_windows
        );
        println!(
            "  alignment: {} anchor, {} fuzzy, {} unaligned",
            self.anchors, self.fuzzy, self.unaligned
        );
        for (tier, count) in &self.tiers {
            println!("  {}: {}", tier, count);
        }
        println!(
            "  cards built: {} ({} facts without card)",
            self.cards_built, self.facts_without_card
        );
        println!(
            "  sync: {} live, {} file, {} queued, {} failed, {} duplicate",
            self.sync.delivered_live,
            self.sync.delivered_file,
            self.sync.queued_retry,
            self.sync.failed_permanent,
            self.sync.duplicates
        );
    }
}

/// Read a JSON array of [`Fact`] records.
pub fn load_facts(path: &Path) -> Result<Vec<Fact>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read facts file: {}", path.display()))?;
    let facts: Vec<Fact> = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse facts file: {}", path.display()))?;
    Ok(facts)
}

/// Run windowing, alignment, verification, and card building.
///
/// Returns the cards to deliver and a report with everything but the
/// sync counts filled in.
pub fn prepare_cards(
    config: &Config,
    slides_text: &str,
    transcript_text: &str,
    facts: &[Fact],
    module_id: &str,
    deck_path: &str,
) -> Result<(Vec<CardRecord>, IngestReport)> {
    if module_id.trim().is_empty() {
        bail!("module id must not be empty");
    }
    if deck_path.trim().is_empty() {
        bail!("deck path must not be empty");
    }

    let slides = slide_windows(slides_text);
    let transcripts = transcript_windows(
        transcript_text,
        config.windowing.transcript_window_tokens,
    );
    if slides.is_empty() {
        warn!(module = module_id, "no slide windows; every slide fact will be unverifiable");
    }
    if transcripts.is_empty() {
        warn!(module = module_id, "no transcript windows; nothing can be corroborated");
    }

    let alignment = align(&slides, &transcripts, &config.alignment.params());
    let verified = verify_facts(facts, &alignment, &slides, &transcripts);

    let policy = config.cards.policy();
    let cards: Vec<CardRecord> = verified
        .iter()
        .filter(|v| policy.admits(v.tier))
        .filter_map(|v| card_from_fact(v, module_id, deck_path))
        .collect();

    let report = IngestReport {
        run_id: String::new(),
        module_id: module_id.trim().to_string(),
        slide_windows: slides.len(),
        transcript_windows: transcripts.len(),
        anchors: alignment.count(AlignmentConfidence::Anchor),
        fuzzy: alignment.count(AlignmentConfidence::Fuzzy),
        unaligned: alignment.count(AlignmentConfidence::None),
        tiers: tier_counts(&verified),
        cards_built: cards.len(),
        facts_without_card: verified.len() - cards.len(),
        sync: SyncReport::default(),
    };

    Ok((cards, report))
}

/// Run the full pipeline for one module and deliver its cards.
pub async fn run_ingest(
    config: &Config,
    engine: &SyncEngine,
    request: &IngestRequest,
) -> Result<IngestReport> {
    let run_id = Uuid::new_v4().to_string();

    let slides_text = std::fs::read_to_string(&request.slides)
        .with_context(|| format!("Failed to read slides: {}", request.slides.display()))?;
    let transcript_text = std::fs::read_to_string(&request.transcript).with_context(|| {
        format!(
            "Failed to read transcript: {}",
            request.transcript.display()
        )
    })?;

    let mut facts = load_facts(&request.facts)?;
    if let Some(path) = &request.transcript_facts {
        facts.extend(load_facts(path)?.into_iter().map(|mut f| {
            f.origin = SourceKind::Transcript;
            f
        }));
    }

    info!(
        run_id = %run_id,
        module = %request.module_id,
        facts = facts.len(),
        "ingest started"
    );

    let (cards, mut report) = prepare_cards(
        config,
        &slides_text,
        &transcript_text,
        &facts,
        &request.module_id,
        &request.deck_path,
    )?;
    report.run_id = run_id;
    report.sync = engine.deliver_all(&cards).await?;

    info!(
        run_id = %report.run_id,
        module = %report.module_id,
        cards = report.cards_built,
        delivered = report.sync.delivered_live + report.sync.delivered_file,
        duplicates = report.sync.duplicates,
        "ingest finished"
    );

    Ok(report)
}
