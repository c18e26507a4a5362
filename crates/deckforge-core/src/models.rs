//! Core data models used throughout Deckforge.
//!
//! These types represent the windows, alignments, facts, cards, and sync
//! states that flow through the ingestion pipeline. Every record is an
//! explicit struct; nothing downstream works on loosely shaped maps.

use std::fmt;
use std::str::FromStr;

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Which source material a window or fact came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Slide,
    Transcript,
}

/// A contiguous span of slide or transcript text.
///
/// Offsets are byte offsets into the original source text, so
/// `&source[start_offset..end_offset] == text` for every window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub source_kind: SourceKind,
    pub index: usize,
    pub text: String,
    pub start_offset: usize,
    pub end_offset: usize,
}

impl Window {
    pub fn new(
        source_kind: SourceKind,
        index: usize,
        text: impl Into<String>,
        start_offset: usize,
        end_offset: usize,
    ) -> Result<Self> {
        let text = text.into();
        if end_offset < start_offset {
            bail!(
                "window {} has end_offset {} before start_offset {}",
                index,
                end_offset,
                start_offset
            );
        }
        if end_offset - start_offset != text.len() {
            bail!(
                "window {} spans {} bytes but carries {} bytes of text",
                index,
                end_offset - start_offset,
                text.len()
            );
        }
        Ok(Self {
            source_kind,
            index,
            text,
            start_offset,
            end_offset,
        })
    }
}

/// Exact match between a slide title and a transcript substring (pass 1).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchorMatch {
    pub slide_window_index: usize,
    pub transcript_window_index: usize,
    pub matched_string: String,
}

/// Similarity-scored pairing of a slide and transcript window (pass 2).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuzzyMatch {
    pub slide_window_index: usize,
    pub transcript_window_index: usize,
    pub similarity_score: f64,
}

/// How a slide window ended up aligned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlignmentConfidence {
    Anchor,
    Fuzzy,
    None,
}

/// Alignment of one slide window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlignmentEntry {
    pub slide_window_index: usize,
    pub transcript_window_index: Option<usize>,
    pub confidence: AlignmentConfidence,
    /// `1.0` for anchors, the cosine similarity for fuzzy matches, and the
    /// best cosine seen (possibly `0.0`) for unaligned slides.
    pub score: f64,
}

impl AlignmentEntry {
    pub fn is_aligned(&self) -> bool {
        self.transcript_window_index.is_some()
    }
}

/// The mapping from every slide window to at most one transcript window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentResult {
    pub entries: Vec<AlignmentEntry>,
    pub anchors: Vec<AnchorMatch>,
    pub fuzzy: Vec<FuzzyMatch>,
}

impl AlignmentResult {
    pub fn entry(&self, slide_window_index: usize) -> Option<&AlignmentEntry> {
        self.entries
            .iter()
            .find(|e| e.slide_window_index == slide_window_index)
    }

    /// The transcript window aligned to a slide, if any.
    pub fn transcript_for(&self, slide_window_index: usize) -> Option<usize> {
        self.entry(slide_window_index)
            .and_then(|e| e.transcript_window_index)
    }

    /// All slide windows aligned to the given transcript window, ascending.
    pub fn slides_for(&self, transcript_window_index: usize) -> Vec<usize> {
        self.entries
            .iter()
            .filter(|e| e.transcript_window_index == Some(transcript_window_index))
            .map(|e| e.slide_window_index)
            .collect()
    }

    pub fn count(&self, confidence: AlignmentConfidence) -> usize {
        self.entries
            .iter()
            .filter(|e| e.confidence == confidence)
            .count()
    }
}

/// An atomic extracted claim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fact {
    pub id: String,
    pub text: String,
    pub source_window_index: usize,
    #[serde(default)]
    pub entity_tags: Vec<String>,
    /// Which side the extractor ran on. Slide facts index slide windows;
    /// transcript facts index transcript windows.
    #[serde(default)]
    pub origin: SourceKind,
}

/// Confidence level assigned to a fact by cross-source corroboration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationTier {
    Verified,
    SlideOnly,
    TranscriptOnly,
    Unverifiable,
}

impl VerificationTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationTier::Verified => "verified",
            VerificationTier::SlideOnly => "slide_only",
            VerificationTier::TranscriptOnly => "transcript_only",
            VerificationTier::Unverifiable => "unverifiable",
        }
    }
}

impl fmt::Display for VerificationTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for VerificationTier {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "verified" => Ok(VerificationTier::Verified),
            "slide_only" => Ok(VerificationTier::SlideOnly),
            "transcript_only" => Ok(VerificationTier::TranscriptOnly),
            "unverifiable" => Ok(VerificationTier::Unverifiable),
            other => bail!(
                "Unknown verification tier: '{}'. Must be verified, slide_only, transcript_only, or unverifiable.",
                other
            ),
        }
    }
}

/// A fact with its assigned tier and the transcript span it was checked against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedFact {
    pub fact: Fact,
    pub tier: VerificationTier,
    pub transcript_window_index: Option<usize>,
}

/// Front/back content of a card plus the tags sent to the deck store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardPayload {
    pub front: String,
    pub back: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub fact_ids: Vec<String>,
    pub tier: VerificationTier,
}

/// A card bound to its owning module and target deck.
///
/// Built through [`CardRecord::new`](crate::card), which computes
/// `content_hash` from the normalized `(module_id, front, back)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub content_hash: String,
    pub module_id: String,
    pub deck_path: String,
    pub payload: CardPayload,
}

/// Delivery status of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Pending,
    DeliveredLive,
    DeliveredFile,
    QueuedRetry,
    FailedPermanent,
}

impl SyncStatus {
    pub const ALL: [SyncStatus; 5] = [
        SyncStatus::Pending,
        SyncStatus::DeliveredLive,
        SyncStatus::DeliveredFile,
        SyncStatus::QueuedRetry,
        SyncStatus::FailedPermanent,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "pending",
            SyncStatus::DeliveredLive => "delivered_live",
            SyncStatus::DeliveredFile => "delivered_file",
            SyncStatus::QueuedRetry => "queued_retry",
            SyncStatus::FailedPermanent => "failed_permanent",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncStatus::DeliveredLive | SyncStatus::DeliveredFile | SyncStatus::FailedPermanent
        )
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        SyncStatus::ALL
            .iter()
            .copied()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| anyhow::anyhow!("Unknown sync status: '{}'", s))
    }
}

/// Delivery bookkeeping for one card, persisted after every attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncState {
    pub card: CardRecord,
    pub attempt_count: u32,
    pub last_error: Option<String>,
    pub status: SyncStatus,
    /// Note id returned by the live deck API.
    pub note_id: Option<i64>,
    /// Where the file fallback wrote the card.
    pub file_location: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    pub fn pending(card: CardRecord) -> Self {
        let now = Utc::now();
        Self {
            card,
            attempt_count: 0,
            last_error: None,
            status: SyncStatus::Pending,
            note_id: None,
            file_location: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn content_hash(&self) -> &str {
        &self.card.content_hash
    }

    /// Move to `status`, bumping `updated_at`.
    pub fn transition(&mut self, status: SyncStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }
}
