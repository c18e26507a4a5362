//! Two-pass slide → transcript alignment.
//!
//! Maps every slide window to at most one transcript window. The engine is
//! pure and never fails: missing, empty, or unmatched inputs degrade to
//! [`AlignmentConfidence::None`] entries, which callers treat as a valid
//! state rather than an error.
//!
//! # Algorithm
//!
//! 1. **Hard anchors.** Take the slide's title (see
//!    [`slide_title`](crate::window::slide_title)). Scan transcript windows
//!    in ascending order for a case-insensitive, whitespace-normalized
//!    literal occurrence of that title. The first hit is an [`AnchorMatch`].
//! 2. **Fuzzy.** For slides without an anchor, compute the TF-IDF cosine
//!    similarity of the slide text against every transcript window using a
//!    [`TfIdfContext`] built once for the document. The highest score wins;
//!    ties go to the lower transcript index. At or above
//!    `fuzzy_threshold` the pairing is a [`FuzzyMatch`], otherwise the
//!    slide stays unaligned.
//!
//! An anchor always takes precedence over any fuzzy score.

use tracing::{debug, warn};

use crate::models::{
    AlignmentConfidence, AlignmentEntry, AlignmentResult, AnchorMatch, FuzzyMatch, Window,
};
use crate::text::normalize_title;
use crate::tfidf::TfIdfContext;
use crate::window::slide_title;

/// Default minimum cosine similarity for a fuzzy match.
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.2;

/// Titles shorter than this never anchor (a one-letter title would match
/// almost any transcript window).
pub const DEFAULT_MIN_TITLE_CHARS: usize = 3;

/// Alignment tuning parameters, decoupled from application config.
#[derive(Debug, Clone)]
pub struct AlignParams {
    /// Minimum cosine similarity for pass 2 to accept a pairing.
    pub fuzzy_threshold: f64,
    /// Minimum normalized title length for pass 1.
    pub min_title_chars: usize,
}

impl Default for AlignParams {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            min_title_chars: DEFAULT_MIN_TITLE_CHARS,
        }
    }
}

/// Align slide windows to transcript windows.
///
/// Builds a fresh [`TfIdfContext`] from `transcripts` for this call.
pub fn align(slides: &[Window], transcripts: &[Window], params: &AlignParams) -> AlignmentResult {
    let ctx = TfIdfContext::new(transcripts);
    align_with_context(slides, transcripts, &ctx, params)
}

/// Align using a caller-provided context built from the same `transcripts`.
///
/// A context built from a different window set is discarded and rebuilt,
/// since its positions would not line up with `transcripts`.
pub fn align_with_context(
    slides: &[Window],
    transcripts: &[Window],
    ctx: &TfIdfContext,
    params: &AlignParams,
) -> AlignmentResult {
    if ctx.len() != transcripts.len() {
        warn!(
            context_windows = ctx.len(),
            transcript_windows = transcripts.len(),
            "TF-IDF context does not match transcript windows; rebuilding"
        );
        let rebuilt = TfIdfContext::new(transcripts);
        return align_with_context(slides, transcripts, &rebuilt, params);
    }

    let normalized: Vec<String> = transcripts
        .iter()
        .map(|w| normalize_title(&w.text))
        .collect();

    let mut result = AlignmentResult::default();

    for slide in slides {
        if let Some(anchor) = find_anchor(slide, transcripts, &normalized, params) {
            debug!(
                slide = slide.index,
                transcript = anchor.transcript_window_index,
                title = %anchor.matched_string,
                "anchor match"
            );
            result.entries.push(AlignmentEntry {
                slide_window_index: slide.index,
                transcript_window_index: Some(anchor.transcript_window_index),
                confidence: AlignmentConfidence::Anchor,
                score: 1.0,
            });
            result.anchors.push(anchor);
            continue;
        }

        let best = best_fuzzy(slide, transcripts, ctx);
        match best {
            Some((pos, score)) if score >= params.fuzzy_threshold => {
                let transcript_index = transcripts[pos].index;
                debug!(
                    slide = slide.index,
                    transcript = transcript_index,
                    score,
                    "fuzzy match"
                );
                result.entries.push(AlignmentEntry {
                    slide_window_index: slide.index,
                    transcript_window_index: Some(transcript_index),
                    confidence: AlignmentConfidence::Fuzzy,
                    score,
                });
                result.fuzzy.push(FuzzyMatch {
                    slide_window_index: slide.index,
                    transcript_window_index: transcript_index,
                    similarity_score: score,
                });
            }
            other => {
                let score = other.map(|(_, s)| s).unwrap_or(0.0);
                debug!(slide = slide.index, best_score = score, "slide unaligned");
                result.entries.push(AlignmentEntry {
                    slide_window_index: slide.index,
                    transcript_window_index: None,
                    confidence: AlignmentConfidence::None,
                    score,
                });
            }
        }
    }

    result
}

/// Pass 1: first transcript window (ascending) containing the slide title.
fn find_anchor(
    slide: &Window,
    transcripts: &[Window],
    normalized: &[String],
    params: &AlignParams,
) -> Option<AnchorMatch> {
    let title = slide_title(slide)?;
    if title.chars().count() < params.min_title_chars {
        return None;
    }
    transcripts
        .iter()
        .zip(normalized)
        .find(|(_, text)| text.contains(title.as_str()))
        .map(|(w, _)| AnchorMatch {
            slide_window_index: slide.index,
            transcript_window_index: w.index,
            matched_string: title.clone(),
        })
}

/// Pass 2: position and score of the most similar transcript window.
///
/// Returns `None` for a zero slide vector or an empty transcript. Ties keep
/// the earlier window because only a strictly greater score replaces the
/// current best.
fn best_fuzzy(slide: &Window, transcripts: &[Window], ctx: &TfIdfContext) -> Option<(usize, f64)> {
    if transcripts.is_empty() || ctx.vectorize(&slide.text).is_zero() {
        return None;
    }

    let mut best: Option<(usize, f64)> = None;
    for (pos, score) in ctx.similarities(&slide.text).into_iter().enumerate() {
        if best.map_or(true, |(_, best_score)| score > best_score) {
            best = Some((pos, score));
        }
    }
    best
}
