//! Fact verification by cross-source corroboration.
//!
//! Assigns each [`Fact`] a [`VerificationTier`] from the alignment and the
//! window texts. Verification is a pure function of its inputs: running it
//! again on the same facts, alignment, and windows yields the same tiers.
//!
//! # Slide facts
//!
//! | Condition | Tier |
//! |-----------|------|
//! | Slide window missing (stale fact) or slide unaligned | `Unverifiable` |
//! | Fact text found in the aligned transcript window | `Verified` |
//! | Otherwise | `SlideOnly` |
//!
//! # Transcript facts (dual-source runs)
//!
//! | Condition | Tier |
//! |-----------|------|
//! | Transcript window missing, or no slide aligned to it | `Unverifiable` |
//! | Fact text found in any slide aligned to that window | `Verified` |
//! | Otherwise | `TranscriptOnly` |
//!
//! Matching is boolean presence after loose normalization (see
//! [`contains_near`]); multiple occurrences count once.

use std::collections::BTreeMap;

use tracing::warn;

use crate::models::{AlignmentResult, Fact, SourceKind, VerificationTier, VerifiedFact, Window};
use crate::text::contains_near;

/// Verify a single fact.
pub fn verify_fact(
    fact: &Fact,
    alignment: &AlignmentResult,
    slides: &[Window],
    transcripts: &[Window],
) -> VerifiedFact {
    let (tier, transcript_window_index) = match fact.origin {
        SourceKind::Slide => verify_slide_fact(fact, alignment, slides, transcripts),
        SourceKind::Transcript => verify_transcript_fact(fact, alignment, slides, transcripts),
    };
    VerifiedFact {
        fact: fact.clone(),
        tier,
        transcript_window_index,
    }
}

/// Verify every fact, preserving input order.
pub fn verify_facts(
    facts: &[Fact],
    alignment: &AlignmentResult,
    slides: &[Window],
    transcripts: &[Window],
) -> Vec<VerifiedFact> {
    facts
        .iter()
        .map(|f| verify_fact(f, alignment, slides, transcripts))
        .collect()
}

/// Count verified facts per tier.
pub fn tier_counts(verified: &[VerifiedFact]) -> BTreeMap<VerificationTier, usize> {
    let mut counts = BTreeMap::new();
    for v in verified {
        *counts.entry(v.tier).or_insert(0) += 1;
    }
    counts
}

fn verify_slide_fact(
    fact: &Fact,
    alignment: &AlignmentResult,
    slides: &[Window],
    transcripts: &[Window],
) -> (VerificationTier, Option<usize>) {
    if find_window(slides, fact.source_window_index).is_none()
        || alignment.entry(fact.source_window_index).is_none()
    {
        warn!(
            fact_id = %fact.id,
            slide_window = fact.source_window_index,
            "fact references a slide window absent from this run; marking unverifiable"
        );
        return (VerificationTier::Unverifiable, None);
    }

    let Some(transcript_index) = alignment.transcript_for(fact.source_window_index) else {
        return (VerificationTier::Unverifiable, None);
    };

    let Some(transcript) = find_window(transcripts, transcript_index) else {
        warn!(
            fact_id = %fact.id,
            transcript_window = transcript_index,
            "alignment points at a missing transcript window; marking unverifiable"
        );
        return (VerificationTier::Unverifiable, None);
    };

    if contains_near(&transcript.text, &fact.text) {
        (VerificationTier::Verified, Some(transcript_index))
    } else {
        (VerificationTier::SlideOnly, Some(transcript_index))
    }
}

fn verify_transcript_fact(
    fact: &Fact,
    alignment: &AlignmentResult,
    slides: &[Window],
    transcripts: &[Window],
) -> (VerificationTier, Option<usize>) {
    if find_window(transcripts, fact.source_window_index).is_none() {
        warn!(
            fact_id = %fact.id,
            transcript_window = fact.source_window_index,
            "fact references a transcript window absent from this run; marking unverifiable"
        );
        return (VerificationTier::Unverifiable, None);
    }

    let aligned_slides = alignment.slides_for(fact.source_window_index);
    if aligned_slides.is_empty() {
        return (VerificationTier::Unverifiable, None);
    }

    let on_slide = aligned_slides
        .iter()
        .filter_map(|&i| find_window(slides, i))
        .any(|slide| contains_near(&slide.text, &fact.text));

    let tier = if on_slide {
        VerificationTier::Verified
    } else {
        VerificationTier::TranscriptOnly
    };
    (tier, Some(fact.source_window_index))
}

fn find_window(windows: &[Window], index: usize) -> Option<&Window> {
    windows
        .get(index)
        .filter(|w| w.index == index)
        .or_else(|| windows.iter().find(|w| w.index == index))
}
