//! Card records, content hashing, and payload validation.
//!
//! A card's `content_hash` is the SHA-256 of the trimmed `module_id` and
//! the normalized front and back. Because the module id is part of the
//! hash, deduplication on `content_hash` is automatically scoped per
//! module: the same front/back may live in two modules, but not twice in
//! one. Module ids compare exactly, so `WK09` and `wk09` are two modules.

use anyhow::{bail, Result};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::DeliveryError;
use crate::models::{CardPayload, CardRecord, VerificationTier, VerifiedFact};
use crate::text::{collapse_whitespace, normalize_title};

/// Maximum bytes accepted in a single card field.
pub const MAX_FIELD_BYTES: usize = 8 * 1024;

/// Separator between hashed fields (ASCII unit separator).
const FIELD_SEPARATOR: u8 = 0x1f;

/// Cloze placeholder shown on the card front.
pub const CLOZE_BLANK: &str = "[...]";

/// Compute the deduplication hash of a card.
pub fn content_hash(module_id: &str, front: &str, back: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(module_id.trim().as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize_title(front).as_bytes());
    hasher.update([FIELD_SEPARATOR]);
    hasher.update(normalize_title(back).as_bytes());
    format!("{:x}", hasher.finalize())
}

impl CardRecord {
    /// Build a card for `module_id`/`deck_path`, computing its content hash.
    ///
    /// # Errors
    ///
    /// Returns an error if `module_id` or `deck_path` is blank.
    pub fn new(module_id: &str, deck_path: &str, payload: CardPayload) -> Result<Self> {
        let module_id = module_id.trim();
        let deck_path = deck_path.trim();
        if module_id.is_empty() {
            bail!("card module_id must not be empty");
        }
        if deck_path.is_empty() {
            bail!("card deck_path must not be empty");
        }
        Ok(Self {
            content_hash: content_hash(module_id, &payload.front, &payload.back),
            module_id: module_id.to_string(),
            deck_path: deck_path.to_string(),
            payload,
        })
    }

    /// Check the payload is deliverable. Failures are permanent.
    pub fn validate(&self) -> std::result::Result<(), DeliveryError> {
        self.payload.validate()
    }
}

impl CardPayload {
    pub fn validate(&self) -> std::result::Result<(), DeliveryError> {
        let front = collapse_whitespace(&self.front);
        let back = collapse_whitespace(&self.back);
        if front.is_empty() {
            return Err(DeliveryError::PermanentValidation(
                "card front is empty".to_string(),
            ));
        }
        if back.is_empty() {
            return Err(DeliveryError::PermanentValidation(
                "card back is empty".to_string(),
            ));
        }
        if front.eq_ignore_ascii_case(&back) {
            return Err(DeliveryError::PermanentValidation(
                "card front and back are identical".to_string(),
            ));
        }
        for (name, field) in [("front", &self.front), ("back", &self.back)] {
            if field.len() > MAX_FIELD_BYTES {
                return Err(DeliveryError::PermanentValidation(format!(
                    "card {} is {} bytes (max {})",
                    name,
                    field.len(),
                    MAX_FIELD_BYTES
                )));
            }
        }
        Ok(())
    }
}

/// Which tiers are turned into cards.
#[derive(Debug, Clone)]
pub struct CardPolicy {
    pub tiers: Vec<VerificationTier>,
}

impl Default for CardPolicy {
    fn default() -> Self {
        Self {
            tiers: vec![
                VerificationTier::Verified,
                VerificationTier::SlideOnly,
                VerificationTier::TranscriptOnly,
            ],
        }
    }
}

impl CardPolicy {
    pub fn admits(&self, tier: VerificationTier) -> bool {
        self.tiers.contains(&tier)
    }
}

/// Build a cloze card from a verified fact.
///
/// The first entity tag that occurs in the fact text (case-insensitive) is
/// blanked on the front and becomes the back. Returns `None` when no tag
/// occurs in the text, or the card could not be built.
pub fn card_from_fact(verified: &VerifiedFact, module_id: &str, deck_path: &str) -> Option<CardRecord> {
    let fact = &verified.fact;
    let text = collapse_whitespace(&fact.text);

    let (start, end) = fact.entity_tags.iter().find_map(|tag| {
        let tag = collapse_whitespace(tag);
        if tag.is_empty() {
            return None;
        }
        find_case_insensitive(&text, &tag)
    })?;

    let front = format!("{}{}{}", &text[..start], CLOZE_BLANK, &text[end..]);
    let back = text[start..end].to_string();

    let mut tags = vec![
        format!("tier::{}", verified.tier),
        format!("module::{}", module_id.trim()),
    ];
    for entity in &fact.entity_tags {
        let entity = collapse_whitespace(entity).replace(' ', "_");
        if !entity.is_empty() && !tags.contains(&entity) {
            tags.push(entity);
        }
    }

    let payload = CardPayload {
        front,
        back,
        tags,
        fact_ids: vec![fact.id.clone()],
        tier: verified.tier,
    };

    match CardRecord::new(module_id, deck_path, payload) {
        Ok(card) => Some(card),
        Err(e) => {
            debug!(fact_id = %fact.id, error = %e, "fact not turned into a card");
            None
        }
    }
}

/// Byte range of the first case-insensitive occurrence of `needle`,
/// respecting word boundaries.
fn find_case_insensitive(haystack: &str, needle: &str) -> Option<(usize, usize)> {
    let needle_chars = needle.chars().count();
    let needle = needle.to_lowercase();
    haystack
        .char_indices()
        .filter(|(i, _)| is_word_start(haystack, *i))
        .find_map(|(i, _)| {
            let candidate: String = haystack[i..].chars().take(needle_chars).collect();
            let end = i + candidate.len();
            if candidate.to_lowercase() == needle && is_word_end(haystack, end) {
                Some((i, end))
            } else {
                None
            }
        })
}

fn is_word_start(s: &str, i: usize) -> bool {
    s[..i].chars().next_back().map_or(true, |c| !c.is_alphanumeric())
}

fn is_word_end(s: &str, i: usize) -> bool {
    s[i..].chars().next().map_or(true, |c| !c.is_alphanumeric())
}
