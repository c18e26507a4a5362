//! Per-document TF-IDF context and sparse cosine similarity.
//!
//! A [`TfIdfContext`] is built once per ingestion run from the full set of
//! transcript windows and passed explicitly into the alignment engine.
//! There is no process-wide vocabulary cache, so concurrently processed
//! documents cannot contaminate each other's IDF weights.
//!
//! # Weighting
//!
//! - Vocabulary: every term of every transcript window, ids assigned in
//!   lexicographic order.
//! - `idf(t) = ln((1 + N) / (1 + df(t))) + 1` (smoothed, always positive).
//! - `weight(t) = count(t) × idf(t)`, then L2-normalized.
//! - Terms outside the transcript vocabulary contribute zero.
//!
//! Vectors are sparse and sorted by term id, which keeps every dot product
//! summed in the same order and therefore bit-for-bit reproducible.

use std::collections::{BTreeMap, BTreeSet};

use crate::models::Window;
use crate::text::tokenize;

/// An L2-normalized sparse vector sorted by term id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SparseVector {
    entries: Vec<(usize, f64)>,
}

impl SparseVector {
    pub fn is_zero(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[(usize, f64)] {
        &self.entries
    }

    fn from_weights(weights: BTreeMap<usize, f64>) -> Self {
        let norm = weights.values().map(|w| w * w).sum::<f64>().sqrt();
        if norm < f64::EPSILON {
            return Self::default();
        }
        Self {
            entries: weights.into_iter().map(|(id, w)| (id, w / norm)).collect(),
        }
    }
}

/// Vocabulary and IDF weights for one document's transcript windows.
#[derive(Debug, Clone)]
pub struct TfIdfContext {
    vocab: BTreeMap<String, usize>,
    idf: Vec<f64>,
    doc_vectors: Vec<SparseVector>,
}

impl TfIdfContext {
    /// Build the context from the transcript windows of one document.
    pub fn new(windows: &[Window]) -> Self {
        let tokenized: Vec<Vec<String>> = windows.iter().map(|w| tokenize(&w.text)).collect();

        let terms: BTreeSet<&str> = tokenized
            .iter()
            .flat_map(|tokens| tokens.iter().map(String::as_str))
            .collect();
        let vocab: BTreeMap<String, usize> = terms
            .into_iter()
            .enumerate()
            .map(|(id, t)| (t.to_string(), id))
            .collect();

        let mut df = vec![0usize; vocab.len()];
        for tokens in &tokenized {
            let distinct: BTreeSet<usize> = tokens.iter().filter_map(|t| vocab.get(t).copied()).collect();
            for id in distinct {
                df[id] += 1;
            }
        }

        let n = windows.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| ((1.0 + n) / (1.0 + d as f64)).ln() + 1.0)
            .collect();

        let mut ctx = Self {
            vocab,
            idf,
            doc_vectors: Vec::new(),
        };
        let doc_vectors: Vec<SparseVector> = tokenized.iter().map(|tokens| ctx.weigh(tokens)).collect();
        ctx.doc_vectors = doc_vectors;
        ctx
    }

    /// Number of transcript windows in the context.
    pub fn len(&self) -> usize {
        self.doc_vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_vectors.is_empty()
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocab.len()
    }

    pub fn document_vector(&self, index: usize) -> Option<&SparseVector> {
        self.doc_vectors.get(index)
    }

    /// Vectorize arbitrary text (e.g. a slide window) against this vocabulary.
    pub fn vectorize(&self, text: &str) -> SparseVector {
        self.weigh(&tokenize(text))
    }

    /// Cosine similarity of `text` against every transcript window, in
    /// window order.
    pub fn similarities(&self, text: &str) -> Vec<f64> {
        let query = self.vectorize(text);
        self.doc_vectors
            .iter()
            .map(|doc| cosine_similarity(&query, doc))
            .collect()
    }

    fn weigh(&self, tokens: &[String]) -> SparseVector {
        let mut weights: BTreeMap<usize, f64> = BTreeMap::new();
        for token in tokens {
            if let Some(&id) = self.vocab.get(token) {
                *weights.entry(id).or_insert(0.0) += self.idf[id];
            }
        }
        SparseVector::from_weights(weights)
    }
}

/// Cosine similarity of two L2-normalized sparse vectors.
///
/// Returns `0.0` if either vector is zero. The result is clamped to
/// `[0.0, 1.0]` to absorb rounding on identical vectors.
pub fn cosine_similarity(a: &SparseVector, b: &SparseVector) -> f64 {
    if a.is_zero() || b.is_zero() {
        return 0.0;
    }

    let (mut i, mut j) = (0, 0);
    let mut dot = 0.0f64;
    while i < a.entries.len() && j < b.entries.len() {
        let (ta, wa) = a.entries[i];
        let (tb, wb) = b.entries[j];
        match ta.cmp(&tb) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                dot += wa * wb;
                i += 1;
                j += 1;
            }
        }
    }

    dot.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::transcript_windows;

    fn windows(texts: &[&str]) -> Vec<Window> {
        let joined = texts.join(" ");
        let per = texts[0].split_whitespace().count();
        transcript_windows(&joined, per)
    }

    #[test]
    fn test_empty_context() {
        let ctx = TfIdfContext::new(&[]);
        assert!(ctx.is_empty());
        assert_eq!(ctx.vocabulary_size(), 0);
        assert!(ctx.vectorize("anything").is_zero());
        assert!(ctx.similarities("anything").is_empty());
    }

    #[test]
    fn test_identical_text_scores_one() {
        let ctx = TfIdfContext::new(&windows(&["femur tibia", "heart lung"]));
        let sims = ctx.similarities("femur tibia");
        assert!((sims[0] - 1.0).abs() < 1e-9);
        assert!(sims[1].abs() < 1e-9);
    }

    #[test]
    fn test_out_of_vocabulary_is_zero_vector() {
        let ctx = TfIdfContext::new(&windows(&["femur tibia"]));
        assert!(ctx.vectorize("zebra giraffe").is_zero());
        assert!(ctx.vectorize("").is_zero());
    }

    #[test]
    fn test_vectors_are_normalized() {
        let ctx = TfIdfContext::new(&windows(&["alpha beta beta", "beta gamma delta"]));
        for i in 0..ctx.len() {
            let v = ctx.document_vector(i).unwrap();
            let norm: f64 = v.entries().iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
            assert!((norm - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_rare_terms_weigh_more() {
        let ctx = TfIdfContext::new(&windows(&["the femur", "the heart", "the lung"]));
        let v = ctx.vectorize("the femur");
        let weight_of = |term: &str| {
            let id = ctx.vocab[term];
            v.entries().iter().find(|(t, _)| *t == id).unwrap().1
        };
        let the_w = weight_of("the");
        let femur_w = weight_of("femur");
        assert!(femur_w > the_w);
    }

    #[test]
    fn test_cosine_bounds() {
        let ctx = TfIdfContext::new(&windows(&["a b c", "c d e", "e f g"]));
        for s in ctx.similarities("a c e g") {
            assert!((0.0..=1.0).contains(&s));
        }
    }

    #[test]
    fn test_deterministic() {
        let w = windows(&["muscles of thigh", "knee joint menisci"]);
        let a = TfIdfContext::new(&w).similarities("thigh muscles knee");
        let b = TfIdfContext::new(&w).similarities("thigh muscles knee");
        assert_eq!(a, b);
    }
}
