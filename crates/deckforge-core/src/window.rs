//! Slide and transcript windowing.
//!
//! Converts raw slide and transcript text into ordered [`Window`]s that the
//! alignment engine compares against each other.
//!
//! # Slides
//!
//! 1. Scan line by line for boundary markers: Markdown headings (`# …`),
//!    slide labels (`Slide 12`, `Slide 12: Title`), horizontal rules
//!    (`---`), and form feeds emitted by PDF/PPTX text extraction.
//! 2. Headings and slide labels open a new block and stay part of it;
//!    rules and form feeds are pure separators and are dropped.
//! 3. Without any marker, blank lines delimit blocks instead, each block
//!    beginning with its title line.
//! 4. Blocks are trimmed; empty blocks are skipped. Text without any
//!    boundary therefore becomes a single window.
//!
//! # Transcripts
//!
//! A rolling, non-overlapping window of `window_tokens` whitespace tokens.
//! Each window's text is the exact source slice from its first token to
//! its last, so offsets always reconstruct the span.
//!
//! # Example
//!
//! ```rust
//! use deckforge_core::window::{slide_title, slide_windows, transcript_windows};
//!
//! let slides = slide_windows("# Muscles of the Thigh\nQuadriceps\n\n# The Knee\nMenisci");
//! assert_eq!(slides.len(), 2);
//! assert_eq!(slide_title(&slides[0]).as_deref(), Some("muscles of the thigh"));
//!
//! let transcript = transcript_windows("one two three four five", 2);
//! assert_eq!(transcript.len(), 3);
//! assert_eq!(transcript[2].text, "five");
//! ```

use crate::models::{SourceKind, Window};
use crate::text::normalize_title;

/// Default transcript window size in tokens.
pub const DEFAULT_WINDOW_TOKENS: usize = 150;

/// Split slide text into one window per heading/marker block.
pub fn slide_windows(text: &str) -> Vec<Window> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut cuts = marker_cuts(text);
    if cuts.is_empty() {
        cuts = blank_line_cuts(text);
    }

    let mut windows = Vec::new();
    let mut seg_start = 0;
    for (seg_end, next_start) in cuts {
        push_trimmed(&mut windows, text, seg_start, seg_end);
        seg_start = next_start;
    }
    push_trimmed(&mut windows, text, seg_start, text.len());
    windows
}

/// Split transcript text into rolling windows of `window_tokens` tokens.
///
/// A `window_tokens` of zero is treated as one.
pub fn transcript_windows(text: &str, window_tokens: usize) -> Vec<Window> {
    let window_tokens = window_tokens.max(1);
    token_spans(text)
        .chunks(window_tokens)
        .enumerate()
        .map(|(index, span)| {
            let start = span[0].0;
            let end = span[span.len() - 1].1;
            make_window(SourceKind::Transcript, index, text, start, end)
        })
        .collect()
}

/// The normalized title of a slide window.
///
/// Takes the first non-empty line, strips heading syntax (`#`) and slide
/// labels (`Slide 4:`), and falls through to the next line when the label
/// stood alone. Returns `None` when nothing is left.
pub fn slide_title(window: &Window) -> Option<String> {
    let mut lines = window.text.lines().map(str::trim).filter(|l| !l.is_empty());
    let first = lines.next()?;

    let stripped = strip_heading(first);
    let candidate = match strip_slide_label(stripped) {
        Some("") => lines.next().map(strip_heading).unwrap_or(""),
        Some(rest) => rest,
        None => stripped,
    };

    let title = normalize_title(candidate);
    if title.is_empty() {
        None
    } else {
        Some(title)
    }
}

/// Boundaries from explicit markers as `(segment_end, next_segment_start)`.
fn marker_cuts(text: &str) -> Vec<(usize, usize)> {
    let mut cuts = Vec::new();
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        let body = line.trim_end_matches(|c: char| c == '\n' || c == '\r');
        let next = pos + line.len();

        if body.contains('\x0c') {
            for (i, _) in body.match_indices('\x0c') {
                cuts.push((pos + i, pos + i + 1));
            }
        } else if is_rule(body) {
            cuts.push((pos, next));
        } else if is_heading(body) || strip_slide_label(body.trim_start()).is_some() {
            cuts.push((pos, pos));
        }

        pos = next;
    }
    cuts
}

fn blank_line_cuts(text: &str) -> Vec<(usize, usize)> {
    let mut cuts = Vec::new();
    let mut pos = 0;
    for line in text.split_inclusive('\n') {
        let next = pos + line.len();
        if line.trim().is_empty() {
            cuts.push((pos, next));
        }
        pos = next;
    }
    cuts
}

fn is_heading(line: &str) -> bool {
    let t = line.trim_start();
    if !t.starts_with('#') {
        return false;
    }
    let rest = t.trim_start_matches('#');
    rest.is_empty() || rest.starts_with(char::is_whitespace)
}

fn is_rule(line: &str) -> bool {
    let t = line.trim();
    t.len() >= 3 && t.chars().all(|c| c == '-')
}

fn strip_heading(line: &str) -> &str {
    if is_heading(line) {
        line.trim_start().trim_start_matches('#').trim()
    } else {
        line
    }
}

/// If `line` starts with a slide label (`Slide 7`, `slide 7:`, `SLIDE 7 -`),
/// return what follows the label.
fn strip_slide_label(line: &str) -> Option<&str> {
    let prefix = line.get(..5)?;
    if !prefix.eq_ignore_ascii_case("slide") {
        return None;
    }
    let rest = line[5..].trim_start();
    if !rest.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    let rest = rest.trim_start_matches(|c: char| c.is_ascii_digit());
    Some(rest.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '.' | ')')))
}

fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut spans = Vec::new();
    let mut start = None;
    for (i, c) in text.char_indices() {
        if c.is_whitespace() {
            if let Some(s) = start.take() {
                spans.push((s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        spans.push((s, text.len()));
    }
    spans
}

/// Trim `text[start..end]` and push it as the next slide window if non-empty.
fn push_trimmed(windows: &mut Vec<Window>, text: &str, start: usize, end: usize) {
    let segment = &text[start..end];
    let leading = segment.len() - segment.trim_start().len();
    let trimmed = segment.trim();
    if trimmed.is_empty() {
        return;
    }
    let s = start + leading;
    let index = windows.len();
    windows.push(make_window(SourceKind::Slide, index, text, s, s + trimmed.len()));
}

fn make_window(kind: SourceKind, index: usize, source: &str, start: usize, end: usize) -> Window {
    Window {
        source_kind: kind,
        index,
        text: source[start..end].to_string(),
        start_offset: start,
        end_offset: end,
    }
}
