//! Output post-processing — the last tier between raw model output and
//! anything persisted or displayed.
//!
//! Ordering matters: citations are extracted from the raw text before
//! markers are stripped, and redaction/truncation runs after stripping so a
//! truncation can never land mid-marker.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

use crate::rag::context_builder::truncate_word_safe;
use crate::types::{CitationMarker, SourceKind};

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[#src:([^\s\]]+)(?:\s+score=([0-9]*\.?[0-9]+))?(?:\s+kind=(doc|overview|web))?\]")
        .expect("citation marker regex is valid")
});

/// "Fontes:"/"Sources:" trailer — everything from the marker to end of text.
/// Anchored to a line start so words like "resources:" in running prose
/// never match.
static SOURCES_TRAILER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?ims)^\s*(?:fontes|sources)\s*:.*$").expect("sources trailer regex is valid")
});

/// Leaked filename/reference artifacts the model sometimes echoes back.
static REFERENCE_ARTIFACT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\[(?:ref|file|doc(?:umento)?)\s*:[^\]]*\]|【[^】]*】")
        .expect("reference artifact regex is valid")
});

static SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:AIza[0-9A-Za-z_-]{10,}|sk-[0-9A-Za-z_-]{10,}|ghp_[0-9A-Za-z]{10,}|xoxb-[0-9A-Za-z-]{10,}|AKIA[0-9A-Z]{8,})\b",
    )
    .expect("secret regex is valid")
});

/// Lines that look like internal/system prompt echoes.
static SYSTEM_ECHO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?im)^\s*(?:system|internal|instru(?:ctions?|ções)|persona)\s*:.*$")
        .expect("system echo regex is valid")
});

static MULTI_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("multi space regex is valid"));
static MULTI_NEWLINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n{3,}").expect("multi newline regex is valid"));
static SPACE_BEFORE_PUNCT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r" +([,.;:!?])").expect("punct regex is valid"));

pub const REDACTION_PLACEHOLDER: &str = "[redacted]";
pub const TRUNCATION_SUFFIX: &str = "…";

/// Final display text is bounded independently of the model's token limit.
pub const MAX_DISPLAY_CHARS: usize = 4000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalizedResponse {
    pub display_text: String,
    pub citations: Vec<CitationMarker>,
}

/// Scan raw model output for `[#src:<key> score=<f> kind=<k>]` markers,
/// in document order. Does not mutate the input.
pub fn extract_citations(raw: &str) -> Vec<CitationMarker> {
    MARKER_RE
        .captures_iter(raw)
        .map(|cap| CitationMarker {
            key: cap[1].to_string(),
            score: cap.get(2).and_then(|m| m.as_str().parse::<f32>().ok()),
            kind: cap.get(3).and_then(|m| match m.as_str() {
                "doc" => Some(SourceKind::Doc),
                "overview" => Some(SourceKind::Overview),
                "web" => Some(SourceKind::Web),
                _ => None,
            }),
        })
        .collect()
}

/// Remove citation markers only — used on stored content before it is
/// re-labeled, so old markers cannot collide with fresh ones.
pub fn strip_inline_markers(text: &str) -> String {
    MARKER_RE.replace_all(text, "").into_owned()
}

/// Remove all control markers, any sources trailer, and leaked reference
/// artifacts; collapse the whitespace left behind.
pub fn strip_control_markers(raw: &str) -> String {
    let text = MARKER_RE.replace_all(raw, "");
    let text = SOURCES_TRAILER_RE.replace(&text, "");
    let text = REFERENCE_ARTIFACT_RE.replace_all(&text, "");

    let text = SPACE_BEFORE_PUNCT_RE.replace_all(&text, "$1");
    let text = MULTI_SPACE_RE.replace_all(&text, " ");
    let text = MULTI_NEWLINE_RE.replace_all(&text, "\n\n");
    text.trim().to_string()
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF   // pictographs, emoticons, symbols
        | 0x2600..=0x27BF   // misc symbols, dingbats
        | 0x2B00..=0x2BFF
        | 0xFE0E..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x1F1E6..=0x1F1FF // regional indicators
    )
}

/// Redact API-key-shaped substrings, drop internal/system echo lines, strip
/// emoji, then truncate word-safe. The final safety step before text is
/// persisted or displayed.
pub fn redact_secrets(text: &str, max_chars: usize) -> String {
    let text = SECRET_RE.replace_all(text, REDACTION_PLACEHOLDER);
    let text = SYSTEM_ECHO_RE.replace_all(&text, "");
    let text: String = text.chars().filter(|c| !is_emoji(*c)).collect();
    let text = text.trim().to_string();

    let (truncated, was_cut) = truncate_word_safe(&text, max_chars);
    if was_cut {
        format!("{}{}", truncated, TRUNCATION_SUFFIX)
    } else {
        truncated
    }
}

/// Full post-processing pass: extract citations from the raw text, then
/// strip markers, then redact and bound the display text.
pub fn finalize(raw: &str, max_chars: usize) -> FinalizedResponse {
    let citations = extract_citations(raw);
    let stripped = strip_control_markers(raw);
    let display_text = redact_secrets(&stripped, max_chars);
    FinalizedResponse {
        display_text,
        citations,
    }
}
