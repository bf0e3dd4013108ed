//! Timed-text caption parser.
//!
//! The provider answers with a small XML document:
//! - Root: `<transcript>`
//! - One `<text start="…" dur="…">caption</text>` element per segment
//! - Caption text is entity-encoded, often twice (`&amp;#39;`)

use regex::Regex;
use socialflow_shared::{Result, SocialFlowError, TranscriptSegment};
use std::sync::LazyLock;

// ---------------------------------------------------------------------------
// Regex patterns (compiled once)
// ---------------------------------------------------------------------------

/// Matches one `<text …>…</text>` element, capturing attributes and body.
static TEXT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<text\b([^>]*)>(.*?)</text>").expect("text element regex")
});

/// Matches `name="value"` attribute pairs.
static ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_:][\w:.-]*)\s*=\s*"([^"]*)""#).expect("attribute regex")
});

/// Matches decimal and hex numeric character references.
static NUMERIC_ENTITY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"&#(x[0-9A-Fa-f]+|[0-9]+);").expect("numeric entity regex")
});

/// Matches any embedded markup inside a caption (e.g. `<font color=…>`).
static TAG_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]+>").expect("tag regex"));

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

/// Parse a timed-text document into ordered segments.
///
/// Segments whose caption is empty after decoding are dropped. A document with
/// no `<transcript>` root is rejected.
pub fn parse_timed_text(body: &str) -> Result<Vec<TranscriptSegment>> {
    if !body.contains("<transcript") {
        return Err(SocialFlowError::transcript(
            "response is not a timed-text transcript document",
        ));
    }

    let mut segments = Vec::new();
    for caps in TEXT_RE.captures_iter(body) {
        let attrs = &caps[1];
        let text = clean_caption(&caps[2]);
        if text.is_empty() {
            continue;
        }

        let mut start_secs = 0.0;
        let mut duration_secs = 0.0;
        for attr in ATTR_RE.captures_iter(attrs) {
            match &attr[1] {
                "start" => start_secs = attr[2].parse().unwrap_or(0.0),
                "dur" => duration_secs = attr[2].parse().unwrap_or(0.0),
                _ => {}
            }
        }

        segments.push(TranscriptSegment {
            text,
            start_secs,
            duration_secs,
        });
    }

    Ok(segments)
}

/// Decode entities (two passes for double-encoded captions), drop inner tags,
/// and collapse whitespace.
fn clean_caption(raw: &str) -> String {
    let once = decode_entities(raw);
    let twice = decode_entities(&once);
    let untagged = TAG_RE.replace_all(&twice, " ");
    untagged.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn decode_entities(s: &str) -> String {
    let numeric = NUMERIC_ENTITY_RE.replace_all(s, |caps: &regex::Captures<'_>| {
        let code = &caps[1];
        let value = match code.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => code.parse::<u32>().ok(),
        };
        value
            .and_then(char::from_u32)
            .map(String::from)
            .unwrap_or_else(|| caps[0].to_string())
    });

    // &amp; last so that "&amp;lt;" decodes to "&lt;" in this pass.
    numeric
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&nbsp;", " ")
        .replace("&amp;", "&")
}
