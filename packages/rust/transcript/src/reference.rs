//! Topic-reference parsing: turn what a user pastes into a video id.

use regex::Regex;
use socialflow_shared::{Result, SocialFlowError, TopicId};
use std::sync::LazyLock;
use url::Url;

/// Video ids are URL-safe base64-ish tokens.
static VIDEO_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{6,64}$").expect("video id regex"));

/// Path prefixes that carry the id as the next segment.
const ID_PATH_PREFIXES: &[&str] = &["shorts", "embed", "live", "v"];

/// Extract the topic id from a watch URL (`?v=`), a `youtu.be/<id>` short link,
/// an `/embed/<id>`-style path, or a bare id.
pub fn parse_topic_ref(reference: &str) -> Result<TopicId> {
    let reference = reference.trim();
    if reference.is_empty() {
        return Err(SocialFlowError::validation("topic reference is required"));
    }

    let candidate = match parse_url(reference) {
        Some(url) => id_from_url(&url).ok_or_else(|| {
            SocialFlowError::validation(format!("no video id found in {reference}"))
        })?,
        None => reference.to_string(),
    };

    if !VIDEO_ID_RE.is_match(&candidate) {
        return Err(SocialFlowError::validation(format!(
            "'{candidate}' is not a valid video id"
        )));
    }
    TopicId::new(candidate)
}

/// Accept URLs with or without a scheme; bare ids are not URLs.
fn parse_url(reference: &str) -> Option<Url> {
    if let Ok(url) = Url::parse(reference) {
        if matches!(url.scheme(), "http" | "https") {
            return Some(url);
        }
        return None;
    }
    if reference.contains('/') || reference.contains('?') {
        return Url::parse(&format!("https://{reference}")).ok();
    }
    None
}

fn id_from_url(url: &Url) -> Option<String> {
    if let Some((_, v)) = url.query_pairs().find(|(key, _)| key == "v") {
        return Some(v.into_owned());
    }

    let mut segments = url.path_segments()?.filter(|s| !s.is_empty());
    let host = url.host_str().unwrap_or_default();
    if host.ends_with("youtu.be") {
        return segments.next().map(str::to_string);
    }

    let first = segments.next()?;
    if ID_PATH_PREFIXES.contains(&first) {
        return segments.next().map(str::to_string);
    }
    None
}
