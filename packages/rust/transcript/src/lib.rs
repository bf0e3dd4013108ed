//! Transcript acquisition for SocialFlow.
//!
//! Transcripts come from an external caption provider as ordered, timed text
//! segments. This crate provides:
//! - [`parse_topic_ref`] — extract a video id from whatever the user pasted
//! - [`TranscriptProvider`] — the provider seam, with the HTTP [`TimedTextProvider`]
//! - [`flatten_segments`] — segments → one text blob, order preserved

mod parser;
mod reference;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use socialflow_shared::{Result, SocialFlowError, TopicId, TranscriptConfig, TranscriptSegment};
use tracing::{debug, info, instrument};

pub use parser::parse_timed_text;
pub use reference::parse_topic_ref;

/// Maximum number of redirects to follow when fetching captions.
const MAX_REDIRECTS: usize = 3;

/// Default timeout in seconds for fetching captions.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

/// Maximum response size we consider valid (5 MB).
const MAX_RESPONSE_SIZE: u64 = 5 * 1024 * 1024;

/// User-Agent string for caption requests.
const USER_AGENT: &str = concat!("SocialFlow/", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Provider seam
// ---------------------------------------------------------------------------

/// Source of timed transcript segments for a topic.
#[async_trait]
pub trait TranscriptProvider: Send + Sync {
    /// Fetch the ordered segments for `topic`. An empty transcript is a failure.
    async fn fetch(&self, topic: &TopicId) -> Result<Vec<TranscriptSegment>>;
}

/// Join segment texts with a single space, preserving order.
pub fn flatten_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|s| s.text.trim())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

// ---------------------------------------------------------------------------
// Timed-text HTTP provider
// ---------------------------------------------------------------------------

/// Configuration for the timed-text provider.
#[derive(Debug, Clone)]
pub struct TimedTextOptions {
    /// Origin serving `/api/timedtext`.
    pub base_url: String,
    /// Caption language code.
    pub language: String,
    /// Timeout for HTTP requests in seconds.
    pub timeout_secs: u64,
}

impl Default for TimedTextOptions {
    fn default() -> Self {
        Self::from(&TranscriptConfig::default())
    }
}

impl From<&TranscriptConfig> for TimedTextOptions {
    fn from(config: &TranscriptConfig) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            language: config.language.clone(),
            timeout_secs: if config.timeout_secs == 0 {
                DEFAULT_TIMEOUT_SECS
            } else {
                config.timeout_secs
            },
        }
    }
}

/// Fetches captions from a timed-text endpoint.
pub struct TimedTextProvider {
    client: Client,
    options: TimedTextOptions,
}

impl TimedTextProvider {
    pub fn new(options: TimedTextOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(options.timeout_secs))
            .build()
            .map_err(|e| {
                SocialFlowError::transcript(format!("failed to build HTTP client: {e}"))
            })?;
        Ok(Self { client, options })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/timedtext", self.options.base_url)
    }
}

#[async_trait]
impl TranscriptProvider for TimedTextProvider {
    #[instrument(skip_all, fields(topic = %topic))]
    async fn fetch(&self, topic: &TopicId) -> Result<Vec<TranscriptSegment>> {
        let url = self.endpoint();
        debug!(%url, lang = %self.options.language, "fetching transcript");

        let mut response = self
            .client
            .get(&url)
            .query(&[("lang", self.options.language.as_str()), ("v", topic.as_str())])
            .send()
            .await
            .map_err(|e| SocialFlowError::transcript(format!("{topic}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SocialFlowError::transcript(format!("{topic}: HTTP {status}")));
        }

        if let Some(len) = response.content_length() {
            if len > MAX_RESPONSE_SIZE {
                return Err(SocialFlowError::transcript(format!(
                    "{topic}: response too large ({len} bytes, max {MAX_RESPONSE_SIZE})"
                )));
            }
        }

        // Content-Length is absent on chunked responses, so the cap is also
        // enforced on the bytes actually read.
        let mut raw = Vec::new();
        while let Some(chunk) = response.chunk().await.map_err(|e| {
            SocialFlowError::transcript(format!("{topic}: failed to read body: {e}"))
        })? {
            push_capped(&mut raw, &chunk, MAX_RESPONSE_SIZE).map_err(|len| {
                SocialFlowError::transcript(format!(
                    "{topic}: response too large (over {len} bytes, max {MAX_RESPONSE_SIZE})"
                ))
            })?;
        }
        let body = String::from_utf8(raw).map_err(|_| {
            SocialFlowError::transcript(format!("{topic}: transcript is not valid UTF-8"))
        })?;

        // An empty 200 means the video has no captions in this language.
        if body.trim().is_empty() {
            return Err(SocialFlowError::transcript(format!(
                "no transcript available for {topic}"
            )));
        }

        let segments = parse_timed_text(&body)?;
        if segments.is_empty() {
            return Err(SocialFlowError::transcript(format!(
                "transcript for {topic} contains no text"
            )));
        }

        info!(segments = segments.len(), "transcript fetched");
        Ok(segments)
    }
}

/// Append `chunk` to `body` unless that would exceed `max` bytes; the
/// would-be length is returned on overflow.
fn push_capped(body: &mut Vec<u8>, chunk: &[u8], max: u64) -> std::result::Result<(), u64> {
    let len = (body.len() + chunk.len()) as u64;
    if len > max {
        return Err(len);
    }
    body.extend_from_slice(chunk);
    Ok(())
}
