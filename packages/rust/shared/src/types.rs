//! Core domain types for SocialFlow conversations, generation requests, and
//! published articles.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::{Result, SocialFlowError};

// ---------------------------------------------------------------------------
// TopicId
// ---------------------------------------------------------------------------

/// Key of a conversation log, e.g. a video identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TopicId(String);

impl TopicId {
    /// Build a topic id, rejecting empty or whitespace-only input.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        let trimmed = id.trim();
        if trimmed.is_empty() {
            return Err(SocialFlowError::validation("topic id is required"));
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TopicId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for TopicId {
    type Err = SocialFlowError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::new(s)
    }
}

// ---------------------------------------------------------------------------
// Messages
// ---------------------------------------------------------------------------

/// A UUID v7 wrapper for message identifiers (time-sortable).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub Uuid);

impl MessageId {
    /// Generate a new time-sortable message identifier.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for MessageId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// UI-facing author of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }

    /// Parse the stored representation.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Self::User),
            "assistant" => Some(Self::Assistant),
            _ => None,
        }
    }
}

/// One entry of a conversation log. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn new(sender: Sender, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::new(),
            content: content.into(),
            sender,
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Sender::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Sender::Assistant, content)
    }
}

/// Caller-supplied conversation turn in the UI vocabulary.
///
/// Both fields are optional so that incomplete entries deserialize and can be
/// rejected by the prompt assembler with a precise error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(default)]
    pub role: Option<Sender>,
    #[serde(default)]
    pub content: Option<String>,
}

impl HistoryEntry {
    pub fn new(role: Sender, content: impl Into<String>) -> Self {
        Self {
            role: Some(role),
            content: Some(content.into()),
        }
    }
}

impl From<&Message> for HistoryEntry {
    fn from(message: &Message) -> Self {
        Self::new(message.sender, message.content.clone())
    }
}

/// Where conversational continuity lives for `discuss`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HistoryMode {
    /// The server appends every turn to the conversation store.
    #[default]
    Persisted,
    /// The caller passes the rolling history on every call; no storage I/O.
    ClientHeld,
}

// ---------------------------------------------------------------------------
// Content types
// ---------------------------------------------------------------------------

/// Kind of video content being summarized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    #[default]
    General,
    Programming,
    Podcast,
}

impl ContentType {
    /// Lenient parse: unknown or missing tags fall back to [`ContentType::General`].
    pub fn from_tag(tag: Option<&str>) -> Self {
        match tag.map(|t| t.trim().to_ascii_lowercase()).as_deref() {
            Some("programming") => Self::Programming,
            Some("podcast") => Self::Podcast,
            _ => Self::General,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::General => "general",
            Self::Programming => "programming",
            Self::Podcast => "podcast",
        }
    }
}

// ---------------------------------------------------------------------------
// Generation requests
// ---------------------------------------------------------------------------

/// Role vocabulary of the generation backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendRole {
    User,
    Model,
}

impl BackendRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

/// A history turn already normalized to the backend vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: BackendRole,
    pub content: String,
}

/// Per-call output limits, applied verbatim by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GenerationLimits {
    pub max_output_units: u32,
    pub temperature: f32,
}

impl GenerationLimits {
    pub fn new(max_output_units: u32, temperature: f32) -> Result<Self> {
        let limits = Self {
            max_output_units,
            temperature,
        };
        limits.validate()?;
        Ok(limits)
    }

    /// Reject out-of-range values instead of clamping them.
    pub fn validate(&self) -> Result<()> {
        if self.max_output_units == 0 {
            return Err(SocialFlowError::validation(
                "max_output_units must be greater than zero",
            ));
        }
        if !(0.0..=1.0).contains(&self.temperature) {
            return Err(SocialFlowError::validation(format!(
                "temperature {} is outside [0, 1]",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// A fully assembled request for the generation backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Instruction / system context.
    pub instruction: String,
    /// New user content for this turn.
    pub primary_content: String,
    /// Prior turns, oldest first.
    pub history: Vec<HistoryTurn>,
    pub limits: GenerationLimits,
}

impl GenerationRequest {
    /// SHA-256 of the canonical JSON encoding. Identical requests hash identically.
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_string(self).unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Pipeline operation that issued a generation call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    Summarize,
    Discuss,
    Translate,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Summarize => "summarize",
            Self::Discuss => "discuss",
            Self::Translate => "translate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "summarize" => Some(Self::Summarize),
            "discuss" => Some(Self::Discuss),
            "translate" => Some(Self::Translate),
            _ => None,
        }
    }
}

/// Replayable request/response record of one successful generation call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub fingerprint: String,
    pub operation: Operation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic_id: Option<TopicId>,
    pub request: GenerationRequest,
    pub response: String,
    pub created_at: DateTime<Utc>,
}

impl GenerationRecord {
    pub fn new(
        operation: Operation,
        topic_id: Option<TopicId>,
        request: GenerationRequest,
        response: impl Into<String>,
    ) -> Self {
        Self {
            fingerprint: request.fingerprint(),
            operation,
            topic_id,
            request,
            response: response.into(),
            created_at: Utc::now(),
        }
    }
}

// ---------------------------------------------------------------------------
// Transcripts
// ---------------------------------------------------------------------------

/// One timed caption line from the transcript provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_secs: f64,
    pub duration_secs: f64,
}

// ---------------------------------------------------------------------------
// Published articles
// ---------------------------------------------------------------------------

/// An article written to the publishing sink.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedArticle {
    pub id: String,
    pub title: String,
    pub content: String,
    pub language: String,
    pub topic_id: TopicId,
    pub slug: String,
    pub created_at: DateTime<Utc>,
}

/// `lowercase(join('-', ["blog", language, topic_id]))`, whitespace runs collapsed to `-`.
pub fn article_slug(language: &str, topic_id: &TopicId) -> String {
    let joined = format!("blog-{}-{}", language.trim(), topic_id.as_str());
    joined
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Title given to a published article.
pub fn article_title(language: &str) -> String {
    format!("Summary in {}", language.trim())
}
