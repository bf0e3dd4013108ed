//! Shared types, error model, and configuration for SocialFlow.
//!
//! This crate is the foundation depended on by all other SocialFlow crates.
//! It provides:
//! - [`SocialFlowError`] — the unified error type, and [`ErrorPayload`]
//! - Domain types ([`Message`], [`TopicId`], [`GenerationRequest`], [`PublishedArticle`])
//! - Configuration ([`AppConfig`], [`PipelineConfig`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, ConversationConfig, DefaultsConfig, GeminiConfig, LimitsConfig, OperationLimits,
    OperationLimitsConfig, PipelineConfig, RetentionPolicy, StoreKind, TranscriptConfig,
    config_dir, config_file_path, expand_home, init_config, load_config, load_config_from,
    validate_api_key,
};
pub use error::{ErrorKind, ErrorPayload, Result, SocialFlowError, UpstreamStage};
pub use types::{
    BackendRole, ContentType, GenerationLimits, GenerationRecord, GenerationRequest,
    HistoryEntry, HistoryMode, HistoryTurn, Message, MessageId, Operation, PublishedArticle,
    Sender, TopicId, TranscriptSegment, article_slug, article_title,
};
