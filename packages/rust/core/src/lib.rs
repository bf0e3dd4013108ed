//! Core pipeline orchestration and domain logic for SocialFlow.
//!
//! This crate ties together template selection, prompt assembly, the
//! conversation store, and the generation gateway into the end-to-end
//! operations (`summarize`, `discuss`, `translate`, `publish`).

pub mod conversation;
pub mod journal;
pub mod pipeline;
pub mod prompt;
pub mod publish;
pub mod templates;

pub use conversation::{ConversationStore, InMemoryConversationStore, TopicLocks};
pub use journal::GenerationJournal;
pub use pipeline::{
    DiscussOutcome, DiscussRequest, OperationStage, Pipeline, ProgressReporter, SilentProgress,
    SummaryOutcome,
};
pub use prompt::{
    DISCUSSION_INSTRUCTION, assemble_discussion, assemble_grounded, to_backend_role,
    translation_instruction,
};
pub use publish::{ArticleSink, publish};
pub use templates::{select_template, select_template_for_tag};
