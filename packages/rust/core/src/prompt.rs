//! Prompt assembly: raw inputs → [`GenerationRequest`].
//!
//! This is the only place where UI-facing roles ([`Sender`]) become
//! backend roles ([`BackendRole`]).

use socialflow_shared::{
    BackendRole, GenerationLimits, GenerationRequest, HistoryEntry, HistoryTurn, Result, Sender,
    SocialFlowError,
};

/// Instruction for conversational follow-ups on a summarized video.
pub const DISCUSSION_INSTRUCTION: &str = "\
You are a helpful assistant answering questions about a video the user has \
already summarized. Ground every answer in the provided summary and the earlier \
conversation. If the summary does not contain the answer, say so plainly instead \
of guessing.";

/// The single UI → backend role mapping.
pub fn to_backend_role(sender: Sender) -> BackendRole {
    match sender {
        Sender::User => BackendRole::User,
        Sender::Assistant => BackendRole::Model,
    }
}

/// Instruction for translating into `target_language` with formatting kept intact.
pub fn translation_instruction(target_language: &str) -> String {
    format!(
        "Translate the following text to {}. Maintain the formatting and structure of \
         the original text, including headings, lists, emphasis, and line breaks. \
         Reply with the translation only.",
        target_language.trim()
    )
}

/// Grounded, stateless request (summarize, translate): no history.
pub fn assemble_grounded(
    instruction: &str,
    content: &str,
    limits: GenerationLimits,
) -> Result<GenerationRequest> {
    if instruction.trim().is_empty() {
        return Err(SocialFlowError::assembly("instruction is empty"));
    }
    if content.trim().is_empty() {
        return Err(SocialFlowError::validation("content is required"));
    }
    Ok(GenerationRequest {
        instruction: instruction.to_string(),
        primary_content: content.to_string(),
        history: Vec::new(),
        limits,
    })
}

/// Grounded, stateful request (discuss).
///
/// The grounding text goes into a context block ahead of the question, never
/// into history. Any malformed prior entry fails the whole assembly.
pub fn assemble_discussion(
    grounding: &str,
    question: &str,
    prior: &[HistoryEntry],
    limits: GenerationLimits,
) -> Result<GenerationRequest> {
    let history = normalize_history(prior)?;
    Ok(GenerationRequest {
        instruction: DISCUSSION_INSTRUCTION.to_string(),
        primary_content: grounded_question(grounding, question),
        history,
        limits,
    })
}

fn grounded_question(grounding: &str, question: &str) -> String {
    format!(
        "Context: The following is a summary of a video: {}\n\nUser Question: {}",
        grounding.trim(),
        question.trim()
    )
}

fn normalize_history(prior: &[HistoryEntry]) -> Result<Vec<HistoryTurn>> {
    prior
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let role = entry.role.ok_or_else(|| {
                SocialFlowError::assembly(format!("history entry {index} has no role"))
            })?;
            let content = match entry.content.as_deref() {
                Some(text) if !text.trim().is_empty() => text.to_string(),
                _ => {
                    return Err(SocialFlowError::assembly(format!(
                        "history entry {index} has no content"
                    )));
                }
            };
            Ok(HistoryTurn {
                role: to_backend_role(role),
                content,
            })
        })
        .collect()
}
