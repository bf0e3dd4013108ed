//! Instruction templates keyed by content type.

use socialflow_shared::ContentType;

const GENERAL_TEMPLATE: &str = "\
You are an expert content summarizer. Read the video transcript that follows and \
write a clear, well-structured summary in Markdown.

Structure:
- A one-paragraph overview of what the video is about
- The key points, as a bulleted list, in the order they are presented
- Notable facts, figures, or quotes worth remembering
- A short conclusion with the main takeaway

Stay faithful to the transcript. Do not invent details that are not in it.

Transcript:
";

const PROGRAMMING_TEMPLATE: &str = "\
You are a senior software engineer summarizing a programming tutorial. Read the \
video transcript that follows and produce study notes in Markdown.

Structure:
- Prerequisites and the problem the tutorial solves
- Core concepts introduced, each with a one-sentence explanation
- Step-by-step walkthrough of what is built, with code snippets in fenced blocks \
where the transcript describes code
- Common pitfalls and best practices mentioned
- Suggested next steps for the learner

Name libraries, commands, and APIs exactly as spoken. Do not invent code the \
tutorial does not describe.

Transcript:
";

const PODCAST_TEMPLATE: &str = "\
You are summarizing a podcast episode. Read the transcript that follows and write \
an episode digest in Markdown.

Structure:
- Who is speaking and the topic of the episode
- Main discussion threads, each with the positions taken by the speakers
- Memorable quotes, attributed where the transcript makes the speaker clear
- Recommendations, resources, or references mentioned
- Key takeaways for a listener who skipped the episode

Keep the speakers' opinions distinct from established facts.

Transcript:
";

/// Instruction template for a content type. Never empty.
pub fn select_template(content_type: ContentType) -> &'static str {
    match content_type {
        ContentType::General => GENERAL_TEMPLATE,
        ContentType::Programming => PROGRAMMING_TEMPLATE,
        ContentType::Podcast => PODCAST_TEMPLATE,
    }
}

/// Lenient variant for raw caller tags: anything unrecognized selects the
/// general template.
pub fn select_template_for_tag(tag: &str) -> &'static str {
    select_template(ContentType::from_tag(Some(tag)))
}
