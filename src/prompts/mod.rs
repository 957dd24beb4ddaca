//! Prompt formatting
//!
//! Per-family prompt templates and research context injection. Everything
//! here is pure: no I/O, no state.

pub mod parameters;
pub mod suggestions;

use crate::research::SearchResult;
use crate::types::message::{Message, Role};
use crate::types::model::{ModelFamily, ModelProfile};

/// Research snippets included in an enhanced prompt
const RESEARCH_RESULT_LIMIT: usize = 3;
/// Characters kept from each snippet
const RESEARCH_SNIPPET_CHARS: usize = 200;

/// Wrap a prompt for code completion models
pub fn format_code_prompt(prompt: &str) -> String {
    format!("```\n{}\n```\nComplete the code:", prompt)
}

/// Replay a transcript as `Human:` / `Assistant:` turns ending in an open
/// assistant turn. System messages are not replayed.
pub fn format_chat_transcript(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        match msg.role {
            Role::User => {
                out.push_str("Human: ");
                out.push_str(&msg.content);
                out.push('\n');
            }
            Role::Assistant => {
                out.push_str("Assistant: ");
                out.push_str(&msg.content);
                out.push('\n');
            }
            Role::System => {}
        }
    }
    out.push_str("Assistant: ");
    out
}

/// Append an enumerated list of image paths
pub fn format_multimodal_prompt(prompt: &str, images: &[String]) -> String {
    if images.is_empty() {
        return prompt.to_string();
    }

    let mut out = String::from(prompt);
    out.push_str("\nImages provided:\n");
    for (i, path) in images.iter().enumerate() {
        out.push_str(&format!("Image {}: {}\n", i + 1, path));
    }
    out
}

/// Build the final prompt for `profile` from a transcript whose last entry is
/// the current user turn.
pub fn format_for_model(profile: &ModelProfile, messages: &[Message], images: &[String]) -> String {
    let last = messages.last().map(|m| m.content.as_str()).unwrap_or("");

    match profile.family {
        ModelFamily::Code => format_code_prompt(last),
        ModelFamily::Chat => format_chat_transcript(messages),
        ModelFamily::Multimodal => format_multimodal_prompt(last, images),
        ModelFamily::General => last.to_string(),
    }
}

/// `Research Context:` block listing the top snippets, each cut to 200 chars
pub fn research_context(results: &[SearchResult]) -> String {
    let mut context = String::from("Research Context:\n");
    for result in results.iter().take(RESEARCH_RESULT_LIMIT) {
        let snippet: String = result.content.chars().take(RESEARCH_SNIPPET_CHARS).collect();
        context.push_str(&format!("- {}: {}...\n", result.title, snippet));
    }
    context
}

/// Prefix a prompt with research snippets. No results leaves it unchanged.
pub fn enhance_prompt_with_research(prompt: &str, results: &[SearchResult]) -> String {
    if results.is_empty() {
        return prompt.to_string();
    }

    format!(
        "{}\nUser Query: {}\n\nPlease provide a comprehensive response using the above context when relevant:",
        research_context(results),
        prompt
    )
}

/// Prefix a prompt with extracted document text
pub fn prepend_document_context(prompt: &str, context: &str) -> String {
    if context.trim().is_empty() {
        return prompt.to_string();
    }
    format!("{}\n{}", context, prompt)
}
