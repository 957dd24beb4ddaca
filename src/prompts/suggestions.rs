//! Follow-up prompt suggestions

const STARTERS: [&str; 4] = [
    "Tell me about artificial intelligence",
    "Help me write some code",
    "Explain a complex topic simply",
    "What's new in technology?",
];

const CODE_FOLLOW_UPS: [&str; 4] = [
    "Can you optimize this code?",
    "Add error handling to this",
    "Explain how this works",
    "Convert this to another language",
];

const EXPLAIN_FOLLOW_UPS: [&str; 4] = [
    "Can you give an example?",
    "What are the pros and cons?",
    "Tell me more about this topic",
    "How does this relate to other concepts?",
];

const GENERIC_FOLLOW_UPS: [&str; 4] = [
    "Can you elaborate on that?",
    "What are the practical applications?",
    "Are there alternatives to consider?",
    "Can you provide more details?",
];

/// Suggest follow-ups from the last message of a conversation; `None` means
/// the conversation has not started yet.
pub fn suggest_prompts(last_message: Option<&str>) -> Vec<String> {
    let list = match last_message.map(str::to_lowercase) {
        None => &STARTERS,
        Some(last) if last.contains("code") || last.contains("program") => &CODE_FOLLOW_UPS,
        Some(last) if last.contains("explain") || last.contains("what") => &EXPLAIN_FOLLOW_UPS,
        Some(_) => &GENERIC_FOLLOW_UPS,
    };
    list.iter().map(|s| s.to_string()).collect()
}
