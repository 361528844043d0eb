//! Prompt assembly for resolution generation.

use std::fmt::Write as _;

use crate::matching::MatchResult;

pub const SYSTEM_PROMPT: &str = "You are an expert support agent that provides accurate and \
helpful resolutions to tickets based on historical examples.";

const INSTRUCTIONS: &str = "Based on these similar historical tickets, provide a comprehensive \
resolution for the new ticket. Focus on accuracy and relevance. If the similar tickets don't \
seem relevant enough, indicate that this might need a different approach.";

/// Render the user prompt: numbered examples, then the new ticket.
pub fn build_prompt(description: &str, matches: &[MatchResult]) -> String {
    let mut prompt =
        String::from("Here are some similar historical tickets and their resolutions:\n\n");

    for (i, m) in matches.iter().enumerate() {
        let _ = write!(
            prompt,
            "Example {} (Similarity: {:.2}):\nIssue: {}\nResolution: {}\n\n",
            i + 1,
            m.similarity,
            m.ticket.description,
            m.ticket.resolution.as_deref().unwrap_or_default(),
        );
    }

    let _ = write!(prompt, "\nNew Ticket: {description}\n\n{INSTRUCTIONS}");
    prompt
}
