//! Grounded prompt assembly.

use crate::types::{ConversationTurn, RetrievalResult};

/// Answer returned when retrieval finds nothing to ground on.
pub const NO_CONTEXT_ANSWER: &str = "I couldn't find any relevant information in the uploaded documents to answer your question.";

const INSTRUCTIONS: &str = "Answer the user's question using ONLY the context below, which was retrieved from the uploaded documents. \
Do not use outside knowledge. If the context does not contain enough information to answer, say so clearly.";

const GUIDELINES: &str = "Guidelines:
- Be clear, accurate, and concise
- Cite the sources you rely on as [source_id #chunk_index]
- If the information is incomplete or ambiguous, mention this";

/// Render retrieved chunks as tagged context blocks, best first.
pub fn format_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .map(|r| {
            format!(
                "[Source: {} | chunk {} | score {:.2}]\n{}",
                r.chunk.source_id, r.chunk.chunk_index, r.score, r.chunk.text
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n---\n\n")
}

/// Render the last `max_turns` grounded turns of `history` as a transcript.
///
/// Turns answered with the no-context fallback are left out.
pub fn format_history(history: &[ConversationTurn], max_turns: usize) -> String {
    let grounded: Vec<&ConversationTurn> = history.iter().filter(|t| t.grounded).collect();
    let start = grounded.len().saturating_sub(max_turns);
    grounded[start..]
        .iter()
        .map(|turn| format!("User: {}\nAssistant: {}", turn.question, turn.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Build the full prompt sent to the generator.
///
/// Layout: instructions, tagged context, optional recent conversation, the
/// question, guidelines, and a trailing `Answer:` cue.
pub fn build_prompt(
    question: &str,
    results: &[RetrievalResult],
    history: &[ConversationTurn],
    max_history_turns: usize,
) -> String {
    let mut prompt = String::with_capacity(
        results.iter().map(|r| r.chunk.text.len() + 64).sum::<usize>() + question.len() + 512,
    );

    prompt.push_str(INSTRUCTIONS);
    prompt.push_str("\n\nContext:\n");
    prompt.push_str(&format_context(results));

    let transcript = format_history(history, max_history_turns);
    if !transcript.is_empty() {
        prompt.push_str("\n\nPrevious conversation:\n");
        prompt.push_str(&transcript);
    }

    prompt.push_str("\n\nQuestion: ");
    prompt.push_str(question.trim());
    prompt.push_str("\n\n");
    prompt.push_str(GUIDELINES);
    prompt.push_str("\n\nAnswer:");
    prompt
}
