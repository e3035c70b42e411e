use localrag_core::types::SearchHit;

pub const PROMPT_TEMPLATE: &str = "Answer the question based only on the following context:\n\n{context}\n\nQuestion: {question}\n";

/// Retrieved chunk texts in ranked order, separated by a blank line.
pub fn assemble_context(hits: &[SearchHit]) -> String {
    hits.iter().map(|h| h.chunk.text.as_str()).collect::<Vec<_>>().join("\n\n")
}

pub fn render_prompt(context: &str, question: &str) -> String {
    PROMPT_TEMPLATE.replacen("{context}", context, 1).replacen("{question}", question, 1)
}
