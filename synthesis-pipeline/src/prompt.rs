use retrieval_pipeline::RetrievedChunk;

/// Guardrail shared by the grounded-answer prompt.
pub const ANSWER_GUARDRAIL: &str = "Only use the provided context. \
Cite chunk IDs for each major claim. \
If evidence is insufficient, reply with answer='insufficient evidence' \
and include follow_ups.";

/// Renders chunks as `[CHUNK id]` blocks the model must cite from.
pub fn build_context(chunks: &[RetrievedChunk], titles: &dyn Fn(&str) -> Option<String>) -> String {
    let mut parts = Vec::with_capacity(chunks.len());
    for retrieved in chunks {
        let chunk = &retrieved.chunk;
        let title = titles(&chunk.source_id).unwrap_or_else(|| "Untitled".to_string());
        let pages = match (chunk.page_start, chunk.page_end) {
            (Some(start), Some(end)) => format!("{start}-{end}"),
            _ => "unknown".to_string(),
        };
        parts.push(format!(
            "[CHUNK {id}]\nSource: {title} | Pages: {pages}\n{text}",
            id = chunk.id,
            text = chunk.text,
        ));
    }
    parts.join("\n\n")
}

pub fn answer_user_prompt(question: &str, context: &str) -> String {
    format!(
        "Question: {question}\n\n\
         Context:\n{context}\n\n\
         Return a JSON object with keys: \
         answer (string), citations (array of chunk_id strings), \
         follow_ups (array of strings)."
    )
}

pub const CLAIM_EXTRACTION_SYSTEM: &str = "Extract 3-8 atomic, factual claims from the \
provided answer. Each claim is a short noun-phrase plus predicate sentence. \
Return only a JSON object with a 'claims' array, each item having a \
'claim_text' string.";

pub fn claim_extraction_prompt(question: &str, answer: &str) -> String {
    format!(
        "Question: {question}\n\nAnswer:\n{answer}\n\n\
         Return JSON: {{\"claims\": [{{\"claim_text\": \"...\"}}]}}"
    )
}

pub const CLAIM_SCORING_SYSTEM: &str = "You are verifying claims against evidence. \
Use only the provided chunks and return JSON only. \
You MUST ONLY use chunk IDs that appear in the provided chunks. \
Do not invent chunk IDs. \
support_score and contradiction_score MUST be floats in [0,1]. \
If unsure, set both scores to 0.0.";

pub fn claim_scoring_prompt(question: &str, claims: &[String], context: &str) -> String {
    let claim_list = claims
        .iter()
        .map(|claim| format!("- {claim}"))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Question: {question}\n\n\
         Claims:\n{claim_list}\n\n\
         Chunks:\n{context}\n\n\
         Return JSON with key 'results', an array of objects with: \
         claim_text, supporting_chunk_ids, contradicting_chunk_ids, \
         support_score, contradiction_score."
    )
}
