use std::collections::HashMap;

use common::{
    error::AppError,
    provider::{AiProvider, ChatMessage, ChatOptions},
};
use retrieval_pipeline::RetrievedChunk;
use serde_json::Value;
use tracing::{debug, warn};

use crate::{
    prompt::{answer_user_prompt, build_context, ANSWER_GUARDRAIL},
    snippet::{absolute_offsets, build_snippet},
    types::{is_insufficient_evidence_answer, AnswerStyle, Citation, CitationGroup},
};

const MAX_FOLLOW_UPS: usize = 3;
const FOLLOW_UP_LEAD_CHARS: usize = 60;

/// What the synthesizer hands back to the caller: a grounded answer with the
/// surviving citation ids, or the canonical fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisResult {
    pub answer_text: String,
    pub cited_ids: Vec<String>,
    pub style: AnswerStyle,
}

/// Produces the grounded answer for a question over the selected chunks.
/// Never fails on bad model output: any parse or grounding problem collapses
/// into the insufficient-evidence fallback. The only error surfaced to the
/// caller besides transport failures is a hallucinated citation id when
/// `debug` is set.
pub async fn generate_answer(
    provider: &AiProvider,
    question: &str,
    chunks: &[RetrievedChunk],
    titles: &HashMap<String, Option<String>>,
    debug: bool,
) -> Result<SynthesisResult, AppError> {
    if chunks.is_empty() {
        return Ok(fallback(chunks));
    }

    let context = build_context(chunks, &|source_id| {
        titles.get(source_id).cloned().flatten()
    });
    let messages = [
        ChatMessage::system(ANSWER_GUARDRAIL),
        ChatMessage::user(answer_user_prompt(question, &context)),
    ];
    let outcome = provider.chat(&messages, &ChatOptions::default()).await?;

    let Some(payload) = parse_object(&outcome.text) else {
        warn!("model returned unparseable answer payload; falling back");
        return Ok(fallback(chunks));
    };

    let answer = payload
        .get("answer")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .trim()
        .to_string();
    let cited = parse_citation_ids(&payload);

    if answer.is_empty()
        || is_insufficient_evidence_answer(&answer)
        || answer.eq_ignore_ascii_case("i don't know")
    {
        return Ok(fallback(chunks));
    }

    let allowed: Vec<&str> = chunks.iter().map(|c| c.chunk.id.as_str()).collect();
    let mut valid: Vec<String> = Vec::new();
    let mut unknown: Vec<String> = Vec::new();
    for id in cited {
        if allowed.contains(&id.as_str()) {
            if !valid.contains(&id) {
                valid.push(id);
            }
        } else {
            unknown.push(id);
        }
    }

    if !unknown.is_empty() {
        if debug {
            return Err(AppError::Citation(format!(
                "model cited unknown chunk ids: {}",
                unknown.join(", ")
            )));
        }
        warn!(dropped = unknown.len(), "dropped citations to unknown chunk ids");
    }

    if valid.is_empty() {
        return Ok(fallback(chunks));
    }

    debug!(citations = valid.len(), "synthesized grounded answer");
    Ok(SynthesisResult {
        answer_text: answer,
        cited_ids: valid,
        style: AnswerStyle::Direct,
    })
}

/// Canonical insufficient-evidence answer with follow-ups derived from the
/// top candidate snippets.
pub fn fallback(chunks: &[RetrievedChunk]) -> SynthesisResult {
    let mut follow_ups: Vec<String> = Vec::new();
    for retrieved in chunks.iter().take(MAX_FOLLOW_UPS) {
        let lead: String = retrieved
            .chunk
            .text
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .chars()
            .take(FOLLOW_UP_LEAD_CHARS)
            .collect();
        let lead = lead.trim();
        if !lead.is_empty() {
            follow_ups.push(format!("Ask about \"{lead}\""));
        }
    }
    if follow_ups.is_empty() {
        follow_ups.push("Ask a narrower question or name specific sections".to_string());
    }

    SynthesisResult {
        answer_text: format!(
            "insufficient evidence. Suggested follow-ups: {}",
            follow_ups.join("; ")
        ),
        cited_ids: Vec::new(),
        style: AnswerStyle::InsufficientEvidence,
    }
}

/// Expands cited chunk ids into full citation records, in citation order.
pub fn expand_citations(
    question: &str,
    cited_ids: &[String],
    chunks: &[RetrievedChunk],
    titles: &HashMap<String, Option<String>>,
    snippet_chars: usize,
) -> Vec<Citation> {
    let by_id: HashMap<&str, &RetrievedChunk> = chunks
        .iter()
        .map(|retrieved| (retrieved.chunk.id.as_str(), retrieved))
        .collect();

    let mut citations = Vec::with_capacity(cited_ids.len());
    for id in cited_ids {
        let Some(retrieved) = by_id.get(id.as_str()) else {
            continue;
        };
        let chunk = &retrieved.chunk;
        let span = build_snippet(question, &chunk.text, snippet_chars);
        let (snippet, snippet_start, snippet_end) = match span {
            Some(span) => (span.text, Some(span.start), Some(span.end)),
            None => (String::new(), None, None),
        };
        let (absolute_start, absolute_end) =
            absolute_offsets(retrieved, snippet_start, snippet_end);
        citations.push(Citation {
            chunk_id: chunk.id.clone(),
            source_id: chunk.source_id.clone(),
            source_title: titles.get(&chunk.source_id).cloned().flatten(),
            page_start: chunk.page_start,
            page_end: chunk.page_end,
            section_path: chunk.section_path.clone(),
            snippet,
            snippet_start,
            snippet_end,
            absolute_start,
            absolute_end,
        });
    }
    citations
}

/// Groups citations by source, preserving within-group citation order and
/// first-appearance group order.
pub fn group_citations(citations: &[Citation]) -> Vec<CitationGroup> {
    let mut groups: Vec<CitationGroup> = Vec::new();
    for citation in citations {
        match groups
            .iter_mut()
            .find(|group| group.source_id == citation.source_id)
        {
            Some(group) => group.citations.push(citation.clone()),
            None => groups.push(CitationGroup {
                source_id: citation.source_id.clone(),
                source_title: citation.source_title.clone(),
                citations: vec![citation.clone()],
            }),
        }
    }
    groups
}

fn parse_object(raw: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(Value::Object(map)),
        _ => None,
    }
}

/// Citation ids may arrive as plain strings or `{chunk_id}` objects.
fn parse_citation_ids(payload: &Value) -> Vec<String> {
    let Some(items) = payload.get("citations").and_then(Value::as_array) else {
        return Vec::new();
    };
    let mut ids = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Value::String(id) => ids.push(id.clone()),
            Value::Object(map) => {
                if let Some(id) = map.get("chunk_id") {
                    match id {
                        Value::String(id) => ids.push(id.clone()),
                        other => ids.push(other.to_string()),
                    }
                }
            }
            _ => {}
        }
    }
    ids
}
