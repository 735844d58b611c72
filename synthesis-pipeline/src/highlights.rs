use std::collections::HashMap;

use common::utils::text::floor_char_boundary;
use retrieval_pipeline::RetrievedChunk;

use crate::types::Claim;

const MAX_HIGHLIGHT_LEN: usize = 240;
const CONTEXT_LEADING: usize = 80;
const CONTEXT_TRAILING: usize = 160;
const SNAP_RANGE: usize = 20;
const MIN_ANCHOR_LEN: usize = 3;

/// Fills `highlight_*` on every evidence item by locating the best matching
/// span of the claim inside the full chunk text. Offsets index the stored
/// chunk text, so `chunk.text[highlight_start..highlight_end] ==
/// highlight_text` holds whenever the fields are non-null.
pub fn add_highlights(claims: &mut [Claim], chunks: &[RetrievedChunk]) {
    let by_id: HashMap<&str, &RetrievedChunk> = chunks
        .iter()
        .map(|retrieved| (retrieved.chunk.id.as_str(), retrieved))
        .collect();

    for claim in claims.iter_mut() {
        for evidence in claim.evidence.iter_mut() {
            let Some(retrieved) = by_id.get(evidence.chunk_id.as_str()) else {
                evidence.highlight_start = None;
                evidence.highlight_end = None;
                evidence.highlight_text = None;
                continue;
            };
            match highlight_from_text(&claim.claim_text, &retrieved.chunk.text) {
                Some((start, end, text)) => {
                    evidence.highlight_start = Some(start);
                    evidence.highlight_end = Some(end);
                    evidence.highlight_text = Some(text);
                }
                None => {
                    evidence.highlight_start = None;
                    evidence.highlight_end = None;
                    evidence.highlight_text = None;
                }
            }
        }
    }
}

/// Best-effort span match: anchor on the longest claim token present in the
/// chunk, widen with context, snap to whitespace. Returns `None` when no
/// anchor of at least `MIN_ANCHOR_LEN` matches.
pub fn highlight_from_text(claim_text: &str, chunk_text: &str) -> Option<(usize, usize, String)> {
    if chunk_text.is_empty() {
        return None;
    }

    let (anchor_start, anchor_end) = find_anchor_span(claim_text, chunk_text)?;

    let mut start = anchor_start.saturating_sub(CONTEXT_LEADING);
    let mut end = (anchor_end + CONTEXT_TRAILING).min(chunk_text.len());
    start = snap_start(chunk_text, start);
    end = snap_end(chunk_text, end);

    if end - start > MAX_HIGHLIGHT_LEN {
        end = floor_char_boundary(chunk_text, start + MAX_HIGHLIGHT_LEN);
    }
    start = floor_char_boundary(chunk_text, start);

    if start >= end {
        return None;
    }

    Some((start, end, chunk_text[start..end].to_string()))
}

/// Longest claim token (first occurrence order breaks length ties) that
/// appears in the chunk, located case-insensitively.
fn find_anchor_span(claim_text: &str, chunk_text: &str) -> Option<(usize, usize)> {
    let chunk_lower = chunk_text.to_ascii_lowercase();

    let mut tokens: Vec<String> = Vec::new();
    for token in common::utils::text::tokenize(claim_text) {
        if token.len() >= MIN_ANCHOR_LEN && !tokens.contains(&token) {
            tokens.push(token);
        }
    }
    tokens.sort_by(|a, b| b.len().cmp(&a.len()));

    for token in &tokens {
        if let Some(at) = chunk_lower.find(token.as_str()) {
            return Some((at, at + token.len()));
        }
    }
    None
}

fn snap_start(text: &str, start: usize) -> usize {
    if start == 0 {
        return 0;
    }
    let bytes = text.as_bytes();
    let lower = start.saturating_sub(SNAP_RANGE);
    let mut pos = start;
    while pos > lower {
        if bytes[pos - 1].is_ascii_whitespace() {
            return pos;
        }
        pos -= 1;
    }
    start
}

fn snap_end(text: &str, end: usize) -> usize {
    let bytes = text.as_bytes();
    if end >= bytes.len() {
        return bytes.len();
    }
    let upper = (end + SNAP_RANGE).min(bytes.len());
    let mut pos = end;
    while pos < upper {
        if bytes[pos].is_ascii_whitespace() {
            return pos;
        }
        pos += 1;
    }
    end
}
