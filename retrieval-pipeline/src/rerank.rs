use common::utils::text::{floor_char_boundary, tokenize};

use crate::RetrievedChunk;

const COVERAGE_WEIGHT: f32 = 0.45;
const TF_WEIGHT: f32 = 0.25;
const PHRASE_WEIGHT: f32 = 0.2;
const LENGTH_WEIGHT: f32 = 0.1;
const TF_CAP: usize = 3;
const LENGTH_SCALE: f32 = 200.0;

/// Deterministic cross-encoder stand-in: token-overlap features over a
/// truncated snippet. Pure by contract: the fake-provider determinism
/// guarantee depends on no network calls happening here.
pub fn rerank(
    question: &str,
    mut candidates: Vec<RetrievedChunk>,
    snippet_chars: usize,
) -> Vec<RetrievedChunk> {
    for candidate in &mut candidates {
        let score = rerank_score(question, &candidate.chunk.text, snippet_chars);
        candidate.scores.rerank = Some(score);
    }
    // Stable sort: ties keep their hybrid order.
    candidates.sort_by(|a, b| {
        let a_score = a.scores.rerank.unwrap_or(0.0);
        let b_score = b.scores.rerank.unwrap_or(0.0);
        b_score
            .partial_cmp(&a_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    candidates
}

/// Score in [0,1] from term-frequency overlap, ordered phrase matches, and an
/// inverse length penalty.
pub fn rerank_score(question: &str, text: &str, snippet_chars: usize) -> f32 {
    let snippet = clean_snippet(text, snippet_chars);
    let question_tokens = tokenize(question);
    let snippet_tokens = tokenize(&snippet);
    if question_tokens.is_empty() || snippet_tokens.is_empty() {
        return 0.0;
    }

    let mut unique_terms: Vec<&String> = Vec::new();
    for token in &question_tokens {
        if !unique_terms.contains(&token) {
            unique_terms.push(token);
        }
    }

    let mut matched = 0usize;
    let mut tf_sum = 0usize;
    for term in &unique_terms {
        let count = snippet_tokens.iter().filter(|token| token == term).count();
        if count > 0 {
            matched += 1;
        }
        tf_sum += count.min(TF_CAP);
    }
    let coverage = matched as f32 / unique_terms.len() as f32;
    let tf = tf_sum as f32 / (TF_CAP * unique_terms.len()) as f32;

    let phrase = if question_tokens.len() < 2 {
        0.0
    } else {
        let mut hits = 0usize;
        for pair in question_tokens.windows(2) {
            if snippet_tokens
                .windows(2)
                .any(|window| window[0] == pair[0] && window[1] == pair[1])
            {
                hits += 1;
            }
        }
        hits as f32 / (question_tokens.len() - 1) as f32
    };

    let length_penalty = 1.0 / (1.0 + snippet_tokens.len() as f32 / LENGTH_SCALE);

    COVERAGE_WEIGHT * coverage
        + TF_WEIGHT * tf
        + PHRASE_WEIGHT * phrase
        + LENGTH_WEIGHT * length_penalty
}

/// Whitespace-collapsed prefix of the text, at most `max_chars` bytes.
pub fn clean_snippet(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if max_chars == 0 || collapsed.len() <= max_chars {
        return collapsed;
    }
    let cut = floor_char_boundary(&collapsed, max_chars);
    collapsed[..cut].to_string()
}
