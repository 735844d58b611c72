use serde_json::json;
use sha2::{Digest, Sha256};

use crate::utils::text::{split_sentences, tokenize};

use super::{ChatMessage, ChatOutcome, ChatRole, ChatUsage};

const FAKE_ANSWER_THRESHOLD: f32 = 0.3;
const FAKE_MAX_SENTENCES: usize = 3;
const FAKE_MAX_CITATIONS: usize = 4;

const STOPWORDS: &[&str] = &[
    "a", "about", "an", "and", "are", "does", "for", "in", "is", "it", "of", "on", "the", "this",
    "to", "what", "which", "that", "how", "why", "when", "where", "who",
];

/// Deterministic provider stand-in. Embeddings are hash-derived from the token
/// bag, chat recognizes the grounded-answer prompt and answers it from the
/// listed chunks. Identical inputs always produce identical outputs.
#[derive(Clone)]
pub struct FakeAi {
    dimension: usize,
}

impl FakeAi {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn embed(&self, texts: &[String]) -> Vec<Vec<f32>> {
        texts
            .iter()
            .map(|text| hashed_embedding(text, self.dimension))
            .collect()
    }

    pub fn chat(&self, messages: &[ChatMessage]) -> ChatOutcome {
        let prompt = messages
            .iter()
            .rev()
            .find(|message| message.role == ChatRole::User)
            .map(|message| message.content.as_str())
            .unwrap_or_default();

        let text = match parse_grounded_prompt(prompt) {
            Some((question, chunks)) => answer_from_chunks(&question, &chunks),
            None => "{}".to_string(),
        };

        let prompt_tokens: usize = messages
            .iter()
            .map(|message| message.content.split_whitespace().count())
            .sum();
        let completion_tokens = text.split_whitespace().count();

        ChatOutcome {
            text,
            usage: ChatUsage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
            },
        }
    }
}

/// Reproducible unit vector for a text: the normalized sum of per-token hash
/// vectors, so texts sharing vocabulary land near each other.
pub fn hashed_embedding(text: &str, dimension: usize) -> Vec<f32> {
    let mut accumulated = vec![0.0f32; dimension];
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return accumulated;
    }

    for token in &tokens {
        let token_vector = token_vector(token, dimension);
        for (slot, value) in accumulated.iter_mut().zip(token_vector) {
            *slot += value;
        }
    }

    let norm = accumulated.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in &mut accumulated {
            *value /= norm;
        }
    }
    accumulated
}

fn token_vector(token: &str, dimension: usize) -> Vec<f32> {
    let seed = Sha256::digest(token.as_bytes());
    let mut values = Vec::with_capacity(dimension);
    let mut counter: u32 = 0;
    while values.len() < dimension {
        let mut hasher = Sha256::new();
        hasher.update(seed);
        hasher.update(counter.to_le_bytes());
        let block = hasher.finalize();
        for quad in block.chunks_exact(4) {
            if values.len() == dimension {
                break;
            }
            let raw = u32::from_le_bytes([quad[0], quad[1], quad[2], quad[3]]);
            values.push((raw as f32 / u32::MAX as f32) * 2.0 - 1.0);
        }
        counter += 1;
    }
    values
}

fn parse_grounded_prompt(prompt: &str) -> Option<(String, Vec<(String, String)>)> {
    let question_start = prompt.find("Question: ")?;
    let after_question = &prompt[question_start + "Question: ".len()..];
    let question = after_question
        .lines()
        .next()
        .unwrap_or_default()
        .trim()
        .to_string();

    let mut chunks = Vec::new();
    let mut remainder = prompt;
    while let Some(marker) = remainder.find("[CHUNK ") {
        let after_marker = &remainder[marker + "[CHUNK ".len()..];
        let close = after_marker.find(']')?;
        let id = after_marker[..close].trim().to_string();
        let body_start = &after_marker[close + 1..];
        let body_end = body_start
            .find("\n\n[CHUNK ")
            .or_else(|| body_start.find("\n\nReturn a JSON"))
            .unwrap_or(body_start.len());
        let body = strip_block_header(&body_start[..body_end]);
        chunks.push((id, body));
        remainder = &after_marker[close + 1..];
    }

    if chunks.is_empty() {
        None
    } else {
        Some((question, chunks))
    }
}

/// Drops the `Source: … | Pages: …` metadata line so scoring only sees chunk text.
fn strip_block_header(body: &str) -> String {
    let trimmed = body.trim_start_matches('\n');
    match trimmed.lines().next() {
        Some(first) if first.starts_with("Source: ") => trimmed
            .splitn(2, '\n')
            .nth(1)
            .unwrap_or_default()
            .to_string(),
        _ => trimmed.to_string(),
    }
}

fn answer_from_chunks(question: &str, chunks: &[(String, String)]) -> String {
    let mut keywords: Vec<String> = Vec::new();
    for token in tokenize(question) {
        if !STOPWORDS.contains(&token.as_str()) && !keywords.contains(&token) {
            keywords.push(token);
        }
    }
    if keywords.is_empty() {
        keywords = tokenize(question);
    }

    let mut scored: Vec<(f32, usize, usize, String)> = Vec::new();
    for (chunk_idx, (_, body)) in chunks.iter().enumerate() {
        for (sentence_idx, sentence) in split_sentences(body).into_iter().enumerate() {
            let coverage = keyword_coverage(&keywords, &sentence);
            if coverage >= FAKE_ANSWER_THRESHOLD {
                scored.push((coverage, chunk_idx, sentence_idx, sentence));
            }
        }
    }

    if scored.is_empty() {
        return json!({
            "answer": "insufficient evidence",
            "citations": [],
            "follow_ups": [],
        })
        .to_string();
    }

    scored.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.cmp(&b.2))
    });

    let selected = &scored[..scored.len().min(FAKE_MAX_SENTENCES)];
    let answer = selected
        .iter()
        .map(|(_, _, _, sentence)| sentence.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    let mut citations: Vec<String> = Vec::new();
    for (_, chunk_idx, _, _) in selected {
        let id = chunks[*chunk_idx].0.clone();
        if !citations.contains(&id) {
            citations.push(id);
        }
        if citations.len() == FAKE_MAX_CITATIONS {
            break;
        }
    }

    json!({
        "answer": answer,
        "citations": citations,
        "follow_ups": [],
    })
    .to_string()
}

fn keyword_coverage(keywords: &[String], sentence: &str) -> f32 {
    if keywords.is_empty() {
        return 0.0;
    }
    let sentence_tokens = tokenize(sentence);
    let hits = keywords
        .iter()
        .filter(|keyword| sentence_tokens.iter().any(|token| token == *keyword))
        .count();
    hits as f32 / keywords.len() as f32
}
