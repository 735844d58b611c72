use common::utils::text::{floor_char_boundary, sentence_spans, tokenize};
use retrieval_pipeline::RetrievedChunk;

/// A contiguous span of a chunk's text chosen for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetSpan {
    pub text: String,
    pub start: usize,
    pub end: usize,
}

/// Picks the contiguous run of sentences (at most `max_chars` bytes) that
/// covers the most question terms. Ties go to the earliest window. The span is
/// an exact substring of the chunk text, so
/// `chunk.text[span.start..span.end] == span.text` always holds.
pub fn build_snippet(question: &str, chunk_text: &str, max_chars: usize) -> Option<SnippetSpan> {
    if chunk_text.trim().is_empty() || max_chars == 0 {
        return None;
    }

    let mut terms: Vec<String> = Vec::new();
    for token in tokenize(question) {
        if !terms.contains(&token) {
            terms.push(token);
        }
    }

    let spans = sentence_spans(chunk_text);
    let mut best: Option<(usize, usize, usize)> = None; // (covered, start, end)

    for i in 0..spans.len() {
        let start = spans[i].0;
        let mut end = spans[i].1;
        for span in &spans[i..] {
            if span.1 - start > max_chars {
                break;
            }
            end = span.1;
        }
        if end <= start {
            continue;
        }
        let covered = covered_terms(&terms, &chunk_text[start..end]);
        let better = match best {
            None => true,
            Some((best_covered, _, _)) => covered > best_covered,
        };
        if better {
            best = Some((covered, start, end));
        }
    }

    let (_, start, end) = best?;
    let (start, end) = trim_span(chunk_text, start, end.min(start + max_chars));
    if end <= start {
        return None;
    }
    let end = floor_char_boundary(chunk_text, end);

    Some(SnippetSpan {
        text: chunk_text[start..end].to_string(),
        start,
        end,
    })
}

fn covered_terms(terms: &[String], window: &str) -> usize {
    if terms.is_empty() {
        return 0;
    }
    let window_tokens = tokenize(window);
    terms
        .iter()
        .filter(|term| window_tokens.iter().any(|token| token == *term))
        .count()
}

/// Moves the span edges inward past whitespace without ever leaving the span.
fn trim_span(text: &str, mut start: usize, mut end: usize) -> (usize, usize) {
    let bytes = text.as_bytes();
    end = end.min(bytes.len());
    while start < end && bytes[start].is_ascii_whitespace() {
        start += 1;
    }
    while end > start && bytes[end - 1].is_ascii_whitespace() {
        end -= 1;
    }
    (start, end)
}

/// Maps snippet offsets to absolute offsets in the cleaned source text.
/// Null when the chunk predates char-offset tracking or the span would fall
/// outside the chunk's recorded range.
pub fn absolute_offsets(
    chunk: &RetrievedChunk,
    snippet_start: Option<usize>,
    snippet_end: Option<usize>,
) -> (Option<usize>, Option<usize>) {
    let (Some(snippet_start), Some(snippet_end)) = (snippet_start, snippet_end) else {
        return (None, None);
    };
    let Some(char_start) = chunk.chunk.char_start else {
        return (None, None);
    };

    let absolute_start = char_start + snippet_start;
    let absolute_end = char_start + snippet_end;
    if absolute_end <= absolute_start {
        return (None, None);
    }
    if let Some(char_end) = chunk.chunk.char_end {
        if absolute_end > char_end {
            return (None, None);
        }
    }
    if absolute_end > char_start + chunk.chunk.text.len() {
        return (None, None);
    }
    (Some(absolute_start), Some(absolute_end))
}
