/// Collapses noisy whitespace from extracted documents: trims each line and
/// squeezes blank-line runs down to a single separator.
pub fn normalize_text(raw: &str) -> String {
    let mut cleaned: Vec<&str> = Vec::new();
    let mut blank_run = 0usize;
    for line in raw.lines() {
        let line = line.trim();
        if line.is_empty() {
            blank_run += 1;
            if blank_run <= 1 {
                cleaned.push("");
            }
        } else {
            blank_run = 0;
            cleaned.push(line);
        }
    }
    cleaned.join("\n").trim_matches('\n').to_string()
}

/// Lowercased alphanumeric tokens in document order. ASCII lowercasing keeps
/// byte offsets stable for downstream span matching.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_ascii_lowercase();
    let mut tokens = Vec::new();
    let mut current = String::new();
    for ch in lowered.chars() {
        if ch.is_ascii_alphanumeric() {
            current.push(ch);
        } else if !current.is_empty() {
            tokens.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Tokens plus their byte spans in the input.
pub fn tokenize_with_spans(text: &str) -> Vec<(String, usize, usize)> {
    let lowered = text.to_ascii_lowercase();
    let bytes = lowered.as_bytes();
    let mut spans = Vec::new();
    let mut start: Option<usize> = None;
    for (idx, byte) in bytes.iter().enumerate() {
        if byte.is_ascii_alphanumeric() {
            if start.is_none() {
                start = Some(idx);
            }
        } else if let Some(s) = start.take() {
            spans.push((lowered[s..idx].to_string(), s, idx));
        }
    }
    if let Some(s) = start {
        spans.push((lowered[s..].to_string(), s, bytes.len()));
    }
    spans
}

/// Splits text into sentence spans `[start, end)` on `.`/`!`/`?` followed by
/// whitespace, or on newlines. Spans cover the whole input.
pub fn sentence_spans(text: &str) -> Vec<(usize, usize)> {
    let bytes = text.as_bytes();
    let mut spans = Vec::new();
    let mut start = 0usize;
    let mut idx = 0usize;
    while idx < bytes.len() {
        let byte = bytes[idx];
        let terminal = matches!(byte, b'.' | b'!' | b'?');
        let break_here = if terminal {
            bytes
                .get(idx + 1)
                .map(|next| next.is_ascii_whitespace())
                .unwrap_or(true)
        } else {
            byte == b'\n'
        };
        if break_here {
            let end = idx + 1;
            if end > start {
                spans.push((start, end));
            }
            start = end;
        }
        idx += 1;
    }
    if start < bytes.len() {
        spans.push((start, bytes.len()));
    }
    spans
}

/// Sentence texts with surrounding whitespace trimmed, preserving order.
pub fn split_sentences(text: &str) -> Vec<String> {
    sentence_spans(text)
        .into_iter()
        .filter_map(|(start, end)| {
            let sentence = text[start..end].trim();
            if sentence.is_empty() {
                None
            } else {
                Some(sentence.to_string())
            }
        })
        .collect()
}

/// Largest index `<= at` that falls on a UTF-8 char boundary.
pub fn floor_char_boundary(text: &str, at: usize) -> usize {
    let mut idx = at.min(text.len());
    while idx > 0 && !text.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_blank_runs() {
        let raw = "  first line  \n\n\n\nsecond line\n\n third ";
        assert_eq!(normalize_text(raw), "first line\n\nsecond line\n\nthird");
    }

    #[test]
    fn normalize_empty_input() {
        assert_eq!(normalize_text("   \n \n"), "");
    }

    #[test]
    fn tokenize_splits_on_punctuation() {
        assert_eq!(
            tokenize("Tokio's scheduler, v2.1!"),
            vec!["tokio", "s", "scheduler", "v2", "1"]
        );
    }

    #[test]
    fn tokenize_with_spans_reports_byte_offsets() {
        let spans = tokenize_with_spans("ab cd");
        assert_eq!(
            spans,
            vec![
                ("ab".to_string(), 0, 2),
                ("cd".to_string(), 3, 5),
            ]
        );
    }

    #[test]
    fn sentence_spans_cover_input() {
        let text = "One. Two! Three";
        let spans = sentence_spans(text);
        assert_eq!(spans.len(), 3);
        let rebuilt: String = spans.iter().map(|&(s, e)| &text[s..e]).collect();
        assert_eq!(rebuilt, text);
    }

    #[test]
    fn split_sentences_trims() {
        assert_eq!(
            split_sentences("First point. Second point! Third"),
            vec!["First point.", "Second point!", "Third"]
        );
    }

    #[test]
    fn floor_char_boundary_respects_utf8() {
        let text = "héllo";
        // 'é' occupies bytes 1..3; index 2 is mid-char.
        assert_eq!(floor_char_boundary(text, 2), 1);
        assert_eq!(floor_char_boundary(text, 3), 3);
        assert_eq!(floor_char_boundary(text, 99), text.len());
    }
}
