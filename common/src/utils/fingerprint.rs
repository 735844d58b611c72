use sha2::{Digest, Sha256};

/// Mode flags that participate in the query fingerprint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryModes {
    pub rerank: bool,
    pub verify: bool,
    pub highlights: bool,
}

/// Whitespace-collapsed, lowercased question used for fingerprinting.
pub fn normalize_question(question: &str) -> String {
    question
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Deterministic fingerprint over (normalized question, sorted source ids,
/// mode flags). Identical queries always map to the same hex digest.
pub fn query_fingerprint(question: &str, source_ids: &[String], modes: QueryModes) -> String {
    let mut sorted_ids: Vec<&str> = source_ids.iter().map(String::as_str).collect();
    sorted_ids.sort_unstable();

    let mut hasher = Sha256::new();
    hasher.update(normalize_question(question).as_bytes());
    hasher.update(b"\n");
    hasher.update(sorted_ids.join(",").as_bytes());
    hasher.update(b"\n");
    hasher.update([
        u8::from(modes.rerank),
        u8::from(modes.verify),
        u8::from(modes.highlights),
    ]);

    let digest = hasher.finalize();
    digest.iter().map(|byte| format!("{byte:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fingerprint_is_stable() {
        let modes = QueryModes::default();
        let a = query_fingerprint("What is MMR?", &["s1".into(), "s2".into()], modes);
        let b = query_fingerprint("What is MMR?", &["s1".into(), "s2".into()], modes);
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_ignores_source_order_and_whitespace() {
        let modes = QueryModes::default();
        let a = query_fingerprint("What   is\tMMR?", &["s2".into(), "s1".into()], modes);
        let b = query_fingerprint("what is mmr?", &["s1".into(), "s2".into()], modes);
        assert_eq!(a, b);
    }

    #[test]
    fn fingerprint_varies_with_modes() {
        let base = QueryModes::default();
        let verified = QueryModes {
            verify: true,
            ..QueryModes::default()
        };
        let ids = vec!["s1".to_string()];
        assert_ne!(
            query_fingerprint("q", &ids, base),
            query_fingerprint("q", &ids, verified)
        );
    }
}
