use serde::{Deserialize, Serialize};

/// First line of every contradiction-rewritten answer.
pub const CONTRADICTION_PREFIX: &str = "Contradictions detected in the source material.";

/// Canonical lead of the fallback answer.
pub const INSUFFICIENT_EVIDENCE: &str = "insufficient evidence";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerStyle {
    Direct,
    InsufficientEvidence,
    Contradictions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Supports,
    WeakSupport,
    Unsupported,
    Contradicted,
    Conflicting,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverallVerdict {
    Supported,
    WeaklySupported,
    Unsupported,
    Contradicted,
    /// Neutral default for hydrated legacy rows without claims.
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceRelation {
    Supports,
    Contradicts,
    Related,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: String,
    pub source_id: String,
    pub source_title: Option<String>,
    pub page_start: Option<u32>,
    pub page_end: Option<u32>,
    #[serde(default)]
    pub section_path: Vec<String>,
    pub snippet: String,
    pub snippet_start: Option<usize>,
    pub snippet_end: Option<usize>,
    /// Offsets into the cleaned source text; null when the chunk predates
    /// char-offset tracking.
    pub absolute_start: Option<usize>,
    pub absolute_end: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationGroup {
    pub source_id: String,
    pub source_title: Option<String>,
    pub citations: Vec<Citation>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub chunk_id: String,
    pub relation: EvidenceRelation,
    pub snippet: String,
    pub snippet_start: Option<usize>,
    pub snippet_end: Option<usize>,
    /// Byte offsets into the stored full chunk text, independent of snippet
    /// offsets. Filled on highlights endpoints only.
    #[serde(default)]
    pub highlight_start: Option<usize>,
    #[serde(default)]
    pub highlight_end: Option<usize>,
    #[serde(default)]
    pub highlight_text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_text: String,
    pub verdict: Verdict,
    pub support_score: f32,
    pub contradiction_score: f32,
    #[serde(default)]
    pub evidence: Vec<Evidence>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    pub supported_count: usize,
    pub weak_support_count: usize,
    pub unsupported_count: usize,
    pub contradicted_count: usize,
    pub conflicting_count: usize,
    pub has_contradictions: bool,
    pub overall_verdict: OverallVerdict,
    pub answer_style: AnswerStyle,
}

impl VerificationSummary {
    /// Neutral summary for answers that never went through verification.
    pub fn neutral(answer_style: AnswerStyle) -> Self {
        Self {
            supported_count: 0,
            weak_support_count: 0,
            unsupported_count: 0,
            contradicted_count: 0,
            conflicting_count: 0,
            has_contradictions: false,
            overall_verdict: OverallVerdict::Unknown,
            answer_style,
        }
    }
}

/// Wire shape of a persisted or freshly produced answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerResponse {
    pub answer_id: String,
    pub query_id: String,
    pub answer_text: String,
    pub citations: Vec<Citation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub citation_groups: Option<Vec<CitationGroup>>,
    pub claims: Vec<Claim>,
    pub verification_summary: VerificationSummary,
    pub answer_style: AnswerStyle,
}

/// True for answers that lead with the canonical fallback text.
pub fn is_insufficient_evidence_answer(answer: &str) -> bool {
    answer
        .trim_start()
        .to_ascii_lowercase()
        .starts_with(INSUFFICIENT_EVIDENCE)
}

/// Style implied by the answer text and citation count alone. The
/// contradiction prefix dominates, then the fallback lead, then direct.
pub fn infer_answer_style(answer_text: &str, citations_count: usize) -> AnswerStyle {
    if answer_text.trim_start().starts_with(CONTRADICTION_PREFIX) {
        AnswerStyle::Contradictions
    } else if is_insufficient_evidence_answer(answer_text) || citations_count == 0 {
        AnswerStyle::InsufficientEvidence
    } else {
        AnswerStyle::Direct
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enums_serialize_to_snake_case() {
        assert_eq!(
            serde_json::to_string(&Verdict::WeakSupport).unwrap(),
            "\"weak_support\""
        );
        assert_eq!(
            serde_json::to_string(&OverallVerdict::WeaklySupported).unwrap(),
            "\"weakly_supported\""
        );
        assert_eq!(
            serde_json::to_string(&AnswerStyle::InsufficientEvidence).unwrap(),
            "\"insufficient_evidence\""
        );
        assert_eq!(
            serde_json::to_string(&EvidenceRelation::Contradicts).unwrap(),
            "\"contradicts\""
        );
    }

    #[test]
    fn insufficient_detection_is_case_insensitive() {
        assert!(is_insufficient_evidence_answer(
            "Insufficient evidence. Suggested follow-ups: none"
        ));
        assert!(is_insufficient_evidence_answer("  insufficient evidence"));
        assert!(!is_insufficient_evidence_answer("The answer is 42."));
    }

    #[test]
    fn style_inference_prioritizes_the_prefix() {
        let rewritten = format!("{CONTRADICTION_PREFIX}\nSupported:\n- a");
        assert_eq!(infer_answer_style(&rewritten, 3), AnswerStyle::Contradictions);
        assert_eq!(
            infer_answer_style("insufficient evidence. etc", 0),
            AnswerStyle::InsufficientEvidence
        );
        assert_eq!(
            infer_answer_style("A grounded answer.", 0),
            AnswerStyle::InsufficientEvidence
        );
        assert_eq!(infer_answer_style("A grounded answer.", 2), AnswerStyle::Direct);
    }
}
