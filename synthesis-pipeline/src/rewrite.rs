use crate::types::{
    is_insufficient_evidence_answer, AnswerStyle, Claim, Evidence, EvidenceRelation, Verdict,
    VerificationSummary, CONTRADICTION_PREFIX,
};

/// Restructures the answer when verification found contradictions: the
/// literal prefix line, then `Supported:` / `Conflicts:` / `Unsupported:`
/// sections (empty ones omitted), each claim with its most salient evidence
/// snippet. Without contradictions the answer passes through and only the
/// style is settled. Always leaves
/// `summary.answer_style == returned style`.
pub fn rewrite_answer(
    answer_text: &str,
    claims: &[Claim],
    summary: &mut VerificationSummary,
) -> (String, AnswerStyle) {
    let clean_answer = answer_text
        .strip_prefix(CONTRADICTION_PREFIX)
        .map(|rest| rest.trim_start().to_string())
        .unwrap_or_else(|| answer_text.to_string());

    if !summary.has_contradictions {
        let style = if is_insufficient_evidence_answer(&clean_answer) {
            AnswerStyle::InsufficientEvidence
        } else {
            AnswerStyle::Direct
        };
        summary.answer_style = style;
        return (clean_answer, style);
    }

    let supported: Vec<&Claim> = claims
        .iter()
        .filter(|claim| matches!(claim.verdict, Verdict::Supports | Verdict::WeakSupport))
        .collect();
    let conflicted: Vec<&Claim> = claims
        .iter()
        .filter(|claim| matches!(claim.verdict, Verdict::Contradicted | Verdict::Conflicting))
        .collect();
    let unsupported: Vec<&Claim> = claims
        .iter()
        .filter(|claim| claim.verdict == Verdict::Unsupported)
        .collect();

    let mut sections = Vec::new();
    if !supported.is_empty() {
        sections.push(format_section("Supported:", &supported));
    }
    if !conflicted.is_empty() {
        sections.push(format_section("Conflicts:", &conflicted));
    }
    if !unsupported.is_empty() {
        sections.push(format_section("Unsupported:", &unsupported));
    }

    if sections.is_empty() {
        // Contradiction counts without claim rows; nothing to restructure.
        summary.answer_style = AnswerStyle::Direct;
        return (clean_answer, AnswerStyle::Direct);
    }

    let body = sections.join("\n\n");
    summary.answer_style = AnswerStyle::Contradictions;
    (
        format!("{CONTRADICTION_PREFIX}\n{body}"),
        AnswerStyle::Contradictions,
    )
}

fn format_section(title: &str, claims: &[&Claim]) -> String {
    let mut lines = vec![title.to_string()];
    for claim in claims {
        match salient_evidence(claim) {
            Some(evidence) if !evidence.snippet.is_empty() => lines.push(format!(
                "- {} (evidence: \"{}\")",
                claim.claim_text, evidence.snippet
            )),
            _ => lines.push(format!("- {}", claim.claim_text)),
        }
    }
    lines.join("\n")
}

/// For contradicted claims the contradicting snippet is the interesting one;
/// otherwise the first supporting snippet wins.
fn salient_evidence(claim: &Claim) -> Option<&Evidence> {
    let preferred_relation = match claim.verdict {
        Verdict::Contradicted | Verdict::Conflicting => EvidenceRelation::Contradicts,
        _ => EvidenceRelation::Supports,
    };
    claim
        .evidence
        .iter()
        .find(|evidence| evidence.relation == preferred_relation)
        .or_else(|| claim.evidence.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::verify::summarize_claims;

    fn claim(text: &str, verdict: Verdict, evidence: Vec<Evidence>) -> Claim {
        Claim {
            claim_text: text.to_string(),
            verdict,
            support_score: 0.5,
            contradiction_score: 0.0,
            evidence,
        }
    }

    fn evidence(relation: EvidenceRelation, snippet: &str) -> Evidence {
        Evidence {
            chunk_id: "c1".into(),
            relation,
            snippet: snippet.to_string(),
            snippet_start: Some(0),
            snippet_end: Some(snippet.len()),
            highlight_start: None,
            highlight_end: None,
            highlight_text: None,
        }
    }

    #[test]
    fn no_contradictions_passes_through_with_style() {
        let claims = vec![claim("All good.", Verdict::Supports, vec![])];
        let mut summary = summarize_claims(&claims, "All good.");
        let (text, style) = rewrite_answer("All good.", &claims, &mut summary);
        assert_eq!(text, "All good.");
        assert_eq!(style, AnswerStyle::Direct);
        assert_eq!(summary.answer_style, style);
    }

    #[test]
    fn contradictions_produce_prefixed_sections() {
        let claims = vec![
            claim(
                "The bridge opened in 1901.",
                Verdict::Contradicted,
                vec![evidence(EvidenceRelation::Contradicts, "built in 1950")],
            ),
            claim(
                "It spans the river.",
                Verdict::Supports,
                vec![evidence(EvidenceRelation::Supports, "spans the river")],
            ),
            claim("It is painted green.", Verdict::Unsupported, vec![]),
        ];
        let mut summary = summarize_claims(&claims, "original answer");
        let (text, style) = rewrite_answer("original answer", &claims, &mut summary);

        assert!(text.starts_with(CONTRADICTION_PREFIX));
        assert_eq!(style, AnswerStyle::Contradictions);
        assert_eq!(summary.answer_style, style);

        let after_prefix = text.strip_prefix(CONTRADICTION_PREFIX).unwrap();
        assert!(after_prefix.starts_with('\n'));

        let supported_at = text.find("Supported:").expect("supported section");
        let conflicts_at = text.find("Conflicts:").expect("conflicts section");
        let unsupported_at = text.find("Unsupported:").expect("unsupported section");
        assert!(supported_at < conflicts_at && conflicts_at < unsupported_at);

        assert!(text.contains("- It spans the river. (evidence: \"spans the river\")"));
        assert!(text.contains("- The bridge opened in 1901. (evidence: \"built in 1950\")"));
        assert!(text.contains("- It is painted green."));
    }

    #[test]
    fn empty_sections_are_omitted() {
        let claims = vec![claim(
            "Contradicted claim.",
            Verdict::Contradicted,
            vec![],
        )];
        let mut summary = summarize_claims(&claims, "answer");
        let (text, _) = rewrite_answer("answer", &claims, &mut summary);
        assert!(!text.contains("Supported:"));
        assert!(text.contains("Conflicts:"));
        assert!(!text.contains("Unsupported:"));
    }

    #[test]
    fn rewrite_is_idempotent_on_already_prefixed_answers() {
        let claims = vec![claim(
            "Numbers disagree.",
            Verdict::Conflicting,
            vec![evidence(EvidenceRelation::Contradicts, "other number")],
        )];
        let mut summary = summarize_claims(&claims, "whatever");
        let (first, _) = rewrite_answer("whatever", &claims, &mut summary);
        let (second, _) = rewrite_answer(&first, &claims, &mut summary);
        assert_eq!(first, second);
        assert_eq!(
            first.matches(CONTRADICTION_PREFIX).count(),
            1,
            "prefix must not stack"
        );
    }

    #[test]
    fn insufficient_evidence_style_survives_without_contradictions() {
        let claims: Vec<Claim> = vec![];
        let mut summary = summarize_claims(&claims, "insufficient evidence. etc");
        let (text, style) =
            rewrite_answer("insufficient evidence. etc", &claims, &mut summary);
        assert_eq!(style, AnswerStyle::InsufficientEvidence);
        assert_eq!(summary.answer_style, style);
        assert_eq!(text, "insufficient evidence. etc");
    }
}
