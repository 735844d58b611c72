use common::storage::types::answer::AnswerRecord;
use serde_json::Value;
use tracing::warn;

use crate::{
    synthesizer::group_citations,
    types::{
        infer_answer_style, AnswerResponse, AnswerStyle, Citation, Claim, Evidence,
        OverallVerdict, VerificationSummary,
    },
    verify::summarize_claims,
};

/// Reconstructs a wire response from a persisted answer row, repairing
/// historically diverse payloads without writing anything back. The stored
/// payload is treated leniently; the returned response is always internally
/// consistent (summary counts match claims, styles agree).
pub fn hydrate_answer(
    record: &AnswerRecord,
    include_groups: bool,
    include_highlights: bool,
) -> AnswerResponse {
    let raw = match &record.raw_citations {
        Value::Object(map) => Value::Object(map.clone()),
        _ => Value::Object(serde_json::Map::new()),
    };

    let citations = coerce_citations(raw.get("citations"));
    let citations_count = match raw.get("ids") {
        Some(Value::Array(ids)) => ids.len(),
        _ => citations.len(),
    };

    let mut claims = coerce_claims(raw.get("claims"));
    if !include_highlights {
        for claim in claims.iter_mut() {
            for evidence in claim.evidence.iter_mut() {
                evidence.highlight_start = None;
                evidence.highlight_end = None;
                evidence.highlight_text = None;
            }
        }
    }

    let raw_summary = raw.get("verification_summary").and_then(Value::as_object);
    let raw_style = raw
        .get("answer_style")
        .and_then(Value::as_str)
        .and_then(parse_style);

    let mut repaired = false;
    let mut summary = if claims.is_empty() {
        coerce_summary(raw_summary).unwrap_or_else(|| {
            VerificationSummary::neutral(if citations_count > 0 {
                AnswerStyle::Direct
            } else {
                AnswerStyle::InsufficientEvidence
            })
        })
    } else {
        let recomputed = summarize_claims(&claims, &record.answer_text);
        if let Some(raw_summary) = raw_summary {
            if !counts_match(raw_summary, &recomputed) {
                repaired = true;
            }
        }
        recomputed
    };

    let style = infer_answer_style(&record.answer_text, citations_count);
    if let Some(raw_style) = raw_style {
        if raw_style != style {
            repaired = true;
        }
    }
    summary.answer_style = style;

    if repaired {
        warn!(
            answer_id = %record.id,
            "verification_summary_inconsistent: repaired stored answer payload on read"
        );
    }

    let citation_groups = include_groups.then(|| group_citations(&citations));

    AnswerResponse {
        answer_id: record.id.clone(),
        query_id: record.query_id.clone(),
        answer_text: record.answer_text.clone(),
        citations,
        citation_groups,
        claims,
        verification_summary: summary,
        answer_style: style,
    }
}

/// Serializes the write-side payload stored in `raw_citations`. The read side
/// must be able to reconstruct the full response from this blob alone.
pub fn build_raw_citations(
    cited_ids: &[String],
    citations: &[Citation],
    claims: &[Claim],
    summary: &VerificationSummary,
    style: AnswerStyle,
) -> Value {
    serde_json::json!({
        "ids": cited_ids,
        "citations": citations,
        "claims": claims,
        "verification_summary": summary,
        "answer_style": style,
    })
}

fn parse_style(raw: &str) -> Option<AnswerStyle> {
    serde_json::from_value(Value::String(raw.trim().to_ascii_lowercase())).ok()
}

fn coerce_citations(raw: Option<&Value>) -> Vec<Citation> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| serde_json::from_value::<Citation>(item.clone()).ok())
        .collect()
}

fn coerce_claims(raw: Option<&Value>) -> Vec<Claim> {
    let Some(Value::Array(items)) = raw else {
        return Vec::new();
    };
    items
        .iter()
        .filter_map(|item| {
            let claim = serde_json::from_value::<Claim>(item.clone()).ok()?;
            Some(Claim {
                support_score: claim.support_score.clamp(0.0, 1.0),
                contradiction_score: claim.contradiction_score.clamp(0.0, 1.0),
                evidence: claim.evidence.into_iter().map(sanitize_evidence).collect(),
                ..claim
            })
        })
        .collect()
}

/// Highlight fields must describe a real span or be null together.
fn sanitize_evidence(mut evidence: Evidence) -> Evidence {
    let valid = matches!(
        (
            evidence.highlight_start,
            evidence.highlight_end,
            evidence.highlight_text.as_ref(),
        ),
        (Some(start), Some(end), Some(_)) if start < end
    );
    if !valid {
        evidence.highlight_start = None;
        evidence.highlight_end = None;
        evidence.highlight_text = None;
    }
    evidence
}

fn coerce_summary(raw: Option<&serde_json::Map<String, Value>>) -> Option<VerificationSummary> {
    let raw = raw?;
    let count = |key: &str| -> usize {
        raw.get(key)
            .and_then(Value::as_u64)
            .map(|value| value as usize)
            .unwrap_or(0)
    };

    let supported_count = count("supported_count");
    let weak_support_count = count("weak_support_count");
    let unsupported_count = count("unsupported_count");
    let contradicted_count = count("contradicted_count");
    let conflicting_count = count("conflicting_count");
    let has_contradictions = contradicted_count + conflicting_count > 0;

    let overall_verdict = raw
        .get("overall_verdict")
        .and_then(Value::as_str)
        .and_then(|value| {
            serde_json::from_value(Value::String(value.trim().to_ascii_lowercase())).ok()
        })
        .unwrap_or(OverallVerdict::Unknown);

    Some(VerificationSummary {
        supported_count,
        weak_support_count,
        unsupported_count,
        contradicted_count,
        conflicting_count,
        has_contradictions,
        overall_verdict,
        answer_style: AnswerStyle::Direct,
    })
}

fn counts_match(raw: &serde_json::Map<String, Value>, recomputed: &VerificationSummary) -> bool {
    let matches = |key: &str, expected: usize| {
        raw.get(key)
            .and_then(Value::as_u64)
            .map(|value| value as usize == expected)
            .unwrap_or(false)
    };
    matches("supported_count", recomputed.supported_count)
        && matches("weak_support_count", recomputed.weak_support_count)
        && matches("unsupported_count", recomputed.unsupported_count)
        && matches("contradicted_count", recomputed.contradicted_count)
        && matches("conflicting_count", recomputed.conflicting_count)
}
