pub mod highlights;
pub mod hydration;
pub mod prompt;
pub mod rewrite;
pub mod snippet;
pub mod synthesizer;
pub mod types;
pub mod verify;

pub use types::{
    AnswerResponse, AnswerStyle, Citation, CitationGroup, Claim, Evidence, EvidenceRelation,
    OverallVerdict, Verdict, VerificationSummary, CONTRADICTION_PREFIX,
};
