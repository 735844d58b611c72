use uuid::Uuid;

use crate::{
    stored_object,
    utils::fingerprint::{query_fingerprint, QueryModes},
};

stored_object!(UserQuery, "user_query", {
    question: String,
    source_ids: Vec<String>,
    fingerprint: String,
    rerank: bool,
    verify: bool,
    highlights: bool
});

impl UserQuery {
    pub fn new(question: String, source_ids: Vec<String>, modes: QueryModes) -> Self {
        let now = Utc::now();
        let fingerprint = query_fingerprint(&question, &source_ids, modes);
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            question,
            source_ids,
            fingerprint,
            rerank: modes.rerank,
            verify: modes.verify,
            highlights: modes.highlights,
        }
    }
}
