use uuid::Uuid;

use crate::{error::AppError, storage::db::SurrealDbClient, stored_object};

stored_object!(TextChunk, "text_chunk", {
    source_id: String,
    ordinal: usize,
    page_start: Option<u32>,
    page_end: Option<u32>,
    #[serde(default)]
    section_path: Vec<String>,
    text: String,
    #[serde(default)]
    char_start: Option<usize>,
    #[serde(default)]
    char_end: Option<usize>,
    embedding: Vec<f32>
});

/// Search hit with the raw store score attached.
#[allow(clippy::module_name_repetitions)]
#[derive(Debug, Clone, PartialEq)]
pub struct TextChunkSearchResult {
    pub chunk: TextChunk,
    pub score: f32,
}

#[derive(Deserialize)]
struct SearchRow {
    #[serde(deserialize_with = "deserialize_flexible_id")]
    id: String,
    #[serde(deserialize_with = "deserialize_datetime", default)]
    created_at: DateTime<Utc>,
    #[serde(deserialize_with = "deserialize_datetime", default)]
    updated_at: DateTime<Utc>,
    source_id: String,
    ordinal: usize,
    page_start: Option<u32>,
    page_end: Option<u32>,
    #[serde(default)]
    section_path: Vec<String>,
    text: String,
    #[serde(default)]
    char_start: Option<usize>,
    #[serde(default)]
    char_end: Option<usize>,
    embedding: Vec<f32>,
    score: f32,
}

impl From<SearchRow> for TextChunkSearchResult {
    fn from(row: SearchRow) -> Self {
        TextChunkSearchResult {
            chunk: TextChunk {
                id: row.id,
                created_at: row.created_at,
                updated_at: row.updated_at,
                source_id: row.source_id,
                ordinal: row.ordinal,
                page_start: row.page_start,
                page_end: row.page_end,
                section_path: row.section_path,
                text: row.text,
                char_start: row.char_start,
                char_end: row.char_end,
                embedding: row.embedding,
            },
            score: row.score,
        }
    }
}

impl TextChunk {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        source_id: String,
        ordinal: usize,
        page_start: Option<u32>,
        page_end: Option<u32>,
        section_path: Vec<String>,
        text: String,
        char_start: usize,
        char_end: usize,
        embedding: Vec<f32>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: now,
            updated_at: now,
            source_id,
            ordinal,
            page_start,
            page_end,
            section_path,
            text,
            char_start: Some(char_start),
            char_end: Some(char_end),
            embedding,
        }
    }

    /// Atomically replaces all chunks of a source. Re-running an ingestion is
    /// therefore idempotent: prior chunks vanish in the same transaction that
    /// writes the new set.
    pub async fn replace_for_source(
        source_id: &str,
        chunks: Vec<TextChunk>,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        let response = db
            .client
            .query("BEGIN TRANSACTION;")
            .query("DELETE text_chunk WHERE source_id = $source_id;")
            .query(
                "FOR $chunk IN $chunks {
                     CREATE type::thing('text_chunk', $chunk.id) CONTENT $chunk;
                 };",
            )
            .query("COMMIT TRANSACTION;")
            .bind(("source_id", source_id.to_string()))
            .bind(("chunks", chunks))
            .await?;

        response.check().map_err(AppError::Database)?;
        Ok(())
    }

    pub async fn delete_by_source_id(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<(), AppError> {
        db.client
            .query("DELETE text_chunk WHERE source_id = $source_id")
            .bind(("source_id", source_id.to_string()))
            .await?
            .check()?;
        Ok(())
    }

    /// All chunks of a source in ordinal order.
    pub async fn by_source_ordered(
        source_id: &str,
        db: &SurrealDbClient,
    ) -> Result<Vec<Self>, AppError> {
        let mut response = db
            .client
            .query("SELECT * FROM text_chunk WHERE source_id = $source_id ORDER BY ordinal ASC")
            .bind(("source_id", source_id.to_string()))
            .await?;
        Ok(response.take(0)?)
    }

    pub async fn get_by_ids(ids: &[String], db: &SurrealDbClient) -> Result<Vec<Self>, AppError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let things: Vec<Thing> = ids
            .iter()
            .map(|id| Thing::from(("text_chunk", id.as_str())))
            .collect();
        let mut response = db
            .client
            .query("SELECT * FROM text_chunk WHERE id IN $ids")
            .bind(("ids", things))
            .await?;
        Ok(response.take(0)?)
    }

    /// Top-k chunks by cosine similarity to the query embedding, optionally
    /// restricted to a set of sources.
    pub async fn vector_search(
        take: usize,
        query_embedding: Vec<f32>,
        source_ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<Vec<TextChunkSearchResult>, AppError> {
        let source_filter = if source_ids.is_empty() {
            ""
        } else {
            "AND source_id IN $source_ids"
        };
        let sql = format!(
            "SELECT *, vector::similarity::cosine(embedding, $embedding) AS score
             FROM text_chunk
             WHERE embedding <|{take},100|> $embedding
               {source_filter}
             ORDER BY score DESC
             LIMIT {take}"
        );

        let mut response = db
            .client
            .query(sql)
            .bind(("embedding", query_embedding))
            .bind(("source_ids", source_ids.to_vec()))
            .await
            .map_err(|e| AppError::InternalError(format!("vector search failed: {e}")))?;

        let rows: Vec<SearchRow> = response.take::<Vec<SearchRow>>(0).unwrap_or_default();
        Ok(rows.into_iter().map(TextChunkSearchResult::from).collect())
    }

    /// Top-k chunks by BM25 full-text score over chunk text.
    pub async fn fts_search(
        take: usize,
        terms: &str,
        source_ids: &[String],
        db: &SurrealDbClient,
    ) -> Result<Vec<TextChunkSearchResult>, AppError> {
        let source_filter = if source_ids.is_empty() {
            ""
        } else {
            "AND source_id IN $source_ids"
        };
        let sql = format!(
            "SELECT *, IF search::score(0) != NONE THEN search::score(0) ELSE 0 END AS score
             FROM text_chunk
             WHERE text @0@ $terms
               {source_filter}
             ORDER BY score DESC
             LIMIT $limit"
        );

        let mut response = db
            .client
            .query(sql)
            .bind(("terms", terms.to_string()))
            .bind(("source_ids", source_ids.to_vec()))
            .bind(("limit", take as i64))
            .await
            .map_err(|e| AppError::InternalError(format!("fts search failed: {e}")))?;

        let response = response.check().map_err(AppError::Database);
        let rows: Vec<SearchRow> = match response {
            Ok(mut checked) => checked.take::<Vec<SearchRow>>(0).unwrap_or_default(),
            // An FTS query against a not-yet-indexed table is not fatal.
            Err(_) => Vec::new(),
        };
        Ok(rows.into_iter().map(TextChunkSearchResult::from).collect())
    }
}
