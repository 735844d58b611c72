use serde_json::Value;
use tracing::{info, warn};

use crate::{error::AppError, storage::db::SurrealDbClient};

const FTS_ANALYZER_NAME: &str = "app_en_fts_analyzer";
const CHUNK_FTS_INDEX: &str = "text_chunk_fts_text_idx";
const CHUNK_HNSW_INDEX: &str = "idx_embedding_text_chunk";

/// Build runtime Surreal indexes (FTS + HNSW + lookup indexes). Idempotent;
/// overwrites the HNSW definition when the embedding dimension changes.
pub async fn ensure_runtime_indexes(
    db: &SurrealDbClient,
    embedding_dimension: usize,
) -> Result<(), AppError> {
    create_fts_analyzer(db).await?;

    let fts_definition = format!(
        "DEFINE INDEX IF NOT EXISTS {CHUNK_FTS_INDEX} ON TABLE text_chunk \
         FIELDS text SEARCH ANALYZER {FTS_ANALYZER_NAME} BM25;"
    );
    db.client
        .query(fts_definition)
        .await?
        .check()
        .map_err(AppError::Database)?;

    let hnsw_keyword = match existing_hnsw_dimension(db).await? {
        Some(existing) if existing == embedding_dimension => None,
        Some(existing) => {
            info!(
                existing_dimension = existing,
                target_dimension = embedding_dimension,
                "Overwriting chunk HNSW index to match new embedding dimension"
            );
            Some("OVERWRITE")
        }
        None => Some("IF NOT EXISTS"),
    };
    if let Some(keyword) = hnsw_keyword {
        let hnsw_definition = format!(
            "DEFINE INDEX {keyword} {CHUNK_HNSW_INDEX} ON TABLE text_chunk \
             FIELDS embedding HNSW DIMENSION {embedding_dimension} DIST COSINE TYPE F32 EFC 100 M 8;"
        );
        db.client
            .query(hnsw_definition)
            .await?
            .check()
            .map_err(AppError::Database)?;
    }

    let lookup_definitions = "
        DEFINE INDEX IF NOT EXISTS idx_chunk_source ON TABLE text_chunk FIELDS source_id;
        DEFINE INDEX IF NOT EXISTS idx_source_status ON TABLE source FIELDS status;
        DEFINE INDEX IF NOT EXISTS idx_job_status ON TABLE job FIELDS status;
        DEFINE INDEX IF NOT EXISTS idx_job_created ON TABLE job FIELDS created_at;
    ";
    db.client
        .query(lookup_definitions)
        .await?
        .check()
        .map_err(AppError::Database)?;

    Ok(())
}

/// Rebuild the chunk FTS index. Tests call this after bulk inserts so BM25
/// statistics are current before asserting on scores.
pub async fn rebuild_indexes(db: &SurrealDbClient) -> Result<(), AppError> {
    db.client
        .query(format!(
            "REBUILD INDEX IF EXISTS {CHUNK_FTS_INDEX} ON text_chunk"
        ))
        .await?
        .check()
        .map_err(AppError::Database)?;
    Ok(())
}

/// Dimension of the existing chunk HNSW index, if any.
pub async fn existing_hnsw_dimension(db: &SurrealDbClient) -> Result<Option<usize>, AppError> {
    let mut response = db.client.query("INFO FOR TABLE text_chunk;").await?;
    let info: surrealdb::Value = response
        .take(0)
        .map_err(|err| AppError::InternalError(format!("failed to read table info: {err}")))?;
    let info_json: Value = serde_json::to_value(info)
        .map_err(|err| AppError::InternalError(format!("table info not serializable: {err}")))?;

    let definition = info_json
        .get("Object")
        .and_then(|o| o.get("indexes"))
        .and_then(|i| i.get("Object"))
        .and_then(|i| i.get(CHUNK_HNSW_INDEX))
        .and_then(|d| d.get("Strand"))
        .and_then(|v| v.as_str())
        .map(str::to_string);

    Ok(definition.as_deref().and_then(extract_dimension))
}

fn extract_dimension(definition: &str) -> Option<usize> {
    definition
        .split("DIMENSION")
        .nth(1)
        .and_then(|rest| rest.split_whitespace().next())
        .and_then(|token| token.trim_end_matches(';').parse::<usize>().ok())
}

async fn create_fts_analyzer(db: &SurrealDbClient) -> Result<(), AppError> {
    // Prefer snowball stemming; fall back to ascii-only when the filter is
    // unavailable in the running Surreal build.
    let snowball_query = format!(
        "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME}
            TOKENIZERS class
            FILTERS lowercase, ascii, snowball(english);"
    );

    match db.client.query(snowball_query).await {
        Ok(res) => {
            if res.check().is_ok() {
                return Ok(());
            }
            warn!("Snowball analyzer check failed; using ascii fallback");
        }
        Err(err) => {
            warn!(error = %err, "Snowball analyzer creation errored; using ascii fallback");
        }
    }

    let fallback_query = format!(
        "DEFINE ANALYZER IF NOT EXISTS {FTS_ANALYZER_NAME}
            TOKENIZERS class
            FILTERS lowercase, ascii;"
    );
    db.client
        .query(fallback_query)
        .await?
        .check()
        .map_err(AppError::Database)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn extract_dimension_parses_definition() {
        let definition = "DEFINE INDEX idx_embedding_text_chunk ON TABLE text_chunk \
             FIELDS embedding HNSW DIMENSION 1536 DIST COSINE TYPE F32 EFC 100 M 8;";
        assert_eq!(extract_dimension(definition), Some(1536));
    }

    #[tokio::test]
    async fn ensure_runtime_indexes_is_idempotent() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("indexes_ns", database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 16)
            .await
            .expect("initial index creation");
        ensure_runtime_indexes(&db, 16)
            .await
            .expect("second index creation");
    }

    #[tokio::test]
    async fn ensure_runtime_indexes_overwrites_dimension() {
        let database = &Uuid::new_v4().to_string();
        let db = SurrealDbClient::memory("indexes_dim", database)
            .await
            .expect("in-memory db");

        ensure_runtime_indexes(&db, 16)
            .await
            .expect("initial index creation");
        ensure_runtime_indexes(&db, 8)
            .await
            .expect("overwritten index creation");

        let dimension = existing_hnsw_dimension(&db).await.expect("dimension");
        assert_eq!(dimension, Some(8));
    }
}
