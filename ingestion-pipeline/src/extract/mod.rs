pub mod pdf;
pub mod url;

use common::{
    error::AppError,
    storage::{files::SourceFileStore, types::source::{Source, SourceType}},
    utils::{config::AppConfig, text::normalize_text},
};

use crate::chunker::PageText;

/// Cleaned pages ready for chunking.
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub pages: Vec<PageText>,
}

/// Reads the stored payload for a source and turns it into cleaned page
/// texts. Size caps are enforced here; violations are validation errors and
/// therefore terminal for the ingestion task.
pub async fn extract_source(
    source: &Source,
    files: &SourceFileStore,
    config: &AppConfig,
) -> Result<ExtractedDocument, AppError> {
    let payload = files
        .get(&source.id, source.source_type.file_extension())
        .await?;

    let pages = match source.source_type {
        SourceType::Pdf => {
            if config.max_pdf_bytes > 0 && payload.len() > config.max_pdf_bytes {
                let max_mb = config.max_pdf_bytes as f64 / (1024.0 * 1024.0);
                return Err(AppError::Validation(format!(
                    "PDF exceeds max size of {max_mb:.1} MB. Please upload a smaller file."
                )));
            }
            let max_pages = config.max_pdf_pages;
            let bytes = payload.to_vec();
            tokio::task::spawn_blocking(move || pdf::extract_pdf_pages(&bytes, max_pages))
                .await??
        }
        SourceType::Text => {
            if config.max_text_bytes > 0 && payload.len() > config.max_text_bytes {
                return Err(AppError::Validation(format!(
                    "Text exceeds max size of {} bytes.",
                    config.max_text_bytes
                )));
            }
            let text = String::from_utf8_lossy(&payload);
            pages_from_text(&text)?
        }
        SourceType::Url => {
            let stored_url = String::from_utf8_lossy(&payload).trim().to_string();
            if stored_url.is_empty() {
                return Err(AppError::Validation("Missing URL payload for source.".into()));
            }
            let parsed = ::url::Url::parse(&stored_url)
                .map_err(|_| AppError::Validation("Invalid URL".to_string()))?;
            // Re-validate at ingest time: the allowlist may have changed since
            // the source was accepted.
            url::ensure_ingestion_url_allowed(&parsed, &config.allowed_url_hosts())
                .map_err(|err| AppError::Validation(err.to_string()))?;
            let text = url::fetch_url_text(&stored_url, config.max_url_bytes).await?;
            pages_from_text(&text)?
        }
    };

    Ok(ExtractedDocument { pages })
}

fn pages_from_text(raw: &str) -> Result<Vec<PageText>, AppError> {
    let cleaned = normalize_text(raw);
    if cleaned.is_empty() {
        return Err(AppError::Validation(
            "No extractable text found. Please provide a longer input.".into(),
        ));
    }
    Ok(vec![PageText {
        number: 1,
        text: cleaned,
    }])
}
