use common::{error::AppError, utils::text::normalize_text};
use lopdf::Document;
use tracing::debug;

use crate::chunker::PageText;

/// Parses PDF bytes into per-page cleaned text. Uses `lopdf` for page-level
/// extraction and falls back to `pdf-extract` over the whole document when
/// the per-page text layer comes back empty.
pub fn extract_pdf_pages(bytes: &[u8], max_pages: usize) -> Result<Vec<PageText>, AppError> {
    let document = Document::load_mem(bytes)
        .map_err(|err| AppError::Validation(format!("Failed to parse PDF: {err}")))?;

    if document.is_encrypted() {
        return Err(AppError::Validation(
            "PDF is encrypted. Please upload an unencrypted PDF.".into(),
        ));
    }

    let mut page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
    page_numbers.sort_unstable();

    if max_pages > 0 && page_numbers.len() > max_pages {
        return Err(AppError::Validation(format!(
            "PDF exceeds max page count of {max_pages}. Please upload a shorter document."
        )));
    }

    let mut pages = Vec::with_capacity(page_numbers.len());
    for number in &page_numbers {
        let raw = document.extract_text(&[*number]).unwrap_or_default();
        let cleaned = normalize_text(&raw);
        if !cleaned.is_empty() {
            pages.push(PageText {
                number: *number,
                text: cleaned,
            });
        }
    }

    if pages.is_empty() {
        debug!("per-page extraction empty; trying whole-document text layer");
        let whole = pdf_extract::extract_text_from_mem(bytes)
            .map(|text| normalize_text(&text))
            .unwrap_or_default();
        if !whole.is_empty() {
            pages.push(PageText {
                number: 1,
                text: whole,
            });
        }
    }

    if pages.is_empty() {
        return Err(AppError::Validation(
            "No extractable text found. If this is a scanned PDF, run OCR and re-upload.".into(),
        ));
    }

    Ok(pages)
}
