use axum::http::StatusCode;
use lopdf::{dictionary, Document, Object, Stream};
use serde_json::Value;

use test_utils::*;

/// Builds a simple multi-page PDF with one text run per page.
fn build_pdf(pages: &[String]) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::with_capacity(pages.len());
    for text in pages {
        let content = format!("BT /F1 12 Tf 72 720 Td ({text}) Tj ET");
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        });
        kids.push(page_id.into());
    }

    let kids_count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => kids_count,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes).expect("save pdf");
    bytes
}

fn sample_page(topic: &str, sentences: usize) -> String {
    let mut out = String::new();
    for i in 0..sentences {
        out.push_str(&format!(
            "The {topic} section describes finding number {i} in careful detail. "
        ));
    }
    out
}

#[tokio::test]
async fn uploaded_pdf_reaches_ready_with_chunks() {
    let app = spawn_app().await;
    let pdf = build_pdf(&[
        sample_page("introduction", 12),
        sample_page("methodology", 12),
        sample_page("conclusion", 12),
    ]);

    let response = app
        .server
        .post("/sources/upload")
        .multipart(
            axum_test::multipart::MultipartForm::new()
                .add_part(
                    "file",
                    axum_test::multipart::Part::bytes(pdf)
                        .file_name("sample.pdf")
                        .mime_type("application/pdf"),
                )
                .add_text("title", "Sample Report"),
        )
        .await;
    response.assert_status(StatusCode::CREATED);
    let source: Value = response.json();
    let source_id = source["id"].as_str().unwrap().to_string();
    assert_eq!(source["status"], "UPLOADED");
    assert_eq!(source["source_type"], "pdf");

    drain_ingestion_queue(&app).await;

    let ready: Value = app
        .server
        .get(&format!("/sources/{source_id}"))
        .await
        .json();
    assert_eq!(ready["status"], "READY");

    let chunks = common::storage::types::chunk::TextChunk::by_source_ordered(&source_id, &app.db)
        .await
        .expect("chunks");
    assert!(chunks.len() >= 3, "expected >= 3 chunks, got {}", chunks.len());
    for (idx, chunk) in chunks.iter().enumerate() {
        assert_eq!(chunk.ordinal, idx);
        assert_eq!(chunk.embedding.len(), TEST_EMBED_DIM);
        assert!(chunk.page_start.is_some());
    }
}

#[tokio::test]
async fn non_pdf_upload_is_rejected() {
    let app = spawn_app().await;
    let response = app
        .server
        .post("/sources/upload")
        .multipart(
            axum_test::multipart::MultipartForm::new().add_part(
                "file",
                axum_test::multipart::Part::bytes(b"plain words".to_vec())
                    .file_name("notes.txt")
                    .mime_type("text/plain"),
            ),
        )
        .await;
    response.assert_status(StatusCode::UNSUPPORTED_MEDIA_TYPE);
}

#[tokio::test]
async fn oversized_pdf_upload_is_rejected() {
    let mut config = test_config();
    config.max_pdf_bytes = 64;
    let app = spawn_app_with_config(config).await;

    let pdf = build_pdf(&[sample_page("payload", 10)]);
    let response = app
        .server
        .post("/sources/upload")
        .multipart(
            axum_test::multipart::MultipartForm::new().add_part(
                "file",
                axum_test::multipart::Part::bytes(pdf)
                    .file_name("big.pdf")
                    .mime_type("application/pdf"),
            ),
        )
        .await;
    response.assert_status(StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn corrupt_pdf_marks_source_failed() {
    let app = spawn_app().await;
    let response = app
        .server
        .post("/sources/upload")
        .multipart(
            axum_test::multipart::MultipartForm::new().add_part(
                "file",
                axum_test::multipart::Part::bytes(b"not actually a pdf".to_vec())
                    .file_name("broken.pdf")
                    .mime_type("application/pdf"),
            ),
        )
        .await;
    response.assert_status(StatusCode::CREATED);
    let source: Value = response.json();
    let source_id = source["id"].as_str().unwrap().to_string();

    drain_ingestion_queue(&app).await;

    let failed: Value = app
        .server
        .get(&format!("/sources/{source_id}"))
        .await
        .json();
    assert_eq!(failed["status"], "FAILED");
    assert!(!failed["error"].as_str().unwrap().is_empty());
}
