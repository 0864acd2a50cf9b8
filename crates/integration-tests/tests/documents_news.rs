//! Documents and news: listing, role gating and passthrough writes.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use franchise_portal_integration_tests::{
    ADMIN_EMAIL, DOCUMENTS_BUCKET, FRANCHISEE_EMAIL, TestPortal, location,
};
use reqwest::StatusCode;
use serde_json::json;

#[tokio::test]
async fn test_document_list_shows_size_and_uploader() {
    let portal = TestPortal::start().await;
    portal.backend.insert_rows(
        "documents",
        vec![json!({
            "id": 7,
            "name": "Manual.pdf",
            "file_path": "1700000000000-Manual.pdf",
            "file_size": 2048,
            "mime_type": "application/pdf",
            "uploaded_by": null,
            "created_at": "2024-03-01T09:00:00Z"
        })],
    );
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let body = portal.get("/documents").await.text().await.unwrap();
    assert!(body.contains("Manual.pdf"));
    assert!(body.contains("2.0 KB"));
    assert!(body.contains("unknown"));
    assert!(body.contains("/documents/7/download"));
    // Franchisees get no upload form.
    assert!(!body.contains("multipart/form-data"));
}

#[tokio::test]
async fn test_franchisee_cannot_upload() {
    let portal = TestPortal::start().await;
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal
        .upload("/documents", "Manual.pdf", "application/pdf", b"%PDF".to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(portal.backend.rows("documents").is_empty());
}

#[tokio::test]
async fn test_admin_upload_then_download() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    let resp = portal
        .upload("/documents", "Price list.pdf", "application/pdf", b"%PDF-1.4 test".to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp).as_deref(),
        Some("/documents?uploaded=Price+list.pdf")
    );

    let rows = portal.backend.rows("documents");
    assert_eq!(rows.len(), 1);
    let id = rows[0]["id"].as_i64().unwrap();
    let path = rows[0]["file_path"].as_str().unwrap().to_string();
    assert!(path.ends_with("Price list.pdf"));
    assert_eq!(
        portal.backend.object(DOCUMENTS_BUCKET, &path).unwrap(),
        b"%PDF-1.4 test"
    );

    let body = portal
        .get("/documents?uploaded=Price+list.pdf")
        .await
        .text()
        .await
        .unwrap();
    assert!(body.contains("Uploaded Price list.pdf."));

    let resp = portal.get(&format!("/documents/{id}/download")).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("content-disposition").unwrap(),
        "attachment; filename=\"Price list.pdf\""
    );
    assert_eq!(resp.bytes().await.unwrap().as_ref(), b"%PDF-1.4 test");
}

#[tokio::test]
async fn test_upload_without_file() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    let resp = portal.upload("/documents", "", "application/pdf", Vec::new()).await;
    assert_eq!(
        location(&resp).as_deref(),
        Some("/documents?error=missing_file")
    );
}

#[tokio::test]
async fn test_missing_document_is_not_found() {
    let portal = TestPortal::start().await;
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal.get("/documents/999/download").await;
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_empty_news_feed() {
    let portal = TestPortal::start().await;
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let body = portal.get("/news").await.text().await.unwrap();
    assert!(body.contains("No news published"));
}

#[tokio::test]
async fn test_news_lifecycle() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    let resp = portal
        .post_form("/news", &[("title", "  "), ("content", "Body")])
        .await;
    assert_eq!(location(&resp).as_deref(), Some("/news?error=title"));
    assert!(portal.backend.rows("news").is_empty());

    let resp = portal
        .post_form(
            "/news",
            &[("title", "New opening hours"), ("content", "From Monday we open at 8.")],
        )
        .await;
    assert_eq!(location(&resp).as_deref(), Some("/news?success=created"));

    let id = portal.backend.rows("news")[0]["id"].as_i64().unwrap();
    let body = portal.get("/news").await.text().await.unwrap();
    assert!(body.contains("New opening hours"));
    assert!(body.contains(&format!("/news/{id}/delete")));

    let resp = portal
        .post_form(
            &format!("/news/{id}"),
            &[("title", "Opening hours"), ("content", "From Monday we open at 9.")],
        )
        .await;
    assert_eq!(location(&resp).as_deref(), Some("/news?success=updated"));
    let row = &portal.backend.rows("news")[0];
    assert_eq!(row["title"], "Opening hours");
    assert!(row.get("updated_at").is_some());

    let resp = portal.post_form(&format!("/news/{id}/delete"), &[]).await;
    assert_eq!(location(&resp).as_deref(), Some("/news?success=deleted"));
    assert!(portal.backend.rows("news").is_empty());
}

#[tokio::test]
async fn test_franchisee_cannot_publish_news() {
    let portal = TestPortal::start().await;
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal
        .post_form("/news", &[("title", "Hello"), ("content", "World")])
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert!(portal.backend.rows("news").is_empty());
}

#[tokio::test]
async fn test_failed_load_offers_retry() {
    let portal = TestPortal::start().await;
    portal.backend.fail_reads("documents");
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal.get("/documents").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Retry"));
    assert!(!body.contains("No documents have been uploaded yet."));
}
