//! Imported datasets: table view, CSV preview, import and export.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use franchise_portal_integration_tests::{ADMIN_EMAIL, FRANCHISEE_EMAIL, TestPortal, location};
use reqwest::StatusCode;
use serde_json::json;

const BILLING_CSV: &str = "\
id,Rental Storage ID,Año,Mes,Total Cost,Número de reservas,Número de vehículos
1,10,2024,1,400,4,2
2,43,2024,1,900,9,3
";

fn seed_bookings(portal: &TestPortal) {
    portal.backend.insert_rows(
        "reservasimportadas",
        vec![
            json!({"id": 1, "NOMBRE SUCURSAL": "GIRONA", "Cliente": "Marta", "created_at": "2024-01-01T00:00:00Z"}),
            json!({"id": 2, "NOMBRE SUCURSAL": "BILBAO", "Cliente": "Luis", "created_at": "2024-01-02T00:00:00Z"}),
        ],
    );
}

#[tokio::test]
async fn test_bookings_table_search() {
    let portal = TestPortal::start().await;
    seed_bookings(&portal);
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let body = portal.get("/bookings?q=bilbao").await.text().await.unwrap();
    assert!(body.contains("1 of 2 records"));
    assert!(body.contains("Luis"));
    assert!(!body.contains("Marta"));
    assert!(body.contains("2 branches"));
    assert!(!body.contains("created at"));
    // Franchisees cannot import.
    assert!(!body.contains("/bookings/upload"));
}

#[tokio::test]
async fn test_export_filtered_csv() {
    let portal = TestPortal::start().await;
    seed_bookings(&portal);
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal.get("/bookings/export?q=girona").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(
        resp.headers()
            .get("content-type")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/csv")
    );
    let disposition = resp
        .headers()
        .get("content-disposition")
        .unwrap()
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"datos_"));

    let csv = resp.text().await.unwrap();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("id,NOMBRE SUCURSAL,Cliente"));
    assert_eq!(lines.next(), Some("1,GIRONA,Marta"));
    assert_eq!(lines.next(), None);
}

#[tokio::test]
async fn test_csv_preview_then_import() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    let resp = portal
        .upload("/billing/upload", "resumen.csv", "text/csv", BILLING_CSV.as_bytes().to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp).as_deref(), Some("/billing"));
    // Nothing is written before confirmation.
    assert!(portal.backend.rows("resumen_mensual_reservas").is_empty());

    let body = portal.get("/billing").await.text().await.unwrap();
    assert!(body.contains("resumen.csv"));
    assert!(body.contains("(2 rows)"));
    assert!(body.contains(r#"action="/billing/import""#));

    let resp = portal.post_form("/billing/import", &[]).await;
    assert_eq!(
        location(&resp).as_deref(),
        Some("/billing?imported=2&failed=0")
    );
    assert_eq!(portal.backend.rows("resumen_mensual_reservas").len(), 2);

    let body = portal
        .get("/billing?imported=2&failed=0")
        .await
        .text()
        .await
        .unwrap();
    assert!(body.contains("Imported 2 rows successfully."));
    assert!(body.contains("BILBAO"));
    assert!(body.contains("GIRONA"));
    // The preview is gone once imported.
    assert!(!body.contains(r#"action="/billing/import""#));
}

#[tokio::test]
async fn test_reimport_merges_on_id() {
    let portal = TestPortal::start().await;
    portal.backend.insert_rows(
        "resumen_mensual_reservas",
        vec![json!({"id": "1", "Rental Storage ID": "10", "Año": "2023", "Mes": "12", "Total Cost": "100"})],
    );
    portal.sign_in(ADMIN_EMAIL).await;

    portal
        .upload("/billing/upload", "resumen.csv", "text/csv", BILLING_CSV.as_bytes().to_vec())
        .await;
    portal.post_form("/billing/import", &[]).await;

    let rows = portal.backend.rows("resumen_mensual_reservas");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["Total Cost"], "400");
}

#[tokio::test]
async fn test_invalid_upload_writes_nothing() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    let resp = portal
        .upload("/bookings/upload", "reservas.txt", "text/plain", b"id\n1\n".to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Please select a .csv file"));

    let resp = portal
        .upload("/bookings/upload", "reservas.csv", "text/csv", b"id,name\n".to_vec())
        .await;
    let body = resp.text().await.unwrap();
    assert!(body.contains("no data rows"));

    assert!(portal.backend.rows("reservasimportadas").is_empty());
}

#[tokio::test]
async fn test_cancel_discards_preview() {
    let portal = TestPortal::start().await;
    portal.sign_in(ADMIN_EMAIL).await;

    portal
        .upload("/billing/upload", "resumen.csv", "text/csv", BILLING_CSV.as_bytes().to_vec())
        .await;
    let resp = portal.post_form("/billing/upload/cancel", &[]).await;
    assert_eq!(location(&resp).as_deref(), Some("/billing"));

    // Importing now is a no-op.
    let resp = portal.post_form("/billing/import", &[]).await;
    assert_eq!(location(&resp).as_deref(), Some("/billing"));
    assert!(portal.backend.rows("resumen_mensual_reservas").is_empty());
}

#[tokio::test]
async fn test_franchisee_cannot_import() {
    let portal = TestPortal::start().await;
    portal.sign_in(FRANCHISEE_EMAIL).await;

    let resp = portal
        .upload("/billing/upload", "resumen.csv", "text/csv", BILLING_CSV.as_bytes().to_vec())
        .await;
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}
