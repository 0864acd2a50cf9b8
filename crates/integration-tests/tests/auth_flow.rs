//! Sign-in, route guard and sign-out through the HTTP surface.

#![allow(clippy::unwrap_used, clippy::indexing_slicing)]

use franchise_portal_integration_tests::{FRANCHISEE_EMAIL, TestPortal, location};
use reqwest::StatusCode;

#[tokio::test]
async fn test_health_endpoints() {
    let portal = TestPortal::start().await;

    let resp = portal.get("/health").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.text().await.unwrap(), "ok");

    let resp = portal.get("/health/ready").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_protected_pages_redirect_to_login() {
    let portal = TestPortal::start().await;

    for path in ["/dashboard", "/documents", "/news", "/reports", "/bookings", "/billing/export"] {
        let resp = portal.get(path).await;
        assert_eq!(resp.status(), StatusCode::SEE_OTHER, "{path}");
        assert_eq!(location(&resp).as_deref(), Some("/login"), "{path}");
    }

    let resp = portal.get("/login").await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers().get("x-frame-options").unwrap(),
        "DENY"
    );
}

#[tokio::test]
async fn test_bad_credentials_are_reported() {
    let portal = TestPortal::start().await;

    let resp = portal
        .post_form("/login", &[("email", FRANCHISEE_EMAIL), ("password", "wrong")])
        .await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        location(&resp).as_deref(),
        Some("/login?error=credentials")
    );

    let body = portal
        .get("/login?error=credentials")
        .await
        .text()
        .await
        .unwrap();
    assert!(body.contains("Invalid email or password."));

    // Still signed out.
    let resp = portal.get("/dashboard").await;
    assert_eq!(location(&resp).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_invalid_email_is_rejected_before_backend() {
    let portal = TestPortal::start().await;
    let resp = portal
        .post_form("/login", &[("email", "not-an-email"), ("password", "x")])
        .await;
    assert_eq!(location(&resp).as_deref(), Some("/login?error=email"));
}

#[tokio::test]
async fn test_sign_in_dashboard_and_sign_out() {
    let portal = TestPortal::start().await;

    let resp = portal.sign_in(FRANCHISEE_EMAIL).await;
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&resp).as_deref(), Some("/dashboard"));

    let resp = portal.get("/dashboard").await;
    assert_eq!(resp.status(), StatusCode::OK);
    let body = resp.text().await.unwrap();
    assert!(body.contains("Welcome to the portal, <strong>Ana Torres</strong>"));
    assert!(body.contains("F-01"));
    assert!(!body.contains("Franchisees"));

    // Signed-in visitors skip the login page.
    let resp = portal.get("/login").await;
    assert_eq!(location(&resp).as_deref(), Some("/dashboard"));

    let resp = portal.post_form("/logout", &[]).await;
    assert_eq!(
        location(&resp).as_deref(),
        Some("/login?success=signed_out")
    );

    let resp = portal.get("/dashboard").await;
    assert_eq!(location(&resp).as_deref(), Some("/login"));
}

#[tokio::test]
async fn test_admin_dashboard_counts_franchisees() {
    let portal = TestPortal::start().await;
    portal
        .sign_in(franchise_portal_integration_tests::ADMIN_EMAIL)
        .await;

    let body = portal.get("/dashboard").await.text().await.unwrap();
    assert!(body.contains("Franchisees"));
    assert!(body.contains("Not assigned"));
}
