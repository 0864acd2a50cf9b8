//! Franchise portal library.
//!
//! Server-rendered portal for a franchise network: documents, news, monthly
//! reports and the imported bookings/billing datasets. All data lives in a
//! hosted backend (identity provider, REST data API and blob storage); the
//! portal talks to it on behalf of the signed-in user so row-level access
//! rules apply.
//!
//! The crate is a library so the router can be exercised in tests and the
//! CLI can reuse the backend client and CSV import.

#![cfg_attr(not(test), forbid(unsafe_code))]

pub mod backend;
pub mod config;
pub mod datasets;
pub mod error;
pub mod fetch;
pub mod filters;
pub mod middleware;
pub mod reports;
pub mod resources;
pub mod routes;
pub mod session;
pub mod state;
pub mod tabular;

use axum::Router;
use tower_http::trace::{DefaultOnResponse, OnResponse, TraceLayer};
use tracing::Span;

use crate::state::AppState;

/// Build the full application: routes, route guard, sessions, security
/// headers, request IDs and request tracing.
///
/// Sentry layers are added by the binary.
pub fn app(state: AppState) -> Router {
    let session_layer = middleware::create_session_layer(state.config());

    routes::routes()
        .layer(axum::middleware::from_fn(middleware::route_guard))
        .layer(session_layer)
        .layer(axum::middleware::from_fn(
            middleware::security_headers_middleware,
        ))
        .layer(axum::middleware::from_fn(middleware::request_id_middleware))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        uri = %request.uri(),
                        request_id = tracing::field::Empty,
                        status = tracing::field::Empty,
                        latency_ms = tracing::field::Empty,
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>,
                     latency: std::time::Duration,
                     span: &Span| {
                        span.record("status", response.status().as_u16());
                        span.record(
                            "latency_ms",
                            u64::try_from(latency.as_millis()).unwrap_or(u64::MAX),
                        );
                        DefaultOnResponse::default().on_response(response, latency, span);
                    },
                ),
        )
        .with_state(state)
}
