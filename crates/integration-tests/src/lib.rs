//! Integration tests for the franchise portal.
//!
//! # Running Tests
//!
//! ```bash
//! cargo test -p franchise-portal-integration-tests
//! ```
//!
//! Nothing external is needed: [`MockBackend`] stands in for the hosted
//! backend (identity, REST data and blob storage APIs) and [`TestPortal`]
//! serves the real portal router against it, both on ephemeral local ports.

use std::collections::HashMap;
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use franchise_portal::config::{BackendConfig, PortalConfig};
use franchise_portal::fetch::RetryPolicy;
use franchise_portal::session::PROFILES_TABLE;
use franchise_portal::state::AppState;
use serde_json::{Value, json};

/// Administrator account seeded in every [`MockBackend`].
pub const ADMIN_EMAIL: &str = "admin@franchise.example";

/// Franchisee account seeded in every [`MockBackend`].
pub const FRANCHISEE_EMAIL: &str = "ana@franchise.example";

/// Password of both seeded accounts.
pub const PASSWORD: &str = "correct horse";

/// Storage bucket used for documents.
pub const DOCUMENTS_BUCKET: &str = "documents";

// =============================================================================
// Mock Backend
// =============================================================================

struct MockUser {
    id: &'static str,
    email: &'static str,
    token: &'static str,
}

#[derive(Default)]
struct MockData {
    users: Vec<MockUser>,
    tables: HashMap<String, Vec<Value>>,
    objects: HashMap<String, Vec<u8>>,
    failing: HashSet<String>,
    next_id: i64,
}

/// In-memory stand-in for the hosted backend.
#[derive(Clone)]
pub struct MockBackend {
    data: Arc<Mutex<MockData>>,
}

impl Default for MockBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBackend {
    /// A backend with one administrator and one franchisee.
    #[must_use]
    pub fn new() -> Self {
        let data = MockData {
            users: vec![
                MockUser {
                    id: "u-admin",
                    email: ADMIN_EMAIL,
                    token: "token-admin",
                },
                MockUser {
                    id: "u-ana",
                    email: FRANCHISEE_EMAIL,
                    token: "token-ana",
                },
            ],
            next_id: 100,
            ..MockData::default()
        };
        let backend = Self {
            data: Arc::new(Mutex::new(data)),
        };
        backend.insert_rows(
            "profiles",
            vec![
                json!({"id": "u-admin", "email": ADMIN_EMAIL, "full_name": "Ada Admin", "role": "admin", "franchise_id": null}),
                json!({"id": "u-ana", "email": FRANCHISEE_EMAIL, "full_name": "Ana Torres", "role": "franchisee", "franchise_id": "F-01"}),
            ],
        );
        backend
    }

    fn lock(&self) -> MutexGuard<'_, MockData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Append rows to `table`.
    pub fn insert_rows(&self, table: &str, rows: Vec<Value>) {
        self.lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    /// Current rows of `table`.
    #[must_use]
    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.lock().tables.get(table).cloned().unwrap_or_default()
    }

    /// Make every read of `table` fail with a 500.
    pub fn fail_reads(&self, table: &str) {
        self.lock().failing.insert(table.to_string());
    }

    /// Stored object bytes.
    #[must_use]
    pub fn object(&self, bucket: &str, path: &str) -> Option<Vec<u8>> {
        self.lock().objects.get(&format!("{bucket}/{path}")).cloned()
    }

    /// Backend routes.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/auth/v1/token", post(token))
            .route("/auth/v1/user", get(user))
            .route("/auth/v1/logout", post(|| async { StatusCode::NO_CONTENT }))
            .route("/auth/v1/health", get(|| async { Json(json!({"name": "mock"})) }))
            .route(
                "/rest/v1/{table}",
                get(select).post(insert).patch(update).delete(delete),
            )
            .route(
                "/storage/v1/object/{bucket}/{*path}",
                get(download).post(upload),
            )
            .with_state(self.clone())
    }

    /// Serve the backend on an ephemeral port.
    ///
    /// # Panics
    ///
    /// Panics if no local port can be bound.
    pub async fn serve(&self) -> SocketAddr {
        serve(self.router()).await
    }
}

async fn serve(router: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("Failed to read local address");
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    addr
}

fn error(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({"message": message}))).into_response()
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// Text form of a cell, so `1` and `"1"` compare equal.
fn text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// `column=eq.value` filters from a REST query string.
fn eq_filters(params: &[(String, String)]) -> Vec<(String, String)> {
    params
        .iter()
        .filter(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit" | "on_conflict"))
        .filter_map(|(key, value)| {
            let value = value.strip_prefix("eq.")?;
            Some((key.trim_matches('"').to_string(), value.to_string()))
        })
        .collect()
}

fn matches(row: &Value, filters: &[(String, String)]) -> bool {
    filters
        .iter()
        .all(|(column, value)| row.get(column).is_some_and(|cell| text(cell) == *value))
}

async fn token(
    State(backend): State<MockBackend>,
    Query(params): Query<HashMap<String, String>>,
    Json(body): Json<Value>,
) -> Response {
    let data = backend.lock();
    let user = match params.get("grant_type").map(String::as_str) {
        Some("password") => data.users.iter().find(|u| {
            body["email"] == u.email && body["password"] == PASSWORD
        }),
        Some("refresh_token") => data
            .users
            .iter()
            .find(|u| body["refresh_token"] == format!("refresh-{}", u.token)),
        _ => None,
    };
    match user {
        Some(user) => Json(json!({
            "access_token": user.token,
            "refresh_token": format!("refresh-{}", user.token),
            "token_type": "bearer",
            "expires_in": 3600,
            "user": {"id": user.id, "email": user.email},
        }))
        .into_response(),
        None => (
            StatusCode::BAD_REQUEST,
            Json(json!({"error": "invalid_grant", "error_description": "Invalid login credentials"})),
        )
            .into_response(),
    }
}

async fn user(State(backend): State<MockBackend>, headers: HeaderMap) -> Response {
    let data = backend.lock();
    bearer(&headers)
        .and_then(|token| data.users.iter().find(|u| u.token == token))
        .map_or_else(
            || error(StatusCode::UNAUTHORIZED, "invalid JWT"),
            |u| Json(json!({"id": u.id, "email": u.email})).into_response(),
        )
}

/// Row policy on `profiles`: admins read every row, anyone else only their own.
fn profile_policy(data: &MockData, headers: &HeaderMap) -> Option<(String, String)> {
    let caller = bearer(headers).and_then(|token| data.users.iter().find(|u| u.token == token));
    let is_admin = caller.is_some_and(|u| {
        data.tables
            .get(PROFILES_TABLE)
            .is_some_and(|rows| rows.iter().any(|row| row["id"] == u.id && row["role"] == "admin"))
    });
    if is_admin {
        None
    } else {
        Some((
            "id".to_string(),
            caller.map_or_else(String::new, |u| u.id.to_string()),
        ))
    }
}

async fn select(
    State(backend): State<MockBackend>,
    Path(table): Path<String>,
    headers: HeaderMap,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let data = backend.lock();
    if data.failing.contains(&table) {
        return error(StatusCode::INTERNAL_SERVER_ERROR, "database unavailable");
    }
    let mut filters = eq_filters(&params);
    if table == PROFILES_TABLE {
        filters.extend(profile_policy(&data, &headers));
    }
    let limit = params
        .iter()
        .find(|(key, _)| key == "limit")
        .and_then(|(_, value)| value.parse().ok())
        .unwrap_or(usize::MAX);
    let rows: Vec<Value> = data
        .tables
        .get(&table)
        .map(|rows| {
            rows.iter()
                .filter(|row| matches(row, &filters))
                .take(limit)
                .cloned()
                .collect()
        })
        .unwrap_or_default();
    Json(rows).into_response()
}

async fn insert(
    State(backend): State<MockBackend>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    Json(mut row): Json<Value>,
) -> Response {
    let mut data = backend.lock();

    if let Some((_, key)) = params.iter().find(|(k, _)| k == "on_conflict") {
        let incoming = row.get(key).map(text);
        let rows = data.tables.entry(table).or_default();
        match rows
            .iter_mut()
            .find(|existing| incoming.is_some() && existing.get(key).map(text) == incoming)
        {
            Some(existing) => {
                if let (Some(existing), Some(changes)) = (existing.as_object_mut(), row.as_object())
                {
                    existing.extend(changes.clone());
                }
            }
            None => rows.push(row),
        }
        return StatusCode::CREATED.into_response();
    }

    data.next_id += 1;
    let id = data.next_id;
    if let Some(fields) = row.as_object_mut() {
        fields.entry("id").or_insert_with(|| json!(id));
        fields
            .entry("created_at")
            .or_insert_with(|| json!(chrono::Utc::now().to_rfc3339()));
    }
    data.tables.entry(table).or_default().insert(0, row.clone());
    (StatusCode::CREATED, Json(json!([row]))).into_response()
}

async fn update(
    State(backend): State<MockBackend>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
    Json(changes): Json<Value>,
) -> Response {
    let filters = eq_filters(&params);
    let mut data = backend.lock();
    let updated: Vec<Value> = data
        .tables
        .get_mut(&table)
        .map(|rows| {
            rows.iter_mut()
                .filter(|row| matches(row, &filters))
                .map(|row| {
                    let fields = row.as_object_mut();
                    if let (Some(fields), Some(changes)) = (fields, changes.as_object()) {
                        fields.extend(changes.clone());
                    }
                    row.clone()
                })
                .collect()
        })
        .unwrap_or_default();
    Json(updated).into_response()
}

async fn delete(
    State(backend): State<MockBackend>,
    Path(table): Path<String>,
    Query(params): Query<Vec<(String, String)>>,
) -> StatusCode {
    let filters = eq_filters(&params);
    if let Some(rows) = backend.lock().tables.get_mut(&table) {
        rows.retain(|row| !matches(row, &filters));
    }
    StatusCode::NO_CONTENT
}

async fn upload(
    State(backend): State<MockBackend>,
    Path((bucket, path)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    let key = format!("{bucket}/{path}");
    let mut data = backend.lock();
    if data.objects.contains_key(&key) {
        return error(StatusCode::CONFLICT, "The resource already exists");
    }
    data.objects.insert(key.clone(), body.to_vec());
    Json(json!({"Key": key})).into_response()
}

async fn download(
    State(backend): State<MockBackend>,
    Path((bucket, path)): Path<(String, String)>,
) -> Response {
    backend
        .lock()
        .objects
        .get(&format!("{bucket}/{path}"))
        .cloned()
        .map_or_else(
            || error(StatusCode::NOT_FOUND, "Object not found"),
            IntoResponse::into_response,
        )
}

// =============================================================================
// Portal Under Test
// =============================================================================

/// Fetch policy for tests: short timeout, no retries.
#[must_use]
pub fn test_policy() -> RetryPolicy {
    RetryPolicy {
        timeout: Duration::from_secs(5),
        max_retries: 0,
        base_delay: Duration::from_millis(10),
        retry_timeouts: false,
    }
}

/// Backend configuration pointing at a running [`MockBackend`].
///
/// # Panics
///
/// Panics if the address does not form a valid URL.
#[must_use]
pub fn backend_config(addr: SocketAddr) -> BackendConfig {
    let mut config = BackendConfig::new(&format!("http://{addr}"), "anon-key")
        .expect("Failed to build backend config");
    config.documents_bucket = DOCUMENTS_BUCKET.to_string();
    config
}

/// The portal served against a [`MockBackend`], with a cookie-keeping
/// client that does not follow redirects.
pub struct TestPortal {
    pub backend: MockBackend,
    pub base_url: String,
    pub client: reqwest::Client,
}

impl TestPortal {
    /// Start a mock backend and the portal in front of it.
    ///
    /// # Panics
    ///
    /// Panics if either server cannot start.
    pub async fn start() -> Self {
        Self::start_with(MockBackend::new()).await
    }

    /// Start the portal in front of an already seeded backend.
    ///
    /// # Panics
    ///
    /// Panics if either server cannot start.
    pub async fn start_with(backend: MockBackend) -> Self {
        let backend_addr = backend.serve().await;

        let config = PortalConfig {
            host: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 0,
            base_url: "http://127.0.0.1".to_string(),
            backend: backend_config(backend_addr),
            fetch: test_policy(),
            log_json: false,
            sentry_dsn: None,
            sentry_environment: None,
            sentry_sample_rate: 0.0,
            sentry_traces_sample_rate: 0.0,
        };
        let state = AppState::new(config).expect("Failed to create application state");
        let addr = serve(franchise_portal::app(state)).await;

        Self {
            backend,
            base_url: format!("http://{addr}"),
            client: Self::new_client(),
        }
    }

    /// A fresh client with its own cookie jar.
    ///
    /// # Panics
    ///
    /// Panics if the client cannot be built.
    #[must_use]
    pub fn new_client() -> reqwest::Client {
        reqwest::Client::builder()
            .cookie_store(true)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .expect("Failed to create HTTP client")
    }

    /// Absolute URL of `path`.
    #[must_use]
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// `GET path`.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client
            .get(self.url(path))
            .send()
            .await
            .expect("Failed to send request")
    }

    /// `POST path` with a urlencoded form.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn post_form(&self, path: &str, form: &[(&str, &str)]) -> reqwest::Response {
        self.client
            .post(self.url(path))
            .form(form)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// `POST path` with `bytes` as the multipart `file` field.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn upload(
        &self,
        path: &str,
        file_name: &str,
        mime: &str,
        bytes: Vec<u8>,
    ) -> reqwest::Response {
        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name.to_string())
            .mime_str(mime)
            .expect("Invalid mime type");
        let form = reqwest::multipart::Form::new().part("file", part);
        self.client
            .post(self.url(path))
            .multipart(form)
            .send()
            .await
            .expect("Failed to send request")
    }

    /// Sign in through the login form.
    ///
    /// # Panics
    ///
    /// Panics if the request cannot be sent.
    pub async fn sign_in(&self, email: &str) -> reqwest::Response {
        self.post_form("/login", &[("email", email), ("password", PASSWORD)])
            .await
    }
}

/// `Location` header of a redirect response.
#[must_use]
pub fn location(response: &reqwest::Response) -> Option<String> {
    response
        .headers()
        .get(reqwest::header::LOCATION)?
        .to_str()
        .ok()
        .map(String::from)
}
