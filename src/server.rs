//!
//! authgate HTTP server
//! --------------------
//! Axum-based HTTP surface over the identity core.
//!
//! Responsibilities:
//! - Header decoding: `Basic <percent-encoded user:pass>` for password logins,
//!   `Bearer <token>` for session logins and authorization checks. The core
//!   only ever sees already-split components.
//! - Login endpoints delegating to the `identity` module.
//! - Role-guard middleware wrapping protected routes; a failed check
//!   short-circuits with a fixed forbidden body before the handler runs.
//! - Startup schema bootstrap and default-admin provisioning.

use std::net::SocketAddr;

use axum::extract::{Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use crate::error::AppError;
use crate::identity::{check_authorization, CredentialValidator, LoginRequest, RoleGuard};
use crate::store::Store;

/// Shared server state injected into all handlers. All mutable state lives in
/// the store; the state itself is cheap to clone per request.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub auth: CredentialValidator,
}

/// Start the authgate HTTP server: connect the pool, bootstrap the schema,
/// ensure the default admin exists, and mount all routes.
pub async fn run_with(http_port: u16, db_url: &str, admin_password: &str) -> anyhow::Result<()> {
    let store = Store::connect(db_url, 5).await?;
    store.ensure_schema().await?;
    crate::security::ensure_default_admin(&store, admin_password).await?;

    let state = AppState { store, auth: CredentialValidator::default() };
    let app = router(state);

    let addr: SocketAddr = format!("0.0.0.0:{}", http_port).parse()?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Convenience entry point using the default port and a local database file.
pub async fn run() -> anyhow::Result<()> {
    run_with(7878, "sqlite://authgate.db?mode=rwc", "authgate").await
}

pub fn router(state: AppState) -> Router {
    // The user index is an administrative view
    let admin_gate =
        middleware::from_fn_with_state((state.clone(), RoleGuard::any(["admin"])), role_gate);

    Router::new()
        .route("/", get(|| async { "authgate ok" }))
        .route("/users", get(list_users).route_layer(admin_gate))
        .route("/login/password", post(login_password))
        .route("/login/session", post(login_session))
        .with_state(state)
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let raw = headers.get("authorization")?.to_str().ok()?;
    let rest = raw.strip_prefix("Bearer ")?;
    Some(urlencoding::decode(rest).ok()?.into_owned())
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get("authorization")?.to_str().ok()?;
    let rest = raw.strip_prefix("Basic ")?;
    let decoded = urlencoding::decode(rest).ok()?.into_owned();
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

fn error_response(e: AppError) -> Response {
    error!("request failed: {}", e);
    let status = StatusCode::from_u16(e.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({"status": "error", "code": e.code_str()}))).into_response()
}

/// Guard middleware evaluating a role requirement against the bearer token
/// before the wrapped handler runs. Denials get a fixed body with no
/// operation-specific detail; store outages surface as 503, never as a denial.
async fn role_gate(
    State((state, guard)): State<(AppState, RoleGuard)>,
    request: Request,
    next: Next,
) -> Response {
    let token = bearer_token(request.headers());
    match check_authorization(&state.store, token.as_deref(), &guard).await {
        Ok(true) => next.run(request).await,
        Ok(false) => {
            (StatusCode::FORBIDDEN, Json(json!({"status": "forbidden"}))).into_response()
        }
        Err(e) => error_response(e),
    }
}

async fn list_users(State(state): State<AppState>) -> Response {
    match state.store.list_users().await {
        Ok(users) => (StatusCode::OK, Json(users)).into_response(),
        Err(e) => error_response(AppError::from(e)),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordLoginPayload {
    #[serde(default)]
    remember_me: bool,
}

async fn login_password(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<PasswordLoginPayload>,
) -> Response {
    let Some((username, password)) = basic_credentials(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "unauthorized"}))).into_response();
    };
    let req = LoginRequest { username, password, remember_me: payload.remember_me };
    match state.auth.authenticate(&state.store, &req).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}

async fn login_session(State(state): State<AppState>, headers: HeaderMap) -> Response {
    let Some(token) = bearer_token(&headers) else {
        return (StatusCode::UNAUTHORIZED, Json(json!({"status": "unauthorized"}))).into_response();
    };
    match state.auth.login_with_token(&state.store, &token).await {
        Ok(result) => (StatusCode::OK, Json(result)).into_response(),
        Err(e) => error_response(e),
    }
}
