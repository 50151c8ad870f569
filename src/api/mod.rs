//! HTTP surface. One base path (`/api`), bearer-or-cookie auth on
//! everything except `/health` and credential verification.

mod activities;
mod chat;
mod contacts;
mod profile;
mod search;
mod tags;
mod verify;

pub use chat::run_chat_turn;

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use tracing::warn;

use crate::auth::extract_token;
use crate::traits::{AuthUser, CompletionProvider, CrmStore, MediaStorage, TokenVerifier};

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CrmStore>,
    pub verifier: Arc<dyn TokenVerifier>,
    pub provider: Arc<dyn CompletionProvider>,
    pub media: Option<Arc<dyn MediaStorage>>,
    pub model: String,
}

// ---------------------------------------------------------------------------
// Error taxonomy
// ---------------------------------------------------------------------------

/// Request-level failures, mapped to HTTP at the boundary:
/// validation → 400, not-found → 404, dependency → 502, the rest → 500.
#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    NotFound(String),
    Unauthorized(String),
    /// Tag deletion refused because contacts still reference it.
    TagInUse {
        name: String,
        contact_count: i64,
    },
    Dependency(String),
    Internal(anyhow::Error),
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        ApiError::Internal(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::Validation(msg) => (
                StatusCode::BAD_REQUEST,
                json!({ "success": false, "error": msg }),
            ),
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                json!({ "success": false, "error": msg }),
            ),
            ApiError::Unauthorized(msg) => (
                StatusCode::UNAUTHORIZED,
                json!({ "success": false, "error": msg }),
            ),
            ApiError::TagInUse { name, contact_count } => (
                StatusCode::BAD_REQUEST,
                json!({
                    "success": false,
                    "error": format!(
                        "Cannot delete tag \"{}\" - it is currently used by {} contact(s)",
                        name, contact_count
                    ),
                    "tagName": name,
                    "contactCount": contact_count,
                    "suggestion": "Use ?force=true to remove tag from all contacts and delete it",
                }),
            ),
            ApiError::Dependency(msg) => (
                StatusCode::BAD_GATEWAY,
                json!({ "success": false, "error": "Upstream dependency failed", "details": msg }),
            ),
            ApiError::Internal(e) => {
                warn!("Internal error: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "success": false, "error": "Internal server error" }),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route(
            "/api/contacts",
            post(contacts::create)
                .get(contacts::list)
                .delete(contacts::delete_many),
        )
        .route("/api/contacts/count", get(contacts::stats))
        .route("/api/contacts/import", post(contacts::import))
        .route(
            "/api/contacts/:id",
            get(contacts::get_by_id)
                .put(contacts::update)
                .delete(contacts::delete),
        )
        .route("/api/tags", get(tags::list))
        .route("/api/tags/bulk", post(tags::bulk_add))
        .route("/api/tags/:id", put(tags::edit).delete(tags::delete))
        .route("/api/activity", get(activities::list))
        .route("/api/activity/:contact_id", get(activities::latest_for_contact))
        .route("/api/profile", get(profile::get).put(profile::update))
        .route("/api/chat/send", post(chat::send))
        .route("/api/chat/history", get(chat::history))
        .route(
            "/api/chat/conversation/:conversation_id",
            get(chat::get_conversation).delete(chat::delete_conversation),
        )
        .route(
            "/api/chat/conversation/:conversation_id/title",
            put(chat::update_title),
        )
        .route("/api/search", get(search::search))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/verify-token", post(verify::verify_token))
        .merge(protected)
        .with_state(state)
}

async fn health_handler() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// Auth middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("No token provided".to_string()))?;

    let identity = state.verifier.verify(&token).await.map_err(|e| {
        warn!("Token verification failed: {}", e);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    request.extensions_mut().insert(AuthUser {
        uid: identity.uid,
    });
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_status_mapping() {
        let cases = [
            (ApiError::Validation("bad".into()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("gone".into()), StatusCode::NOT_FOUND),
            (ApiError::Unauthorized("no".into()), StatusCode::UNAUTHORIZED),
            (
                ApiError::TagInUse {
                    name: "hot".into(),
                    contact_count: 4,
                },
                StatusCode::BAD_REQUEST,
            ),
            (ApiError::Dependency("down".into()), StatusCode::BAD_GATEWAY),
            (
                ApiError::Internal(anyhow::anyhow!("boom")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(err.into_response().status(), status);
        }
    }
}
