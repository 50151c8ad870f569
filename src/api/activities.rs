use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, AppState};
use crate::traits::{AuthUser, CrmStore};

#[derive(Deserialize)]
pub(super) struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
}

/// Newest-first page of the user's activity feed. Returned as a bare array.
pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let page = q.page.unwrap_or(1).max(1);
    let limit = q.limit.unwrap_or(5).max(1);
    let activities = state.store.list_activities(&user.uid, page, limit).await?;
    Ok(Json(json!(activities)))
}

pub(super) async fn latest_for_contact(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(contact_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let latest = state
        .store
        .latest_activity_for_contact(&user.uid, &contact_id)
        .await?;
    Ok(Json(json!({ "activities": latest })))
}
