use axum::{extract::State, Extension, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use super::{ApiError, AppState};
use crate::traits::{AuthUser, CrmStore, MediaStorage, ProfileUpdate, UserRecord};

fn user_payload(user: &UserRecord) -> serde_json::Value {
    json!({
        "uid": user.uid,
        "name": user.name,
        "email": user.email,
        "phone": user.phone,
        "company": user.company,
        "avatar": user.avatar_url,
    })
}

pub(super) async fn get(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state
        .store
        .get_user(&user.uid)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "user": user_payload(&record),
    })))
}

#[derive(Deserialize)]
pub(super) struct UpdateBody {
    name: String,
    email: String,
    #[serde(default)]
    phone: String,
    #[serde(default)]
    company: String,
    #[serde(default)]
    avatar: Option<String>,
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.name.trim().is_empty() || body.email.trim().is_empty() {
        return Err(ApiError::Validation(
            "Name and email are required".to_string(),
        ));
    }

    let existing = state
        .store
        .get_user(&user.uid)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    // Three avatar cases: fresh image payload to upload, an already-durable
    // URL to keep, or nothing (preserve whatever is stored).
    let avatar_url = match body.avatar.as_deref() {
        Some(payload) if payload.starts_with("data:") => {
            let media = state.media.as_ref().ok_or_else(|| {
                ApiError::Dependency("Avatar storage is not configured".to_string())
            })?;
            let url = media
                .store_avatar(&user.uid, payload)
                .await
                .map_err(|e| ApiError::Dependency(e.to_string()))?;
            Some(url)
        }
        Some(url) if url.starts_with("http") => Some(url.to_string()),
        _ => Some(existing.avatar_url.clone()),
    };

    let update = ProfileUpdate {
        name: body.name,
        email: body.email,
        phone: body.phone,
        company: body.company,
        avatar_url,
    };

    let record = state
        .store
        .update_profile(&user.uid, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    info!(uid = %user.uid, "Profile updated");

    Ok(Json(json!({
        "success": true,
        "message": "Profile updated successfully",
        "user": user_payload(&record),
    })))
}
