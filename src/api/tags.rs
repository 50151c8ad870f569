use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, AppState};
use crate::activity_log::log_activity;
use crate::traits::{AuthUser, CrmStore};

#[derive(Deserialize)]
pub(super) struct TagInput {
    name: Option<String>,
    color: Option<String>,
}

#[derive(Deserialize)]
pub(super) struct BulkBody {
    tags: Vec<TagInput>,
}

pub(super) async fn bulk_add(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<BulkBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.tags.is_empty() {
        return Err(ApiError::Validation("No tags provided".to_string()));
    }

    let mut created = Vec::new();
    for input in &body.tags {
        let name = match input.name.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n,
            _ => continue,
        };
        let color = input
            .color
            .as_deref()
            .filter(|c| !c.trim().is_empty())
            .unwrap_or(crate::store::DEFAULT_TAG_COLOR);

        if let Some(tag) = state.store.create_tag(&user.uid, name, color).await? {
            log_activity(
                state.store.as_ref(),
                &user.uid,
                "CREATE_TAG",
                &format!("Created tag: \"{}\"", tag.name),
                None,
            )
            .await;
            created.push(tag);
        }
    }

    if created.is_empty() {
        return Err(ApiError::Validation(
            "No new tags were created (all duplicates or invalid)".to_string(),
        ));
    }

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "message": format!("{} tag(s) created successfully", created.len()),
            "tags": created,
        })),
    ))
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tags = state.store.list_tags(&user.uid).await?;
    let distribution = state.store.tag_distribution(&user.uid).await?;

    let mut tag_counts = serde_json::Map::new();
    for entry in distribution {
        tag_counts.insert(entry.name, json!(entry.count));
    }

    Ok(Json(json!({
        "success": true,
        "tags": tags,
        "tagCounts": tag_counts,
    })))
}

pub(super) async fn edit(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<TagInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let name = body
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| ApiError::Validation("Tag name is required".to_string()))?;
    let color = body
        .color
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .ok_or_else(|| ApiError::Validation("Tag color is required".to_string()))?;

    let before = state
        .store
        .get_tag(&user.uid, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))?;

    let tag = state
        .store
        .update_tag(&user.uid, &id, name, color)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))?;

    log_activity(
        state.store.as_ref(),
        &user.uid,
        "EDIT_TAG",
        &format!("Updated tag: \"{}\" -> \"{}\"", before.name, tag.name),
        None,
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Tag updated successfully",
        "tag": tag,
    })))
}

#[derive(Deserialize)]
pub(super) struct DeleteQuery {
    force: Option<String>,
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Query(q): Query<DeleteQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let tag = state
        .store
        .get_tag(&user.uid, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Tag not found".to_string()))?;

    let contact_count = state.store.tag_contact_count(&user.uid, &id).await?;
    let force = q.force.as_deref() == Some("true");

    if contact_count > 0 && !force {
        return Err(ApiError::TagInUse {
            name: tag.name,
            contact_count,
        });
    }

    if force && contact_count > 0 {
        let removed_from = state.store.force_delete_tag(&user.uid, &id).await?;
        log_activity(
            state.store.as_ref(),
            &user.uid,
            "FORCE_DELETE_TAG",
            &format!(
                "Force deleted tag: \"{}\" (removed from {} contacts)",
                tag.name, removed_from
            ),
            None,
        )
        .await;
        return Ok(Json(json!({
            "success": true,
            "message": format!(
                "Tag \"{}\" deleted and removed from {} contact(s)",
                tag.name, removed_from
            ),
        })));
    }

    if !state.store.delete_tag(&user.uid, &id).await? {
        return Err(ApiError::NotFound("Tag not found".to_string()));
    }
    log_activity(
        state.store.as_ref(),
        &user.uid,
        "DELETE_TAG",
        &format!("Deleted tag: \"{}\"", tag.name),
        None,
    )
    .await;

    Ok(Json(json!({
        "success": true,
        "message": "Tag deleted successfully",
    })))
}
