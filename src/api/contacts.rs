use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Extension, Json,
};
use chrono::{DateTime, Datelike, Duration, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, AppState};
use crate::activity_log::log_activity;
use crate::traits::{AuthUser, ContactQuery, ContactUpdate, CrmStore, NewContact};

pub(super) async fn create(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<NewContact>,
) -> Result<impl IntoResponse, ApiError> {
    if body.name.trim().is_empty()
        || body.email.trim().is_empty()
        || body.phone.trim().is_empty()
        || body.company.trim().is_empty()
    {
        return Err(ApiError::Validation("All fields are required".to_string()));
    }

    let contact = state.store.create_contact(&user.uid, &body).await?;
    log_activity(
        state.store.as_ref(),
        &user.uid,
        "CREATE_CONTACT",
        &format!(
            "Created contact: \"{}\" ({}, {})",
            contact.name, contact.email, contact.company
        ),
        None,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "contact": contact,
            "message": "Contact created successfully",
            "success": true,
        })),
    ))
}

#[derive(Deserialize)]
pub(super) struct ListQuery {
    page: Option<u32>,
    limit: Option<u32>,
    search: Option<String>,
    /// Comma-separated tag names.
    tags: Option<String>,
}

pub(super) async fn list(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<ListQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let limit = q.limit.unwrap_or(10).max(1);
    let page = q.page.unwrap_or(1).max(1);
    let query = ContactQuery {
        page,
        limit,
        search: q.search,
        tags: q
            .tags
            .map(|t| {
                t.split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default(),
    };

    let result = state.store.list_contacts(&user.uid, &query).await?;
    let total_pages = (result.total_contacts + limit as i64 - 1) / limit as i64;

    Ok(Json(json!({
        "contacts": result.contacts,
        "message": "Contacts retrieved successfully",
        "success": true,
        "pagination": {
            "totalContacts": result.total_contacts,
            "totalPages": total_pages,
            "currentPage": page,
            "limit": limit,
        },
    })))
}

pub(super) async fn get_by_id(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let contact = state
        .store
        .get_contact(&user.uid, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Contact not found".to_string()))?;

    Ok(Json(json!({
        "contact": contact,
        "message": "Contact retrieved successfully",
        "success": true,
    })))
}

pub(super) async fn update(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
    Json(body): Json<ContactUpdate>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let contact = state
        .store
        .update_contact(&user.uid, &id, &body)
        .await?
        .ok_or_else(|| ApiError::NotFound("Contact not found".to_string()))?;

    log_activity(
        state.store.as_ref(),
        &user.uid,
        "UPDATE_CONTACT",
        &format!(
            "Updated contact: \"{}\" ({}, {})",
            contact.name, contact.email, contact.company
        ),
        Some(&id),
    )
    .await;

    Ok(Json(json!({
        "contact": contact,
        "message": "Contact updated successfully",
        "success": true,
    })))
}

pub(super) async fn delete(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let deleted = state
        .store
        .delete_contact(&user.uid, &id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Contact not found".to_string()))?;

    log_activity(
        state.store.as_ref(),
        &user.uid,
        "DELETE_CONTACT",
        &format!(
            "Deleted contact: \"{}\" ({}, {})",
            deleted.name, deleted.email, deleted.company
        ),
        None,
    )
    .await;

    Ok(Json(json!({
        "message": "Contact deleted successfully",
        "success": true,
    })))
}

#[derive(Deserialize)]
pub(super) struct DeleteManyBody {
    ids: Vec<String>,
}

pub(super) async fn delete_many(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<DeleteManyBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.ids.is_empty() {
        return Err(ApiError::Validation("Contact IDs are required".to_string()));
    }

    let deleted = state.store.delete_contacts(&user.uid, &body.ids).await?;
    if deleted == 0 {
        return Err(ApiError::NotFound(
            "No contacts found to delete".to_string(),
        ));
    }

    log_activity(
        state.store.as_ref(),
        &user.uid,
        "DELETE_MULTIPLE_CONTACTS",
        &format!("Deleted {} contacts", deleted),
        None,
    )
    .await;

    Ok(Json(json!({
        "message": format!("{} contacts deleted successfully", deleted),
        "success": true,
    })))
}

#[derive(Deserialize)]
pub(super) struct ImportBody {
    contacts: Vec<NewContact>,
}

pub(super) async fn import(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ImportBody>,
) -> Result<impl IntoResponse, ApiError> {
    if body.contacts.is_empty() {
        return Err(ApiError::Validation(
            "No contacts provided for import".to_string(),
        ));
    }

    let outcome = state
        .store
        .import_contacts(&user.uid, &body.contacts)
        .await?;

    if outcome.imported.is_empty() {
        return Ok((
            StatusCode::BAD_REQUEST,
            Json(json!({
                "error": "All contacts already exist",
                "success": false,
                "imported": 0,
                "rejected": outcome.duplicates.len(),
                "duplicates": outcome.duplicates,
            })),
        ));
    }

    log_activity(
        state.store.as_ref(),
        &user.uid,
        "BULK_IMPORT_CONTACTS",
        &format!(
            "Imported {} contacts from CSV. Rejected {} duplicates.",
            outcome.imported.len(),
            outcome.duplicates.len()
        ),
        None,
    )
    .await;

    Ok((
        StatusCode::OK,
        Json(json!({
            "message": format!(
                "Successfully imported {} contacts. {} duplicates were rejected.",
                outcome.imported.len(),
                outcome.duplicates.len()
            ),
            "success": true,
            "imported": outcome.imported.len(),
            "rejected": outcome.duplicates.len(),
            "duplicates": outcome.duplicates,
            "importedContacts": outcome.imported,
        })),
    ))
}

/// Midnight at the start of the week (Monday) containing `now`.
/// Computed per request; no load-time date constants.
fn start_of_week(now: DateTime<Utc>) -> DateTime<Utc> {
    let days_from_monday = now.weekday().num_days_from_monday() as i64;
    let monday = now.date_naive() - Duration::days(days_from_monday);
    Utc.from_utc_datetime(&monday.and_time(NaiveTime::MIN))
}

pub(super) async fn stats(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let store = state.store.as_ref();
    let uid = &user.uid;
    let now = Utc::now();

    let total_contacts = store.contact_count(uid).await?;
    let activities_total = store.activity_count(uid).await?;

    let week_start = start_of_week(now);
    let new_this_week = store.contacts_created_between(uid, week_start, now).await?;

    let top_companies = store.top_companies(uid, 5).await?;
    let contacts_by_company: Vec<serde_json::Value> = top_companies
        .iter()
        .map(|c| json!({ "name": c.name, "contacts": c.count }))
        .collect();

    let tag_distribution = store.tag_distribution(uid).await?;

    // Activity counts for the trailing 7 days, keyed by weekday name.
    let mut activities_by_day = serde_json::Map::new();
    for i in (0..7).rev() {
        let day = now.date_naive() - Duration::days(i);
        let from = Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN));
        let to = from + Duration::days(1) - Duration::microseconds(1);
        let count = store.activities_between(uid, from, to).await?;
        activities_by_day.insert(from.format("%A").to_string(), json!(count));
    }

    // Contacts created during the previous week (Monday through Sunday).
    let last_week_start = week_start - Duration::days(7);
    let last_week_end = week_start - Duration::microseconds(1);
    let contacts_per_day = store
        .contacts_per_day(uid, last_week_start, last_week_end)
        .await?;

    let all_contact_tags = store.all_contact_tags(uid).await?;
    let all_contacts: Vec<serde_json::Value> = all_contact_tags
        .into_iter()
        .map(|tags| json!({ "tags": tags }))
        .collect();

    Ok(Json(json!({
        "success": true,
        "message": "Contact statistics retrieved successfully",
        "data": {
            "totalContacts": total_contacts,
            "newThisWeek": new_this_week,
            "contactsByCompany": contacts_by_company,
            "tagDistribution": tag_distribution,
            "allContacts": all_contacts,
            "activitiesByDay": activities_by_day,
            "activities": activities_total,
            "contactsPerDay": contacts_per_day,
        },
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contact_input, test_state};
    use crate::traits::CrmStore;

    #[tokio::test]
    async fn all_duplicate_import_is_rejected_with_400() {
        let state = test_state().await;
        state
            .store
            .create_contact("u1", &contact_input("Ada", "ada@example.com", &[]))
            .await
            .unwrap();

        let response = import(
            State(state.clone()),
            Extension(AuthUser { uid: "u1".into() }),
            Json(ImportBody {
                contacts: vec![contact_input("Ada Again", "ada@example.com", &[])],
            }),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(state.store.contact_count("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn partial_import_succeeds_with_200() {
        let state = test_state().await;
        state
            .store
            .create_contact("u1", &contact_input("Ada", "ada@example.com", &[]))
            .await
            .unwrap();

        let response = import(
            State(state.clone()),
            Extension(AuthUser { uid: "u1".into() }),
            Json(ImportBody {
                contacts: vec![
                    contact_input("Ada Again", "ada@example.com", &[]),
                    contact_input("Grace", "grace@example.com", &[]),
                ],
            }),
        )
        .await
        .unwrap()
        .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.store.contact_count("u1").await.unwrap(), 2);
    }

    #[test]
    fn week_starts_on_monday() {
        // 2026-08-27 is a Thursday.
        let now = "2026-08-27T15:30:00Z".parse::<DateTime<Utc>>().unwrap();
        let start = start_of_week(now);
        assert_eq!(start.to_rfc3339(), "2026-08-24T00:00:00+00:00");
        assert_eq!(start.weekday(), chrono::Weekday::Mon);
    }

    #[test]
    fn monday_is_its_own_week_start() {
        let now = "2026-08-24T00:00:01Z".parse::<DateTime<Utc>>().unwrap();
        assert_eq!(start_of_week(now).to_rfc3339(), "2026-08-24T00:00:00+00:00");
    }
}
