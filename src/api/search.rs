use axum::{
    extract::{Query, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;

use super::{ApiError, AppState};
use crate::traits::{AuthUser, CrmStore};

#[derive(Deserialize)]
pub(super) struct SearchQuery {
    q: Option<String>,
}

/// Cross-entity search over the caller's contacts, tags, and activities.
/// An empty or missing query yields empty result sets, not an error.
pub(super) async fn search(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or("");
    let results = state.store.search(&user.uid, q).await?;
    Ok(Json(json!({
        "contacts": results.contacts,
        "tags": results.tags,
        "activities": results.activities,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{contact_input, test_state};
    use crate::traits::CrmStore;

    #[tokio::test]
    async fn empty_query_returns_empty_result_sets() {
        let state = test_state().await;
        state
            .store
            .create_contact("u1", &contact_input("Ada", "ada@example.com", &["vip"]))
            .await
            .unwrap();

        for q in [None, Some(String::new()), Some("   ".to_string())] {
            let Json(body) = search(
                State(state.clone()),
                Extension(AuthUser { uid: "u1".into() }),
                Query(SearchQuery { q }),
            )
            .await
            .unwrap();

            assert_eq!(body["contacts"], json!([]));
            assert_eq!(body["tags"], json!([]));
            assert_eq!(body["activities"], json!([]));
        }
    }

    #[tokio::test]
    async fn non_empty_query_matches() {
        let state = test_state().await;
        state
            .store
            .create_contact("u1", &contact_input("Ada", "ada@example.com", &[]))
            .await
            .unwrap();

        let Json(body) = search(
            State(state),
            Extension(AuthUser { uid: "u1".into() }),
            Query(SearchQuery {
                q: Some("ada".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(body["contacts"].as_array().unwrap().len(), 1);
        assert_eq!(body["contacts"][0]["name"], "Ada");
    }
}
