use axum::{extract::State, Json};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::traits::{CrmStore, TokenVerifier};

#[derive(Deserialize)]
pub(super) struct VerifyBody {
    token: String,
}

/// Exchange an identity-provider credential for a local profile. First-time
/// callers get a profile row created from the verified claims.
pub(super) async fn verify_token(
    State(state): State<AppState>,
    Json(body): Json<VerifyBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.token.trim().is_empty() {
        return Err(ApiError::Validation("Token is required".to_string()));
    }

    let identity = state.verifier.verify(&body.token).await.map_err(|e| {
        warn!("Token verification failed: {}", e);
        ApiError::Unauthorized("Invalid or expired token".to_string())
    })?;

    let user = state.store.upsert_user(&identity).await?;
    info!(uid = %user.uid, "Credential verified");

    Ok(Json(json!({
        "success": true,
        "message": "Authenticated",
        "user": {
            "uid": user.uid,
            "name": user.name,
            "email": user.email,
            "avatar": user.avatar_url,
        },
    })))
}
