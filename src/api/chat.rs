use axum::{
    extract::{Path, State},
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

use super::{ApiError, AppState};
use crate::context;
use crate::traits::{AuthUser, CompletionProvider, Conversation, CrmStore, Sender};

pub struct ChatTurnOutcome {
    pub reply: String,
    pub conversation_id: String,
    /// Whether the system prompt carried live CRM data.
    pub crm_grounded: bool,
}

/// One full chat exchange: ground the prompt in the caller's CRM data, append
/// the user turn, call the completion API, append the reply.
///
/// The user turn is persisted before the upstream call, so a provider failure
/// leaves it in the transcript and a retry sees it.
pub async fn run_chat_turn(
    store: &dyn CrmStore,
    provider: &dyn CompletionProvider,
    model: &str,
    uid: &str,
    conversation_id: &str,
    message: &str,
) -> Result<ChatTurnOutcome, ApiError> {
    let snapshot = context::assemble(store, uid).await;
    let crm_grounded = snapshot.is_some();
    if !crm_grounded {
        warn!(uid, "Chat proceeding without CRM context");
    }

    let mut conversation = store.get_or_create_conversation(uid, conversation_id).await?;
    conversation.append(Sender::User, message);
    store.persist_conversation(&conversation).await?;

    let system_prompt = context::render_system_prompt(snapshot.as_ref());
    let mut messages = Vec::with_capacity(conversation.messages.len() + 1);
    messages.push(json!({ "role": "system", "content": system_prompt }));
    for turn in &conversation.messages {
        let role = match turn.sender {
            Sender::User => "user",
            Sender::Assistant => "assistant",
        };
        messages.push(json!({ "role": role, "content": turn.message }));
    }

    let reply = provider.complete(model, &messages).await.map_err(|e| {
        warn!(uid, conversation_id, "Completion request failed: {:#}", e);
        ApiError::Dependency(e.to_string())
    })?;

    conversation.append(Sender::Assistant, reply.as_str());
    store.persist_conversation(&conversation).await?;

    info!(
        uid,
        conversation_id,
        turns = conversation.messages.len(),
        crm_grounded,
        "Chat turn completed"
    );

    Ok(ChatTurnOutcome {
        reply,
        conversation_id: conversation.conversation_id,
        crm_grounded,
    })
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct SendBody {
    message: String,
    conversation_id: String,
}

pub(super) async fn send(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<SendBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if body.message.trim().is_empty() {
        return Err(ApiError::Validation("Message is required".to_string()));
    }
    if body.conversation_id.trim().is_empty() {
        return Err(ApiError::Validation(
            "Conversation ID is required".to_string(),
        ));
    }

    let outcome = run_chat_turn(
        state.store.as_ref(),
        state.provider.as_ref(),
        &state.model,
        &user.uid,
        &body.conversation_id,
        &body.message,
    )
    .await?;

    Ok(Json(json!({
        "success": true,
        "response": outcome.reply,
        "conversationId": outcome.conversation_id,
        "crmDataIncluded": outcome.crm_grounded,
    })))
}

fn conversation_summary(conv: &Conversation) -> serde_json::Value {
    json!({
        "conversationId": conv.conversation_id,
        "title": conv.title,
        "messageCount": conv.messages.len(),
        "createdAt": conv.created_at,
        "updatedAt": conv.updated_at,
        "hasCRMContext": true,
    })
}

/// All of the caller's conversations, newest-updated first, without bodies.
pub(super) async fn history(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversations = state.store.list_conversations(&user.uid).await?;
    let summaries: Vec<_> = conversations.iter().map(conversation_summary).collect();
    Ok(Json(json!({
        "success": true,
        "conversations": summaries,
    })))
}

pub(super) async fn get_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let conversation = state
        .store
        .get_conversation(&user.uid, &conversation_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    // Context-size indicator for the client, not the stored transcript.
    let crm_context = context::assemble(state.store.as_ref(), &user.uid)
        .await
        .map(|s| {
            json!({
                "contactsCount": s.total_contacts,
                "activitiesCount": s.activities.len(),
                "tagsCount": s.tags_count,
            })
        });

    Ok(Json(json!({
        "success": true,
        "conversation": conversation,
        "crmContext": crm_context,
    })))
}

pub(super) async fn delete_conversation(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if !state
        .store
        .delete_conversation(&user.uid, &conversation_id)
        .await?
    {
        return Err(ApiError::NotFound("Conversation not found".to_string()));
    }

    Ok(Json(json!({
        "success": true,
        "message": "Conversation deleted successfully",
    })))
}

#[derive(Deserialize)]
pub(super) struct TitleBody {
    title: String,
}

pub(super) async fn update_title(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(conversation_id): Path<String>,
    Json(body): Json<TitleBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let title = body.title.trim();
    if title.is_empty() {
        return Err(ApiError::Validation("Title is required".to_string()));
    }

    let conversation = state
        .store
        .set_conversation_title(&user.uid, &conversation_id, title)
        .await?
        .ok_or_else(|| ApiError::NotFound("Conversation not found".to_string()))?;

    Ok(Json(json!({
        "success": true,
        "conversation": conversation_summary(&conversation),
    })))
}
