use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::auth::AuthenticatedUser;
use crate::conversation::parse_json_body;
use crate::error::ApiError;
use crate::state::SharedState;

/// GET /history/{conversation_id}: stored messages of one of the caller's conversations.
pub async fn conversation_history(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let store = state
        .history
        .as_ref()
        .ok_or_else(ApiError::history_unavailable)?;
    let user_id = &user.user_principal_id;

    if store.get_conversation(user_id, &conversation_id)?.is_none() {
        return Err(ApiError::not_found(format!(
            "conversation {conversation_id} was not found"
        )));
    }
    let messages = store.get_messages(user_id, &conversation_id)?;

    Ok(Json(json!({
        "conversation_id": conversation_id,
        "messages": messages,
    })))
}

/// DELETE /history/{conversation_id}: remove a conversation and its messages.
pub async fn delete_conversation(
    State(state): State<SharedState>,
    Path(conversation_id): Path<String>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, ApiError> {
    let store = state
        .history
        .as_ref()
        .ok_or_else(ApiError::history_unavailable)?;

    if !store.delete_conversation(&user.user_principal_id, &conversation_id)? {
        return Err(ApiError::not_found(format!(
            "conversation {conversation_id} was not found"
        )));
    }
    info!(%conversation_id, "conversation deleted");

    Ok(Json(json!({
        "conversation_id": conversation_id,
        "deleted": true,
    })))
}

#[derive(Deserialize)]
pub struct MessageFeedbackRequest {
    message_id: String,
    message_feedback: String,
}

/// POST /history/message_feedback: attach feedback to a stored assistant message.
pub async fn message_feedback(
    State(state): State<SharedState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let store = state
        .history
        .as_ref()
        .ok_or_else(ApiError::history_unavailable)?;
    let request: MessageFeedbackRequest = parse_json_body(&headers, &body)?;

    if !store.feedback_enabled() {
        return Err(ApiError::bad_request("message feedback is not enabled"));
    }
    if request.message_id.trim().is_empty() {
        return Err(ApiError::bad_request("message_id is required"));
    }

    let updated = store.update_message_feedback(
        &user.user_principal_id,
        &request.message_id,
        &request.message_feedback,
    )?;

    match updated {
        Some(message) => Ok(Json(json!({
            "message_id": message.id,
            "message_feedback": message.feedback,
        }))),
        None => Err(ApiError::not_found(format!(
            "message {} was not found",
            request.message_id
        ))),
    }
}
