use axum::Json;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use bytes::Bytes;
use promptgate_common::Error;
use promptgate_db::HistoryStore;
use promptgate_llm::{
    ChatRole, ConversationRequest, FormattedReply, build_model_args, format_reply,
    normalize_messages,
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::state::SharedState;

const MAX_TITLE_CHARS: usize = 64;

/// POST /conversation/{context}: answer a conversation using the prompt for `context`.
#[instrument(skip_all, fields(context = %context))]
pub async fn conversation(
    State(state): State<SharedState>,
    Path(context): Path<String>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<FormattedReply>, ApiError> {
    let request: ConversationRequest = parse_json_body(&headers, &body)?;

    let system_prompt = state.prompts.select(&context)?;
    let messages = normalize_messages(&request.messages, system_prompt);
    let args = build_model_args(messages, &state.config.azure_openai);

    debug!(
        provider = state.llm.provider_id(),
        messages = args.messages.len(),
        "sending chat request"
    );
    let completion = state.llm.complete(&args).await?;

    let mut reply = format_reply(
        &completion.body,
        request.history_metadata.clone(),
        completion.request_id,
    )?;

    match &state.history {
        Some(store) => persist_turn(store, &user, &request, &mut reply),
        None => debug!("chat history disabled, skipping persistence"),
    }

    info!(
        request_id = reply.apim_request_id.as_deref().unwrap_or("-"),
        user = user.user_name.as_deref().unwrap_or(user.user_principal_id.as_str()),
        "conversation completed"
    );
    Ok(Json(reply))
}

/// Decode a JSON request body. Non-JSON bodies are `MalformedRequest`; JSON of
/// the wrong shape is a bad request.
pub(crate) fn parse_json_body<T: DeserializeOwned>(
    headers: &HeaderMap,
    body: &[u8],
) -> Result<T, ApiError> {
    if !is_json_content_type(headers) {
        return Err(Error::MalformedRequest("request must be JSON".to_string()).into());
    }
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::MalformedRequest(format!("request must be JSON: {e}")))?;
    serde_json::from_value(value)
        .map_err(|e| ApiError::bad_request(format!("invalid request body: {e}")))
}

fn is_json_content_type(headers: &HeaderMap) -> bool {
    let Some(content_type) = headers.get(CONTENT_TYPE).and_then(|v| v.to_str().ok()) else {
        return false;
    };
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Store the latest user turn and the assistant reply when the client opted
/// in with a `conversation_id` key. Failures are logged, never returned.
fn persist_turn(
    store: &HistoryStore,
    user: &AuthenticatedUser,
    request: &ConversationRequest,
    reply: &mut FormattedReply,
) {
    let Some(requested) = reply.history_metadata.get("conversation_id") else {
        return;
    };
    let requested_id = requested
        .as_str()
        .filter(|id| !id.is_empty())
        .map(str::to_string);
    let user_id = user.user_principal_id.as_str();

    let last_user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == ChatRole::User);

    let result = (|| -> promptgate_common::Result<String> {
        let existing = match requested_id.as_deref() {
            Some(id) => store.get_conversation(user_id, id)?,
            None => None,
        };
        let conversation = match existing {
            Some(conversation) => conversation,
            None => {
                let title = last_user
                    .map(|m| m.content.chars().take(MAX_TITLE_CHARS).collect::<String>())
                    .unwrap_or_else(|| "New conversation".to_string());
                store.create_conversation(user_id, &title)?
            }
        };

        if let Some(message) = last_user {
            store.create_message(
                &conversation.id,
                user_id,
                ChatRole::User.as_str(),
                &message.content,
            )?;
        }
        if let Some(content) = reply.assistant_content() {
            store.create_message(
                &conversation.id,
                user_id,
                ChatRole::Assistant.as_str(),
                content,
            )?;
        }
        Ok(conversation.id)
    })();

    match result {
        Ok(conversation_id) => {
            if let Some(metadata) = reply.history_metadata.as_object_mut() {
                metadata.insert("conversation_id".to_string(), Value::String(conversation_id));
            }
        }
        Err(e) => warn!("failed to persist conversation turn: {e}"),
    }
}
