use promptgate_common::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{ChatMessage, ChatRole};

/// Reply shape returned to clients regardless of what the provider sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormattedReply {
    pub id: String,
    pub model: String,
    pub created: i64,
    pub object: String,
    pub choices: Vec<ReplyChoice>,
    pub history_metadata: Value,
    #[serde(rename = "apim-request-id")]
    pub apim_request_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyChoice {
    pub messages: Vec<ChatMessage>,
}

impl FormattedReply {
    /// Content of the assistant message in the first choice.
    pub fn assistant_content(&self) -> Option<&str> {
        self.choices
            .first()?
            .messages
            .iter()
            .find(|m| m.role == ChatRole::Assistant)
            .map(|m| m.content.as_str())
    }
}

/// Map a raw chat-completions body into a [`FormattedReply`].
///
/// Missing top-level metadata is tolerated. Anything wrong with the first
/// choice's message is a `Format` error.
pub fn format_reply(
    body: &Value,
    history_metadata: Value,
    request_id: Option<String>,
) -> Result<FormattedReply> {
    let choices = body
        .get("choices")
        .and_then(Value::as_array)
        .ok_or_else(|| Error::Format("response has no choices array".to_string()))?;
    let first = choices
        .first()
        .ok_or_else(|| Error::Format("response contains no choices".to_string()))?;
    let message = first
        .get("message")
        .and_then(Value::as_object)
        .ok_or_else(|| Error::Format("first choice has no message".to_string()))?;

    let content = match message.get("content") {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => {
            return Err(Error::Format(format!(
                "message content is not a string: {other}"
            )));
        }
    };

    let mut messages = Vec::with_capacity(2);
    if let Some(context) = message.get("context").filter(|c| !c.is_null()) {
        messages.push(ChatMessage::new(
            ChatRole::Tool,
            serde_json::to_string(context)?,
        ));
    }
    messages.push(ChatMessage::assistant(content));

    Ok(FormattedReply {
        id: str_field(body, "id"),
        model: str_field(body, "model"),
        created: body.get("created").and_then(Value::as_i64).unwrap_or(0),
        object: str_field(body, "object"),
        choices: vec![ReplyChoice { messages }],
        history_metadata,
        apim_request_id: request_id,
    })
}

fn str_field(body: &Value, key: &str) -> String {
    body.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}
