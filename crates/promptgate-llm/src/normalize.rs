use promptgate_config::AzureOpenAiConfig;

use crate::types::{ChatMessage, ChatRole, ModelArgs};

/// Build the outbound message list: tool-role messages are dropped, the rest
/// keep their order and content, and `system_prompt` goes first.
pub fn normalize_messages(messages: &[ChatMessage], system_prompt: &str) -> Vec<ChatMessage> {
    let mut normalized = Vec::with_capacity(messages.len() + 1);
    normalized.push(ChatMessage::system(system_prompt));
    normalized.extend(
        messages
            .iter()
            .filter(|m| m.role != ChatRole::Tool)
            .cloned(),
    );
    normalized
}

pub fn build_model_args(messages: Vec<ChatMessage>, config: &AzureOpenAiConfig) -> ModelArgs {
    ModelArgs {
        messages,
        temperature: config.temperature,
        max_tokens: config.max_tokens,
        top_p: config.top_p,
        stop: config.stop_sequence.clone(),
        stream: config.stream,
        model: config.model.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PROMPT: &str = "You are an expert IT assistant.";

    fn tool(content: &str) -> ChatMessage {
        ChatMessage::new(ChatRole::Tool, content)
    }

    #[test]
    fn system_prompt_is_first() {
        let normalized = normalize_messages(&[ChatMessage::user("printer jammed")], PROMPT);
        assert_eq!(normalized[0], ChatMessage::system(PROMPT));
        assert_eq!(normalized.len(), 2);
    }

    #[test]
    fn empty_conversation_yields_only_system_prompt() {
        let normalized = normalize_messages(&[], PROMPT);
        assert_eq!(normalized, vec![ChatMessage::system(PROMPT)]);
    }

    #[test]
    fn tool_messages_removed_and_order_preserved() {
        let original = vec![
            ChatMessage::user("first"),
            tool("{\"citations\": []}"),
            ChatMessage::assistant("second"),
            tool("{}"),
            ChatMessage::user("third"),
        ];
        let tool_count = original.iter().filter(|m| m.role == ChatRole::Tool).count();

        let normalized = normalize_messages(&original, PROMPT);

        assert_eq!(normalized.len(), original.len() - tool_count + 1);
        assert!(normalized.iter().all(|m| m.role != ChatRole::Tool));
        let contents: Vec<&str> = normalized[1..].iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn caller_messages_are_untouched() {
        let mut with_extra = ChatMessage::user("hello");
        with_extra.extra.insert("id".to_string(), json!("m-1"));
        let original = vec![ChatMessage::system("client supplied"), tool("x"), with_extra];
        let snapshot = original.clone();

        let normalized = normalize_messages(&original, PROMPT);

        assert_eq!(original, snapshot);
        // A client-supplied system message stays after the selected prompt.
        assert_eq!(normalized[1].content, "client supplied");
        assert_eq!(normalized[2].extra.get("id"), Some(&json!("m-1")));
    }

    #[test]
    fn model_args_copy_configuration() {
        let mut config = AzureOpenAiConfig::default();
        config.temperature = 0.3;
        config.max_tokens = 256;
        config.top_p = 0.9;
        config.stop_sequence = Some(vec!["###".to_string()]);
        config.model = "gpt-4o".to_string();

        let args = build_model_args(vec![ChatMessage::system(PROMPT)], &config);

        assert_eq!(args.temperature, 0.3);
        assert_eq!(args.max_tokens, 256);
        assert_eq!(args.top_p, 0.9);
        assert_eq!(args.stop, Some(vec!["###".to_string()]));
        assert!(!args.stream);
        assert_eq!(args.model, "gpt-4o");
        assert_eq!(args.messages.len(), 1);
    }
}
