use std::collections::BTreeMap;
use std::path::PathBuf;

use promptgate_common::{Error, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_API_VERSION: &str = "2024-05-01-preview";
pub const DEFAULT_SYSTEM_MESSAGE: &str =
    "You are an AI assistant that helps people find information.";

/// Root configuration for the gateway process.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub ui: UiConfig,
    pub azure_openai: AzureOpenAiConfig,
    pub chat_history: Option<ChatHistoryConfig>,
    pub gateway: GatewayConfig,
    /// Extra context prompts merged over the built-in ones, keyed by path segment.
    pub prompts: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    pub title: String,
    pub favicon: String,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            title: "Contoso".to_string(),
            favicon: "/favicon.ico".to_string(),
        }
    }
}

/// Model parameters and credentials for the Azure OpenAI deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AzureOpenAiConfig {
    pub resource: Option<String>,
    pub endpoint: Option<String>,
    pub key: Option<String>,
    pub preview_api_version: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub top_p: f64,
    pub stop_sequence: Option<Vec<String>>,
    pub stream: bool,
    pub model: String,
    /// Fallback prompt for unrecognized contexts. Empty disables the fallback.
    pub system_message: String,
    pub timeout_secs: u64,
}

impl Default for AzureOpenAiConfig {
    fn default() -> Self {
        Self {
            resource: None,
            endpoint: None,
            key: None,
            preview_api_version: DEFAULT_API_VERSION.to_string(),
            temperature: 0.0,
            max_tokens: 1000,
            top_p: 0.0,
            stop_sequence: None,
            stream: false,
            model: String::new(),
            system_message: DEFAULT_SYSTEM_MESSAGE.to_string(),
            timeout_secs: 60,
        }
    }
}

impl AzureOpenAiConfig {
    /// Base URL of the deployment. An explicit endpoint wins over the resource name.
    pub fn resolved_endpoint(&self) -> Option<String> {
        if let Some(endpoint) = self.endpoint.as_deref().filter(|e| !e.trim().is_empty()) {
            return Some(endpoint.trim().to_string());
        }
        self.resource
            .as_deref()
            .filter(|r| !r.trim().is_empty())
            .map(|r| format!("https://{}.openai.azure.com/", r.trim()))
    }

    pub fn default_prompt(&self) -> Option<&str> {
        let prompt = self.system_message.trim();
        if prompt.is_empty() { None } else { Some(prompt) }
    }
}

/// Connection parameters for the conversation history store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatHistoryConfig {
    /// Directory holding the store files, or `memory` for a process-local store.
    pub account: String,
    pub database: String,
    pub conversations_container: String,
    pub account_key: Option<String>,
    pub enable_feedback: bool,
}

impl Default for ChatHistoryConfig {
    fn default() -> Self {
        Self {
            account: "data".to_string(),
            database: "db_conversation_history".to_string(),
            conversations_container: "conversations".to_string(),
            account_key: None,
            enable_feedback: false,
        }
    }
}

impl ChatHistoryConfig {
    pub fn is_in_memory(&self) -> bool {
        self.account == "memory"
    }

    pub fn database_path(&self) -> PathBuf {
        PathBuf::from(&self.account).join(format!("{}.db", self.database))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub static_dir: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 50505,
            static_dir: "static".to_string(),
        }
    }
}

impl AppConfig {
    /// Reject configurations the gateway cannot serve with.
    pub fn validate(&self) -> Result<()> {
        let aoai = &self.azure_openai;

        let Some(endpoint) = aoai.resolved_endpoint() else {
            return Err(Error::Config(
                "either AZURE_OPENAI_ENDPOINT or AZURE_OPENAI_RESOURCE is required".to_string(),
            ));
        };
        match url::Url::parse(&endpoint) {
            Ok(parsed) if matches!(parsed.scheme(), "http" | "https") => {}
            _ => {
                return Err(Error::Config(format!(
                    "invalid Azure OpenAI endpoint: {endpoint}"
                )));
            }
        }

        if aoai.model.trim().is_empty() {
            return Err(Error::Config("AZURE_OPENAI_MODEL is required".to_string()));
        }
        if !(0.0..=2.0).contains(&aoai.temperature) {
            return Err(Error::Config(format!(
                "temperature must be within [0, 2], got {}",
                aoai.temperature
            )));
        }
        if !(0.0..=1.0).contains(&aoai.top_p) {
            return Err(Error::Config(format!(
                "top_p must be within [0, 1], got {}",
                aoai.top_p
            )));
        }
        if aoai.max_tokens == 0 {
            return Err(Error::Config("max_tokens must be positive".to_string()));
        }

        if let Some((context, _)) = self.prompts.iter().find(|(_, p)| p.trim().is_empty()) {
            return Err(Error::Config(format!(
                "prompt for context '{context}' is empty"
            )));
        }

        if let Some(history) = &self.chat_history {
            if history.database.trim().is_empty() || history.conversations_container.trim().is_empty()
            {
                return Err(Error::Config(
                    "chat history requires a database and a conversations container".to_string(),
                ));
            }
            let valid_container = history
                .conversations_container
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid_container {
                return Err(Error::Config(format!(
                    "invalid conversations container name: {}",
                    history.conversations_container
                )));
            }
        }

        Ok(())
    }
}
