use std::collections::HashMap;

use promptgate_common::{Error, Result};
use promptgate_config::AppConfig;
use tracing::debug;

/// Contexts that ship with a built-in system prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContextKey {
    It,
    Legal,
}

impl ContextKey {
    pub const ALL: [ContextKey; 2] = [ContextKey::It, ContextKey::Legal];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::It => "it",
            Self::Legal => "legal",
        }
    }

    pub fn prompt(&self) -> &'static str {
        match self {
            Self::It => {
                "You are an expert IT assistant. Provide detailed technical guidance and solutions for IT-related queries."
            }
            Self::Legal => {
                "You are a professional legal assistant. Provide accurate, concise, and compliant legal advice."
            }
        }
    }
}

/// Resolves a path context to a system prompt.
///
/// The table is seeded from [`ContextKey`], then overlaid with configured
/// prompts. Unknown contexts fall back to the default prompt when one is set.
#[derive(Debug, Clone)]
pub struct PromptSelector {
    prompts: HashMap<String, String>,
    default: Option<String>,
}

impl PromptSelector {
    pub fn new<I>(extra: I, default: Option<String>) -> Result<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut prompts: HashMap<String, String> = ContextKey::ALL
            .iter()
            .map(|key| (key.as_str().to_string(), key.prompt().to_string()))
            .collect();

        for (context, prompt) in extra {
            if context.trim().is_empty() || prompt.trim().is_empty() {
                return Err(Error::Config(format!(
                    "context '{context}' must have a non-empty name and prompt"
                )));
            }
            prompts.insert(context, prompt);
        }

        let default = default.filter(|p| !p.trim().is_empty());
        Ok(Self { prompts, default })
    }

    /// Built-in prompts only, without a fallback.
    pub fn builtin() -> Self {
        Self {
            prompts: ContextKey::ALL
                .iter()
                .map(|key| (key.as_str().to_string(), key.prompt().to_string()))
                .collect(),
            default: None,
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.prompts.clone(),
            config.azure_openai.default_prompt().map(str::to_string),
        )
    }

    pub fn select(&self, context: &str) -> Result<&str> {
        if let Some(prompt) = self.prompts.get(context) {
            return Ok(prompt.as_str());
        }
        match &self.default {
            Some(prompt) => {
                debug!("context '{context}' not mapped, using default prompt");
                Ok(prompt.as_str())
            }
            None => Err(Error::UnsupportedContext(context.to_string())),
        }
    }

    /// Known contexts in sorted order.
    pub fn contexts(&self) -> Vec<&str> {
        let mut contexts: Vec<&str> = self.prompts.keys().map(String::as_str).collect();
        contexts.sort_unstable();
        contexts
    }

    pub fn has_default(&self) -> bool {
        self.default.is_some()
    }
}
