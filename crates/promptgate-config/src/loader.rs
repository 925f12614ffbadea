use std::path::{Path, PathBuf};

use promptgate_common::{Error, Result};
use tracing::{debug, info};

use crate::model::{AppConfig, ChatHistoryConfig};

const DEFAULT_CONFIG_FILE: &str = "promptgate.yml";

/// Builds an [`AppConfig`] from defaults, an optional YAML file, `.env` and the
/// process environment, in that order of precedence (later wins).
pub struct ConfigLoader {
    path: Option<PathBuf>,
    load_dotenv: bool,
}

impl ConfigLoader {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            load_dotenv: true,
        }
    }

    /// Skip reading `.env` from the working directory.
    pub fn without_dotenv(mut self) -> Self {
        self.load_dotenv = false;
        self
    }

    pub fn load(&self) -> Result<AppConfig> {
        if self.load_dotenv {
            match dotenvy::dotenv() {
                Ok(path) => debug!("loaded environment from {}", path.display()),
                Err(e) if e.not_found() => {}
                Err(e) => return Err(Error::Config(format!("failed to read .env: {e}"))),
            }
        }

        let mut config = match self.config_file() {
            Some(path) => Self::load_file(&path)?,
            None => AppConfig::default(),
        };
        apply_env(&mut config, |key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    fn config_file(&self) -> Option<PathBuf> {
        match &self.path {
            Some(path) => Some(path.clone()),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                default.is_file().then_some(default)
            }
        }
    }

    pub fn load_file(path: &Path) -> Result<AppConfig> {
        info!("loading config from {}", path.display());
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("failed to read config at {}: {e}", path.display()))
        })?;
        serde_yaml::from_str(&contents)
            .map_err(|e| Error::Config(format!("invalid config at {}: {e}", path.display())))
    }
}

/// Overlay environment variables onto `config`. `lookup` returns the raw value
/// of a variable; empty values are treated as unset.
pub fn apply_env<F>(config: &mut AppConfig, lookup: F) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = get("UI_TITLE") {
        config.ui.title = v;
    }
    if let Some(v) = get("UI_FAVICON") {
        config.ui.favicon = v;
    }

    let aoai = &mut config.azure_openai;
    if let Some(v) = get("AZURE_OPENAI_RESOURCE") {
        aoai.resource = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_ENDPOINT") {
        aoai.endpoint = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_KEY") {
        aoai.key = Some(v);
    }
    if let Some(v) = get("AZURE_OPENAI_PREVIEW_API_VERSION") {
        aoai.preview_api_version = v;
    }
    if let Some(v) = get("AZURE_OPENAI_TEMPERATURE") {
        aoai.temperature = parse_var("AZURE_OPENAI_TEMPERATURE", &v)?;
    }
    if let Some(v) = get("AZURE_OPENAI_MAX_TOKENS") {
        aoai.max_tokens = parse_var("AZURE_OPENAI_MAX_TOKENS", &v)?;
    }
    if let Some(v) = get("AZURE_OPENAI_TOP_P") {
        aoai.top_p = parse_var("AZURE_OPENAI_TOP_P", &v)?;
    }
    if let Some(v) = get("AZURE_OPENAI_STOP_SEQUENCE") {
        aoai.stop_sequence = Some(v.split('|').map(str::to_string).collect());
    }
    if let Some(v) = get("AZURE_OPENAI_STREAM") {
        aoai.stream = parse_bool("AZURE_OPENAI_STREAM", &v)?;
    }
    if let Some(v) = get("AZURE_OPENAI_MODEL") {
        aoai.model = v;
    }
    // An explicitly empty system message disables the fallback prompt.
    if let Some(v) = lookup("AZURE_OPENAI_SYSTEM_MESSAGE") {
        aoai.system_message = v;
    }
    if let Some(v) = get("AZURE_OPENAI_TIMEOUT_SECS") {
        aoai.timeout_secs = parse_var("AZURE_OPENAI_TIMEOUT_SECS", &v)?;
    }

    if let Some(v) = get("CHAT_HISTORY_ENABLED") {
        if parse_bool("CHAT_HISTORY_ENABLED", &v)? {
            config.chat_history.get_or_insert_with(ChatHistoryConfig::default);
        } else {
            config.chat_history = None;
        }
    }
    if let Some(history) = config.chat_history.as_mut() {
        if let Some(v) = get("CHAT_HISTORY_ACCOUNT") {
            history.account = v;
        }
        if let Some(v) = get("CHAT_HISTORY_DATABASE") {
            history.database = v;
        }
        if let Some(v) = get("CHAT_HISTORY_CONVERSATIONS_CONTAINER") {
            history.conversations_container = v;
        }
        if let Some(v) = get("CHAT_HISTORY_ACCOUNT_KEY") {
            history.account_key = Some(v);
        }
        if let Some(v) = get("CHAT_HISTORY_ENABLE_FEEDBACK") {
            history.enable_feedback = parse_bool("CHAT_HISTORY_ENABLE_FEEDBACK", &v)?;
        }
    }

    if let Some(v) = get("PROMPTGATE_HOST") {
        config.gateway.host = v;
    }
    if let Some(v) = get("PROMPTGATE_PORT") {
        config.gateway.port = parse_var("PROMPTGATE_PORT", &v)?;
    }
    if let Some(v) = get("PROMPTGATE_STATIC_DIR") {
        config.gateway.static_dir = v;
    }

    Ok(())
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| Error::Config(format!("invalid value for {key}: {e}")))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config(format!("invalid boolean for {key}: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_model_parameters() {
        let mut config = AppConfig::default();
        apply_env(
            &mut config,
            lookup_from(&[
                ("AZURE_OPENAI_RESOURCE", "contoso"),
                ("AZURE_OPENAI_MODEL", "gpt-4o"),
                ("AZURE_OPENAI_TEMPERATURE", "0.7"),
                ("AZURE_OPENAI_MAX_TOKENS", "800"),
                ("AZURE_OPENAI_TOP_P", "0.95"),
                ("AZURE_OPENAI_STOP_SEQUENCE", "END|STOP"),
                ("AZURE_OPENAI_STREAM", "true"),
            ]),
        )
        .unwrap();

        let aoai = &config.azure_openai;
        assert_eq!(aoai.resource.as_deref(), Some("contoso"));
        assert_eq!(aoai.model, "gpt-4o");
        assert_eq!(aoai.temperature, 0.7);
        assert_eq!(aoai.max_tokens, 800);
        assert_eq!(aoai.top_p, 0.95);
        assert_eq!(
            aoai.stop_sequence,
            Some(vec!["END".to_string(), "STOP".to_string()])
        );
        assert!(aoai.stream);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn empty_system_message_env_clears_fallback() {
        let mut config = AppConfig::default();
        apply_env(&mut config, lookup_from(&[("AZURE_OPENAI_SYSTEM_MESSAGE", "")])).unwrap();
        assert_eq!(config.azure_openai.default_prompt(), None);
    }

    #[test]
    fn chat_history_is_enabled_by_flag() {
        let mut config = AppConfig::default();
        apply_env(
            &mut config,
            lookup_from(&[
                ("CHAT_HISTORY_ENABLED", "true"),
                ("CHAT_HISTORY_ACCOUNT", "memory"),
                ("CHAT_HISTORY_ENABLE_FEEDBACK", "yes"),
            ]),
        )
        .unwrap();

        let history = config.chat_history.expect("history should be enabled");
        assert!(history.is_in_memory());
        assert!(history.enable_feedback);
        assert_eq!(history.conversations_container, "conversations");
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let mut config = AppConfig::default();
        let result = apply_env(&mut config, lookup_from(&[("AZURE_OPENAI_MAX_TOKENS", "lots")]));
        assert!(matches!(result, Err(Error::Config(_))));

        let result = apply_env(&mut config, lookup_from(&[("AZURE_OPENAI_STREAM", "maybe")]));
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn yaml_file_supplies_prompts_and_history() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "ui:\n  title: Helpdesk\nazure_openai:\n  resource: contoso\n  model: gpt-4o\nprompts:\n  hr: You are an HR assistant.\nchat_history:\n  account: memory\n"
        )
        .unwrap();

        let config = ConfigLoader::load_file(file.path()).unwrap();
        assert_eq!(config.ui.title, "Helpdesk");
        assert_eq!(config.ui.favicon, "/favicon.ico");
        assert_eq!(
            config.prompts.get("hr").map(String::as_str),
            Some("You are an HR assistant.")
        );
        assert!(config.chat_history.unwrap().is_in_memory());
    }

    #[test]
    fn missing_file_is_config_error() {
        let result = ConfigLoader::load_file(Path::new("/nonexistent/promptgate.yml"));
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
