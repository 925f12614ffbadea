use std::sync::Arc;

use promptgate_common::Result;
use promptgate_config::AppConfig;
use promptgate_db::HistoryStore;
use promptgate_llm::{CompletionClient, PromptSelector};

/// Shared, read-only state handed to every request handler.
///
/// The history store is resolved before the router is built, so handlers see
/// either a ready store or `None` (history disabled) and never wait on it.
pub struct AppState {
    pub config: AppConfig,
    pub prompts: PromptSelector,
    pub llm: Arc<dyn CompletionClient>,
    pub history: Option<Arc<HistoryStore>>,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn new(
        config: AppConfig,
        llm: Arc<dyn CompletionClient>,
        history: Option<Arc<HistoryStore>>,
    ) -> Result<Self> {
        let prompts = PromptSelector::from_config(&config)?;
        Ok(Self {
            config,
            prompts,
            llm,
            history,
        })
    }

    pub fn history_enabled(&self) -> bool {
        self.history.is_some()
    }

    pub fn feedback_enabled(&self) -> bool {
        self.history
            .as_ref()
            .is_some_and(|store| store.feedback_enabled())
    }
}
