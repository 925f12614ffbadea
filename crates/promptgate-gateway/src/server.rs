use std::net::SocketAddr;
use std::sync::Arc;

use promptgate_common::{Error, Result};
use promptgate_config::AppConfig;
use promptgate_db::HistoryStore;
use promptgate_llm::{AzureOpenAiClient, CompletionClient};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::router::build_router;
use crate::state::{AppState, SharedState};

/// Owns startup: dependencies are constructed once, up front, and the router is
/// only served after every one of them is ready.
pub struct GatewayServer {
    config: AppConfig,
}

impl GatewayServer {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }

    /// Construct the history store and model client and assemble shared state.
    pub fn build_state(&self) -> Result<SharedState> {
        let llm: Arc<dyn CompletionClient> =
            Arc::new(AzureOpenAiClient::from_config(&self.config.azure_openai)?);
        self.build_state_with_client(llm)
    }

    pub fn build_state_with_client(&self, llm: Arc<dyn CompletionClient>) -> Result<SharedState> {
        let history = init_history(&self.config)?;
        let state = AppState::new(self.config.clone(), llm, history)?;
        info!(
            contexts = ?state.prompts.contexts(),
            default_prompt = state.prompts.has_default(),
            history = state.history_enabled(),
            "gateway state ready"
        );
        Ok(Arc::new(state))
    }

    pub async fn run(self) -> Result<()> {
        let state = self.build_state()?;
        let addr = self.bind_addr()?;
        let listener = TcpListener::bind(addr).await?;
        serve(listener, state).await
    }

    fn bind_addr(&self) -> Result<SocketAddr> {
        let gateway = &self.config.gateway;
        format!("{}:{}", gateway.host, gateway.port)
            .parse()
            .map_err(|e| Error::Config(format!("invalid listen address: {e}")))
    }
}

/// Serve `state` on an already-bound listener until ctrl-c.
pub async fn serve(listener: TcpListener, state: SharedState) -> Result<()> {
    let addr = listener.local_addr()?;
    info!("gateway listening on http://{addr}");

    axum::serve(listener, build_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("gateway stopped");
    Ok(())
}

/// Open the history store when chat history is configured.
///
/// `Ok(None)` means history is disabled. An error aborts startup: the gateway
/// never serves with a half-initialized store.
pub fn init_history(config: &AppConfig) -> Result<Option<Arc<HistoryStore>>> {
    let Some(history) = &config.chat_history else {
        info!("chat history is not enabled");
        return Ok(None);
    };

    info!(
        container = %history.conversations_container,
        feedback = history.enable_feedback,
        "initializing history store"
    );
    match HistoryStore::open(history) {
        Ok(store) => {
            info!(container = store.container(), "history store ready");
            Ok(Some(Arc::new(store)))
        }
        Err(e) => {
            error!("failed to initialize history store: {e}");
            Err(e)
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
