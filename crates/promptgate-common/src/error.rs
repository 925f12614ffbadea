/// Errors surfaced by every PromptGate component boundary.
///
/// The HTTP layer is the only place these are translated into status codes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unsupported context '{0}'")]
    UnsupportedContext(String),

    #[error("{0}")]
    MalformedRequest(String),

    #[error("upstream error: {message}")]
    Upstream {
        status: Option<u16>,
        message: String,
    },

    #[error("history store initialization failed: {0}")]
    HistoryStoreInit(String),

    #[error("format error: {0}")]
    Format(String),

    #[error("database error: {0}")]
    Database(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn upstream(status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Upstream {
            status,
            message: message.into(),
        }
    }

    /// Status code reported by the upstream provider, if this error carries one.
    pub fn upstream_status(&self) -> Option<u16> {
        match self {
            Self::Upstream { status, .. } => *status,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
