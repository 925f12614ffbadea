use async_trait::async_trait;
use promptgate_common::Result;
use serde_json::Value;

use crate::types::ModelArgs;

/// Raw provider reply plus the provider-assigned request id, if any.
#[derive(Debug, Clone)]
pub struct RawCompletion {
    pub body: Value,
    pub request_id: Option<String>,
}

/// A hosted chat-completions endpoint.
///
/// Implementations issue exactly one outbound call per invocation and never
/// retry; failures surface as `Error::Upstream` with the provider status code
/// when one was received.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Provider identifier used in logs.
    fn provider_id(&self) -> &str;

    async fn complete(&self, args: &ModelArgs) -> Result<RawCompletion>;
}
