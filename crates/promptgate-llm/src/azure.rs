use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use promptgate_common::{Error, Result};
use promptgate_config::AzureOpenAiConfig;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, error};

use crate::provider::{CompletionClient, RawCompletion};
use crate::types::ModelArgs;

/// Response header carrying the API-management request id.
pub const REQUEST_ID_HEADER: &str = "apim-request-id";

/// Chat-completions client for an Azure OpenAI deployment.
#[derive(Clone)]
pub struct AzureOpenAiClient {
    client: Client,
    endpoint: String,
    api_key: Option<String>,
    api_version: String,
}

impl AzureOpenAiClient {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: Option<String>,
        api_version: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
            api_version: api_version.into(),
        })
    }

    pub fn from_config(config: &AzureOpenAiConfig) -> Result<Self> {
        let endpoint = config.resolved_endpoint().ok_or_else(|| {
            Error::Config("Azure OpenAI endpoint or resource must be configured".to_string())
        })?;
        Self::new(
            endpoint,
            config.key.clone(),
            config.preview_api_version.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    fn completions_url(&self, deployment: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            self.endpoint, deployment, self.api_version
        )
    }
}

#[async_trait]
impl CompletionClient for AzureOpenAiClient {
    fn provider_id(&self) -> &str {
        "azure-openai"
    }

    async fn complete(&self, args: &ModelArgs) -> Result<RawCompletion> {
        let url = self.completions_url(&args.model);

        let mut request = self.client.post(&url).json(args);
        if let Some(key) = &self.api_key {
            request = request.header("api-key", key);
        }

        let response = request.send().await.map_err(|e| {
            error!("Azure OpenAI request failed: {e}");
            Error::upstream(
                e.status().map(|s| s.as_u16()),
                format!("Azure OpenAI request failed: {e}"),
            )
        })?;

        let request_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let status = response.status();

        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            let message = provider_error_message(&error_text);
            error!(
                status = status.as_u16(),
                request_id = request_id.as_deref().unwrap_or("-"),
                "Azure OpenAI API error: {message}"
            );
            return Err(Error::upstream(Some(status.as_u16()), message));
        }

        let body = if args.stream {
            let chunks = SseParser::new(response.bytes_stream());
            aggregate_stream(chunks).await?
        } else {
            response
                .json::<Value>()
                .await
                .map_err(|e| Error::Format(format!("failed to parse Azure OpenAI response: {e}")))?
        };

        debug!(
            request_id = request_id.as_deref().unwrap_or("-"),
            "Azure OpenAI completion received"
        );
        Ok(RawCompletion { body, request_id })
    }
}

/// Pull `error.message` out of a provider error body, falling back to the raw text.
fn provider_error_message(error_text: &str) -> String {
    serde_json::from_str::<Value>(error_text)
        .ok()
        .and_then(|v| v.pointer("/error/message").and_then(Value::as_str).map(str::to_string))
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| {
            if error_text.is_empty() {
                "Azure OpenAI API error".to_string()
            } else {
                error_text.to_string()
            }
        })
}

/// Fold streamed chunks into a single non-streaming completion body.
async fn aggregate_stream<S>(mut chunks: S) -> Result<Value>
where
    S: Stream<Item = Result<StreamChunk>> + Unpin,
{
    let mut id = None;
    let mut model = None;
    let mut created = None;
    let mut content = String::new();
    let mut context = None;
    let mut finish_reason = None;

    while let Some(chunk) = chunks.next().await {
        let chunk = chunk?;
        if let Some(error) = chunk.error {
            return Err(Error::upstream(None, stream_error_message(&error)));
        }
        // Azure opens with a prompt_filter_results chunk carrying placeholder metadata.
        id = id.or(chunk.id.filter(|i| !i.is_empty()));
        model = model.or(chunk.model.filter(|m| !m.is_empty()));
        created = created.or(chunk.created.filter(|c| *c != 0));
        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                content.push_str(&text);
            }
            if choice.delta.context.is_some() {
                context = choice.delta.context;
            }
            if choice.finish_reason.is_some() {
                finish_reason = choice.finish_reason;
            }
        }
    }

    let mut message = json!({ "role": "assistant", "content": content });
    if let Some(context) = context {
        message["context"] = context;
    }

    Ok(json!({
        "id": id,
        "model": model,
        "created": created,
        "object": "chat.completion",
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": finish_reason,
        }],
    }))
}

fn stream_error_message(error: &Value) -> String {
    error
        .get("message")
        .and_then(Value::as_str)
        .filter(|m| !m.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| format!("Azure OpenAI stream error: {error}"))
}

// Stream Parser
struct SseParser {
    stream: Pin<Box<dyn Stream<Item = reqwest::Result<Bytes>> + Send>>,
    buffer: Vec<u8>,
    queue: VecDeque<Result<StreamChunk>>,
}

impl SseParser {
    fn new(stream: impl Stream<Item = reqwest::Result<Bytes>> + Send + 'static) -> Self {
        Self {
            stream: Box::pin(stream),
            buffer: Vec::new(),
            queue: VecDeque::new(),
        }
    }

    /// Move every complete event in the buffer onto the queue.
    fn drain_events(&mut self) {
        loop {
            let delimiter = if let Some(p) = self.buffer.windows(2).position(|w| w == b"\n\n") {
                Some((p, 2))
            } else {
                self.buffer
                    .windows(4)
                    .position(|w| w == b"\r\n\r\n")
                    .map(|p| (p, 4))
            };

            let Some((pos, len)) = delimiter else {
                break;
            };
            let event: Vec<u8> = self.buffer.drain(..pos).collect();
            self.buffer.drain(..len);
            self.push_event(&event);
        }
    }

    fn push_event(&mut self, event: &[u8]) {
        // Invalid UTF-8 events are dropped
        let Ok(text) = std::str::from_utf8(event) else {
            return;
        };
        for line in text.lines() {
            let Some(data) = line.strip_prefix("data:") else {
                continue;
            };
            let data = data.trim();
            if data == "[DONE]" || data.is_empty() {
                continue;
            }
            self.queue.push_back(
                serde_json::from_str::<StreamChunk>(data)
                    .map_err(|e| Error::Format(format!("invalid stream chunk: {e}"))),
            );
        }
    }
}

impl Stream for SseParser {
    type Item = Result<StreamChunk>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(item) = self.queue.pop_front() {
                return Poll::Ready(Some(item));
            }

            match self.stream.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    self.buffer.extend_from_slice(&chunk);
                    self.drain_events();
                }
                Poll::Ready(Some(Err(e))) => {
                    return Poll::Ready(Some(Err(Error::upstream(
                        e.status().map(|s| s.as_u16()),
                        format!("stream error: {e}"),
                    ))));
                }
                Poll::Ready(None) => {
                    // Flush a trailing event that was not terminated by a blank line.
                    if !self.buffer.is_empty() {
                        let rest = std::mem::take(&mut self.buffer);
                        self.push_event(&rest);
                        continue;
                    }
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[derive(Deserialize)]
struct StreamChunk {
    id: Option<String>,
    model: Option<String>,
    created: Option<i64>,
    #[serde(default)]
    choices: Vec<StreamChoice>,
    error: Option<Value>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
    context: Option<Value>,
}
