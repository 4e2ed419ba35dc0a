//! OpenAI-compatible streaming completion client.
//!
//! Speaks `POST {base_url}/chat/completions` with `stream: true` and parses
//! the SSE response into plain text fragments. Works against any
//! OpenAI-compatible endpoint (the base URL comes from configuration).

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt, TryStreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::UpstreamConfig;
use crate::error::{ParakeetError, Result};

use super::{CompletionProvider, FragmentStream};

/// Connect timeout for the upstream API. The request itself has no overall
/// deadline — completions stream for as long as the model talks; hung
/// streams are handled by the relay's idle timeout.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Streaming client for an OpenAI-compatible chat-completions API.
pub struct OpenAiProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl std::fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .finish()
    }
}

// ── Wire types ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
}

#[derive(Debug, Deserialize)]
struct StreamDelta {
    content: Option<String>,
}

// ── Provider ─────────────────────────────────────────────────────────────────

impl OpenAiProvider {
    /// Build from validated upstream configuration.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(|e| ParakeetError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn build_request_body(&self, question: &str) -> ChatRequest {
        ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: question.to_string(),
            }],
            stream: true,
        }
    }

    fn completions_url(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }
}

#[async_trait]
impl CompletionProvider for OpenAiProvider {
    async fn completion_stream(&self, question: &str) -> Result<FragmentStream> {
        let body = self.build_request_body(question);
        debug!(model = %self.model, "starting upstream completion");

        let response = self
            .client
            .post(self.completions_url())
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ParakeetError::Provider(format!("upstream request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(ParakeetError::Provider(format!(
                "upstream returned {status}: {text}"
            )));
        }

        let bytes = Box::pin(
            response
                .bytes_stream()
                .map_err(|e| ParakeetError::Provider(format!("upstream body error: {e}"))),
        );
        Ok(Box::pin(parse_sse_stream(bytes)))
    }

    fn name(&self) -> &str {
        "openai-compatible"
    }
}

// ── SSE parsing ──────────────────────────────────────────────────────────────

/// Parse a server-sent-events byte stream into text fragments.
///
/// Events are framed by blank lines; each `data:` payload is one JSON chunk
/// with a `choices[0].delta.content` text delta, except the literal `[DONE]`
/// sentinel that ends the stream. Chunks that fail to parse are logged and
/// skipped, matching the lenient behavior of the upstream SDKs. Bytes are
/// buffered until a full event is available, so multi-byte characters split
/// across network reads are never corrupted.
fn parse_sse_stream<S>(stream: S) -> impl Stream<Item = Result<String>>
where
    S: Stream<Item = Result<Bytes>> + Send + Unpin + 'static,
{
    futures::stream::unfold(
        (stream, Vec::new(), false),
        |(mut stream, mut buffer, mut done)| async move {
            loop {
                if done {
                    return None;
                }

                // Drain complete events from the buffer before reading more.
                if let Some(pos) = find_event_boundary(&buffer) {
                    let event: Vec<u8> = buffer.drain(..pos + 2).collect();
                    let event = String::from_utf8_lossy(&event);

                    for line in event.lines() {
                        let Some(data) = line
                            .strip_prefix("data: ")
                            .or_else(|| line.strip_prefix("data:"))
                        else {
                            continue;
                        };
                        let data = data.trim();
                        if data == "[DONE]" {
                            done = true;
                            break;
                        }
                        match serde_json::from_str::<StreamChunk>(data) {
                            Ok(chunk) => {
                                let fragment = chunk
                                    .choices
                                    .first()
                                    .and_then(|c| c.delta.content.clone())
                                    .unwrap_or_default();
                                if !fragment.is_empty() {
                                    return Some((Ok(fragment), (stream, buffer, done)));
                                }
                            }
                            Err(e) => {
                                warn!("failed to parse upstream SSE chunk: {e}");
                            }
                        }
                    }
                    continue;
                }

                match stream.next().await {
                    Some(Ok(bytes)) => buffer.extend_from_slice(&bytes),
                    Some(Err(e)) => return Some((Err(e), (stream, buffer, true))),
                    // Upstream closed without [DONE]; treat as a normal end.
                    None => return None,
                }
            }
        },
    )
}

/// Offset of the first `\n\n` event delimiter, if a full event is buffered.
fn find_event_boundary(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|w| w == b"\n\n")
}
