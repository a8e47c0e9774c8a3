//! Adapter for the Ollama native chat API (`/api/chat`).
//!
//! Streaming responses are newline-delimited JSON objects; the last one
//! carries `"done": true` plus token counts.

use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::http::{body_lines, build_client, check_status, transport_error};
use super::traits::{EventStream, ProviderAdapter, ProviderMetadata};
use crate::types::{
    Deployment, FinishReason, GenerateEvent, GenerateRequest, GenerateResponse, Message,
    ProviderCapabilities, ToolCall, Usage,
};
use crate::{Result, SwitchboardError};

/// Default Ollama endpoint.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Client for one model served by a local (or LAN) Ollama instance.
#[derive(Clone)]
pub struct OllamaAdapter {
    name: String,
    base_url: String,
    metadata: ProviderMetadata,
    http: Client,
}

impl OllamaAdapter {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            metadata: ProviderMetadata::new(model)
                .deployment(Deployment::Local)
                .capabilities(ProviderCapabilities::default().max_context_tokens(8_192)),
            http: build_client()?,
        })
    }

    /// Replace the reported metadata. The model is kept.
    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        let model = std::mem::take(&mut self.metadata.model);
        self.metadata = ProviderMetadata { model, ..metadata };
        self
    }

    fn body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let options = &request.options;
        let mut model_options = Map::new();
        if let Some(max_tokens) = options.max_tokens {
            model_options.insert("num_predict".into(), json!(max_tokens));
        }
        if let Some(temperature) = options.temperature {
            model_options.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = options.top_p {
            model_options.insert("top_p".into(), json!(top_p));
        }
        if let Some(seed) = options.seed {
            model_options.insert("seed".into(), json!(seed));
        }
        if !options.stop_sequences.is_empty() {
            model_options.insert("stop".into(), json!(options.stop_sequences));
        }

        let mut body = Map::new();
        body.insert("model".into(), json!(self.metadata.model));
        body.insert(
            "messages".into(),
            request.messages.iter().map(message_json).collect(),
        );
        body.insert("stream".into(), json!(stream));
        if !request.tools.is_empty() {
            body.insert(
                "tools".into(),
                request.tools.iter().map(|t| t.to_openai_json()).collect(),
            );
        }
        if options.json_mode {
            body.insert("format".into(), json!("json"));
        }
        if !model_options.is_empty() {
            body.insert("options".into(), Value::Object(model_options));
        }
        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let response = self
            .http
            .post(format!("{}/api/chat", self.base_url))
            .json(body)
            .send()
            .await
            .map_err(transport_error)?;
        check_status(response, &self.metadata.model).await
    }
}

/// Ollama wants raw base64 images, not data URIs.
fn image_payload(url: &str) -> &str {
    match url.split_once(";base64,") {
        Some((prefix, data)) if prefix.starts_with("data:") => data,
        _ => url,
    }
}

fn message_json(message: &Message) -> Value {
    let mut value = json!({
        "role": message.role.as_str(),
        "content": message.content.text(),
    });
    let images: Vec<&str> = message.content.images().map(image_payload).collect();
    if !images.is_empty() {
        value["images"] = json!(images);
    }
    if let Some(calls) = &message.tool_calls {
        value["tool_calls"] = calls
            .iter()
            .map(|c| {
                let arguments: Value =
                    serde_json::from_str(&c.arguments).unwrap_or_else(|_| json!({}));
                json!({"function": {"name": c.name, "arguments": arguments}})
            })
            .collect();
    }
    value
}

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: Option<u32>,
    #[serde(default)]
    eval_count: Option<u32>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize, Default)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Deserialize)]
struct ChunkToolCall {
    function: ChunkFunction,
}

#[derive(Deserialize)]
struct ChunkFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

impl ChatChunk {
    fn usage(&self) -> Option<Usage> {
        match (self.prompt_eval_count, self.eval_count) {
            (None, None) => None,
            (p, c) => Some(Usage::new(p.unwrap_or(0), c.unwrap_or(0))),
        }
    }
}

fn tool_calls(calls: Vec<ChunkToolCall>, offset: usize) -> Vec<ToolCall> {
    calls
        .into_iter()
        .enumerate()
        .map(|(i, call)| {
            let arguments = match call.function.arguments {
                Value::Null => "{}".to_string(),
                Value::String(s) => s,
                other => other.to_string(),
            };
            ToolCall::new(format!("call_{}", offset + i), call.function.name, arguments)
        })
        .collect()
}

#[async_trait]
impl ProviderAdapter for OllamaAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ProviderMetadata {
        self.metadata.clone()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self.post(&self.body(request, false)).await?;
        let chunk: ChatChunk = response.json().await.map_err(transport_error)?;
        let usage = chunk.usage();
        if let Some(error) = chunk.error {
            return Err(SwitchboardError::Api {
                status: 500,
                message: error,
            });
        }

        let message = chunk.message.unwrap_or_default();
        let calls = tool_calls(message.tool_calls, 0);
        if message.content.is_empty() && calls.is_empty() {
            return Err(SwitchboardError::EmptyResponse);
        }
        let finish_reason = if calls.is_empty() {
            chunk
                .done_reason
                .as_deref()
                .map(FinishReason::from_wire)
                .unwrap_or_default()
        } else {
            FinishReason::ToolCalls
        };

        Ok(GenerateResponse {
            content: message.content,
            model: chunk.model.unwrap_or_else(|| self.metadata.model.clone()),
            tool_calls: calls,
            usage,
            finish_reason,
        })
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> Result<EventStream> {
        let response = self.post(&self.body(request, true)).await?;
        let lines = Box::pin(body_lines(response));
        Ok(Box::pin(ndjson_events(lines)))
    }
}

struct NdjsonState<L> {
    lines: L,
    pending: VecDeque<Result<GenerateEvent>>,
    calls_seen: usize,
    done: bool,
}

fn ndjson_events<L>(lines: L) -> impl futures_util::Stream<Item = Result<GenerateEvent>> + Send
where
    L: futures_util::Stream<Item = Result<String>> + Send + Unpin + 'static,
{
    let state = NdjsonState {
        lines,
        pending: VecDeque::new(),
        calls_seen: 0,
        done: false,
    };

    futures_util::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop_front() {
                return Some((event, state));
            }
            if state.done {
                return None;
            }
            let line = match state.lines.next().await {
                None => {
                    state.done = true;
                    return Some((
                        Err(SwitchboardError::Stream("stream ended before done".into())),
                        state,
                    ));
                }
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                Some(Ok(line)) => line,
            };
            let chunk: ChatChunk = match serde_json::from_str(&line) {
                Ok(chunk) => chunk,
                Err(e) => {
                    state.done = true;
                    return Some((
                        Err(SwitchboardError::Stream(format!("bad NDJSON chunk: {e}"))),
                        state,
                    ));
                }
            };
            let usage = chunk.usage();
            if let Some(error) = chunk.error {
                state.done = true;
                return Some((Err(SwitchboardError::Stream(error)), state));
            }

            if let Some(message) = chunk.message {
                if !message.content.is_empty() {
                    state
                        .pending
                        .push_back(Ok(GenerateEvent::Text(message.content)));
                }
                let calls = tool_calls(message.tool_calls, state.calls_seen);
                state.calls_seen += calls.len();
                state
                    .pending
                    .extend(calls.into_iter().map(|c| Ok(GenerateEvent::ToolCall(c))));
            }
            if chunk.done {
                if let Some(usage) = usage {
                    state.pending.push_back(Ok(GenerateEvent::Usage(usage)));
                }
                state.pending.push_back(Ok(GenerateEvent::Done));
                state.done = true;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::GenerateOptions;

    fn lines(raw: &[&str]) -> futures_util::stream::Iter<std::vec::IntoIter<Result<String>>> {
        let owned: Vec<Result<String>> = raw.iter().map(|l| Ok(l.to_string())).collect();
        futures_util::stream::iter(owned)
    }

    #[test]
    fn defaults_to_local_deployment() {
        let adapter = OllamaAdapter::new("ollama", DEFAULT_OLLAMA_URL, "llama3.2").unwrap();
        let metadata = adapter.metadata();
        assert_eq!(metadata.deployment, Deployment::Local);
        assert_eq!(metadata.model, "llama3.2");
    }

    #[test]
    fn body_maps_options_and_strips_data_uri() {
        let adapter = OllamaAdapter::new("ollama", DEFAULT_OLLAMA_URL, "llava").unwrap();
        let request = GenerateRequest {
            messages: vec![Message::user_with_image(
                "describe",
                "data:image/png;base64,iVBORw0",
            )],
            tools: vec![],
            options: GenerateOptions::new().max_tokens(32).temperature(0.1),
        };
        let body = adapter.body(&request, true);

        assert_eq!(body["stream"], true);
        assert_eq!(body["options"]["num_predict"], 32);
        assert_eq!(body["messages"][0]["content"], "describe");
        assert_eq!(body["messages"][0]["images"][0], "iVBORw0");
        assert!(body.get("format").is_none());
    }

    #[tokio::test]
    async fn ndjson_stream_emits_text_then_usage() {
        let raw = [
            r#"{"model":"llama3.2","message":{"role":"assistant","content":"Hi"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":" there"},"done":false}"#,
            r#"{"model":"llama3.2","message":{"role":"assistant","content":""},"done":true,"done_reason":"stop","prompt_eval_count":5,"eval_count":2}"#,
        ];
        let events: Vec<_> = ndjson_events(lines(&raw))
            .map(|e| e.unwrap())
            .collect()
            .await;
        assert_eq!(
            events,
            vec![
                GenerateEvent::Text("Hi".into()),
                GenerateEvent::Text(" there".into()),
                GenerateEvent::Usage(Usage::new(5, 2)),
                GenerateEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn truncated_ndjson_stream_is_an_error() {
        let raw = [r#"{"message":{"content":"partial"},"done":false}"#];
        let events: Vec<_> = ndjson_events(lines(&raw)).collect().await;
        assert_eq!(events.len(), 2);
        assert!(matches!(events[1], Err(SwitchboardError::Stream(_))));
    }
}
