//! Adapter for OpenAI-compatible `/chat/completions` endpoints.
//!
//! Covers OpenAI itself and the many services that mirror its API (Groq,
//! DeepSeek, Qwen/DashScope, Gemini's OpenAI endpoint, vLLM, LM Studio).
//! Streaming uses server-sent events terminated by `data: [DONE]`.

use std::collections::BTreeMap;
use std::collections::VecDeque;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Value, json};

use super::http::{body_lines, build_client, check_status, transport_error};
use super::traits::{EventStream, ProviderAdapter, ProviderMetadata};
use crate::types::{
    ContentPart, FinishReason, GenerateEvent, GenerateRequest, GenerateResponse, Message,
    MessageContent, Role, ToolCall, Usage,
};
use crate::{Result, SwitchboardError};

/// Client for one model behind an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiCompatibleAdapter {
    name: String,
    base_url: String,
    api_key: Option<String>,
    metadata: ProviderMetadata,
    http: Client,
}

impl OpenAiCompatibleAdapter {
    /// `base_url` is the API root, e.g. `https://api.groq.com/openai/v1`.
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            name: name.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            metadata: ProviderMetadata::new(model),
            http: build_client()?,
        })
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Replace the reported metadata. The model is kept.
    pub fn with_metadata(mut self, metadata: ProviderMetadata) -> Self {
        let model = std::mem::take(&mut self.metadata.model);
        self.metadata = ProviderMetadata { model, ..metadata };
        self
    }

    fn body(&self, request: &GenerateRequest, stream: bool) -> Value {
        let options = &request.options;
        let mut body = serde_json::Map::new();
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
        if let Some(max_tokens) = options.max_tokens {
            body.insert("max_tokens".into(), json!(max_tokens));
        }
        if let Some(temperature) = options.temperature {
            body.insert("temperature".into(), json!(temperature));
        }
        if let Some(top_p) = options.top_p {
            body.insert("top_p".into(), json!(top_p));
        }
        if !options.stop_sequences.is_empty() {
            body.insert("stop".into(), json!(options.stop_sequences));
        }
        if let Some(seed) = options.seed {
            body.insert("seed".into(), json!(seed));
        }
        if options.json_mode {
            body.insert("response_format".into(), json!({"type": "json_object"}));
        }
        if stream {
            body.insert("stream_options".into(), json!({"include_usage": true}));
        }
        Value::Object(body)
    }

    async fn post(&self, body: &Value) -> Result<reqwest::Response> {
        let mut builder = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .json(body);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }
        let response = builder.send().await.map_err(transport_error)?;
        check_status(response, &self.metadata.model).await
    }
}

fn message_json(message: &Message) -> Value {
    let content = match &message.content {
        MessageContent::Text(text) => json!(text),
        MessageContent::Parts(parts) => parts
            .iter()
            .map(|part| match part {
                ContentPart::Text { text } => json!({"type": "text", "text": text}),
                ContentPart::Image { url } => json!({"type": "image_url", "image_url": {"url": url}}),
            })
            .collect(),
    };
    let mut value = json!({"role": message.role.as_str(), "content": content});
    if let Role::Tool { tool_call_id } = &message.role {
        value["tool_call_id"] = json!(tool_call_id);
    }
    if let Some(name) = &message.name {
        value["name"] = json!(name);
    }
    if let Some(calls) = &message.tool_calls {
        value["tool_calls"] = calls
            .iter()
            .map(|c| {
                json!({
                    "id": c.id,
                    "type": "function",
                    "function": {"name": c.name, "arguments": c.arguments},
                })
            })
            .collect();
    }
    value
}

#[derive(Deserialize)]
struct CompletionResponse {
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct Choice {
    #[serde(default)]
    message: Option<WireMessage>,
    #[serde(default)]
    delta: Option<WireMessage>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<WireToolCall>,
}

#[derive(Deserialize)]
struct WireToolCall {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<WireFunction>,
}

#[derive(Deserialize)]
struct WireFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize, Clone, Copy)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage::new(u.prompt_tokens, u.completion_tokens)
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn metadata(&self) -> ProviderMetadata {
        self.metadata.clone()
    }

    async fn generate(&self, request: &GenerateRequest) -> Result<GenerateResponse> {
        let response = self.post(&self.body(request, false)).await?;
        let parsed: CompletionResponse = response.json().await.map_err(transport_error)?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or(SwitchboardError::EmptyResponse)?;
        let message = choice.message.unwrap_or_default();
        let tool_calls: Vec<ToolCall> = message
            .tool_calls
            .into_iter()
            .enumerate()
            .map(|(i, call)| {
                let function = call.function.unwrap_or(WireFunction {
                    name: None,
                    arguments: None,
                });
                ToolCall::new(
                    call.id.unwrap_or_else(|| format!("call_{i}")),
                    function.name.unwrap_or_default(),
                    function.arguments.unwrap_or_else(|| "{}".into()),
                )
            })
            .collect();
        let content = message.content.unwrap_or_default();
        if content.is_empty() && tool_calls.is_empty() {
            return Err(SwitchboardError::EmptyResponse);
        }

        Ok(GenerateResponse {
            content,
            model: parsed.model.unwrap_or_else(|| self.metadata.model.clone()),
            tool_calls,
            usage: parsed.usage.map(Usage::from),
            finish_reason: choice
                .finish_reason
                .as_deref()
                .map(FinishReason::from_wire)
                .unwrap_or_default(),
        })
    }

    async fn generate_stream(&self, request: &GenerateRequest) -> Result<EventStream> {
        let response = self.post(&self.body(request, true)).await?;
        let lines = Box::pin(body_lines(response));
        Ok(Box::pin(sse_events(lines)))
    }
}

/// Partial tool call assembled from streamed deltas.
#[derive(Default)]
struct PendingCall {
    id: String,
    name: String,
    arguments: String,
}

struct SseState<L> {
    lines: L,
    pending: VecDeque<Result<GenerateEvent>>,
    calls: BTreeMap<usize, PendingCall>,
    done: bool,
}

impl<L> SseState<L> {
    fn flush_calls(&mut self) {
        for (i, call) in std::mem::take(&mut self.calls) {
            let id = if call.id.is_empty() {
                format!("call_{i}")
            } else {
                call.id
            };
            let arguments = if call.arguments.is_empty() {
                "{}".to_string()
            } else {
                call.arguments
            };
            self.pending
                .push_back(Ok(GenerateEvent::ToolCall(ToolCall::new(id, call.name, arguments))));
        }
    }

    fn finish(&mut self) {
        self.flush_calls();
        self.pending.push_back(Ok(GenerateEvent::Done));
        self.done = true;
    }

    fn absorb(&mut self, chunk: CompletionResponse) {
        for choice in chunk.choices {
            if let Some(delta) = choice.delta {
                if let Some(text) = delta.content
                    && !text.is_empty()
                {
                    self.pending.push_back(Ok(GenerateEvent::Text(text)));
                }
                for (pos, call) in delta.tool_calls.into_iter().enumerate() {
                    let entry = self.calls.entry(call.index.unwrap_or(pos)).or_default();
                    if let Some(id) = call.id {
                        entry.id = id;
                    }
                    if let Some(function) = call.function {
                        if let Some(name) = function.name {
                            entry.name.push_str(&name);
                        }
                        if let Some(args) = function.arguments {
                            entry.arguments.push_str(&args);
                        }
                    }
                }
            }
            if choice.finish_reason.is_some() {
                self.flush_calls();
            }
        }
        if let Some(usage) = chunk.usage {
            self.pending.push_back(Ok(GenerateEvent::Usage(usage.into())));
        }
    }
}

fn sse_events<L>(lines: L) -> impl futures_util::Stream<Item = Result<GenerateEvent>> + Send
where
    L: futures_util::Stream<Item = Result<String>> + Send + Unpin + 'static,
{
    let state = SseState {
        lines,
        pending: VecDeque::new(),
        calls: BTreeMap::new(),
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
            match state.lines.next().await {
                None => state.finish(),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(e), state));
                }
                Some(Ok(line)) => {
                    let Some(data) = line.strip_prefix("data:") else {
                        continue; // comments, event names, keep-alives
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        state.finish();
                        continue;
                    }
                    match serde_json::from_str::<CompletionResponse>(data) {
                        Ok(chunk) => state.absorb(chunk),
                        Err(e) => {
                            state.done = true;
                            return Some((
                                Err(SwitchboardError::Stream(format!("bad SSE chunk: {e}"))),
                                state,
                            ));
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{GenerateOptions, ToolDefinition};

    fn lines(raw: &[&str]) -> futures_util::stream::Iter<std::vec::IntoIter<Result<String>>> {
        let owned: Vec<Result<String>> = raw.iter().map(|l| Ok(l.to_string())).collect();
        futures_util::stream::iter(owned)
    }

    #[test]
    fn request_body_carries_options_and_tools() {
        let adapter = OpenAiCompatibleAdapter::new("groq", "http://x/v1/", "llama").unwrap();
        let request = GenerateRequest {
            messages: vec![
                Message::system("sys"),
                Message::user_with_image("look", "data:image/png;base64,AA"),
            ],
            tools: vec![ToolDefinition::new("search", "web search", json!({"type": "object"}))],
            options: GenerateOptions::new()
                .max_tokens(64)
                .stop_sequence("END")
                .json_mode(true),
        };
        let body = adapter.body(&request, false);

        assert_eq!(adapter.base_url, "http://x/v1");
        assert_eq!(body["model"], "llama");
        assert_eq!(body["max_tokens"], 64);
        assert_eq!(body["stop"][0], "END");
        assert_eq!(body["response_format"]["type"], "json_object");
        assert_eq!(body["tools"][0]["function"]["name"], "search");
        assert_eq!(body["messages"][1]["content"][1]["type"], "image_url");
        assert!(body.get("stream_options").is_none());
    }

    #[tokio::test]
    async fn sse_text_tool_calls_and_usage() {
        let raw = [
            r#"data: {"choices":[{"delta":{"content":"Hel"}}]}"#,
            ": keep-alive",
            r#"data: {"choices":[{"delta":{"content":"lo"}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"c1","function":{"name":"search","arguments":"{\"q\":"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"\"rust\"}"}}]}}]}"#,
            r#"data: {"choices":[{"delta":{},"finish_reason":"tool_calls"}]}"#,
            r#"data: {"choices":[],"usage":{"prompt_tokens":7,"completion_tokens":3}}"#,
            "data: [DONE]",
        ];
        let events: Vec<_> = sse_events(lines(&raw))
            .map(|e| e.unwrap())
            .collect()
            .await;

        assert_eq!(
            events,
            vec![
                GenerateEvent::Text("Hel".into()),
                GenerateEvent::Text("lo".into()),
                GenerateEvent::ToolCall(ToolCall::new("c1", "search", r#"{"q":"rust"}"#)),
                GenerateEvent::Usage(Usage::new(7, 3)),
                GenerateEvent::Done,
            ]
        );
    }

    #[tokio::test]
    async fn malformed_chunk_ends_stream_with_error() {
        let raw = ["data: {not json", r#"data: {"choices":[]}"#];
        let events: Vec<_> = sse_events(lines(&raw)).collect().await;
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], Err(SwitchboardError::Stream(_))));
    }
}
