//! Shared HTTP plumbing for the network adapters.

use std::time::Duration;

use futures_util::{Stream, StreamExt};
use reqwest::{Client, Response};

use crate::{Result, SwitchboardError};

/// Transport-level timeout. Per-attempt routing timeouts are usually tighter.
const HTTP_TIMEOUT: Duration = Duration::from_secs(300);

pub(crate) fn build_client() -> Result<Client> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| SwitchboardError::Configuration(format!("failed to build HTTP client: {e}")))
}

pub(crate) fn transport_error(e: reqwest::Error) -> SwitchboardError {
    if e.is_timeout() {
        SwitchboardError::Timeout(HTTP_TIMEOUT)
    } else {
        SwitchboardError::Http(e.to_string())
    }
}

/// Map a non-success status to the matching error; pass successes through.
pub(crate) async fn check_status(response: Response, model: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    match status.as_u16() {
        401 | 403 => Err(SwitchboardError::AuthenticationFailed),
        404 => Err(SwitchboardError::ModelNotFound(model.to_string())),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.trim().parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(SwitchboardError::RateLimited { retry_after })
        }
        code => {
            let body = response.text().await.unwrap_or_default();
            let message = if body.is_empty() {
                status.to_string()
            } else {
                truncate(&body, 300)
            };
            if code == 400 && is_context_overflow(&body) {
                return Err(SwitchboardError::ContextLengthExceeded { limit: 0 });
            }
            Err(SwitchboardError::Api {
                status: code,
                message,
            })
        }
    }
}

fn is_context_overflow(body: &str) -> bool {
    let lower = body.to_ascii_lowercase();
    lower.contains("context_length_exceeded") || lower.contains("maximum context length")
}

fn truncate(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &s[..idx]),
        None => s.to_string(),
    }
}

/// Split a streaming response body into non-empty lines.
pub(crate) fn body_lines(response: Response) -> impl Stream<Item = Result<String>> + Send {
    line_stream(Box::pin(response.bytes_stream()))
}

fn line_stream<S, B>(bytes: S) -> impl Stream<Item = Result<String>> + Send
where
    S: Stream<Item = reqwest::Result<B>> + Send + Unpin + 'static,
    B: AsRef<[u8]> + Send,
{
    struct State<S> {
        bytes: S,
        buffer: Vec<u8>,
        finished: bool,
    }

    futures_util::stream::unfold(
        State {
            bytes,
            buffer: Vec::new(),
            finished: false,
        },
        |mut state| async move {
            loop {
                if let Some(pos) = state.buffer.iter().position(|b| *b == b'\n') {
                    let raw: Vec<u8> = state.buffer.drain(..=pos).collect();
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        continue;
                    }
                    return Some((Ok(line), state));
                }
                if state.finished {
                    if state.buffer.is_empty() {
                        return None;
                    }
                    let raw = std::mem::take(&mut state.buffer);
                    let line = String::from_utf8_lossy(&raw).trim().to_string();
                    if line.is_empty() {
                        return None;
                    }
                    return Some((Ok(line), state));
                }
                match state.bytes.next().await {
                    Some(Ok(chunk)) => state.buffer.extend_from_slice(chunk.as_ref()),
                    Some(Err(e)) => {
                        state.finished = true;
                        state.buffer.clear();
                        return Some((Err(SwitchboardError::Stream(e.to_string())), state));
                    }
                    None => state.finished = true,
                }
            }
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn lines_survive_chunk_boundaries() {
        let chunks: Vec<reqwest::Result<&'static [u8]>> = vec![
            Ok(b"data: {\"a\"".as_slice()),
            Ok(b":1}\n\ndata: [DO".as_slice()),
            Ok(b"NE]\n".as_slice()),
            Ok(b"tail".as_slice()),
        ];
        let lines: Vec<String> = line_stream(futures_util::stream::iter(chunks))
            .map(|l| l.unwrap())
            .collect()
            .await;
        assert_eq!(lines, ["data: {\"a\":1}", "data: [DONE]", "tail"]);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé...");
        assert_eq!(truncate("ok", 10), "ok");
    }
}
