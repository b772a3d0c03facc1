//! `/v1/completions` client over reqwest with SSE streaming.
//!
//! Request body: `{model, temperature, stream: true, prompt, max_tokens, stop,
//! ...settings}` where `settings` override the defaults key by key. The bearer
//! token goes in `Authorization`. A non-2xx status fails before any streaming.

use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use futures::{stream, Stream, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tracing::{debug, trace};

use super::sse::{parse_stream_line, LineBuffer, StreamLine};
use super::{CompletionClient, CompletionError, CompletionStream, RequestSettings};
use crate::prompt::STOP_MARKER;
use crate::tokenizer::{TokenId, Tokenizer};

const DEFAULT_BASE_URL: &str = "https://api.openai.com";

/// Connection and default request parameters for [`OpenAiCompletions`].
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    pub api_key: String,
    /// Base URL; `/v1/completions` is appended (without doubling an existing `/v1`).
    pub base_url: String,
    pub model: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub stop: Vec<String>,
}

impl OpenAiConfig {
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            temperature: 1.0,
            max_tokens: 2000,
            stop: vec![STOP_MARKER.to_string()],
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    fn completions_url(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/completions")
        } else {
            format!("{base}/v1/completions")
        }
    }
}

/// Streaming completions client.
///
/// **Interaction**: Implements [`CompletionClient`]; decodes the prompt with the
/// same tokenizer the prompt builder measured it with.
pub struct OpenAiCompletions {
    client: Client,
    config: OpenAiConfig,
    tokenizer: Arc<dyn Tokenizer>,
}

impl OpenAiCompletions {
    pub fn new(config: OpenAiConfig, tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self {
            client: Client::new(),
            config,
            tokenizer,
        }
    }

    /// Request body with `settings` merged over the defaults.
    fn request_body(&self, prompt: String, settings: &RequestSettings) -> Value {
        let mut body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "stream": true,
            "prompt": prompt,
            "max_tokens": self.config.max_tokens,
            "stop": self.config.stop,
        });
        if let Value::Object(map) = &mut body {
            for (k, v) in settings {
                map.insert(k.clone(), v.clone());
            }
        }
        body
    }
}

impl std::fmt::Debug for OpenAiCompletions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompletions")
            .field("base_url", &self.config.base_url)
            .field("model", &self.config.model)
            .finish_non_exhaustive()
    }
}

/// State threaded through the body stream.
struct BodyState<S> {
    body: Pin<Box<S>>,
    lines: LineBuffer,
    finished: bool,
}

/// Turns a response byte stream into text fragments, ending at `[DONE]`, at the
/// first error, or when the body ends.
fn fragments<S, B>(body: S) -> CompletionStream
where
    S: Stream<Item = reqwest::Result<B>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
{
    let state = BodyState {
        body: Box::pin(body),
        lines: LineBuffer::default(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if state.finished {
                return None;
            }
            let line = match state.lines.next_line() {
                Some(line) => line,
                None => match state.body.next().await {
                    Some(Ok(bytes)) => {
                        state.lines.push(bytes.as_ref());
                        continue;
                    }
                    Some(Err(e)) => {
                        state.finished = true;
                        return Some((Err(CompletionError::Transport(e.to_string())), state));
                    }
                    None => {
                        state.finished = true;
                        match state.lines.take_rest() {
                            Some(rest) => rest,
                            None => return None,
                        }
                    }
                },
            };
            trace!(line = %line, "completion stream line");
            match parse_stream_line(&line) {
                Ok(StreamLine::Blank) => continue,
                Ok(StreamLine::Done) => return None,
                Ok(StreamLine::Text(text)) => return Some((Ok(text), state)),
                Err(e) => {
                    state.finished = true;
                    return Some((Err(e), state));
                }
            }
        }
    }))
}

#[async_trait]
impl CompletionClient for OpenAiCompletions {
    async fn complete(
        &self,
        prompt: &[TokenId],
        settings: &RequestSettings,
    ) -> Result<CompletionStream, CompletionError> {
        let prompt = self.tokenizer.decode(prompt)?;
        let body = self.request_body(prompt, settings);
        let url = self.config.completions_url();
        debug!(url = %url, model = %self.config.model, "completion request");

        let resp = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| CompletionError::Transport(e.to_string()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(CompletionError::UpstreamHttp {
                status: status.as_u16(),
                body: if text.is_empty() {
                    "no body".to_string()
                } else {
                    text
                },
            });
        }
        Ok(fragments(resp.bytes_stream()))
    }
}
