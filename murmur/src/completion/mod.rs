//! Text-completion collaborator.
//!
//! [`CompletionClient`] turns a prompt (token ids) plus opaque request settings into
//! a stream of text fragments. [`OpenAiCompletions`] implements it over the
//! legacy `/v1/completions` endpoint with server-sent events; [`parse_stream_line`]
//! is the line-level protocol decoder it uses.
//!
//! # Streaming
//!
//! The stream suspends only at network reads. Dropping it drops the underlying
//! HTTP response, which is how a timed-out cycle cancels the request.

mod openai;
mod sse;

pub use openai::{OpenAiCompletions, OpenAiConfig};
pub use sse::{parse_stream_line, StreamLine};

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use futures::Stream;
use thiserror::Error;

use crate::tokenizer::{TokenId, TokenizerError};

/// Extra request-body fields merged into every completion request.
pub type RequestSettings = serde_json::Map<String, serde_json::Value>;

/// Stream of text fragments from one completion.
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

/// Failures of one completion cycle.
#[derive(Debug, Error)]
pub enum CompletionError {
    /// Non-success status before any streaming started.
    #[error("HTTP {status}: {body}")]
    UpstreamHttp { status: u16, body: String },
    /// Error object embedded in the stream.
    #[error("{0}")]
    UpstreamStream(String),
    /// Deadline for the whole cycle exceeded.
    #[error("no complete response within {0:?}")]
    Timeout(Duration),
    /// A non-blank stream line without the `data: ` prefix.
    #[error("malformed stream line: {0}")]
    MalformedStreamLine(String),
    /// A `data:` payload that is not the expected JSON.
    #[error("invalid stream payload: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("transport: {0}")]
    Transport(String),
    #[error(transparent)]
    Tokenizer(#[from] TokenizerError),
}

impl CompletionError {
    /// Stable name shown to users next to the description.
    pub fn kind(&self) -> &'static str {
        match self {
            CompletionError::UpstreamHttp { .. } => "UpstreamHttpError",
            CompletionError::UpstreamStream(_) => "UpstreamStreamError",
            CompletionError::Timeout(_) => "Timeout",
            CompletionError::MalformedStreamLine(_) => "MalformedStreamLine",
            CompletionError::Decode(_) => "DecodeError",
            CompletionError::Transport(_) => "TransportError",
            CompletionError::Tokenizer(_) => "TokenizerError",
        }
    }
}

/// Completion service: prompt tokens in, streamed text out.
///
/// **Interaction**: Called by the coordinator once per cycle while it holds the
/// channel's gate; the returned stream is consumed under the cycle deadline.
#[async_trait]
pub trait CompletionClient: Send + Sync {
    async fn complete(
        &self,
        prompt: &[TokenId],
        settings: &RequestSettings,
    ) -> Result<CompletionStream, CompletionError>;
}
