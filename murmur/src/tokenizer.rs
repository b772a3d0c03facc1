//! Tokenizer adapter: text ↔ token ids.
//!
//! Token sequences are the unit of the prompt budget and the wire encoding of the
//! prompt. The default implementation wraps tiktoken's `r50k_base` vocabulary
//! (the GPT-2 BPE used by the legacy completion models).

use std::sync::Arc;

use thiserror::Error;
use tiktoken_rs::CoreBPE;

/// One token id.
pub type TokenId = u32;

/// Errors from building or using a tokenizer.
#[derive(Debug, Error)]
pub enum TokenizerError {
    #[error("load vocabulary: {0}")]
    Load(String),
    #[error("decode tokens: {0}")]
    Decode(String),
}

/// Encodes text to token ids and back.
///
/// **Interaction**: Used by [`PromptTemplate`](crate::prompt::PromptTemplate) to measure
/// prompt fragments and by [`OpenAiCompletions`](crate::completion::OpenAiCompletions) to
/// decode the final prompt into request text.
pub trait Tokenizer: Send + Sync {
    fn encode(&self, text: &str) -> Vec<TokenId>;

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError>;
}

/// BPE tokenizer backed by `tiktoken-rs`.
#[derive(Clone)]
pub struct TiktokenTokenizer {
    bpe: Arc<CoreBPE>,
}

impl TiktokenTokenizer {
    /// Loads the GPT-2 (`r50k_base`) vocabulary. The ranks are bundled with the crate.
    pub fn gpt2() -> Result<Self, TokenizerError> {
        let bpe = tiktoken_rs::r50k_base().map_err(|e| TokenizerError::Load(e.to_string()))?;
        Ok(Self { bpe: Arc::new(bpe) })
    }
}

impl std::fmt::Debug for TiktokenTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TiktokenTokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer for TiktokenTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        self.bpe
            .encode_ordinary(text)
            .into_iter()
            .map(|t| t as TokenId)
            .collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        self.bpe
            .decode(tokens.iter().map(|&t| t as _).collect())
            .map_err(|e| TokenizerError::Decode(e.to_string()))
    }
}
