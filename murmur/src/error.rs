//! Errors surfaced at the coordinator boundary.

use thiserror::Error;

use crate::chunker::ChunkError;
use crate::completion::CompletionError;
use crate::platform::PlatformError;

/// Failure of one event handler. Shown in the channel as `"<kind>: <message>"`.
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error(transparent)]
    Platform(#[from] PlatformError),
    #[error(transparent)]
    Chunk(#[from] ChunkError),
    #[error("invalid text replacements: {0}")]
    Replacements(#[from] regex::Error),
}

impl BotError {
    /// Stable name shown to users next to the description.
    pub fn kind(&self) -> &'static str {
        match self {
            BotError::Completion(e) => e.kind(),
            BotError::Platform(_) => "PlatformError",
            BotError::Chunk(_) | BotError::Replacements(_) => "InvalidArgument",
        }
    }
}
