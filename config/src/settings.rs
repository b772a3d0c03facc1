//! `[bot]` table: completion model, prompt budget, and reply behavior.

use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;

/// Bot settings as read from `config.toml`. Every field has a default, so a
/// missing file or a partial `[bot]` table is valid.
///
/// ```toml
/// [bot]
/// model = "davinci-002"
/// max_input_tokens = 2000
/// context_tokens = 4000
/// ignored_authors = [123456]
///
/// [bot.extra_api_settings]
/// presence_penalty = 0.5
///
/// [bot.text_replacements]
/// "colour" = "color"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Prompt budget in tokens.
    pub max_input_tokens: usize,
    /// Model context size; the completion may use what the prompt leaves.
    pub context_tokens: usize,
    pub model: String,
    pub base_url: String,
    pub temperature: f64,
    /// Merged into every completion request body, overriding the defaults.
    pub extra_api_settings: serde_json::Map<String, serde_json::Value>,
    /// User ids whose messages are recorded but never answered.
    pub ignored_authors: Vec<u64>,
    /// Case-insensitive substring replacements applied to every message.
    pub text_replacements: HashMap<String, String>,
    pub history_capacity: usize,
    /// Maximum chars per outgoing message.
    pub chunk_length: usize,
    pub request_timeout_secs: u64,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            max_input_tokens: 2000,
            context_tokens: 4000,
            model: "davinci-002".to_string(),
            base_url: "https://api.openai.com".to_string(),
            temperature: 1.0,
            extra_api_settings: serde_json::Map::new(),
            ignored_authors: Vec::new(),
            text_replacements: HashMap::new(),
            history_capacity: 200,
            chunk_length: 2000,
            request_timeout_secs: 30,
        }
    }
}

impl BotSettings {
    /// Completion length: whatever the context leaves after the prompt budget.
    pub fn max_tokens(&self) -> usize {
        self.context_tokens.saturating_sub(self.max_input_tokens)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}
