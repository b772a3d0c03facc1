//! Prompt assembly: the chat-log template and the token-budgeted window builder.
//!
//! A prompt is `preamble ++ history lines ++ postamble`, each fragment encoded
//! separately so its token cost is known before it is committed. The stop marker
//! [`STOP_MARKER`] ends every fragment and is also the completion stop sequence,
//! so it is stripped from user content before rendering.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::entry::HistoryEntry;
use crate::tokenizer::{TokenId, Tokenizer};

/// Delimits rendered lines and stops generation.
pub const STOP_MARKER: &str = "###";

/// Channel topics are cut at this separator; text after it is for humans only.
const TOPIC_SEPARATOR: &str = "---";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S UTC";

/// Renders prompt fragments as chat-log text and encodes them.
///
/// **Interaction**: Built once by the coordinator; `line` is the renderer handed to
/// [`build_prompt`].
#[derive(Clone)]
pub struct PromptTemplate {
    tokenizer: Arc<dyn Tokenizer>,
}

impl PromptTemplate {
    pub fn new(tokenizer: Arc<dyn Tokenizer>) -> Self {
        Self { tokenizer }
    }

    pub fn tokenizer(&self) -> &Arc<dyn Tokenizer> {
        &self.tokenizer
    }

    /// Identity and channel context, followed by the stop marker.
    pub fn preamble(&self, bot_name: &str, channel_name: &str, topic: Option<&str>) -> Vec<TokenId> {
        let topic = topic
            .map(|t| t.split(TOPIC_SEPARATOR).next().unwrap_or("").trim())
            .filter(|t| !t.is_empty());
        let topic_sentence = match topic {
            Some(t) => format!(" The topic of the channel is: {t}"),
            None => String::new(),
        };
        self.tokenizer.encode(&format!(
            "You are {bot_name}.\n\nYou are in a chat channel named #{channel_name}.{topic_sentence}\n{STOP_MARKER}\n"
        ))
    }

    /// One history line: header, content with stop markers removed, stop marker.
    pub fn line(&self, entry: &HistoryEntry, reply: Option<&HistoryEntry>) -> Vec<TokenId> {
        let header = match reply {
            Some(target) => format!(
                "{} – {} in reply to {} - {}",
                entry.author_display_name,
                entry.timestamp.format(TIMESTAMP_FORMAT),
                target.author_display_name,
                target.timestamp.format(TIMESTAMP_FORMAT),
            ),
            None => format!(
                "{} – {}",
                entry.author_display_name,
                entry.timestamp.format(TIMESTAMP_FORMAT)
            ),
        };
        let content = entry.content.replace(STOP_MARKER, "");
        let mut text = format!("{header}:\n{content}\n{STOP_MARKER}\n");
        if entry.content.is_empty() {
            text.truncate(text.trim_end().len());
        }
        self.tokenizer.encode(&text)
    }

    /// Header of the bot's own upcoming line; the completion continues from here.
    pub fn postamble(&self, bot_name: &str, now: DateTime<Utc>) -> Vec<TokenId> {
        self.tokenizer
            .encode(&format!("{bot_name} – {}:\n", now.format(TIMESTAMP_FORMAT)))
    }
}

impl std::fmt::Debug for PromptTemplate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptTemplate").finish_non_exhaustive()
    }
}

/// Finds the entry with `id` in the visible window. Linear scan: O(window) per
/// lookup, O(window²) per prompt build, which is fine at a 200-entry window.
fn resolve_reply<'a>(history: &'a [HistoryEntry], entry: &HistoryEntry) -> Option<&'a HistoryEntry> {
    let target = entry.reply_target_id?;
    history.iter().find(|e| e.id == target)
}

/// Builds `preamble ++ lines ++ postamble` under `budget` tokens.
///
/// `history` is oldest first. Entries are scanned newest first; empty entries are
/// skipped; the scan stops at the first line that would overflow the budget, so
/// the selection is always a contiguous run of the newest non-empty entries,
/// emitted in chronological order. A reply target that is not in `history`
/// renders as no reply.
///
/// If `preamble + postamble` alone exceeds `budget`, the result exceeds it too.
pub fn build_prompt<F>(
    history: &[HistoryEntry],
    preamble: &[TokenId],
    postamble: &[TokenId],
    budget: usize,
    mut render: F,
) -> Vec<TokenId>
where
    F: FnMut(&HistoryEntry, Option<&HistoryEntry>) -> Vec<TokenId>,
{
    let fixed = preamble.len() + postamble.len();
    let mut used = 0usize;
    let mut lines: Vec<Vec<TokenId>> = Vec::new();

    for entry in history.iter().rev() {
        if entry.content.is_empty() {
            continue;
        }
        let line = render(entry, resolve_reply(history, entry));
        if fixed + used + line.len() > budget {
            break;
        }
        used += line.len();
        lines.push(line);
    }

    let mut prompt = Vec::with_capacity(fixed + used);
    prompt.extend_from_slice(preamble);
    for line in lines.iter().rev() {
        prompt.extend_from_slice(line);
    }
    prompt.extend_from_slice(postamble);
    prompt
}
