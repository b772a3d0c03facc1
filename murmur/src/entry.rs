//! History entries and message normalization.
//!
//! A [`HistoryEntry`] is the platform-independent form of one chat message as it
//! appears in a prompt. [`Normalizer`] produces entries from [`InboundMessage`]s:
//! user mentions become display names, custom emoji become `:name:`, channel
//! references become `#name`, and configured text replacements are applied.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use regex::{Captures, Regex, RegexBuilder};

use crate::platform::{ChannelId, ChatPlatform, InboundMessage, MessageId, UserId};

/// Normalized, immutable record of one chat message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HistoryEntry {
    pub id: MessageId,
    pub author_display_name: String,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    /// Id of the message this one replies to; may point outside the cached window.
    pub reply_target_id: Option<MessageId>,
}

/// Fallback when the platform has no display name for a user.
pub fn placeholder_user_name(user: UserId) -> String {
    format!("user{user}")
}

/// Upper bound on the compiled replacement pattern.
const REPLACEMENT_PATTERN_SIZE_LIMIT: usize = 1 << 20;

fn placeholder_channel_name(channel: i64) -> String {
    format!("#channel{channel}")
}

/// Turns raw platform messages into [`HistoryEntry`] values.
///
/// **Interaction**: Owned by the coordinator; applied to live messages, history
/// backfill, and the bot's own replies on platforms that do not echo them.
#[derive(Debug)]
pub struct Normalizer {
    user_mention: Regex,
    custom_emoji: Regex,
    channel_mention: Regex,
    replacements: Option<(Regex, HashMap<String, String>)>,
}

impl Normalizer {
    /// Builds a normalizer. Replacement keys match case-insensitively.
    ///
    /// Fails when the replacement table does not compile into one pattern (e.g.
    /// it is too large).
    pub fn new(text_replacements: &HashMap<String, String>) -> Result<Self, regex::Error> {
        let replacements = if text_replacements.is_empty() {
            None
        } else {
            let lowered: HashMap<String, String> = text_replacements
                .iter()
                .map(|(k, v)| (k.to_lowercase(), v.clone()))
                .collect();
            let mut keys: Vec<&String> = lowered.keys().collect();
            // Longest first so overlapping keys prefer the most specific match.
            keys.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
            let pattern = keys
                .iter()
                .map(|k| regex::escape(k))
                .collect::<Vec<_>>()
                .join("|");
            let re = RegexBuilder::new(&pattern)
                .case_insensitive(true)
                .size_limit(REPLACEMENT_PATTERN_SIZE_LIMIT)
                .build()?;
            Some((re, lowered))
        };
        Ok(Self {
            user_mention: Regex::new(r"<@!?(\d+)>").expect("static regex"),
            custom_emoji: Regex::new(r"<a?(:\w+:)\d+>").expect("static regex"),
            channel_mention: Regex::new(r"<#(\d+)>").expect("static regex"),
            replacements,
        })
    }

    /// Resolves placeholders and applies replacements to raw message text.
    pub fn clean_text(&self, platform: &dyn ChatPlatform, channel: ChannelId, text: &str) -> String {
        let text = self.user_mention.replace_all(text, |caps: &Captures<'_>| {
            match caps[1].parse::<u64>() {
                Ok(id) => platform
                    .display_name(channel, UserId(id))
                    .unwrap_or_else(|| placeholder_user_name(UserId(id))),
                Err(_) => caps[0].to_string(),
            }
        });
        let text = self.custom_emoji.replace_all(&text, "$1");
        let text = self.channel_mention.replace_all(&text, |caps: &Captures<'_>| {
            match caps[1].parse::<i64>() {
                Ok(id) => platform
                    .channel_name(ChannelId(id))
                    .map(|name| format!("#{name}"))
                    .unwrap_or_else(|| placeholder_channel_name(id)),
                Err(_) => caps[0].to_string(),
            }
        });
        match &self.replacements {
            Some((re, table)) => re
                .replace_all(&text, |caps: &Captures<'_>| {
                    table
                        .get(&caps[0].to_lowercase())
                        .cloned()
                        .unwrap_or_else(|| caps[0].to_string())
                })
                .into_owned(),
            None => text.into_owned(),
        }
    }

    pub fn normalize(&self, platform: &dyn ChatPlatform, message: &InboundMessage) -> HistoryEntry {
        HistoryEntry {
            id: message.id,
            author_display_name: platform
                .display_name(message.channel_id, message.author_id)
                .unwrap_or_else(|| placeholder_user_name(message.author_id)),
            timestamp: message.timestamp,
            content: self.clean_text(platform, message.channel_id, &message.content),
            reply_target_id: message.reply_to,
        }
    }
}
