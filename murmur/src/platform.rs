//! Chat platform collaborator: the seam between the coordinator and a concrete
//! chat service (Telegram, Discord, a test double).
//!
//! The coordinator only sees the types in this module. Adapters translate their
//! native events into [`InboundMessage`] and call the coordinator's handlers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

/// Platform-assigned channel (chat) id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(pub i64);

/// Platform-assigned message id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub i64);

/// Platform-assigned user id.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserId(pub u64);

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message as delivered by the platform, before normalization.
///
/// `content` is raw platform text and may still contain mention placeholders
/// such as `<@123>`; see [`Normalizer`](crate::entry::Normalizer).
#[derive(Clone, Debug)]
pub struct InboundMessage {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub timestamp: DateTime<Utc>,
    pub content: String,
    pub reply_to: Option<MessageId>,
    /// Whether the bot was mentioned (or replied to) in this message.
    pub mentions_bot: bool,
    /// Bot-authored confirmation of a reset command; history backfill stops here.
    pub is_reset_marker: bool,
}

/// Channel metadata used in the prompt preamble.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChannelInfo {
    pub name: String,
    pub topic: Option<String>,
}

/// A message the bot posted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SentMessage {
    pub id: MessageId,
    pub timestamp: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A structured status message (rendered as an embed where the platform has them).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub title: Option<String>,
    pub description: String,
}

impl Notice {
    pub fn busy() -> Self {
        Self {
            level: NoticeLevel::Warning,
            title: Some("Hold up!".to_string()),
            description: "I'm already replying, please wait for me to finish!".to_string(),
        }
    }

    pub fn forgotten() -> Self {
        Self {
            level: NoticeLevel::Info,
            title: None,
            description: "Okay, forgetting everything from here.".to_string(),
        }
    }

    pub fn error(kind: &str, description: impl std::fmt::Display) -> Self {
        Self {
            level: NoticeLevel::Error,
            title: Some("Error".to_string()),
            description: format!("{kind}: {description}"),
        }
    }
}

/// Errors returned by platform calls.
#[derive(Debug, Error)]
pub enum PlatformError {
    #[error("platform request failed: {0}")]
    Request(String),
}

/// Operations the coordinator needs from a chat platform.
///
/// Lookups (`display_name`, `channel_name`) are synchronous cache reads; a miss
/// returns `None` and callers fall back to a placeholder.
#[async_trait]
pub trait ChatPlatform: Send + Sync {
    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo, PlatformError>;

    /// Up to `limit` messages strictly before `before`, newest first.
    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: MessageId,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, PlatformError>;

    async fn send_text(
        &self,
        channel: ChannelId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError>;

    async fn send_notice(
        &self,
        channel: ChannelId,
        notice: &Notice,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError>;

    /// Shows a short-lived "typing" indicator.
    async fn start_typing(&self, channel: ChannelId) -> Result<(), PlatformError>;

    fn display_name(&self, channel: ChannelId, user: UserId) -> Option<String>;

    fn channel_name(&self, channel: ChannelId) -> Option<String>;

    /// Whether messages the bot sends come back as message-created events.
    ///
    /// When `false` the coordinator records its own replies into history itself.
    fn echoes_own_messages(&self) -> bool {
        true
    }
}
