//! [`ChatPlatform`] over the Telegram Bot API.
//!
//! The Bot API has no history endpoint and does not deliver the bot's own
//! messages back as updates, so history starts with the first message the bot
//! sees in a chat and the coordinator records the bot's replies itself. Names
//! are cached from incoming updates.

use async_trait::async_trait;
use dashmap::DashMap;
use teloxide::prelude::*;
use teloxide::types::{ChatAction, Me, MessageId as TgMessageId, ReplyParameters, User};

use murmur::{
    ChannelId, ChannelInfo, ChatPlatform, InboundMessage, MessageId, Notice, NoticeLevel,
    PlatformError, SentMessage, UserId,
};

pub struct TelegramPlatform {
    bot: Bot,
    me_id: u64,
    me_username: String,
    users: DashMap<u64, String>,
    chats: DashMap<i64, String>,
}

impl TelegramPlatform {
    pub fn new(bot: Bot, me: &Me) -> Self {
        Self {
            bot,
            me_id: me.id.0,
            me_username: me.username().to_string(),
            users: DashMap::new(),
            chats: DashMap::new(),
        }
    }

    /// Converts an update into an [`InboundMessage`], caching the author and chat
    /// names on the way. Messages without text or author are skipped.
    pub fn inbound(&self, msg: &Message) -> Option<InboundMessage> {
        let text = msg.text().or_else(|| msg.caption())?;
        let author = msg.from.as_ref()?;
        self.users.insert(author.id.0, user_display_name(author));
        if let Some(name) = msg
            .chat
            .title()
            .or_else(|| msg.chat.username())
            .or_else(|| msg.chat.first_name())
        {
            self.chats.insert(msg.chat.id.0, name.to_string());
        }

        let reply = msg.reply_to_message();
        let replies_to_bot = reply
            .and_then(|m| m.from.as_ref())
            .is_some_and(|u| u.id.0 == self.me_id);
        Some(InboundMessage {
            id: MessageId(i64::from(msg.id.0)),
            channel_id: ChannelId(msg.chat.id.0),
            author_id: UserId(author.id.0),
            timestamp: msg.date,
            content: text.to_string(),
            reply_to: reply.map(|m| MessageId(i64::from(m.id.0))),
            mentions_bot: msg.chat.is_private()
                || replies_to_bot
                || mentions_username(text, &self.me_username),
            is_reset_marker: false,
        })
    }
}

fn user_display_name(user: &User) -> String {
    match &user.last_name {
        Some(last) => format!("{} {}", user.first_name, last),
        None => user.first_name.clone(),
    }
}

/// Whether `text` contains `@username` as a whole mention (case-insensitive).
fn mentions_username(text: &str, username: &str) -> bool {
    if username.is_empty() {
        return false;
    }
    let needle = format!("@{}", username.to_lowercase());
    let haystack = text.to_lowercase();
    haystack.match_indices(&needle).any(|(i, m)| {
        haystack[i + m.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}

/// Telegram has no embeds; notices become plain text with a level marker.
fn render_notice(notice: &Notice) -> String {
    let marker = match notice.level {
        NoticeLevel::Info => "",
        NoticeLevel::Warning => "⚠️ ",
        NoticeLevel::Error => "❌ ",
    };
    match &notice.title {
        Some(title) => format!("{marker}{title}\n{}", notice.description),
        None => format!("{marker}{}", notice.description),
    }
}

fn request_error(e: teloxide::RequestError) -> PlatformError {
    PlatformError::Request(e.to_string())
}

#[async_trait]
impl ChatPlatform for TelegramPlatform {
    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo, PlatformError> {
        Ok(ChannelInfo {
            name: self
                .channel_name(channel)
                .unwrap_or_else(|| format!("chat{channel}")),
            topic: None,
        })
    }

    async fn fetch_history(
        &self,
        _channel: ChannelId,
        _before: MessageId,
        _limit: usize,
    ) -> Result<Vec<InboundMessage>, PlatformError> {
        Ok(Vec::new())
    }

    async fn send_text(
        &self,
        channel: ChannelId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError> {
        let mut request = self.bot.send_message(ChatId(channel.0), text);
        if let Some(id) = reply_to.and_then(|id| i32::try_from(id.0).ok()) {
            request = request.reply_parameters(ReplyParameters::new(TgMessageId(id)));
        }
        let sent = request.await.map_err(request_error)?;
        Ok(SentMessage {
            id: MessageId(i64::from(sent.id.0)),
            timestamp: sent.date,
        })
    }

    async fn send_notice(
        &self,
        channel: ChannelId,
        notice: &Notice,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError> {
        self.send_text(channel, &render_notice(notice), reply_to)
            .await
    }

    async fn start_typing(&self, channel: ChannelId) -> Result<(), PlatformError> {
        self.bot
            .send_chat_action(ChatId(channel.0), ChatAction::Typing)
            .await
            .map(|_| ())
            .map_err(request_error)
    }

    fn display_name(&self, _channel: ChannelId, user: UserId) -> Option<String> {
        self.users.get(&user.0).map(|name| name.clone())
    }

    fn channel_name(&self, channel: ChannelId) -> Option<String> {
        self.chats.get(&channel.0).map(|name| name.clone())
    }

    fn echoes_own_messages(&self) -> bool {
        false
    }
}
