//! Shared test doubles for coordinator tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream;
use tokio::sync::Notify;

use murmur::{
    ChannelId, ChannelInfo, ChatPlatform, CompletionClient, CompletionError, CompletionStream,
    InboundMessage, MessageId, Notice, PlatformError, RequestSettings, SentMessage, TokenId,
    Tokenizer, TokenizerError, UserId,
};

pub const BOT: UserId = UserId(1);
pub const ALICE: UserId = UserId(42);
pub const BOB: UserId = UserId(43);

pub fn ts(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000 + secs, 0).unwrap()
}

/// A message from `author` in `channel`.
pub fn message(channel: i64, id: i64, author: UserId, content: &str) -> InboundMessage {
    InboundMessage {
        id: MessageId(id),
        channel_id: ChannelId(channel),
        author_id: author,
        timestamp: ts(id),
        content: content.to_string(),
        reply_to: None,
        mentions_bot: false,
        is_reset_marker: false,
    }
}

/// Same as [`message`] but addressed to the bot.
pub fn trigger(channel: i64, id: i64, author: UserId, content: &str) -> InboundMessage {
    InboundMessage {
        mentions_bot: true,
        ..message(channel, id, author, content)
    }
}

/// One token per char; decoding gives back readable prompt text.
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<TokenId> {
        text.chars().map(|c| c as TokenId).collect()
    }

    fn decode(&self, tokens: &[TokenId]) -> Result<String, TokenizerError> {
        tokens
            .iter()
            .map(|&t| char::from_u32(t).ok_or_else(|| TokenizerError::Decode(t.to_string())))
            .collect()
    }
}

pub fn prompt_text(tokens: &[TokenId]) -> String {
    CharTokenizer.decode(tokens).unwrap()
}

#[derive(Debug, Clone)]
pub struct SentText {
    pub channel: ChannelId,
    pub text: String,
    pub reply_to: Option<MessageId>,
}

#[derive(Debug, Clone)]
pub struct SentNotice {
    pub channel: ChannelId,
    pub notice: Notice,
    pub reply_to: Option<MessageId>,
}

/// In-memory platform that records everything the bot sends.
pub struct MockPlatform {
    pub history: Mutex<HashMap<ChannelId, Vec<InboundMessage>>>,
    pub texts: Mutex<Vec<SentText>>,
    pub notices: Mutex<Vec<SentNotice>>,
    pub names: HashMap<UserId, String>,
    pub fetches: AtomicUsize,
    pub typing: AtomicUsize,
    pub echoes: bool,
    /// Signalled when `channel_info` is entered.
    pub info_started: Notify,
    info_hold: Option<Arc<Notify>>,
    next_id: AtomicI64,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            history: Mutex::new(HashMap::new()),
            texts: Mutex::new(Vec::new()),
            notices: Mutex::new(Vec::new()),
            names: HashMap::from([
                (BOT, "murmur".to_string()),
                (ALICE, "alice".to_string()),
                (BOB, "bob".to_string()),
            ]),
            fetches: AtomicUsize::new(0),
            typing: AtomicUsize::new(0),
            echoes: true,
            info_started: Notify::new(),
            info_hold: None,
            next_id: AtomicI64::new(10_000),
        }
    }

    /// A platform that does not deliver the bot's own messages back as events.
    pub fn without_echo() -> Self {
        Self {
            echoes: false,
            ..Self::new()
        }
    }

    /// A platform whose `channel_info` waits on `release` before answering.
    pub fn holding_channel_info(release: Arc<Notify>) -> Self {
        Self {
            info_hold: Some(release),
            ..Self::new()
        }
    }

    /// Seeds platform-side history (chronological).
    pub fn seed(&self, messages: Vec<InboundMessage>) {
        let mut history = self.history.lock().unwrap();
        for m in messages {
            history.entry(m.channel_id).or_default().push(m);
        }
    }

    pub fn texts(&self) -> Vec<SentText> {
        self.texts.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<SentNotice> {
        self.notices.lock().unwrap().clone()
    }

    fn sent(&self) -> SentMessage {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        SentMessage {
            id: MessageId(id),
            timestamp: ts(id),
        }
    }
}

#[async_trait]
impl ChatPlatform for MockPlatform {
    async fn channel_info(&self, channel: ChannelId) -> Result<ChannelInfo, PlatformError> {
        self.info_started.notify_one();
        if let Some(hold) = &self.info_hold {
            hold.notified().await;
        }
        Ok(ChannelInfo {
            name: format!("room{channel}"),
            topic: None,
        })
    }

    async fn fetch_history(
        &self,
        channel: ChannelId,
        before: MessageId,
        limit: usize,
    ) -> Result<Vec<InboundMessage>, PlatformError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let history = self.history.lock().unwrap();
        Ok(history
            .get(&channel)
            .map(|msgs| {
                msgs.iter()
                    .rev()
                    .filter(|m| m.id < before)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn send_text(
        &self,
        channel: ChannelId,
        text: &str,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError> {
        self.texts.lock().unwrap().push(SentText {
            channel,
            text: text.to_string(),
            reply_to,
        });
        Ok(self.sent())
    }

    async fn send_notice(
        &self,
        channel: ChannelId,
        notice: &Notice,
        reply_to: Option<MessageId>,
    ) -> Result<SentMessage, PlatformError> {
        self.notices.lock().unwrap().push(SentNotice {
            channel,
            notice: notice.clone(),
            reply_to,
        });
        Ok(self.sent())
    }

    async fn start_typing(&self, _channel: ChannelId) -> Result<(), PlatformError> {
        self.typing.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn display_name(&self, _channel: ChannelId, user: UserId) -> Option<String> {
        self.names.get(&user).cloned()
    }

    fn channel_name(&self, channel: ChannelId) -> Option<String> {
        Some(format!("room{channel}"))
    }

    fn echoes_own_messages(&self) -> bool {
        self.echoes
    }
}

/// What [`ScriptedCompletion`] answers with.
#[derive(Debug, Clone)]
pub enum Script {
    /// Streams these fragments, then ends.
    Reply(Vec<String>),
    /// Fails before streaming with this status.
    Status(u16, String),
    /// Streams these fragments, then yields an upstream error.
    FailMidStream(Vec<String>, String),
    /// Never yields anything.
    Hang,
}

/// Completion double that records prompts and can be held at the start of a call.
pub struct ScriptedCompletion {
    script: Script,
    hold: Option<Arc<Notify>>,
    pub prompts: Mutex<Vec<Vec<TokenId>>>,
    pub settings: Mutex<Vec<RequestSettings>>,
    pub started: Notify,
}

impl ScriptedCompletion {
    pub fn new(script: Script) -> Self {
        Self {
            script,
            hold: None,
            prompts: Mutex::new(Vec::new()),
            settings: Mutex::new(Vec::new()),
            started: Notify::new(),
        }
    }

    /// Each call waits on `release` before answering.
    pub fn held(script: Script, release: Arc<Notify>) -> Self {
        Self {
            hold: Some(release),
            ..Self::new(script)
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts
            .lock()
            .unwrap()
            .iter()
            .map(|p| prompt_text(p))
            .collect()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletion {
    async fn complete(
        &self,
        prompt: &[TokenId],
        settings: &RequestSettings,
    ) -> Result<CompletionStream, CompletionError> {
        self.prompts.lock().unwrap().push(prompt.to_vec());
        self.settings.lock().unwrap().push(settings.clone());
        self.started.notify_one();
        if let Some(hold) = &self.hold {
            hold.notified().await;
        }
        match &self.script {
            Script::Reply(fragments) => {
                let items: Vec<Result<String, CompletionError>> =
                    fragments.iter().cloned().map(Ok).collect();
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Status(status, body) => Err(CompletionError::UpstreamHttp {
                status: *status,
                body: body.clone(),
            }),
            Script::FailMidStream(fragments, message) => {
                let mut items: Vec<Result<String, CompletionError>> =
                    fragments.iter().cloned().map(Ok).collect();
                items.push(Err(CompletionError::UpstreamStream(message.clone())));
                Ok(Box::pin(stream::iter(items)))
            }
            Script::Hang => Ok(Box::pin(stream::pending::<Result<String, CompletionError>>())),
        }
    }
}
