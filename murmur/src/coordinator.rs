//! Event coordinator: turns platform events into history updates and reply cycles.
//!
//! One [`Coordinator`] is shared (by `Arc`) across every event task. Each handler
//! only touches the session of the channel it was called for, so channels run in
//! parallel while a channel's own cycles are serialized by its gate.
//!
//! # Reply cycle
//!
//! 1. Record the trigger in history (rehydrating the cache first if needed).
//! 2. Try the channel's gate; if a cycle is running, reply with a busy notice.
//!    Otherwise snapshot history while still holding the history lock, so the
//!    prompt sees exactly what was recorded when the gate was taken.
//! 3. Build the prompt under the token budget.
//! 4. Stream the completion through an [`IncrementalChunker`], sending each chunk
//!    as a reply to the trigger as soon as it is final.
//!
//! Steps 3 and 4 run under one deadline. Any failure is reported in the channel
//! and returned; the gate is released on every path.
//!
//! Steps 1 and 2 are [`Coordinator::record`], the rest is
//! [`Coordinator::follow_up`]. Adapters that deliver a channel's events in order
//! can await `record` inline and spawn only `follow_up`, which keeps history in
//! arrival order.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::chunker::IncrementalChunker;
use crate::completion::{CompletionClient, CompletionError, RequestSettings};
use crate::entry::{HistoryEntry, Normalizer};
use crate::error::BotError;
use crate::platform::{ChannelId, ChatPlatform, InboundMessage, MessageId, Notice, UserId};
use crate::prompt::{build_prompt, PromptTemplate};
use crate::session::{
    ChannelSession, CyclePermit, HistoryLog, SessionRegistry, DEFAULT_HISTORY_CAPACITY,
};
use crate::tokenizer::Tokenizer;

/// Who the bot is on the platform.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BotIdentity {
    pub user_id: UserId,
    /// Name used for the bot in the preamble, postamble, and its own history lines.
    pub name: String,
}

/// Tuning for the coordinator.
#[derive(Clone, Debug)]
pub struct CoordinatorConfig {
    /// Token budget for the whole prompt.
    pub max_input_tokens: usize,
    /// Extra fields merged into every completion request.
    pub request_settings: RequestSettings,
    /// Authors whose messages are recorded but never answered.
    pub ignored_authors: HashSet<UserId>,
    pub text_replacements: HashMap<String, String>,
    pub history_capacity: usize,
    /// Maximum chars per outgoing message.
    pub chunk_length: usize,
    /// Deadline for one prompt → complete → send cycle.
    pub request_timeout: Duration,
    /// How often the typing indicator is refreshed while a cycle runs.
    pub typing_interval: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_input_tokens: 2000,
            request_settings: RequestSettings::new(),
            ignored_authors: HashSet::new(),
            text_replacements: HashMap::new(),
            history_capacity: DEFAULT_HISTORY_CAPACITY,
            chunk_length: 2000,
            request_timeout: Duration::from_secs(30),
            typing_interval: Duration::from_secs(4),
        }
    }
}

/// Result of handling one created message.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Recorded in history; not addressed to the bot (or from the bot / an ignored author).
    Recorded,
    /// Addressed to the bot while a cycle was already running; a busy notice was sent.
    Busy,
    /// A cycle ran to completion and sent `chunks` messages.
    Replied { chunks: usize },
}

/// A recorded message whose follow-up has not run yet.
///
/// Holds the channel's gate and the history snapshot when a reply cycle is due;
/// dropping it without [`Coordinator::follow_up`] releases the gate.
#[derive(Debug)]
#[must_use = "pass to Coordinator::follow_up"]
pub struct Recorded {
    channel: ChannelId,
    trigger: MessageId,
    next: FollowUp,
}

#[derive(Debug)]
enum FollowUp {
    Nothing,
    Busy,
    Cycle {
        session: Arc<ChannelSession>,
        permit: CyclePermit,
        history: Vec<HistoryEntry>,
    },
}

impl Recorded {
    /// Whether [`Coordinator::follow_up`] will run a reply cycle.
    pub fn starts_cycle(&self) -> bool {
        matches!(self.next, FollowUp::Cycle { .. })
    }
}

/// Commands users can invoke.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Forget the channel's history up to now.
    Forget,
}

/// Keeps the typing indicator alive until dropped.
struct TypingGuard {
    handle: JoinHandle<()>,
}

impl TypingGuard {
    fn start(platform: Arc<dyn ChatPlatform>, channel: ChannelId, interval: Duration) -> Self {
        let handle = tokio::spawn(async move {
            loop {
                if let Err(e) = platform.start_typing(channel).await {
                    debug!(channel = %channel, error = %e, "typing indicator failed");
                }
                tokio::time::sleep(interval).await;
            }
        });
        Self { handle }
    }
}

impl Drop for TypingGuard {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Dispatch target for platform events.
///
/// **Interaction**: Adapters call [`on_message_created`](Self::on_message_created),
/// [`on_message_deleted`](Self::on_message_deleted), and
/// [`on_command_invoked`](Self::on_command_invoked), one task per event.
pub struct Coordinator {
    platform: Arc<dyn ChatPlatform>,
    completion: Arc<dyn CompletionClient>,
    template: PromptTemplate,
    normalizer: Normalizer,
    sessions: SessionRegistry,
    bot: BotIdentity,
    config: CoordinatorConfig,
}

impl Coordinator {
    /// Builds a coordinator. Fails if `chunk_length` is zero or the text
    /// replacements do not compile.
    pub fn new(
        platform: Arc<dyn ChatPlatform>,
        completion: Arc<dyn CompletionClient>,
        tokenizer: Arc<dyn Tokenizer>,
        bot: BotIdentity,
        config: CoordinatorConfig,
    ) -> Result<Self, BotError> {
        IncrementalChunker::new(config.chunk_length)?;
        Ok(Self {
            platform,
            completion,
            template: PromptTemplate::new(tokenizer),
            normalizer: Normalizer::new(&config.text_replacements)?,
            sessions: SessionRegistry::new(config.history_capacity),
            bot,
            config,
        })
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Records `message` and, if it is addressed to the bot, runs a reply cycle.
    pub async fn on_message_created(&self, message: InboundMessage) -> Result<CycleOutcome, BotError> {
        let recorded = self.record(message).await;
        self.follow_up(recorded).await
    }

    /// Records `message` in its channel's history and, for a trigger, tries the gate.
    ///
    /// When the gate is free the returned [`Recorded`] owns it together with the
    /// history as of that moment; a trigger arriving later is never part of this
    /// cycle's prompt.
    pub async fn record(&self, message: InboundMessage) -> Recorded {
        let channel = message.channel_id;
        let trigger = message.id;
        let session = self.sessions.session(channel).await;

        let next = {
            let mut log = session.log().await;
            if message.is_reset_marker {
                debug!(channel = %channel, id = %trigger, "reset marker; history starts here");
                *log = Some(HistoryLog::new(self.sessions.capacity()));
                FollowUp::Nothing
            } else {
                if log.is_none() {
                    *log = Some(self.rehydrate(channel, trigger).await);
                }
                let entry = self.normalizer.normalize(self.platform.as_ref(), &message);
                let history = log.get_or_insert_with(|| HistoryLog::new(self.sessions.capacity()));
                history.push(entry);

                if message.author_id == self.bot.user_id
                    || self.config.ignored_authors.contains(&message.author_id)
                    || !message.mentions_bot
                {
                    FollowUp::Nothing
                } else {
                    match session.try_begin_cycle() {
                        Some(permit) => FollowUp::Cycle {
                            session: session.clone(),
                            permit,
                            history: history.snapshot(),
                        },
                        None => FollowUp::Busy,
                    }
                }
            }
        };

        Recorded {
            channel,
            trigger,
            next,
        }
    }

    /// Sends the busy notice or runs the reply cycle that `record` prepared.
    pub async fn follow_up(&self, recorded: Recorded) -> Result<CycleOutcome, BotError> {
        let Recorded {
            channel,
            trigger,
            next,
        } = recorded;
        let (session, permit, history) = match next {
            FollowUp::Nothing => return Ok(CycleOutcome::Recorded),
            FollowUp::Busy => {
                info!(channel = %channel, id = %trigger, "cycle already running; rejecting trigger");
                if let Err(e) = self
                    .platform
                    .send_notice(channel, &Notice::busy(), Some(trigger))
                    .await
                {
                    warn!(channel = %channel, error = %e, "failed to send busy notice");
                }
                return Ok(CycleOutcome::Busy);
            }
            FollowUp::Cycle {
                session,
                permit,
                history,
            } => (session, permit, history),
        };

        info!(channel = %channel, trigger = %trigger, history = history.len(), "reply cycle started");
        let deadline = self.config.request_timeout;
        let result = match tokio::time::timeout(deadline, self.respond(&session, trigger, history)).await {
            Ok(result) => result,
            Err(_) => Err(CompletionError::Timeout(deadline).into()),
        };
        drop(permit);

        match result {
            Ok(chunks) => {
                info!(channel = %channel, chunks, "reply cycle finished");
                Ok(CycleOutcome::Replied { chunks })
            }
            Err(e) => {
                error!(channel = %channel, kind = e.kind(), error = %e, "reply cycle failed");
                let notice = Notice::error(e.kind(), &e);
                if let Err(send_err) = self
                    .platform
                    .send_notice(channel, &notice, Some(trigger))
                    .await
                {
                    warn!(channel = %channel, error = %send_err, "failed to send error notice");
                }
                Err(e)
            }
        }
    }

    /// Drops the channel's cached history if it holds `message`. Returns whether it did.
    pub async fn on_message_deleted(&self, channel: ChannelId, message: MessageId) -> bool {
        let Some(session) = self.sessions.get(channel).await else {
            return false;
        };
        let invalidated = session.invalidate_if_cached(message).await;
        if invalidated {
            debug!(channel = %channel, id = %message, "cached message deleted; history invalidated");
        }
        invalidated
    }

    /// Runs a user command in `channel`.
    pub async fn on_command_invoked(&self, channel: ChannelId, command: Command) -> Result<(), BotError> {
        match command {
            Command::Forget => self.forget(channel).await,
        }
    }

    /// Waits for any running cycle, posts the reset marker, and clears the cache.
    async fn forget(&self, channel: ChannelId) -> Result<(), BotError> {
        let session = self.sessions.session(channel).await;
        let _permit = session.begin_cycle().await;
        self.platform
            .send_notice(channel, &Notice::forgotten(), None)
            .await?;
        session.clear().await;
        info!(channel = %channel, "history forgotten");
        Ok(())
    }

    /// Loads up to capacity messages before `before`, stopping at the newest reset marker.
    async fn rehydrate(&self, channel: ChannelId, before: MessageId) -> HistoryLog {
        let capacity = self.sessions.capacity();
        let messages = match self.platform.fetch_history(channel, before, capacity).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(channel = %channel, error = %e, "history backfill failed; starting empty");
                Vec::new()
            }
        };
        let entries = messages
            .iter()
            .take_while(|m| !m.is_reset_marker)
            .map(|m| self.normalizer.normalize(self.platform.as_ref(), m));
        let log = HistoryLog::from_newest_first(capacity, entries);
        debug!(channel = %channel, entries = log.len(), "history rehydrated");
        log
    }

    /// Builds the prompt and streams the reply. Returns the number of messages sent.
    async fn respond(
        &self,
        session: &ChannelSession,
        trigger: MessageId,
        history: Vec<HistoryEntry>,
    ) -> Result<usize, BotError> {
        let channel = session.channel_id();
        let info = self.platform.channel_info(channel).await?;

        let preamble = self
            .template
            .preamble(&self.bot.name, &info.name, info.topic.as_deref());
        let postamble = self.template.postamble(&self.bot.name, Utc::now());
        let prompt = build_prompt(
            &history,
            &preamble,
            &postamble,
            self.config.max_input_tokens,
            |entry, reply| self.template.line(entry, reply),
        );
        debug!(channel = %channel, tokens = prompt.len(), history = history.len(), "prompt built");
        if tracing::enabled!(tracing::Level::DEBUG) {
            if let Ok(text) = self.template.tokenizer().decode(&prompt) {
                debug!(channel = %channel, prompt = %text, "prompt text");
            }
        }

        let _typing = TypingGuard::start(self.platform.clone(), channel, self.config.typing_interval);
        let mut stream = self
            .completion
            .complete(&prompt, &self.config.request_settings)
            .await?;
        let mut chunker = IncrementalChunker::new(self.config.chunk_length)?;
        let mut sent = 0usize;

        while let Some(fragment) = stream.next().await {
            for chunk in chunker.write(&fragment?) {
                sent += self.send_chunk(session, trigger, &chunk).await?;
            }
        }
        let tail = chunker.flush();
        sent += self.send_chunk(session, trigger, &tail).await?;
        Ok(sent)
    }

    /// Sends one chunk as a reply to `trigger`; whitespace-only chunks are skipped.
    async fn send_chunk(
        &self,
        session: &ChannelSession,
        trigger: MessageId,
        chunk: &str,
    ) -> Result<usize, BotError> {
        if chunk.trim().is_empty() {
            return Ok(0);
        }
        let channel = session.channel_id();
        let sent = self.platform.send_text(channel, chunk, Some(trigger)).await?;
        if !self.platform.echoes_own_messages() {
            if let Some(log) = session.log().await.as_mut() {
                log.push(HistoryEntry {
                    id: sent.id,
                    author_display_name: self.bot.name.clone(),
                    timestamp: sent.timestamp,
                    content: chunk.to_string(),
                    reply_target_id: Some(trigger),
                });
            }
        }
        Ok(1)
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("bot", &self.bot)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
