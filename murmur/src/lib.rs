//! # Murmur
//!
//! Core of a chat bot that forwards recent channel history to a text-completion
//! service and streams the reply back into the channel.
//!
//! ## Design principles
//!
//! - **Bounded prompts**: the newest contiguous run of history that fits a token
//!   budget, always in chronological order ([`build_prompt`]).
//! - **One cycle per channel**: a non-blocking gate per channel; triggers that
//!   arrive while a reply is streaming get a busy notice instead of queueing
//!   ([`ChannelSession`]).
//! - **Bounded messages**: streamed output is cut at Unicode line-break
//!   opportunities into platform-sized messages as it arrives ([`IncrementalChunker`]).
//!
//! ## Main modules
//!
//! - [`coordinator`]: [`Coordinator`], event handlers and the reply cycle.
//! - [`session`]: [`SessionRegistry`], [`ChannelSession`], [`HistoryLog`], [`CyclePermit`].
//! - [`prompt`]: [`PromptTemplate`], [`build_prompt`].
//! - [`chunker`]: [`chunks`], [`IncrementalChunker`].
//! - [`completion`]: [`CompletionClient`] trait, [`OpenAiCompletions`], [`parse_stream_line`].
//! - [`platform`]: [`ChatPlatform`] trait and the ids/messages adapters exchange.
//! - [`entry`]: [`HistoryEntry`], [`Normalizer`].
//! - [`tokenizer`]: [`Tokenizer`] trait, [`TiktokenTokenizer`].
//!
//! Key types are re-exported at crate root: `use murmur::{Coordinator, ChatPlatform, OpenAiCompletions};`.

pub mod chunker;
pub mod completion;
pub mod coordinator;
pub mod entry;
pub mod error;
pub mod platform;
pub mod prompt;
pub mod session;
pub mod tokenizer;

pub use chunker::{chunks, ChunkError, Chunks, IncrementalChunker};
pub use completion::{
    parse_stream_line, CompletionClient, CompletionError, CompletionStream, OpenAiCompletions,
    OpenAiConfig, RequestSettings, StreamLine,
};
pub use coordinator::{
    BotIdentity, Command, Coordinator, CoordinatorConfig, CycleOutcome, Recorded,
};
pub use entry::{placeholder_user_name, HistoryEntry, Normalizer};
pub use error::BotError;
pub use platform::{
    ChannelId, ChannelInfo, ChatPlatform, InboundMessage, MessageId, Notice, NoticeLevel,
    PlatformError, SentMessage, UserId,
};
pub use prompt::{build_prompt, PromptTemplate, STOP_MARKER};
pub use session::{
    ChannelSession, CyclePermit, HistoryLog, SessionRegistry, DEFAULT_HISTORY_CAPACITY,
};
pub use tokenizer::{TiktokenTokenizer, TokenId, Tokenizer, TokenizerError};
