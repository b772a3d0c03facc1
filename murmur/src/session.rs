//! Per-channel session state: the bounded history window and the completion gate.
//!
//! [`SessionRegistry`] maps channel ids to [`ChannelSession`]s behind one coarse
//! lock that is held only for lookup/insert. Each session then guards its own
//! history with its own lock, so unrelated channels never wait on each other.
//!
//! The completion gate is separate from the history lock: a cycle holds the gate
//! for the whole request/stream, while history stays writable so messages that
//! arrive meanwhile are still recorded.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, MutexGuard, OwnedMutexGuard};

use crate::entry::HistoryEntry;
use crate::platform::{ChannelId, MessageId};

/// Default number of entries kept per channel.
pub const DEFAULT_HISTORY_CAPACITY: usize = 200;

/// FIFO window of the most recent entries in one channel.
#[derive(Debug, Clone)]
pub struct HistoryLog {
    entries: VecDeque<HistoryEntry>,
    capacity: usize,
}

impl HistoryLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Builds a log from backfill given newest first, keeping at most `capacity`
    /// of the newest entries in chronological order.
    pub fn from_newest_first<I>(capacity: usize, newest_first: I) -> Self
    where
        I: IntoIterator<Item = HistoryEntry>,
    {
        let mut log = Self::new(capacity);
        for entry in newest_first.into_iter().take(capacity) {
            log.entries.push_front(entry);
        }
        log
    }

    /// Appends `entry`, evicting the oldest entries so the log never exceeds capacity.
    pub fn push(&mut self, entry: HistoryEntry) {
        if self.capacity == 0 {
            return;
        }
        while self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: MessageId) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// Copy of the window, oldest first.
    pub fn snapshot(&self) -> Vec<HistoryEntry> {
        self.entries.iter().cloned().collect()
    }
}

/// Proof that the holder owns a channel's completion gate. Dropping it releases
/// the gate, on every exit path including cancellation.
#[derive(Debug)]
pub struct CyclePermit {
    _guard: OwnedMutexGuard<()>,
}

/// State for one channel.
///
/// `log` is `None` until the first access and again after a reset or
/// invalidation; the next access rehydrates it from platform history. The gate
/// lives as long as the session, so a reset never drops a gate someone holds.
#[derive(Debug)]
pub struct ChannelSession {
    channel_id: ChannelId,
    gate: Arc<Mutex<()>>,
    log: Mutex<Option<HistoryLog>>,
}

impl ChannelSession {
    fn new(channel_id: ChannelId) -> Self {
        Self {
            channel_id,
            gate: Arc::new(Mutex::new(())),
            log: Mutex::new(None),
        }
    }

    pub fn channel_id(&self) -> ChannelId {
        self.channel_id
    }

    /// Takes the gate without waiting; `None` means a cycle is already running.
    pub fn try_begin_cycle(&self) -> Option<CyclePermit> {
        self.gate
            .clone()
            .try_lock_owned()
            .ok()
            .map(|guard| CyclePermit { _guard: guard })
    }

    /// Waits for the gate. Used by reset so it cannot interleave with a running cycle.
    pub async fn begin_cycle(&self) -> CyclePermit {
        CyclePermit {
            _guard: self.gate.clone().lock_owned().await,
        }
    }

    pub fn is_busy(&self) -> bool {
        self.gate.try_lock().is_err()
    }

    /// Locks this channel's history. `None` inside means "not loaded".
    pub async fn log(&self) -> MutexGuard<'_, Option<HistoryLog>> {
        self.log.lock().await
    }

    /// Oldest-first copy of the loaded history (empty when not loaded).
    pub async fn snapshot(&self) -> Vec<HistoryEntry> {
        self.log
            .lock()
            .await
            .as_ref()
            .map(HistoryLog::snapshot)
            .unwrap_or_default()
    }

    /// Drops the cached history; the next access rehydrates it.
    pub async fn clear(&self) {
        *self.log.lock().await = None;
    }

    /// Drops the cached history if it contains `id`. Returns whether it did.
    pub async fn invalidate_if_cached(&self, id: MessageId) -> bool {
        let mut log = self.log.lock().await;
        let cached = log.as_ref().is_some_and(|l| l.contains(id));
        if cached {
            *log = None;
        }
        cached
    }
}

/// Process-wide channel → session map.
///
/// **Interaction**: Owned by the coordinator and shared by every event task.
#[derive(Debug)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<ChannelId, Arc<ChannelSession>>>,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            capacity,
        }
    }

    /// History capacity for every channel.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the session for `channel`, creating it on first use.
    pub async fn session(&self, channel: ChannelId) -> Arc<ChannelSession> {
        let mut sessions = self.sessions.lock().await;
        sessions
            .entry(channel)
            .or_insert_with(|| Arc::new(ChannelSession::new(channel)))
            .clone()
    }

    /// Returns the session for `channel` if one exists.
    pub async fn get(&self, channel: ChannelId) -> Option<Arc<ChannelSession>> {
        self.sessions.lock().await.get(&channel).cloned()
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
