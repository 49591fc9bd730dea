//! Session State
//!
//! Per-user conversation mode and last result set. Sessions are created on
//! first contact and live for the lifetime of the process.
//!
//! Each session sits behind its own async mutex. The controller holds that
//! lock for the whole handling of one message, so two messages from the same
//! user never interleave while different users proceed in parallel.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard, RwLock};
use tracing::debug;

use crate::catalog::Title;

/// Position in the conversation state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    #[default]
    Idle,
    AwaitingQuery,
    Selecting,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::AwaitingQuery => "awaiting_query",
            Self::Selecting => "selecting",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One user's conversation state
#[derive(Debug, Clone, Default)]
pub struct Session {
    mode: Mode,
    last_results: Vec<Title>,
}

impl Session {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn last_results(&self) -> &[Title] {
        &self.last_results
    }

    /// Search trigger: forget any previous list and wait for a keyword
    pub fn begin_search(&mut self) {
        self.mode = Mode::AwaitingQuery;
        self.last_results.clear();
    }

    /// A non-empty result list was shown; the user now picks by number
    pub fn present(&mut self, results: Vec<Title>) {
        debug_assert!(!results.is_empty());
        self.mode = Mode::Selecting;
        self.last_results = results;
    }

    /// Take the 1-based `n`th entry of the current list and return to idle.
    ///
    /// Returns `None` (and changes nothing) when not selecting or when `n`
    /// is outside `1..=len`.
    pub fn take_selection(&mut self, n: usize) -> Option<Title> {
        if self.mode != Mode::Selecting || n == 0 || n > self.last_results.len() {
            return None;
        }
        let title = self.last_results.swap_remove(n - 1);
        self.reset();
        Some(title)
    }

    /// Back to idle with no list
    pub fn reset(&mut self) {
        self.mode = Mode::Idle;
        self.last_results.clear();
    }
}

/// Exclusive access to one user's session
pub type SessionGuard = OwnedMutexGuard<Session>;

/// All sessions keyed by user id
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<i64, Arc<Mutex<Session>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a user's session, creating it on first contact.
    ///
    /// Waits while another message from the same user is being handled.
    pub async fn lock(&self, user_id: i64) -> SessionGuard {
        self.slot(user_id).await.lock_owned().await
    }

    /// Snapshot of a user's session (waits for any in-flight message)
    pub async fn snapshot(&self, user_id: i64) -> Option<Session> {
        let slot = self.sessions.read().await.get(&user_id).cloned()?;
        let session = slot.lock().await;
        Some(session.clone())
    }

    /// Number of users seen since start
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn slot(&self, user_id: i64) -> Arc<Mutex<Session>> {
        if let Some(slot) = self.sessions.read().await.get(&user_id) {
            return Arc::clone(slot);
        }

        let mut sessions = self.sessions.write().await;
        let slot = sessions.entry(user_id).or_insert_with(|| {
            debug!("New session for user {}", user_id);
            Arc::new(Mutex::new(Session::default()))
        });
        Arc::clone(slot)
    }
}
