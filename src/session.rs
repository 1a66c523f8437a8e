//! Per-session context.
//!
//! Every browser session owns one [`Session`]: its transcript and its
//! in-flight request state. Handlers look the session up in the
//! [`SessionStore`] and pass it explicitly into the flows; nothing is kept
//! in process globals, so sessions never see each other's turns.
//!
//! A session admits at most one outstanding request. [`Session::try_begin`]
//! hands out an [`InFlight`] guard carrying a cancellation token; the guard
//! releases the session when dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::models::Transcript;

pub struct Session {
    id: String,
    transcript: RwLock<Transcript>,
    busy: AtomicBool,
    cancel: Mutex<Option<CancellationToken>>,
    last_seen: Mutex<Instant>,
}

impl Session {
    fn new(id: String) -> Self {
        Self {
            id,
            transcript: RwLock::new(Transcript::new()),
            busy: AtomicBool::new(false),
            cancel: Mutex::new(None),
            last_seen: Mutex::new(Instant::now()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Snapshot of the transcript.
    pub fn transcript(&self) -> Transcript {
        self.transcript
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub(crate) fn record_exchange(&self, question: &str, answer: &str) {
        self.transcript
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .append_exchange(question, answer);
    }

    /// True while a request is outstanding.
    pub fn is_pending(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// Claim the session for one request.
    ///
    /// Returns `None` if another request is already in flight. The returned
    /// token is a child of `parent`, so cancelling `parent` (server
    /// shutdown) also cancels this request.
    pub fn try_begin(self: &Arc<Self>, parent: &CancellationToken) -> Option<InFlight> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return None;
        }

        let token = parent.child_token();
        *self.cancel.lock().unwrap_or_else(|e| e.into_inner()) = Some(token.clone());
        self.touch();

        Some(InFlight {
            session: Arc::clone(self),
            token,
        })
    }

    /// Cancel the outstanding request, if any. Returns whether one was cancelled.
    pub fn cancel(&self) -> bool {
        match self.cancel.lock().unwrap_or_else(|e| e.into_inner()).as_ref() {
            Some(token) => {
                token.cancel();
                true
            }
            None => false,
        }
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_seen
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .elapsed()
    }
}

/// Exclusive claim on a session for the duration of one request.
pub struct InFlight {
    session: Arc<Session>,
    token: CancellationToken,
}

impl InFlight {
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        *self
            .session
            .cancel
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = None;
        self.session.touch();
        self.session.busy.store(false, Ordering::Release);
    }
}

/// All live sessions, keyed by session id.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    /// Look up the session for `id`, creating a fresh one when the id is
    /// missing, unknown, or expired. Returns the session and whether it was
    /// newly created.
    ///
    /// Unknown ids are never adopted: a new session always gets a
    /// server-generated id.
    pub fn get_or_create(&self, id: Option<&str>) -> (Arc<Session>, bool) {
        self.purge_expired();

        if let Some(session) = id.and_then(|id| self.get(id)) {
            session.touch();
            return (session, false);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(id.clone()));
        self.sessions
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(id, Arc::clone(&session));
        tracing::debug!(session = %session.id(), "session created");
        (session, true)
    }

    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(id)
            .cloned()
    }

    /// Drop sessions idle longer than the TTL. Sessions with a request in
    /// flight are kept.
    pub fn purge_expired(&self) -> usize {
        let mut sessions = self.sessions.write().unwrap_or_else(|e| e.into_inner());
        let before = sessions.len();
        sessions.retain(|_, s| s.is_pending() || s.idle_for() < self.ttl);
        let removed = before - sessions.len();
        if removed > 0 {
            tracing::info!(removed, "expired idle sessions");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
