use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;
use uuid::Uuid;

/// How the question box got its current contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InputState {
    #[default]
    Empty,
    UserEdited,
    RandomFilled,
}

/// Per-browser state: just the question box.
#[derive(Debug, Clone)]
pub struct Session {
    question: String,
    input: InputState,
    last_seen: Instant,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            question: String::new(),
            input: InputState::Empty,
            last_seen: Instant::now(),
        }
    }
}

impl Session {
    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn input(&self) -> InputState {
        self.input
    }

    /// The user typed into the box.
    pub fn edit(&mut self, text: impl Into<String>) {
        self.question = text.into();
        self.input = InputState::UserEdited;
    }

    /// The box was overwritten by a catalog pick.
    pub fn fill_random(&mut self, question: impl Into<String>) {
        self.question = question.into();
        self.input = InputState::RandomFilled;
    }

    fn touch(&mut self) {
        self.last_seen = Instant::now();
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_seen)
    }
}

/// All live sessions, keyed by the id stored in the browser cookie.
#[derive(Debug)]
pub struct SessionStore {
    sessions: DashMap<Uuid, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            ttl,
        }
    }

    /// Returns `id` if it names a live session, otherwise starts a new one.
    pub fn resolve(&self, id: Option<Uuid>) -> (Uuid, bool) {
        if let Some(id) = id {
            if let Some(mut session) = self.sessions.get_mut(&id) {
                session.touch();
                return (id, false);
            }
        }

        let id = Uuid::new_v4();
        self.sessions.insert(id, Session::default());
        debug!(%id, "session started");

        (id, true)
    }

    /// Run `f` against the session. Unknown ids get a fresh session, which
    /// covers one expiring between `resolve` and use.
    pub fn with<T>(&self, id: Uuid, f: impl FnOnce(&mut Session) -> T) -> T {
        let mut session = self.sessions.entry(id).or_default();
        session.touch();

        f(session.value_mut())
    }

    pub fn snapshot(&self, id: Uuid) -> Session {
        self.with(id, |s| s.clone())
    }

    /// Drop sessions idle for longer than the ttl. Returns how many ended.
    pub fn purge_expired(&self) -> usize {
        self.purge_idle_since(Instant::now())
    }

    fn purge_idle_since(&self, now: Instant) -> usize {
        let mut ended = 0;

        self.sessions.retain(|_, s| {
            let live = s.idle_for(now) <= self.ttl;
            if !live {
                ended += 1;
            }
            live
        });

        ended
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        let session = Session::default();

        assert_eq!(session.question(), "");
        assert_eq!(session.input(), InputState::Empty);
    }

    #[test]
    fn transitions() {
        let mut session = Session::default();

        session.fill_random("Show all orders shipped to France.");
        assert_eq!(session.input(), InputState::RandomFilled);

        session.edit("Show all orders shipped to Spain.");
        assert_eq!(session.input(), InputState::UserEdited);
        assert_eq!(session.question(), "Show all orders shipped to Spain.");

        session.fill_random("Which products have never been ordered?");
        assert_eq!(session.input(), InputState::RandomFilled);

        session.edit("");
        assert_eq!(session.input(), InputState::UserEdited);
    }

    #[test]
    fn resolve_keeps_known_sessions() {
        let store = SessionStore::new(Duration::from_secs(60));

        let (id, created) = store.resolve(None);
        assert!(created);

        store.with(id, |s| s.edit("hello"));

        let (same, created) = store.resolve(Some(id));
        assert_eq!(same, id);
        assert!(!created);
        assert_eq!(store.snapshot(id).question(), "hello");
    }

    #[test]
    fn resolve_replaces_unknown_ids() {
        let store = SessionStore::new(Duration::from_secs(60));
        let stale = Uuid::new_v4();

        let (id, created) = store.resolve(Some(stale));

        assert!(created);
        assert_ne!(id, stale);
    }

    #[test]
    fn sessions_are_independent() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (a, _) = store.resolve(None);
        let (b, _) = store.resolve(None);

        store.with(a, |s| s.edit("first"));

        assert_eq!(store.snapshot(a).question(), "first");
        assert_eq!(store.snapshot(b).question(), "");
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn idle_sessions_expire() {
        let store = SessionStore::new(Duration::from_secs(60));
        let (a, _) = store.resolve(None);
        store.with(a, |s| s.edit("soon gone"));

        assert_eq!(store.purge_idle_since(Instant::now()), 0);
        assert_eq!(
            store.purge_idle_since(Instant::now() + Duration::from_secs(61)),
            1
        );
        assert!(store.is_empty());
        assert_eq!(store.snapshot(a).question(), "");
    }

    #[test]
    fn purge_counts_while_sessions_start() {
        use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

        let store = SessionStore::new(Duration::ZERO);
        let started = AtomicUsize::new(0);
        let done = AtomicBool::new(false);
        let mut ended = 0;

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while !done.load(Ordering::Relaxed) {
                        store.resolve(None);
                        started.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }

            for _ in 0..2_000 {
                ended += store.purge_idle_since(Instant::now() + Duration::from_secs(1));
            }
            done.store(true, Ordering::Relaxed);
        });

        assert_eq!(ended + store.len(), started.load(Ordering::Relaxed));
    }
}
