//! services/api/src/web/session.rs
//!
//! Per-browser-session context. Each session owns the stories it creates and
//! caches the list of stories it can see. Contexts are created explicitly by
//! the session middleware and dropped explicitly on `/session/clear`, or
//! evicted once they have been idle for too long.

use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use storybook_core::domain::Story;
use uuid::Uuid;

/// Name of the cookie carrying the session id.
pub const SESSION_COOKIE: &str = "session";

/// Whether the session currently has a story being written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateState {
    Idle,
    Generating { started_at: DateTime<Utc> },
}

/// State scoped to a single user session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    pub id: Uuid,
    /// Owner id recorded on the stories this session creates.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Cached result of the last story scan; `None` until first loaded.
    pub stories: Option<Vec<Story>>,
    pub create_state: CreateState,
}

impl SessionContext {
    pub fn new(id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id,
            user_id: id.to_string(),
            created_at: now,
            last_seen: now,
            stories: None,
            create_state: CreateState::Idle,
        }
    }
}

/// All live session contexts, keyed by session id.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<Uuid, SessionContext>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the existing context or initializes a fresh one, marking it
    /// as seen. The boolean is `true` when the context was created by this call.
    pub fn init(&self, id: Uuid) -> (SessionContext, bool) {
        let mut created = false;
        let mut entry = self.sessions.entry(id).or_insert_with(|| {
            created = true;
            SessionContext::new(id)
        });
        entry.last_seen = Utc::now();
        (entry.value().clone(), created)
    }

    pub fn get(&self, id: Uuid) -> Option<SessionContext> {
        self.sessions.get(&id).map(|entry| entry.clone())
    }

    /// Drops the context; returns whether it existed.
    pub fn clear(&self, id: Uuid) -> bool {
        self.sessions.remove(&id).is_some()
    }

    /// Drops every context not seen for `max_idle`, except those still
    /// generating a story. Returns how many were dropped.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let cutoff = Utc::now() - max_idle;
        let before = self.sessions.len();
        self.sessions.retain(|_, context| {
            context.last_seen >= cutoff || context.create_state != CreateState::Idle
        });
        before.saturating_sub(self.sessions.len())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn cached_stories(&self, id: Uuid) -> Option<Vec<Story>> {
        self.sessions.get(&id).and_then(|entry| entry.stories.clone())
    }

    pub fn set_stories(&self, id: Uuid, stories: Vec<Story>) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.stories = Some(stories);
        }
    }

    /// Forgets the cached story list so the next read rescans the store.
    pub fn invalidate_stories(&self, id: Uuid) {
        if let Some(mut entry) = self.sessions.get_mut(&id) {
            entry.stories = None;
        }
    }

    /// Marks the session as generating a story. Returns `None` when a
    /// generation is already running for it. The returned ticket resets the
    /// state when dropped, including when the request is abandoned.
    pub fn begin_create(&self, id: Uuid) -> Option<CreateTicket<'_>> {
        let mut entry = self
            .sessions
            .entry(id)
            .or_insert_with(|| SessionContext::new(id));
        entry.last_seen = Utc::now();
        if entry.create_state != CreateState::Idle {
            return None;
        }
        entry.create_state = CreateState::Generating {
            started_at: Utc::now(),
        };
        Some(CreateTicket { store: self, id })
    }
}

/// Holds a session's "generating" state for as long as it lives.
pub struct CreateTicket<'a> {
    store: &'a SessionStore,
    id: Uuid,
}

impl Drop for CreateTicket<'_> {
    fn drop(&mut self) {
        if let Some(mut entry) = self.store.sessions.get_mut(&self.id) {
            entry.create_state = CreateState::Idle;
        }
    }
}
