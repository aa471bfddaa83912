//! Session store contract (component B) and its default in-memory
//! implementation.

use crate::error::{Error, Result};
use crate::types::{Event, Session, SessionKey};
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

/// Minimum contract every session store must satisfy. `ListContextWindowEvents`
/// is an optional capability with a default implementation that falls back to
/// scanning the full log in memory (the projection the runtime would do
/// itself if the store didn't offer it).
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session>;

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()>;

    async fn list_events(&self, key: &SessionKey) -> Result<Vec<Event>>;

    /// Events from the most recent compaction point (inclusive) onward. The
    /// default implementation computes this by scanning `list_events`
    /// backward for the last `meta.kind == "compaction"` event.
    async fn list_context_window_events(&self, key: &SessionKey) -> Result<Vec<Event>> {
        let events = self.list_events(key).await?;
        Ok(context_window(&events).to_vec())
    }
}

/// Scans `events` backward for the most recent compaction event; the window
/// is `[that event, .., last event]`, or the entire log if no compaction
/// event exists. Shared by the default `SessionStore::list_context_window_events`
/// and by runtime code operating on an in-memory copy of the log.
pub fn context_window(events: &[Event]) -> &[Event] {
    match events.iter().rposition(|e| e.is_compaction()) {
        Some(idx) => &events[idx..],
        None => events,
    }
}

/// Default in-memory session store, keyed by the (app, user, session)
/// triple. Events returned to callers are cloned so that caller-side
/// mutation can never corrupt the store's own copy.
#[derive(Default)]
pub struct InMemorySessionStore {
    sessions: DashMap<SessionKey, Arc<Session>>,
    events: DashMap<SessionKey, Vec<Event>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get_or_create(&self, key: &SessionKey) -> Result<Session> {
        if let Some(existing) = self.sessions.get(key) {
            return Ok((**existing).clone());
        }
        let session = Session {
            key: key.clone(),
            created_at: chrono::Utc::now(),
        };
        self.sessions
            .entry(key.clone())
            .or_insert_with(|| Arc::new(session.clone()));
        self.events.entry(key.clone()).or_default();
        Ok(session)
    }

    async fn append_event(&self, key: &SessionKey, event: Event) -> Result<()> {
        if !self.sessions.contains_key(key) {
            return Err(Error::session_not_found(key.to_string()));
        }
        self.events.entry(key.clone()).or_default().push(event);
        Ok(())
    }

    async fn list_events(&self, key: &SessionKey) -> Result<Vec<Event>> {
        self.events
            .get(key)
            .map(|entries| entries.clone())
            .ok_or_else(|| Error::session_not_found(key.to_string()))
    }
}
