//! In-memory session registry.
//!
//! The registry lock only guards the map and is never held across an
//! `.await`. Each session sits behind its own async mutex, held for a whole
//! turn, so turns within a session run one at a time while sessions stay
//! independent.
//!
//! With an idle TTL set, a session that nobody has looked up for that long
//! is dropped by [`SessionRegistry::evict_idle`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use rolechat::session::{Page, Session};
use tracing::info;

pub type SessionRef = Arc<tokio::sync::Mutex<Session>>;

struct Entry {
    session: SessionRef,
    last_used: Instant,
}

#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, Entry>>,
    idle_ttl: Option<Duration>,
}

impl SessionRegistry {
    /// Registry that keeps sessions until they are removed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry whose sessions expire after `idle_ttl` without a lookup.
    pub fn with_idle_ttl(idle_ttl: Duration) -> Self {
        Self {
            idle_ttl: Some(idle_ttl),
            ..Self::default()
        }
    }

    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl
    }

    /// Start a session for `page` and return its id.
    pub fn create(&self, page: Page) -> String {
        let session = Session::new(page);
        let id = session.id().to_string();
        let entry = Entry {
            session: Arc::new(tokio::sync::Mutex::new(session)),
            last_used: Instant::now(),
        };
        self.lock().insert(id.clone(), entry);
        info!("Session {id} created for page {page}");
        id
    }

    /// Look up a session and mark it as used.
    pub fn get(&self, id: &str) -> Option<SessionRef> {
        let now = Instant::now();
        let mut sessions = self.lock();
        let entry = sessions.get_mut(id)?;
        if self.expired(entry, now) {
            return None;
        }
        entry.last_used = now;
        Some(entry.session.clone())
    }

    /// End a session and hand it back.
    pub fn remove(&self, id: &str) -> Option<SessionRef> {
        let removed = self.lock().remove(id).map(|e| e.session);
        if removed.is_some() {
            info!("Session {id} ended");
        }
        removed
    }

    /// Drop every session idle for longer than the TTL and return them.
    pub fn evict_idle(&self) -> Vec<SessionRef> {
        self.evict_idle_at(Instant::now())
    }

    fn evict_idle_at(&self, now: Instant) -> Vec<SessionRef> {
        if self.idle_ttl.is_none() {
            return Vec::new();
        }
        let mut sessions = self.lock();
        let idle: Vec<String> = sessions
            .iter()
            .filter(|(_, e)| self.expired(e, now))
            .map(|(id, _)| id.clone())
            .collect();
        let mut evicted = Vec::with_capacity(idle.len());
        for id in idle {
            if let Some(entry) = sessions.remove(&id) {
                info!("Session {id} expired after {:?} idle", now - entry.last_used);
                evicted.push(entry.session);
            }
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn expired(&self, entry: &Entry, now: Instant) -> bool {
        self.idle_ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_used) > ttl)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Entry>> {
        self.sessions.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_get_remove() {
        let registry = SessionRegistry::new();
        let id = registry.create(Page::Space);
        assert_eq!(registry.len(), 1);

        let session = registry.get(&id).unwrap();
        assert_eq!(session.lock().await.page(), Page::Space);

        let removed = registry.remove(&id).unwrap();
        assert!(Arc::ptr_eq(&removed, &session));
        assert!(registry.remove(&id).is_none());
        assert!(registry.get(&id).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn sessions_are_independent() {
        let registry = SessionRegistry::new();
        let a = registry.create(Page::Roles);
        let b = registry.create(Page::Roles);
        assert_ne!(a, b);
        let sa = registry.get(&a).unwrap();
        let sb = registry.get(&b).unwrap();
        assert!(!Arc::ptr_eq(&sa, &sb));
    }

    #[test]
    fn without_ttl_nothing_expires() {
        let registry = SessionRegistry::new();
        registry.create(Page::Widgets);
        let later = Instant::now() + Duration::from_secs(365 * 24 * 3600);
        assert!(registry.evict_idle_at(later).is_empty());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn idle_sessions_are_evicted() {
        let registry = SessionRegistry::with_idle_ttl(Duration::from_secs(60));
        let idle = registry.create(Page::Roles);
        let busy = registry.create(Page::Space);

        let later = Instant::now() + Duration::from_secs(61);
        registry.lock().get_mut(&busy).unwrap().last_used = later;

        let evicted = registry.evict_idle_at(later);
        assert_eq!(evicted.len(), 1);
        assert!(registry.get(&idle).is_none());
        assert!(registry.get(&busy).is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn lookup_refreshes_idle_clock() {
        let registry = SessionRegistry::with_idle_ttl(Duration::from_millis(400));
        let id = registry.create(Page::Space);

        std::thread::sleep(Duration::from_millis(150));
        assert!(registry.get(&id).is_some());
        std::thread::sleep(Duration::from_millis(150));
        assert!(registry.get(&id).is_some());
        assert!(registry.evict_idle().is_empty());

        std::thread::sleep(Duration::from_millis(500));
        assert!(registry.get(&id).is_none());
        assert_eq!(registry.evict_idle().len(), 1);
        assert!(registry.is_empty());
    }
}
