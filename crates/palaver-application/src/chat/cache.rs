//! In-memory cache for session transcripts.

use std::collections::HashMap;

use tokio::sync::RwLock;

use palaver_core::chat::ChatSession;

/// Keyed store of full session transcripts.
///
/// This is the single source of truth during streaming: every active
/// generation mutates the entry for its session id here, whether or not
/// that session is the one currently displayed. Entries are created on
/// first fetch or creation and evicted only by explicit [`clear`] (e.g. on
/// logout) or [`remove`] (session deletion) — never implicitly, because a
/// background generation must keep a live target even if the user switches
/// away.
///
/// [`clear`]: SessionCacheService::clear
/// [`remove`]: SessionCacheService::remove
pub struct SessionCacheService {
    /// In-memory session cache
    sessions: RwLock<HashMap<i64, ChatSession>>,
}

impl SessionCacheService {
    /// Creates a new empty cache.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Returns a snapshot of the cached transcript for a session.
    pub async fn get(&self, session_id: i64) -> Option<ChatSession> {
        let sessions = self.sessions.read().await;
        sessions.get(&session_id).cloned()
    }

    /// Returns true if the session has a cached entry.
    pub async fn contains(&self, session_id: i64) -> bool {
        let sessions = self.sessions.read().await;
        sessions.contains_key(&session_id)
    }

    /// Inserts or overwrites the transcript for a session.
    pub async fn insert(&self, session: ChatSession) {
        let mut sessions = self.sessions.write().await;
        sessions.insert(session.id, session);
    }

    /// Removes one session from the cache.
    pub async fn remove(&self, session_id: i64) {
        let mut sessions = self.sessions.write().await;
        sessions.remove(&session_id);
    }

    /// Clears all cached sessions.
    pub async fn clear(&self) {
        let mut sessions = self.sessions.write().await;
        sessions.clear();
    }

    /// Mutates one cached transcript under a single lock hold.
    ///
    /// The closure runs with the write lock held and must not suspend;
    /// callers that need "find message, then mutate" do both inside one
    /// closure so no other generation's mutation can interleave between
    /// lookup and update.
    ///
    /// Returns `None` if the session has no cached entry.
    pub async fn with_session_mut<F, R>(&self, session_id: i64, mutate: F) -> Option<R>
    where
        F: FnOnce(&mut ChatSession) -> R,
    {
        let mut sessions = self.sessions.write().await;
        sessions.get_mut(&session_id).map(mutate)
    }
}

impl Default for SessionCacheService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: i64) -> ChatSession {
        ChatSession {
            id,
            title: format!("session {id}"),
            created_at: "2024-01-01T00:00:00Z".to_string(),
            messages: Vec::new(),
        }
    }

    #[tokio::test]
    async fn insert_get_remove() {
        let cache = SessionCacheService::new();
        cache.insert(session(1)).await;
        assert!(cache.contains(1).await);
        assert_eq!(cache.get(1).await.unwrap().id, 1);

        cache.remove(1).await;
        assert!(cache.get(1).await.is_none());
    }

    #[tokio::test]
    async fn with_session_mut_misses_unknown_ids() {
        let cache = SessionCacheService::new();
        let result = cache.with_session_mut(9, |_| ()).await;
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn with_session_mut_applies_in_place() {
        let cache = SessionCacheService::new();
        cache.insert(session(3)).await;
        cache
            .with_session_mut(3, |s| s.title = "renamed".to_string())
            .await
            .unwrap();
        assert_eq!(cache.get(3).await.unwrap().title, "renamed");
    }

    #[tokio::test]
    async fn clear_evicts_everything() {
        let cache = SessionCacheService::new();
        cache.insert(session(1)).await;
        cache.insert(session(2)).await;
        cache.clear().await;
        assert!(!cache.contains(1).await);
        assert!(!cache.contains(2).await);
    }
}
