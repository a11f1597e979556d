//! In-memory conversation session store.
//!
//! Maps a session key to the [`Conversation`] that holds its history. Each
//! logical user session owns two keys: the chat key (the session id itself)
//! and the resume key (session id plus a fixed suffix).
//!
//! Lookups create missing conversations atomically under the store lock, so
//! two first requests for the same key always share one conversation. The
//! conversation itself sits behind an async mutex, which serializes turns
//! within a session while other sessions proceed independently.
//!
//! The store is unbounded unless `max_sessions` or `idle_ttl_secs` is set.

use crate::conversation::{ChatModel, Conversation};
use lru::LruCache;
use resume_common::config::SessionsConfig;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Shared handle to one conversation.
pub type ConversationHandle = Arc<tokio::sync::Mutex<Conversation>>;

/// Session store failure.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("session store lock poisoned")]
    LockPoisoned,
}

struct SessionEntry {
    conversation: ConversationHandle,
    last_used: Instant,
}

/// Which threads a clear request removed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionClearOutcome {
    pub chat: bool,
    pub resume: bool,
}

impl SessionClearOutcome {
    /// Whether anything was removed.
    pub fn any(&self) -> bool {
        self.chat || self.resume
    }
}

/// Process-wide map from session key to conversation.
pub struct SessionStore {
    model: ChatModel,
    resume_suffix: String,
    idle_ttl: Option<Duration>,
    entries: Mutex<LruCache<String, SessionEntry>>,
}

impl SessionStore {
    /// Create a store that starts conversations from `model`.
    pub fn new(model: ChatModel, config: &SessionsConfig) -> Self {
        let cache = match config.max_sessions.and_then(NonZeroUsize::new) {
            Some(cap) => LruCache::new(cap),
            None => LruCache::unbounded(),
        };

        Self {
            model,
            resume_suffix: config.resume_suffix.clone(),
            idle_ttl: config.idle_ttl_secs.map(Duration::from_secs),
            entries: Mutex::new(cache),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, LruCache<String, SessionEntry>>, SessionError> {
        self.entries.lock().map_err(|_| SessionError::LockPoisoned)
    }

    fn is_expired(&self, entry: &SessionEntry, now: Instant) -> bool {
        self.idle_ttl
            .is_some_and(|ttl| now.saturating_duration_since(entry.last_used) > ttl)
    }

    /// Key of the resume analysis thread belonging to `session_id`.
    pub fn resume_key(&self, session_id: &str) -> String {
        format!("{session_id}{}", self.resume_suffix)
    }

    /// Return the conversation for `key`, creating an empty one if absent.
    pub fn get_or_create(&self, key: &str) -> Result<ConversationHandle, SessionError> {
        let now = Instant::now();
        let mut entries = self.lock()?;

        let expired = match entries.get_mut(key) {
            Some(entry) if !self.is_expired(entry, now) => {
                entry.last_used = now;
                tracing::debug!(session = %key, "Reusing session");
                return Ok(Arc::clone(&entry.conversation));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.pop(key);
            tracing::info!(session = %key, "Session expired, starting fresh");
        }

        let conversation = Arc::new(tokio::sync::Mutex::new(self.model.start_chat()));
        let entry = SessionEntry {
            conversation: Arc::clone(&conversation),
            last_used: now,
        };

        if let Some((evicted, _)) = entries.push(key.to_string(), entry) {
            if evicted != key {
                tracing::info!(session = %evicted, "Evicted least recently used session");
            }
        }

        tracing::info!(session = %key, model = %self.model.model(), "Created new session");
        Ok(conversation)
    }

    /// Remove the conversation for `key`. Returns whether a live one existed.
    ///
    /// An entry past its idle TTL is dropped but not reported as removed.
    pub fn delete(&self, key: &str) -> Result<bool, SessionError> {
        let now = Instant::now();
        let removed = self
            .lock()?
            .pop(key)
            .is_some_and(|entry| !self.is_expired(&entry, now));
        if removed {
            tracing::info!(session = %key, "Cleared session");
        }
        Ok(removed)
    }

    /// Remove both the chat and resume conversations of `session_id`.
    pub fn delete_session(&self, session_id: &str) -> Result<SessionClearOutcome, SessionError> {
        let chat = self.delete(session_id)?;
        let resume = self.delete(&self.resume_key(session_id))?;
        Ok(SessionClearOutcome { chat, resume })
    }

    /// Whether a live conversation exists for `key`.
    pub fn contains(&self, key: &str) -> Result<bool, SessionError> {
        let now = Instant::now();
        let entries = self.lock()?;
        Ok(entries
            .peek(key)
            .is_some_and(|entry| !self.is_expired(entry, now)))
    }

    /// Number of stored conversations, expired ones included until swept.
    pub fn len(&self) -> Result<usize, SessionError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, SessionError> {
        Ok(self.lock()?.is_empty())
    }

    /// Stored keys, most recently used first.
    pub fn keys(&self) -> Result<Vec<String>, SessionError> {
        Ok(self.lock()?.iter().map(|(k, _)| k.clone()).collect())
    }

    /// Drop every conversation idle for longer than the configured TTL.
    ///
    /// Returns the number of conversations removed. A no-op without a TTL.
    pub fn prune_expired(&self) -> Result<usize, SessionError> {
        if self.idle_ttl.is_none() {
            return Ok(0);
        }

        let now = Instant::now();
        let mut entries = self.lock()?;
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, entry)| self.is_expired(entry, now))
            .map(|(key, _)| key.clone())
            .collect();

        for key in &expired {
            entries.pop(key);
        }

        if !expired.is_empty() {
            tracing::info!(pruned = expired.len(), "Pruned idle sessions");
        }
        Ok(expired.len())
    }

    /// Configured idle TTL, if any.
    pub fn idle_ttl(&self) -> Option<Duration> {
        self.idle_ttl
    }
}

/// Periodically prune idle sessions until the store is dropped.
pub fn spawn_sweeper(store: &Arc<SessionStore>, every: Duration) -> tokio::task::JoinHandle<()> {
    let weak = Arc::downgrade(store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let Some(store) = weak.upgrade() else {
                break;
            };
            if let Err(e) = store.prune_expired() {
                tracing::error!(error = %e, "Session sweep failed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::testing::EchoProvider;
    use resume_common::config::LlmConfig;

    fn store_with(config: SessionsConfig) -> SessionStore {
        let model = ChatModel::new(EchoProvider::shared(), &LlmConfig::default());
        SessionStore::new(model, &config)
    }

    fn store() -> SessionStore {
        store_with(SessionsConfig::default())
    }

    #[test]
    fn get_or_create_reuses_existing_handle() {
        let store = store();
        let a = store.get_or_create("s1").unwrap();
        let b = store.get_or_create("s1").unwrap();
        let c = store.get_or_create("s2").unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(store.len().unwrap(), 2);
    }

    #[test]
    fn delete_reports_presence() {
        let store = store();
        store.get_or_create("s1").unwrap();

        assert!(store.delete("s1").unwrap());
        assert!(!store.delete("s1").unwrap());
        assert!(!store.delete("never-seen").unwrap());
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn delete_session_removes_both_threads() {
        let store = store();
        store.get_or_create("s1").unwrap();
        store.get_or_create("s1_resume").unwrap();
        store.get_or_create("s2").unwrap();

        let outcome = store.delete_session("s1").unwrap();
        assert_eq!(
            outcome,
            SessionClearOutcome {
                chat: true,
                resume: true
            }
        );
        assert!(!store.contains("s1").unwrap());
        assert!(!store.contains("s1_resume").unwrap());
        assert!(store.contains("s2").unwrap());
    }

    #[test]
    fn delete_session_on_unknown_id_clears_nothing() {
        let store = store();
        let outcome = store.delete_session("ghost").unwrap();
        assert!(!outcome.any());
    }

    #[test]
    fn delete_session_with_only_resume_thread() {
        let store = store();
        store.get_or_create(&store.resume_key("s1")).unwrap();

        let outcome = store.delete_session("s1").unwrap();
        assert!(!outcome.chat);
        assert!(outcome.resume);
        assert!(outcome.any());
    }

    #[test]
    fn resume_key_uses_configured_suffix() {
        let store = store_with(SessionsConfig {
            resume_suffix: "::cv".into(),
            ..SessionsConfig::default()
        });
        assert_eq!(store.resume_key("abc"), "abc::cv");
    }

    #[test]
    fn lru_bound_evicts_least_recently_used() {
        let store = store_with(SessionsConfig {
            max_sessions: Some(2),
            ..SessionsConfig::default()
        });

        store.get_or_create("a").unwrap();
        store.get_or_create("b").unwrap();
        store.get_or_create("a").unwrap();
        store.get_or_create("c").unwrap();

        assert_eq!(store.len().unwrap(), 2);
        assert!(store.contains("a").unwrap());
        assert!(!store.contains("b").unwrap());
        assert!(store.contains("c").unwrap());
        assert_eq!(store.keys().unwrap(), vec!["c".to_string(), "a".to_string()]);
    }

    #[test]
    fn idle_entries_are_replaced_and_pruned() {
        let store = store_with(SessionsConfig {
            idle_ttl_secs: Some(1),
            ..SessionsConfig::default()
        });

        let first = store.get_or_create("s1").unwrap();
        store.get_or_create("s2").unwrap();

        {
            let mut entries = store.lock().unwrap();
            let past = Instant::now() - Duration::from_secs(5);
            for (_, entry) in entries.iter_mut() {
                entry.last_used = past;
            }
        }

        assert!(!store.contains("s1").unwrap());
        let second = store.get_or_create("s1").unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        assert_eq!(store.prune_expired().unwrap(), 1);
        assert_eq!(store.keys().unwrap(), vec!["s1".to_string()]);
    }

    #[test]
    fn deleting_expired_entry_reports_nothing_cleared() {
        let store = store_with(SessionsConfig {
            idle_ttl_secs: Some(1),
            ..SessionsConfig::default()
        });
        store.get_or_create("s1").unwrap();
        store.get_or_create("s1_resume").unwrap();

        {
            let mut entries = store.lock().unwrap();
            let past = Instant::now() - Duration::from_secs(5);
            if let Some(entry) = entries.peek_mut("s1") {
                entry.last_used = past;
            }
        }

        let outcome = store.delete_session("s1").unwrap();
        assert!(!outcome.chat);
        assert!(outcome.resume);
        assert!(store.is_empty().unwrap());
    }

    #[test]
    fn prune_without_ttl_is_noop() {
        let store = store();
        store.get_or_create("s1").unwrap();
        assert_eq!(store.prune_expired().unwrap(), 0);
        assert!(store.idle_ttl().is_none());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[tokio::test]
    async fn concurrent_first_requests_share_one_conversation() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();
        for _ in 0..16 {
            let store = Arc::clone(&store);
            tasks.push(tokio::spawn(async move {
                let handle = store.get_or_create("race").unwrap();
                handle.lock().await.send_message("hi").await.unwrap();
                handle
            }));
        }

        let mut handles = Vec::new();
        for task in tasks {
            handles.push(task.await.unwrap());
        }

        assert!(handles.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
        assert_eq!(handles[0].lock().await.exchanges(), 16);
    }

    #[tokio::test]
    async fn sweeper_stops_when_store_dropped() {
        let store = Arc::new(store_with(SessionsConfig {
            idle_ttl_secs: Some(60),
            ..SessionsConfig::default()
        }));
        let sweeper = spawn_sweeper(&store, Duration::from_millis(5));
        drop(store);

        tokio::time::timeout(Duration::from_secs(2), sweeper)
            .await
            .expect("sweeper should exit")
            .unwrap();
    }
}
