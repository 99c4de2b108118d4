/// Session identifier sets
///
/// Each chat has a [`Session`] holding the ids of the vector records it
/// inserted since its last reset. The registry is owned by the dispatcher
/// and handed to the pipeline; it is not persisted, so ids inserted before a
/// restart can no longer be reset.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

/// Ids inserted by one chat
///
/// The mutex is held by the pipeline across "insert + record" and
/// "delete + clear", so a reset never runs between an insert and the
/// recording of its ids.
#[derive(Debug, Default)]
pub struct Session {
    ids: Mutex<Vec<Uuid>>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self) -> MutexGuard<'_, Vec<Uuid>> {
        self.ids.lock().await
    }

    pub async fn ids(&self) -> Vec<Uuid> {
        self.ids.lock().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.ids.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.ids.lock().await.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub chats: usize,
    pub tracked_ids: usize,
}

/// Maps chat_id to its session
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<i64, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The chat's session, created empty on first use
    pub async fn session(&self, chat_id: i64) -> Arc<Session> {
        if let Some(session) = self.sessions.read().await.get(&chat_id) {
            return Arc::clone(session);
        }
        let mut sessions = self.sessions.write().await;
        Arc::clone(sessions.entry(chat_id).or_insert_with(|| Arc::new(Session::new())))
    }

    pub async fn stats(&self) -> SessionStats {
        let sessions: Vec<Arc<Session>> = self.sessions.read().await.values().cloned().collect();
        let mut tracked_ids = 0;
        for session in &sessions {
            tracked_ids += session.len().await;
        }
        SessionStats {
            chats: sessions.len(),
            tracked_ids,
        }
    }
}
