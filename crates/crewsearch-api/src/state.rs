use std::sync::Arc;

use chrono::{DateTime, Utc};
use crewsearch_agents::ResearchService;
use crewsearch_core::SecretValue;
use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::config::ApiConfig;

/// Reply given instead of running research when a chat has no search key.
pub const MISSING_KEY_REPLY: &str = "Please enter your API Key.";

#[derive(Clone)]
pub struct AppState {
    research: Arc<ResearchService>,
    chats: Arc<DashMap<Uuid, ChatSession>>,
    permits: Arc<Semaphore>,
    max_concurrency: usize,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    pub fn new(research: ResearchService, config: &ApiConfig) -> Self {
        let max_concurrency = config.max_concurrency.max(1);
        Self {
            research: Arc::new(research),
            chats: Arc::new(DashMap::new()),
            permits: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    pub fn research(&self) -> Arc<ResearchService> {
        self.research.clone()
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    /// Claim a research slot without waiting; `None` when all are busy.
    pub fn try_acquire_slot(&self) -> Option<OwnedSemaphorePermit> {
        self.permits.clone().try_acquire_owned().ok()
    }

    pub fn metrics(&self) -> ApiMetrics {
        ApiMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.permits.available_permits(),
            chat_sessions: self.chats.len(),
        }
    }

    pub fn create_chat(&self) -> Uuid {
        let id = Uuid::new_v4();
        self.chats.insert(id, ChatSession::default());
        id
    }

    pub fn has_chat(&self, id: &Uuid) -> bool {
        self.chats.contains_key(id)
    }

    /// Returns `false` when the chat does not exist.
    pub fn set_credential(&self, id: &Uuid, credential: SecretValue) -> bool {
        match self.chats.get_mut(id) {
            Some(mut chat) => {
                chat.credential = Some(credential);
                true
            }
            None => false,
        }
    }

    pub fn credential(&self, id: &Uuid) -> Option<SecretValue> {
        self.chats
            .get(id)
            .and_then(|chat| chat.credential.clone())
            .filter(|credential| !credential.is_blank())
    }

    pub fn push_message(&self, id: &Uuid, role: ChatRole, content: impl Into<String>) -> bool {
        match self.chats.get_mut(id) {
            Some(mut chat) => {
                chat.messages.push(ChatEntry {
                    role,
                    content: content.into(),
                    at: Utc::now(),
                });
                true
            }
            None => false,
        }
    }

    pub fn history(&self, id: &Uuid) -> Option<Vec<ChatEntry>> {
        self.chats.get(id).map(|chat| chat.messages.clone())
    }

    /// Clear the conversation but keep the stored credential.
    pub fn clear_history(&self, id: &Uuid) -> bool {
        match self.chats.get_mut(id) {
            Some(mut chat) => {
                chat.messages.clear();
                true
            }
            None => false,
        }
    }

    /// Drop the session, its history and its credential.
    pub fn end_chat(&self, id: &Uuid) -> bool {
        self.chats.remove(id).is_some()
    }
}

#[derive(Default)]
struct ChatSession {
    credential: Option<SecretValue>,
    messages: Vec<ChatEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatEntry {
    pub role: ChatRole,
    pub content: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ApiMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub chat_sessions: usize,
}
