//! Conversation sessions.
//!
//! The [`SessionManager`] owns every session's ordered message list, keeps
//! one of them current, and hands the agent a view of the history that fits
//! the model's context window. A [`SessionStore`] may be attached for
//! write-through persistence; store failures are logged and never fail the
//! in-memory operation.

use std::collections::{HashMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use steward_config::SessionSettings;
use steward_core::error::SessionError;
use steward_core::event::AgentEvent;
use steward_core::event_bus::EventBus;
use steward_core::message::{Message, Role, ToolCallRequest};
use steward_core::storage::{SessionStore, StoredSession};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{enforce_message_cap, fit_to_window};

pub const DEFAULT_SESSION_TITLE: &str = "Default chat";
pub const NEW_SESSION_TITLE: &str = "New chat";

const TITLE_CHARS: usize = 20;

/// One conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    /// Insertion order is meaningful and never changes
    pub messages: Vec<Message>,
    pub model_key: String,
    pub total_tokens: u64,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Session {
    fn new(title: &str, model_key: &str) -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self {
            id,
            title: title.to_string(),
            created_at: Utc::now(),
            messages: Vec::new(),
            model_key: model_key.to_string(),
            total_tokens: 0,
            metadata: HashMap::new(),
        }
    }

    fn from_stored(stored: StoredSession) -> Self {
        Self {
            id: stored.id,
            title: stored.title,
            created_at: stored.created_at,
            messages: Vec::new(),
            model_key: stored.model_key,
            total_tokens: stored.total_tokens,
            metadata: HashMap::new(),
        }
    }

    pub fn message_count(&self) -> usize {
        self.messages.len()
    }

    pub fn has_system_prompt(&self) -> bool {
        self.messages.first().is_some_and(Message::is_system)
    }

    fn to_stored(&self) -> StoredSession {
        StoredSession {
            id: self.id.clone(),
            title: self.title.clone(),
            created_at: self.created_at,
            model_key: self.model_key.clone(),
            total_tokens: self.total_tokens,
        }
    }
}

pub struct SessionManager {
    /// Never empty; creation order
    sessions: Vec<Session>,
    current_id: String,
    settings: SessionSettings,
    store: Option<Arc<dyn SessionStore>>,
    /// Sessions the store already knows about
    persisted: HashSet<String>,
    event_bus: Option<Arc<EventBus>>,
}

impl SessionManager {
    /// Create a manager holding one fresh default session.
    pub fn new(settings: SessionSettings) -> Self {
        let mut manager = Self {
            sessions: Vec::new(),
            current_id: String::new(),
            settings,
            store: None,
            persisted: HashSet::new(),
            event_bus: None,
        };
        manager.insert_session(DEFAULT_SESSION_TITLE, "");
        manager
    }

    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }

    // ── Sessions ──────────────────────────────────────────────────────

    /// Create a session, make it current and persist it.
    pub async fn create_session(&mut self, title: &str, model_key: &str) -> &Session {
        let id = self.insert_session(title, model_key);
        self.persist_session(&id).await;
        self.publish(AgentEvent::SessionCreated {
            session_id: id.clone(),
            title: title.to_string(),
        })
        .await;
        self.current_session()
    }

    fn insert_session(&mut self, title: &str, model_key: &str) -> String {
        let mut session = Session::new(title, model_key);
        if !self.settings.system_prompt.is_empty() {
            session
                .messages
                .push(Message::system(&self.settings.system_prompt));
        }
        let id = session.id.clone();
        info!(session_id = %id, title, "Created session");

        self.sessions.push(session);
        self.current_id = id.clone();
        self.evict_oldest();
        id
    }

    fn evict_oldest(&mut self) {
        while self.sessions.len() > self.settings.max_sessions {
            let oldest = self
                .sessions
                .iter()
                .enumerate()
                .filter(|(_, s)| s.id != self.current_id)
                .min_by_key(|(_, s)| s.created_at)
                .map(|(i, _)| i);
            let Some(index) = oldest else { break };
            let removed = self.sessions.remove(index);
            self.persisted.remove(&removed.id);
            info!(session_id = %removed.id, "Evicted oldest session");
        }
    }

    pub async fn switch_session(&mut self, session_id: &str) -> Result<&Session, SessionError> {
        if self.get_session(session_id).is_none() {
            return Err(SessionError::NotFound(session_id.to_string()));
        }
        self.current_id = session_id.to_string();
        info!(session_id, "Switched session");
        self.publish(AgentEvent::SessionSwitched {
            session_id: session_id.to_string(),
        })
        .await;
        Ok(self.current_session())
    }

    /// Remove a session. When it was current, the most recently created
    /// remaining session becomes current, or a fresh one is created.
    pub async fn delete_session(&mut self, session_id: &str) -> bool {
        let Some(index) = self.sessions.iter().position(|s| s.id == session_id) else {
            return false;
        };
        self.sessions.remove(index);
        self.persisted.remove(session_id);
        info!(session_id, "Deleted session");

        if self.current_id == session_id {
            let newest = self
                .sessions
                .iter()
                .max_by_key(|s| s.created_at)
                .map(|s| s.id.clone());
            match newest {
                Some(id) => self.current_id = id,
                None => {
                    self.create_session(NEW_SESSION_TITLE, "").await;
                }
            }
        }
        true
    }

    pub fn current_session(&self) -> &Session {
        &self.sessions[self.current_index()]
    }

    pub fn current_session_id(&self) -> &str {
        &self.current_id
    }

    pub fn get_session(&self, session_id: &str) -> Option<&Session> {
        self.sessions.iter().find(|s| s.id == session_id)
    }

    /// All sessions, newest first.
    pub fn list_sessions(&self) -> Vec<&Session> {
        let mut sessions: Vec<&Session> = self.sessions.iter().rev().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        sessions
    }

    fn current_index(&self) -> usize {
        self.sessions
            .iter()
            .position(|s| s.id == self.current_id)
            .unwrap_or(self.sessions.len().saturating_sub(1))
    }

    fn current_mut(&mut self) -> &mut Session {
        let index = self.current_index();
        &mut self.sessions[index]
    }

    fn session_mut(&mut self, session_id: &str) -> Result<&mut Session, SessionError> {
        self.sessions
            .iter_mut()
            .find(|s| s.id == session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))
    }

    /// Replace the current session's system message, or insert one. Also
    /// becomes the prompt for sessions created later.
    pub fn update_system_prompt(&mut self, prompt: &str) {
        self.settings.system_prompt = prompt.to_string();
        let session = self.current_mut();
        if session.has_system_prompt() {
            session.messages[0] = Message::system(prompt);
        } else {
            session.messages.insert(0, Message::system(prompt));
        }
        debug!(len = prompt.len(), "Updated system prompt");
    }

    // ── Messages ──────────────────────────────────────────────────────

    /// Append to the current session, enforcing the message cap.
    pub async fn add_message(&mut self, message: Message) {
        let cap = self.settings.max_message_count;
        let session = self.current_mut();
        let session_id = session.id.clone();
        session.messages.push(message.clone());

        if session.messages.len() > cap {
            let evicted = enforce_message_cap(&mut session.messages, cap);
            info!(
                session_id = %session_id,
                evicted,
                remaining = session.messages.len(),
                "Message cap reached, evicted old rounds"
            );
        }

        self.persist_message(&session_id, &message).await;
    }

    pub async fn add_user_message(&mut self, content: &str) {
        self.add_message(Message::user(content)).await;
    }

    pub async fn add_assistant_message(&mut self, content: &str, tool_calls: Vec<ToolCallRequest>) {
        self.add_message(Message::assistant_with_tool_calls(content, tool_calls))
            .await;
    }

    pub async fn add_tool_message(&mut self, tool_call_id: &str, content: &str) {
        self.add_message(Message::tool_result(tool_call_id, content))
            .await;
    }

    /// Current history, truncated to fit `max_tokens` (the configured
    /// context window when `None` or zero).
    pub fn get_messages(&self, max_tokens: Option<usize>) -> Vec<Message> {
        let window = max_tokens
            .filter(|t| *t > 0)
            .unwrap_or(self.settings.context_window);
        fit_to_window(&self.current_session().messages, window)
    }

    /// Drop every message except the system prompt and reset the token count.
    pub async fn clear_messages(&mut self) {
        let session = self.current_mut();
        let system = session
            .messages
            .first()
            .filter(|m| m.is_system())
            .cloned();
        session.messages.clear();
        session.messages.extend(system);
        session.total_tokens = 0;
        let session_id = session.id.clone();
        info!(session_id = %session_id, "Cleared session messages");
        self.publish(AgentEvent::SessionCleared { session_id }).await;
    }

    pub async fn update_title(&mut self, title: &str) {
        let session = self.current_mut();
        session.title = title.to_string();
        let session_id = session.id.clone();
        self.persist_title(&session_id, title).await;
    }

    pub fn update_tokens(&mut self, tokens: u64) {
        self.current_mut().total_tokens += tokens;
    }

    /// Title the current session after its first user message.
    pub async fn generate_title(&mut self) -> String {
        let session = self.current_mut();
        let Some(first) = session.messages.iter().find(|m| m.is_user()) else {
            return session.title.clone();
        };

        let content = first.content();
        let title = if content.chars().count() <= TITLE_CHARS {
            content.to_string()
        } else {
            let head: String = content.chars().take(TITLE_CHARS).collect();
            format!("{head}...")
        };
        session.title = title.clone();
        let session_id = session.id.clone();
        self.persist_title(&session_id, &title).await;
        title
    }

    /// Render a session (the current one by default) as Markdown.
    pub fn export_markdown(&self, session_id: Option<&str>) -> Result<String, SessionError> {
        let session = match session_id {
            Some(id) => self
                .get_session(id)
                .ok_or_else(|| SessionError::NotFound(id.to_string()))?,
            None => self.current_session(),
        };

        let mut out = String::new();
        let _ = writeln!(out, "# {}\n", session.title);
        let _ = writeln!(out, "> Created: {}\n", session.created_at.format("%Y-%m-%d %H:%M"));
        out.push_str("---\n\n");
        for msg in &session.messages {
            let label = match msg.role() {
                Role::System => "System",
                Role::User => "User",
                Role::Assistant => "Assistant",
                Role::Tool => "Tool",
            };
            let _ = writeln!(out, "### {label}\n\n{}\n", msg.content());
        }
        Ok(out)
    }

    // ── Persistence ───────────────────────────────────────────────────

    /// Pull metadata of stored sessions not yet in memory. Messages load
    /// lazily through [`load_session_messages`](Self::load_session_messages).
    pub async fn load_history(&mut self, limit: usize) -> Vec<String> {
        let Some(store) = self.store.clone() else {
            return Vec::new();
        };
        let stored = match store.list_sessions(limit).await {
            Ok(stored) => stored,
            Err(e) => {
                warn!(error = %e, "Failed to list stored sessions");
                return Vec::new();
            }
        };

        let mut loaded = Vec::new();
        for meta in stored {
            if self.get_session(&meta.id).is_some() {
                continue;
            }
            self.persisted.insert(meta.id.clone());
            loaded.push(meta.id.clone());
            self.sessions.push(Session::from_stored(meta));
        }
        if !loaded.is_empty() {
            info!(count = loaded.len(), "Loaded session history");
        }
        loaded
    }

    /// Fill an empty session from the store. Returns how many messages were
    /// added.
    pub async fn load_session_messages(&mut self, session_id: &str) -> Result<usize, SessionError> {
        let store = self.store.clone();
        let session = self.session_mut(session_id)?;
        let Some(store) = store else { return Ok(0) };
        if !session.messages.is_empty() {
            return Ok(0);
        }

        let stored = match store.load_messages(session_id).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!(session_id, error = %e, "Failed to load stored messages");
                return Ok(0);
            }
        };

        let session = self.session_mut(session_id)?;
        let mut added = 0;
        for msg in stored {
            if msg.is_system() && session.has_system_prompt() {
                continue;
            }
            session.messages.push(msg);
            added += 1;
        }
        info!(session_id, added, "Loaded session messages");
        Ok(added)
    }

    async fn persist_session(&mut self, session_id: &str) {
        let Some(store) = self.store.clone() else { return };
        let Some(stored) = self.get_session(session_id).map(Session::to_stored) else {
            return;
        };
        match store.save_session(&stored).await {
            Ok(()) => {
                self.persisted.insert(session_id.to_string());
            }
            Err(e) => warn!(session_id, error = %e, "Failed to save session"),
        }
    }

    async fn persist_message(&mut self, session_id: &str, message: &Message) {
        let Some(store) = self.store.clone() else { return };
        if !self.persisted.contains(session_id) {
            self.persist_session(session_id).await;
        }
        if let Err(e) = store.save_message(session_id, message).await {
            warn!(session_id, error = %e, "Failed to save message");
        }
    }

    async fn persist_title(&mut self, session_id: &str, title: &str) {
        let Some(store) = self.store.clone() else { return };
        if !self.persisted.contains(session_id) {
            self.persist_session(session_id).await;
            return;
        }
        if let Err(e) = store.update_session_title(session_id, title).await {
            warn!(session_id, error = %e, "Failed to update session title");
        }
    }

    async fn publish(&self, event: AgentEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish(event).await;
        }
    }
}
