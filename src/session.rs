//! In-memory session state: the conversation list and the send state machine
//!
//! Everything the UI shows is derived from one [`SessionState`]. It is owned by
//! the UI loop and only mutated there, so there is no locking. Nothing here is
//! persisted.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::events::{AppEvent, ChatMessage};

/// Name given to the first conversation and to replacements
pub const PLACEHOLDER_NAME: &str = "New Conversation";

/// Prompt offered on the welcome screen
pub const SAMPLE_PROMPT: &str = "What is AI?";

const NAME_MAX_WORDS: usize = 8;
const NAME_MAX_CHARS: usize = 40;

/// One independent chat thread
#[derive(Debug, Clone, PartialEq)]
pub struct Conversation {
    pub id: Uuid,
    pub name: String,
    pub messages: Vec<ChatMessage>,
    pub model: String,
    pub created_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            messages: Vec::new(),
            model: model.into(),
            created_at: Utc::now(),
        }
    }

    /// Still carrying a name we generated rather than one derived from content
    pub fn has_placeholder_name(&self) -> bool {
        self.name == PLACEHOLDER_NAME || self.name.starts_with("Conversation ")
    }
}

/// Derive a conversation name from its first message: the first eight words,
/// cut at forty characters, with `...` when anything was dropped.
pub fn derive_conversation_name(content: &str) -> String {
    let words: Vec<&str> = content.split(' ').take(NAME_MAX_WORDS).collect();
    let mut topic = words.join(" ");

    if topic.chars().count() > NAME_MAX_CHARS {
        topic = topic.chars().take(NAME_MAX_CHARS).collect();
    }
    if content.chars().count() > topic.chars().count() {
        topic.push_str("...");
    }

    topic
}

/// A request the UI must issue after a successful [`SessionState::begin_send`]
#[derive(Debug, Clone, PartialEq)]
pub struct PendingSend {
    pub conversation_id: Uuid,
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

/// Whole-application state for one UI session
#[derive(Debug, Clone)]
pub struct SessionState {
    conversations: Vec<Conversation>,
    active_id: Uuid,
    last_chosen_model: String,
    awaiting_reply: bool,
    last_error: Option<String>,
}

impl SessionState {
    /// One empty "New Conversation" using `default_model`
    pub fn new(default_model: impl Into<String>) -> Self {
        let last_chosen_model = default_model.into();
        let first = Conversation::new(PLACEHOLDER_NAME, last_chosen_model.clone());

        Self {
            active_id: first.id,
            conversations: vec![first],
            last_chosen_model,
            awaiting_reply: false,
            last_error: None,
        }
    }

    /// Conversations, newest first
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// The active conversation; a stale pointer falls back to the first entry
    pub fn active(&self) -> &Conversation {
        self.conversations
            .iter()
            .find(|c| c.id == self.active_id)
            .unwrap_or(&self.conversations[0])
    }

    pub fn active_id(&self) -> Uuid {
        self.active().id
    }

    pub fn last_chosen_model(&self) -> &str {
        &self.last_chosen_model
    }

    pub fn is_awaiting_reply(&self) -> bool {
        self.awaiting_reply
    }

    /// The most recent send failure, cleared by the next send
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn find(&self, id: Uuid) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    /// Insert "Conversation N" at the front and make it active
    pub fn create_conversation(&mut self) -> Uuid {
        let name = format!("Conversation {}", self.conversations.len() + 1);
        let conversation = Conversation::new(name, self.last_chosen_model.clone());
        let id = conversation.id;

        self.conversations.insert(0, conversation);
        self.active_id = id;
        tracing::debug!(%id, "Created conversation");
        id
    }

    /// Switch the active conversation; unknown ids are ignored
    pub fn select_conversation(&mut self, id: Uuid) -> bool {
        if self.find(id).is_none() {
            return false;
        }
        self.active_id = id;
        true
    }

    /// Remove a conversation, never leaving the list empty
    pub fn delete_conversation(&mut self, id: Uuid) -> bool {
        if self.find(id).is_none() {
            return false;
        }

        if self.conversations.len() == 1 {
            let replacement = Conversation::new(PLACEHOLDER_NAME, self.last_chosen_model.clone());
            self.active_id = replacement.id;
            self.conversations = vec![replacement];
        } else {
            let was_active = self.active_id() == id;
            self.conversations.retain(|c| c.id != id);
            if was_active {
                self.active_id = self.conversations[0].id;
            }
        }

        tracing::debug!(%id, "Deleted conversation");
        true
    }

    /// Set the active conversation's model and remember it for new conversations
    pub fn change_model(&mut self, model: &str) -> bool {
        let model = model.trim();
        if model.is_empty() {
            return false;
        }

        self.last_chosen_model = model.to_string();
        let active_id = self.active_id();
        if let Some(conversation) = self.conversations.iter_mut().find(|c| c.id == active_id) {
            conversation.model = model.to_string();
        }
        true
    }

    /// Append the user's message to the active conversation and enter awaiting-reply.
    ///
    /// Returns `None` (and changes nothing) for blank input or while a reply is
    /// already pending anywhere in the application.
    pub fn begin_send(&mut self, input: &str) -> Option<PendingSend> {
        if input.trim().is_empty() || self.awaiting_reply {
            return None;
        }

        let active_id = self.active_id();
        let conversation = self.conversations.iter_mut().find(|c| c.id == active_id)?;

        if conversation.messages.is_empty() && conversation.has_placeholder_name() {
            conversation.name = derive_conversation_name(input);
        }
        conversation.messages.push(ChatMessage::user(input));

        self.awaiting_reply = true;
        self.last_error = None;

        Some(PendingSend {
            conversation_id: conversation.id,
            messages: conversation.messages.clone(),
            model: conversation.model.clone(),
        })
    }

    /// Apply the outcome of a pending send
    pub fn complete_send(&mut self, event: AppEvent) {
        self.awaiting_reply = false;

        match event {
            AppEvent::ReplyReceived {
                conversation_id,
                content,
            } => {
                match self.conversations.iter_mut().find(|c| c.id == conversation_id) {
                    Some(conversation) => conversation.messages.push(ChatMessage::assistant(content)),
                    None => {
                        tracing::warn!(%conversation_id, "Reply arrived for a deleted conversation");
                    }
                }
            }
            AppEvent::ReplyFailed {
                conversation_id,
                error,
            } => {
                tracing::error!(%conversation_id, %error, "Chat request failed");
                self.last_error = Some(error);
            }
        }
    }
}
