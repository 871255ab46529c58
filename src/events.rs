use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Internal application events delivered to the UI loop
#[derive(Debug, Clone, PartialEq)]
pub enum AppEvent {
    /// The proxy answered a pending send
    ReplyReceived {
        conversation_id: Uuid,
        content: String,
    },

    /// The pending send failed; nothing is appended
    ReplyFailed {
        conversation_id: Uuid,
        error: String,
    },
}

/// TUI-specific events (keyboard, paste, resize)
#[derive(Debug, Clone)]
pub enum TuiEvent {
    /// Key press event
    Key(crossterm::event::KeyEvent),

    /// Paste event
    Paste(String),

    /// Terminal resize
    Resize(u16, u16),

    /// Periodic redraw (drives the loading animation)
    Tick,
}

/// Role in conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
    System,
}

impl std::fmt::Display for ConversationRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationRole::User => write!(f, "user"),
            ConversationRole::Assistant => write!(f, "assistant"),
            ConversationRole::System => write!(f, "system"),
        }
    }
}

/// A single transcript entry, exactly as it travels on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ConversationRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ConversationRole::Assistant,
            content: content.into(),
        }
    }
}

/// Body the UI sends to `POST /api/ollama`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    pub model: String,
}

/// Body as the proxy receives it. Messages are kept as raw JSON and forwarded
/// untouched, so roles and fields the UI never produces (`tool`, `images`)
/// reach the upstream as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayRequest {
    pub messages: Vec<Value>,
    pub model: String,
}
