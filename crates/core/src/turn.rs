use crate::stage::Stage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who spoke a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    /// The simulated customer, voiced by the backend.
    Customer,
    /// The person being trained.
    Trainee,
}

impl fmt::Display for Speaker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Speaker::Customer => write!(f, "customer"),
            Speaker::Trainee => write!(f, "trainee"),
        }
    }
}

/// One message in the conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Turn {
    pub speaker: Speaker,
    pub text: String,
    /// 1-based position in the log.
    pub sequence: usize,
    /// Stage the session was in when the turn was spoken.
    pub stage: Stage,
    pub at: DateTime<Utc>,
}

/// Role tag of a message sent to the chat-completion backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// A backend-neutral chat message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

impl From<&Turn> for ChatMessage {
    /// The backend plays the customer, so customer turns are its own
    /// (assistant) messages and trainee turns are user messages.
    fn from(turn: &Turn) -> Self {
        match turn.speaker {
            Speaker::Customer => ChatMessage::assistant(turn.text.clone()),
            Speaker::Trainee => ChatMessage::user(turn.text.clone()),
        }
    }
}
