use super::markdown::{escape_html, render_markdown};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
    Status,
    Error,
    Code,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub id: u64,
    pub role: Role,
    pub content: String,
    pub html: String,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(id: u64, role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let html = match role {
            Role::Assistant | Role::Code => render_markdown(&content),
            Role::User | Role::Status | Role::Error => escape_html(&content),
        };
        Self {
            id,
            role,
            content,
            html,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SpinnerState {
    Active,
    Done,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TranscriptEntry {
    Message(ChatMessage),
    Stream {
        stream_id: String,
        html: String,
        finished: bool,
    },
    Loading {
        text: String,
        state: SpinnerState,
    },
}

impl TranscriptEntry {
    pub fn as_message(&self) -> Option<&ChatMessage> {
        match self {
            Self::Message(message) => Some(message),
            _ => None,
        }
    }

    /// Single-line plain rendering used by the CLI replay.
    pub fn summary(&self) -> String {
        match self {
            Self::Message(message) => {
                let label = match message.role {
                    Role::User => "you",
                    Role::Assistant => "agent",
                    Role::Status => "status",
                    Role::Error => "error",
                    Role::Code => "code",
                };
                format!("[{label}] {}", message.content)
            }
            Self::Stream {
                stream_id,
                html,
                finished,
            } => {
                let marker = if *finished { "" } else { " (streaming)" };
                format!("[stream {stream_id}{marker}] {}", html.trim_end())
            }
            Self::Loading { text, state } => match state {
                SpinnerState::Active => format!("[..] {text}"),
                SpinnerState::Done => format!("[ok] {text}"),
            },
        }
    }
}
