// src/models/chat.rs
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "system" => Ok(Role::System),
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown message role '{}'", other)),
        }
    }
}

/// One turn of a transcript. Its index is its position in the stored array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

pub type ChatHistory = Vec<Message>;

/// Chat ids arrive as strings from the UI but older clients send numbers.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ChatIdField {
    Text(String),
    Number(u64),
}

impl ChatIdField {
    pub fn into_string(self) -> String {
        match self {
            ChatIdField::Text(s) => s,
            ChatIdField::Number(n) => n.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AddMessageRequest {
    pub role: Option<String>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateMessageRequest {
    pub index: Option<i64>,
    pub content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DeleteMessageRequest {
    pub index: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub new_history: ChatHistory,
}

#[derive(Debug, Serialize)]
pub struct CreateChatResponse {
    pub chat_id: String,
}

/// Sampling knobs as the web UI names them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LlmSettings {
    pub temperature: Option<f64>,
    pub repetition_penalty: Option<f64>,
    pub min_p: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct CompletionRequest {
    pub character_id: Option<String>,
    pub chat_id: Option<ChatIdField>,
    pub message: Option<String>,
    pub history_override: Option<ChatHistory>,
    pub mode: Option<String>,
    pub user_persona: Option<String>,
    pub llm_settings: Option<LlmSettings>,
    pub system_prompt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CompletionReply {
    pub reply: String,
}
