// src/prompt.rs
use crate::models::{Character, ChatHistory, Message};

pub const DEFAULT_USER_PERSONA: &str = "The user you are talking to.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    Chat,
    Instruct,
}

impl PromptMode {
    /// `"chat"` (or nothing) selects chat mode; any other value is instruct mode.
    pub fn from_request(mode: Option<&str>) -> Self {
        match mode {
            None | Some("chat") => PromptMode::Chat,
            Some(_) => PromptMode::Instruct,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            PromptMode::Chat => {
                "Respond naturally and conversationally as your character. Stay in character at all times."
            }
            PromptMode::Instruct => {
                "You are in instruct mode. Follow the user's instructions precisely while embodying your character's personality."
            }
        }
    }
}

pub fn build_system_prompt(character: &Character, user_persona: &str, mode: PromptMode) -> String {
    format!(
        "This is a conversation between you, {}, and a user. Your persona: {}. The user's persona: {}. {}",
        character.name,
        character.description,
        user_persona,
        mode.instruction()
    )
}

/// Picks the caller's prompt when one was sent, otherwise builds it from the personas.
pub fn resolve_system_prompt(
    supplied: Option<String>,
    character: &Character,
    user_persona: Option<&str>,
    mode: PromptMode,
) -> String {
    match supplied {
        Some(prompt) if !prompt.is_empty() => prompt,
        _ => build_system_prompt(character, user_persona.unwrap_or(DEFAULT_USER_PERSONA), mode),
    }
}

/// `[system] + history + [user]`, the order the completion endpoint sees.
pub fn assemble_messages(system_prompt: String, history: &ChatHistory, user_message: &str) -> Vec<Message> {
    let mut messages = Vec::with_capacity(history.len() + 2);
    messages.push(Message::system(system_prompt));
    messages.extend(history.iter().cloned());
    messages.push(Message::user(user_message));
    messages
}
