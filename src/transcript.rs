// src/transcript.rs
//! In-memory edits of a chat transcript.
//!
//! Every operation takes the whole history and hands the whole history back,
//! so callers can write it out in one piece and return it to the client.

use crate::models::{ChatHistory, Message, Role};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum TranscriptError {
    #[error("Invalid message index {index} for history of length {len}")]
    IndexOutOfRange { index: i64, len: usize },
}

fn checked_index(history: &ChatHistory, index: i64) -> Result<usize, TranscriptError> {
    usize::try_from(index)
        .ok()
        .filter(|&i| i < history.len())
        .ok_or(TranscriptError::IndexOutOfRange {
            index,
            len: history.len(),
        })
}

pub fn append(mut history: ChatHistory, role: Role, content: impl Into<String>) -> ChatHistory {
    history.push(Message::new(role, content));
    history
}

/// Replaces the content at `index`, keeping the message's role.
pub fn update(
    mut history: ChatHistory,
    index: i64,
    content: impl Into<String>,
) -> Result<ChatHistory, TranscriptError> {
    let i = checked_index(&history, index)?;
    history[i].content = content.into();
    Ok(history)
}

pub fn delete(mut history: ChatHistory, index: i64) -> Result<ChatHistory, TranscriptError> {
    let i = checked_index(&history, index)?;
    history.remove(i);
    Ok(history)
}

/// Puts a regenerated assistant reply at `target`, or at the end when the
/// stored transcript has since become shorter than `target`.
pub fn place_regenerated(mut history: ChatHistory, target: usize, content: impl Into<String>) -> ChatHistory {
    let message = Message::assistant(content);
    match history.get_mut(target) {
        Some(slot) => *slot = message,
        None => history.push(message),
    }
    history
}
