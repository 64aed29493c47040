// src/relay.rs
//! Completion relay: sends a prompt upstream, collects the reply and commits
//! it to the chat transcript.
//!
//! ```text
//! Idle -> Requested -> Streaming | Buffered -> Committing -> Done
//!            \______________\_______________________\______-> Error
//! ```
//!
//! Commit is the only step that touches storage, and it runs once, after the
//! whole reply is known. A failed request or stream never writes anything.
//! Through [`CompletionRelay::spawn_streaming`] the commit also happens when
//! the client stops listening halfway.

use crate::llm_client::{CompletionPayload, LlmClient, LlmError};
use crate::models::{ChatHistory, Message};
use crate::storage::{ChatKey, ChatStore, StorageError};
use crate::transcript;
use futures::{Stream, StreamExt};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Idle,
    Requested,
    Streaming,
    Buffered,
    Committing,
    Done,
    Error,
}

impl RelayState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RelayState::Done | RelayState::Error)
    }

    fn can_advance_to(self, next: RelayState) -> bool {
        use RelayState::*;
        match (self, next) {
            (Idle, Requested)
            | (Requested, Streaming)
            | (Requested, Buffered)
            | (Streaming, Committing)
            | (Buffered, Committing)
            | (Committing, Done) => true,
            (from, Error) => !from.is_terminal(),
            _ => false,
        }
    }
}

#[derive(Error, Debug)]
pub enum RelayError {
    #[error(transparent)]
    Upstream(#[from] LlmError),
    #[error("Error saving chat history: {0}")]
    Commit(#[from] StorageError),
    #[error("Relay cannot move from {from:?} to {to:?}")]
    InvalidTransition { from: RelayState, to: RelayState },
}

/// What a successful completion does to the stored transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitMode {
    /// Append the user's message and the reply.
    Append { user_message: String },
    /// Put the reply at `target_index`, or at the end if the transcript is shorter now.
    Regenerate { target_index: usize },
}

impl CommitMode {
    pub fn for_request(user_message: &str, history_override: Option<&ChatHistory>) -> Self {
        match history_override {
            Some(history) => CommitMode::Regenerate {
                target_index: history.len(),
            },
            None => CommitMode::Append {
                user_message: user_message.to_string(),
            },
        }
    }

    fn apply(&self, history: ChatHistory, completion: &str) -> ChatHistory {
        match self {
            CommitMode::Append { user_message } => {
                let mut history = history;
                history.push(Message::user(user_message.as_str()));
                history.push(Message::assistant(completion));
                history
            }
            CommitMode::Regenerate { target_index } => {
                transcript::place_regenerated(history, *target_index, completion)
            }
        }
    }
}

/// One event of the downstream stream, serialised as `{"type": ..., ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum RelayEvent {
    Content { content: String },
    Done,
    Error { content: String },
}

impl RelayEvent {
    fn error(err: &RelayError) -> Self {
        RelayEvent::Error {
            content: err.to_string(),
        }
    }
}

pub struct CompletionRelay {
    state: RelayState,
    client: LlmClient,
    chats: Arc<ChatStore>,
    key: ChatKey,
    mode: CommitMode,
}

impl CompletionRelay {
    pub fn new(client: LlmClient, chats: Arc<ChatStore>, key: ChatKey, mode: CommitMode) -> Self {
        Self {
            state: RelayState::Idle,
            client,
            chats,
            key,
            mode,
        }
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    fn advance(&mut self, next: RelayState) -> Result<(), RelayError> {
        if !self.state.can_advance_to(next) {
            let err = RelayError::InvalidTransition {
                from: self.state,
                to: next,
            };
            return Err(self.fail(err));
        }
        tracing::debug!(chat = %self.key, from = ?self.state, to = ?next, "relay transition");
        self.state = next;
        Ok(())
    }

    fn fail(&mut self, err: RelayError) -> RelayError {
        tracing::error!(chat = %self.key, state = ?self.state, error = %err, "Completion relay failed");
        if !self.state.is_terminal() {
            self.state = RelayState::Error;
        }
        err
    }

    async fn commit(&mut self, completion: &str) -> Result<ChatHistory, RelayError> {
        self.advance(RelayState::Committing)?;
        let mode = self.mode.clone();
        let result = self
            .chats
            .mutate::<_, StorageError>(&self.key, |history| Ok(mode.apply(history, completion)))
            .await;
        match result {
            Ok(history) => {
                self.advance(RelayState::Done)?;
                tracing::info!(chat = %self.key, messages = history.len(), "✅ Completion committed");
                Ok(history)
            }
            Err(e) => Err(self.fail(e.into())),
        }
    }

    /// Waits for the full reply, commits it and returns the reply text.
    pub async fn run_buffered(&mut self, payload: CompletionPayload) -> Result<String, RelayError> {
        self.advance(RelayState::Requested)?;
        let reply = match self.client.complete(&payload).await {
            Ok(reply) => reply,
            Err(e) => return Err(self.fail(e.into())),
        };
        self.advance(RelayState::Buffered)?;
        self.commit(&reply).await?;
        Ok(reply)
    }

    /// Runs [`run_streaming`](Self::run_streaming) on its own task and hands
    /// back its events. Dropping the returned stream stops delivery only: the
    /// task keeps reading upstream and still commits the reply.
    pub fn spawn_streaming(self, payload: CompletionPayload) -> impl Stream<Item = RelayEvent> + Send {
        let (tx, mut rx) = mpsc::channel(EVENT_BUFFER);
        let key = self.key.clone();

        tokio::spawn(async move {
            let mut events = Box::pin(self.run_streaming(payload));
            let mut listening = true;
            while let Some(event) = events.next().await {
                if listening && tx.send(event).await.is_err() {
                    tracing::info!(chat = %key, "Client went away, finishing completion in background");
                    listening = false;
                }
            }
        });

        async_stream::stream! {
            while let Some(event) = rx.recv().await {
                yield event;
            }
        }
    }

    /// Forwards each fragment as a `content` event, then commits and ends with
    /// `done`. Any failure ends the stream with a single `error` event.
    pub fn run_streaming(mut self, payload: CompletionPayload) -> impl Stream<Item = RelayEvent> + Send {
        async_stream::stream! {
            let fragments = match self.advance(RelayState::Requested) {
                Ok(()) => match self.client.stream(&payload).await {
                    Ok(fragments) => self.advance(RelayState::Streaming).map(|()| fragments),
                    Err(e) => Err(self.fail(e.into())),
                },
                Err(e) => Err(e),
            };

            match fragments {
                Err(e) => {
                    yield RelayEvent::error(&e);
                }
                Ok(mut fragments) => {
                    let mut completion = String::new();
                    let mut failure = None;

                    while let Some(item) = fragments.next().await {
                        match item {
                            Ok(fragment) => {
                                completion.push_str(&fragment);
                                yield RelayEvent::Content { content: fragment };
                            }
                            Err(e) => {
                                failure = Some(self.fail(e.into()));
                                break;
                            }
                        }
                    }

                    let outcome = match failure {
                        Some(e) => Err(e),
                        None => self.commit(&completion).await,
                    };
                    match outcome {
                        Ok(_) => {
                            yield RelayEvent::Done;
                        }
                        Err(e) => {
                            yield RelayEvent::error(&e);
                        }
                    }
                }
            }
        }
    }
}
