// src/state.rs
use crate::config::AppConfig;
use crate::llm_client::{LlmClient, LlmError};
use crate::storage::{CharacterStore, ChatStore};
use std::sync::Arc;

/// Shared by every handler through `Extension<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    pub characters: CharacterStore,
    pub chats: Arc<ChatStore>,
    pub llm: LlmClient,
}

impl AppState {
    pub fn new(config: AppConfig) -> Result<Self, LlmError> {
        let llm = LlmClient::new(&config)?;
        let chats = Arc::new(ChatStore::new(config.chats_dir()));
        Ok(Self {
            characters: CharacterStore::new(config.characters_dir(), chats.clone()),
            chats,
            llm,
            config,
        })
    }
}
