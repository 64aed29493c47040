// src/storage/chats.rs
use super::characters::json_file_names;
use super::ids::ChatIdGenerator;
use super::{load, save, save_new, StorageError};
use crate::models::ChatHistory;
use crate::utils::is_valid_character_id;
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Addresses one transcript file: `chats/<character_id>/<chat_id>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChatKey {
    pub character_id: String,
    pub chat_id: u64,
}

impl ChatKey {
    /// `None` when either part could not name a transcript on disk.
    pub fn parse(character_id: &str, chat_id: &str) -> Option<Self> {
        if !is_valid_character_id(character_id) {
            return None;
        }
        let chat_id = chat_id.trim().parse().ok()?;
        Some(Self {
            character_id: character_id.to_string(),
            chat_id,
        })
    }
}

impl fmt::Display for ChatKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.character_id, self.chat_id)
    }
}

/// Chat transcripts. Read-modify-write cycles on the same chat are
/// serialised through a per-chat lock; separate processes still race.
#[derive(Debug)]
pub struct ChatStore {
    dir: PathBuf,
    ids: ChatIdGenerator,
    locks: Mutex<HashMap<ChatKey, Arc<Mutex<()>>>>,
}

impl ChatStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            ids: ChatIdGenerator::new(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn chat_path(&self, key: &ChatKey) -> PathBuf {
        self.dir
            .join(&key.character_id)
            .join(format!("{}.json", key.chat_id))
    }

    async fn lock_for(&self, key: &ChatKey) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks.entry(key.clone()).or_default().clone()
    }

    /// Drops the lock entry of a chat that no longer exists on disk.
    async fn forget(&self, key: &ChatKey) {
        self.locks.lock().await.remove(key);
    }

    /// Chat ids for a character, newest first.
    pub async fn list(&self, character_id: &str) -> Result<Vec<String>, StorageError> {
        let names = json_file_names(&self.dir.join(character_id)).await?;
        let mut ids: Vec<u64> = names
            .iter()
            .filter_map(|name| name.trim_end_matches(".json").parse().ok())
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        Ok(ids.into_iter().map(|id| id.to_string()).collect())
    }

    /// Makes sure `chats/<character_id>/` exists.
    pub async fn create_character_dir(&self, character_id: &str) -> Result<PathBuf, StorageError> {
        let dir = self.dir.join(character_id);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;
        Ok(dir)
    }

    /// Writes a new empty transcript and returns its id.
    pub async fn create(&self, character_id: &str) -> Result<u64, StorageError> {
        let dir = self.create_character_dir(character_id).await?;

        loop {
            let chat_id = self.ids.next_id();
            let path = dir.join(format!("{}.json", chat_id));
            match save_new(&path, &ChatHistory::new()).await {
                Ok(()) => {
                    tracing::info!(character_id = %character_id, chat_id, "💬 Created chat session");
                    return Ok(chat_id);
                }
                Err(StorageError::AlreadyExists(_)) => {
                    tracing::debug!(chat_id, "Chat id already on disk, trying the next one");
                    self.ids.observe(chat_id);
                }
                Err(e) => return Err(e),
            }
        }
    }

    pub async fn load(&self, key: &ChatKey) -> Result<ChatHistory, StorageError> {
        load(&self.chat_path(key)).await
    }

    pub async fn exists(&self, key: &ChatKey) -> bool {
        super::exists(&self.chat_path(key)).await
    }

    /// Loads the transcript, applies `edit` and writes the result back while
    /// holding the chat's lock. Nothing is written when `edit` fails.
    pub async fn mutate<F, E>(&self, key: &ChatKey, edit: F) -> Result<ChatHistory, E>
    where
        F: FnOnce(ChatHistory) -> Result<ChatHistory, E>,
        E: From<StorageError>,
    {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let path = self.chat_path(key);
        let history: ChatHistory = match load(&path).await {
            Ok(history) => history,
            Err(e) => {
                if matches!(e, StorageError::NotFound(_)) {
                    self.forget(key).await;
                }
                return Err(e.into());
            }
        };
        let updated = edit(history)?;
        save(&path, &updated).await?;
        tracing::debug!(chat = %key, messages = updated.len(), "Saved chat history");
        Ok(updated)
    }

    pub async fn delete(&self, key: &ChatKey) -> Result<(), StorageError> {
        let lock = self.lock_for(key).await;
        let _guard = lock.lock().await;

        let path = self.chat_path(key);
        let removed = tokio::fs::remove_file(&path)
            .await
            .map_err(|e| StorageError::io(&path, e));
        if matches!(removed, Ok(()) | Err(StorageError::NotFound(_))) {
            self.forget(key).await;
        }
        removed?;
        tracing::info!(chat = %key, "Deleted chat session");
        Ok(())
    }

    /// Removes every transcript of a character. Waits for in-flight edits on
    /// those chats, then drops their locks. A missing directory is fine.
    pub async fn delete_all(&self, character_id: &str) -> Result<(), StorageError> {
        let held: Vec<(ChatKey, Arc<Mutex<()>>)> = self
            .locks
            .lock()
            .await
            .iter()
            .filter(|(key, _)| key.character_id == character_id)
            .map(|(key, lock)| (key.clone(), lock.clone()))
            .collect();

        let mut guards = Vec::with_capacity(held.len());
        for (_, lock) in &held {
            guards.push(lock.lock().await);
        }

        let dir = self.dir.join(character_id);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&dir, e)),
        }

        let mut locks = self.locks.lock().await;
        for (key, _) in &held {
            locks.remove(key);
        }
        drop(locks);
        drop(guards);

        tracing::info!(character_id = %character_id, chats = held.len(), "Deleted all chats of character");
        Ok(())
    }
}
