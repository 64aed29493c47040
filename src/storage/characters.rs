// src/storage/characters.rs
use super::{load, save, save_new, ChatStore, StorageError};
use crate::models::{Character, CharacterFields};
use crate::utils::slugify;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Character profiles, one `<id>.json` per character. Chats belong to the
/// shared [`ChatStore`], which also owns their locks.
#[derive(Debug, Clone)]
pub struct CharacterStore {
    dir: PathBuf,
    chats: Arc<ChatStore>,
}

impl CharacterStore {
    pub fn new(dir: impl Into<PathBuf>, chats: Arc<ChatStore>) -> Self {
        Self {
            dir: dir.into(),
            chats,
        }
    }

    fn profile_path(&self, id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", id))
    }

    /// All readable profiles, ordered by file name. Broken files are logged and skipped.
    pub async fn list(&self) -> Result<Vec<Character>, StorageError> {
        let mut names = json_file_names(&self.dir).await?;
        names.sort();

        let mut characters = Vec::with_capacity(names.len());
        for name in names {
            let path = self.dir.join(&name);
            match load::<Character>(&path).await {
                Ok(character) => characters.push(character),
                Err(e) => tracing::warn!(file = %name, error = %e, "Skipping unreadable character file"),
            }
        }
        Ok(characters)
    }

    pub async fn get(&self, id: &str) -> Result<Character, StorageError> {
        load(&self.profile_path(id)).await
    }

    /// Creates the profile and its chat directory. Fails with `AlreadyExists`
    /// when the slug of `fields.name` is taken.
    pub async fn create(&self, fields: CharacterFields) -> Result<Character, StorageError> {
        let character = Character {
            id: slugify(&fields.name),
            name: fields.name,
            description: fields.description,
            avatar_url: fields.avatar_url,
        };

        save_new(&self.profile_path(&character.id), &character).await?;

        self.chats.create_character_dir(&character.id).await?;

        tracing::info!(character_id = %character.id, "🎭 Created character");
        Ok(character)
    }

    /// Rewrites name, description and avatar; the id never changes.
    pub async fn update(&self, id: &str, fields: CharacterFields) -> Result<Character, StorageError> {
        let path = self.profile_path(id);
        let mut character: Character = load(&path).await?;
        character.name = fields.name;
        character.description = fields.description;
        character.avatar_url = fields.avatar_url;
        save(&path, &character).await?;
        tracing::info!(character_id = %id, "Updated character");
        Ok(character)
    }

    /// Removes the profile and every chat belonging to it. Missing pieces are ignored.
    pub async fn delete(&self, id: &str) -> Result<(), StorageError> {
        let path = self.profile_path(id);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(StorageError::io(&path, e)),
        }

        self.chats.delete_all(id).await?;

        tracing::info!(character_id = %id, "🗑️ Deleted character and its chats");
        Ok(())
    }
}

/// File names ending in `.json` directly under `dir`; a missing dir is empty.
pub(crate) async fn json_file_names(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(StorageError::io(dir, e)),
    };

    let mut names = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| StorageError::io(dir, e))?
    {
        if let Some(name) = entry.file_name().to_str() {
            if name.ends_with(".json") {
                names.push(name.to_string());
            }
        }
    }
    Ok(names)
}
