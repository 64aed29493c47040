// src/models/character.rs
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Character {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub avatar_url: String,
}

/// Body of character create and update requests.
#[derive(Debug, Deserialize)]
pub struct CharacterPayload {
    pub name: Option<String>,
    pub description: Option<String>,
    pub avatar_url: Option<String>,
}

/// A payload that passed validation: both required fields are non-empty.
#[derive(Debug, Clone)]
pub struct CharacterFields {
    pub name: String,
    pub description: String,
    pub avatar_url: String,
}

impl CharacterPayload {
    pub fn validate(self) -> Option<CharacterFields> {
        let name = self.name.filter(|n| !n.is_empty())?;
        let description = self.description.filter(|d| !d.is_empty())?;
        Some(CharacterFields {
            name,
            description,
            avatar_url: self.avatar_url.unwrap_or_default(),
        })
    }
}
