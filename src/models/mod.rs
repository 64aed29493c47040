// src/models/mod.rs
pub mod character;
pub mod chat;

pub use character::{Character, CharacterFields, CharacterPayload};
pub use chat::{ChatHistory, Message, Role};
