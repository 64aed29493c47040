// src/handlers/mod.rs
pub mod characters;
pub mod chats;
pub mod completion;
pub mod upload;
