// src/utils.rs
//! Id and filename helpers.
use regex::Regex;
use std::path::Path;

lazy_static::lazy_static! {
    static ref NON_SLUG_CHARS: Regex = Regex::new(r"[^a-zA-Z0-9_-]").expect("static regex");
}

/// Turns a display name into a character id: spaces become underscores,
/// anything outside `[a-zA-Z0-9_-]` is dropped, the rest is lowercased.
pub fn slugify(name: &str) -> String {
    NON_SLUG_CHARS
        .replace_all(&name.replace(' ', "_"), "")
        .to_lowercase()
}

/// True when `id` could have come out of [`slugify`], which also rules out
/// path separators and `..`.
pub fn is_valid_character_id(id: &str) -> bool {
    !id.is_empty() && slugify(id) == id
}

/// Random file name for an upload, keeping the original extension.
pub fn upload_file_name(original: &str) -> String {
    let extension = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{}", ext))
        .unwrap_or_default();
    format!("{}{}", uuid::Uuid::new_v4(), extension)
}
