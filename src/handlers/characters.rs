// src/handlers/characters.rs
use crate::error::{AppError, AppResult};
use crate::models::{Character, CharacterPayload};
use crate::state::AppState;
use crate::storage::StorageError;
use crate::utils::{is_valid_character_id, slugify};
use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

const CHARACTER_NOT_FOUND: &str = "Character not found";

pub fn character_routes() -> Router {
    Router::new()
        .route("/api/characters", get(list_characters).post(create_character))
        .route(
            "/api/characters/:character_id",
            get(get_character).put(update_character).delete(delete_character),
        )
}

pub async fn list_characters(Extension(state): Extension<Arc<AppState>>) -> AppResult<Json<Vec<Character>>> {
    let characters = state
        .characters
        .list()
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to list characters: {}", e)))?;
    Ok(Json(characters))
}

pub async fn create_character(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CharacterPayload>, JsonRejection>,
) -> AppResult<(StatusCode, Json<Character>)> {
    let Json(payload) = body?;
    let fields = payload
        .validate()
        .ok_or_else(|| AppError::Validation("Name and description are required".to_string()))?;

    if slugify(&fields.name).is_empty() {
        return Err(AppError::Validation(
            "Name must contain at least one letter or digit".to_string(),
        ));
    }

    let character = state.characters.create(fields).await.map_err(|e| match e {
        StorageError::AlreadyExists(_) => {
            AppError::Conflict("A character with this name already exists".to_string())
        }
        other => AppError::Persistence(format!("Failed to save character data: {}", other)),
    })?;

    Ok((StatusCode::CREATED, Json(character)))
}

pub async fn get_character(
    Extension(state): Extension<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> AppResult<Json<Character>> {
    if !is_valid_character_id(&character_id) {
        return Err(AppError::NotFound(CHARACTER_NOT_FOUND.to_string()));
    }
    let character = state
        .characters
        .get(&character_id)
        .await
        .map_err(|e| AppError::from_storage(e, CHARACTER_NOT_FOUND))?;
    Ok(Json(character))
}

pub async fn update_character(
    Extension(state): Extension<Arc<AppState>>,
    Path(character_id): Path<String>,
    body: Result<Json<CharacterPayload>, JsonRejection>,
) -> AppResult<Json<Character>> {
    let Json(payload) = body?;
    let fields = payload
        .validate()
        .ok_or_else(|| AppError::Validation("Name and description are required".to_string()))?;

    if !is_valid_character_id(&character_id) {
        return Err(AppError::NotFound(CHARACTER_NOT_FOUND.to_string()));
    }

    let character = state
        .characters
        .update(&character_id, fields)
        .await
        .map_err(|e| AppError::from_storage(e, CHARACTER_NOT_FOUND))?;
    Ok(Json(character))
}

/// Deleting something that is not there still succeeds.
pub async fn delete_character(
    Extension(state): Extension<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> AppResult<Json<Value>> {
    if is_valid_character_id(&character_id) {
        state
            .characters
            .delete(&character_id)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to delete character: {}", e)))?;
    }
    Ok(Json(json!({ "success": true })))
}
