// src/handlers/chats.rs
use crate::error::{AppError, AppResult};
use crate::models::chat::{
    AddMessageRequest, CreateChatResponse, DeleteMessageRequest, HistoryResponse, UpdateMessageRequest,
};
use crate::models::{ChatHistory, Role};
use crate::state::AppState;
use crate::storage::{ChatKey, StorageError};
use crate::transcript::{self, TranscriptError};
use crate::utils::is_valid_character_id;
use axum::{
    extract::{rejection::JsonRejection, Extension, Path},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use serde_json::{json, Value};
use std::sync::Arc;

const CHAT_NOT_FOUND: &str = "Chat not found";

pub fn chat_routes() -> Router {
    Router::new()
        .route(
            "/api/characters/:character_id/chats",
            get(list_chats).post(create_chat),
        )
        .route(
            "/api/characters/:character_id/chats/:chat_id",
            axum::routing::delete(delete_chat),
        )
        .route("/api/chats/:character_id/:chat_id", get(get_history))
        .route("/api/chats/:character_id/:chat_id/add_message", post(add_message))
        .route("/api/chats/:character_id/:chat_id/update_message", post(update_message))
        .route("/api/chats/:character_id/:chat_id/delete_message", post(delete_message))
}

/// Failure inside a locked read-edit-write of one transcript.
#[derive(Debug)]
enum EditError {
    Storage(StorageError),
    Transcript(TranscriptError),
}

impl From<StorageError> for EditError {
    fn from(err: StorageError) -> Self {
        EditError::Storage(err)
    }
}

impl From<TranscriptError> for EditError {
    fn from(err: TranscriptError) -> Self {
        EditError::Transcript(err)
    }
}

impl From<EditError> for AppError {
    fn from(err: EditError) -> Self {
        match err {
            EditError::Storage(StorageError::NotFound(_)) => AppError::NotFound(CHAT_NOT_FOUND.to_string()),
            EditError::Storage(e) => AppError::Persistence(format!("Failed to update chat history: {}", e)),
            EditError::Transcript(e) => e.into(),
        }
    }
}

fn chat_key(character_id: &str, chat_id: &str) -> AppResult<ChatKey> {
    ChatKey::parse(character_id, chat_id).ok_or_else(|| AppError::NotFound(CHAT_NOT_FOUND.to_string()))
}

fn success(new_history: ChatHistory) -> Json<HistoryResponse> {
    Json(HistoryResponse {
        success: true,
        new_history,
    })
}

/// Chat ids of one character, newest first. Unknown characters have none.
pub async fn list_chats(
    Extension(state): Extension<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> AppResult<Json<Vec<String>>> {
    if !is_valid_character_id(&character_id) {
        return Ok(Json(Vec::new()));
    }
    let chats = state
        .chats
        .list(&character_id)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to list chats: {}", e)))?;
    Ok(Json(chats))
}

pub async fn create_chat(
    Extension(state): Extension<Arc<AppState>>,
    Path(character_id): Path<String>,
) -> AppResult<(StatusCode, Json<CreateChatResponse>)> {
    if !is_valid_character_id(&character_id) {
        return Err(AppError::NotFound("Character not found".to_string()));
    }
    let chat_id = state
        .chats
        .create(&character_id)
        .await
        .map_err(|e| AppError::Persistence(format!("Failed to create chat: {}", e)))?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChatResponse {
            chat_id: chat_id.to_string(),
        }),
    ))
}

pub async fn delete_chat(
    Extension(state): Extension<Arc<AppState>>,
    Path((character_id, chat_id)): Path<(String, String)>,
) -> AppResult<Json<Value>> {
    let key = chat_key(&character_id, &chat_id)?;
    state
        .chats
        .delete(&key)
        .await
        .map_err(|e| AppError::from_storage(e, CHAT_NOT_FOUND))?;
    Ok(Json(json!({ "success": true })))
}

pub async fn get_history(
    Extension(state): Extension<Arc<AppState>>,
    Path((character_id, chat_id)): Path<(String, String)>,
) -> AppResult<Json<ChatHistory>> {
    let key = chat_key(&character_id, &chat_id)?;
    let history = state
        .chats
        .load(&key)
        .await
        .map_err(|e| AppError::from_storage(e, "Chat history not found"))?;
    Ok(Json(history))
}

pub async fn add_message(
    Extension(state): Extension<Arc<AppState>>,
    Path((character_id, chat_id)): Path<(String, String)>,
    body: Result<Json<AddMessageRequest>, JsonRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Json(request) = body?;
    let (Some(role), Some(content)) = (
        request.role.filter(|r| !r.is_empty()),
        request.content.filter(|c| !c.is_empty()),
    ) else {
        return Err(AppError::Validation("Role and content are required".to_string()));
    };
    let role: Role = role.parse().map_err(AppError::Validation)?;
    let key = chat_key(&character_id, &chat_id)?;

    let history = state
        .chats
        .mutate(&key, |history| Ok::<_, EditError>(transcript::append(history, role, content)))
        .await?;

    tracing::info!(chat = %key, role = %role, "Added message");
    Ok(success(history))
}

pub async fn update_message(
    Extension(state): Extension<Arc<AppState>>,
    Path((character_id, chat_id)): Path<(String, String)>,
    body: Result<Json<UpdateMessageRequest>, JsonRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Json(request) = body?;
    let (Some(index), Some(content)) = (request.index, request.content) else {
        return Err(AppError::Validation("Index and content are required".to_string()));
    };
    let key = chat_key(&character_id, &chat_id)?;

    let history = state
        .chats
        .mutate(&key, |history| -> Result<_, EditError> {
            Ok(transcript::update(history, index, content)?)
        })
        .await?;

    tracing::info!(chat = %key, index, "Updated message");
    Ok(success(history))
}

pub async fn delete_message(
    Extension(state): Extension<Arc<AppState>>,
    Path((character_id, chat_id)): Path<(String, String)>,
    body: Result<Json<DeleteMessageRequest>, JsonRejection>,
) -> AppResult<Json<HistoryResponse>> {
    let Json(request) = body?;
    let index = request
        .index
        .ok_or_else(|| AppError::Validation("Index is required".to_string()))?;
    let key = chat_key(&character_id, &chat_id)?;

    let history = state
        .chats
        .mutate(&key, |history| -> Result<_, EditError> {
            Ok(transcript::delete(history, index)?)
        })
        .await?;

    tracing::info!(chat = %key, index, "Deleted message");
    Ok(success(history))
}
