// src/handlers/completion.rs
use crate::error::{AppError, AppResult};
use crate::llm_client::CompletionPayload;
use crate::models::chat::{CompletionReply, CompletionRequest};
use crate::prompt::{assemble_messages, resolve_system_prompt, PromptMode};
use crate::relay::{CommitMode, CompletionRelay};
use crate::state::AppState;
use crate::storage::ChatKey;
use crate::utils::is_valid_character_id;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    response::{
        sse::{Event, KeepAlive, Sse},
        Json,
    },
    routing::post,
    Router,
};
use futures::{Stream, StreamExt};
use std::sync::Arc;

const CHARACTER_NOT_FOUND: &str = "Character data not found.";
const HISTORY_NOT_FOUND: &str = "Chat history not found.";

pub fn completion_routes() -> Router {
    Router::new()
        .route("/api/chat", post(chat))
        .route("/api/chat/stream", post(chat_stream))
}

/// A relay ready to run, with the upstream request it will send.
struct PreparedCompletion {
    relay: CompletionRelay,
    payload: CompletionPayload,
}

/// Validates the request, loads the character and transcript, and builds the
/// prompt. Everything that can be rejected before contacting upstream is
/// rejected here, so the streaming route can still answer with a plain status.
async fn prepare(state: &AppState, request: CompletionRequest, stream: bool) -> AppResult<PreparedCompletion> {
    let character_id = request.character_id.filter(|id| !id.is_empty());
    let chat_id = request
        .chat_id
        .map(|id| id.into_string())
        .filter(|id| !id.is_empty());
    let message = request.message.filter(|m| !m.is_empty());

    let (Some(character_id), Some(chat_id), Some(message)) = (character_id, chat_id, message) else {
        return Err(AppError::Validation(
            "Character ID, Chat ID, and message are required".to_string(),
        ));
    };

    if !is_valid_character_id(&character_id) {
        return Err(AppError::NotFound(CHARACTER_NOT_FOUND.to_string()));
    }
    let character = state
        .characters
        .get(&character_id)
        .await
        .map_err(|e| AppError::from_storage(e, CHARACTER_NOT_FOUND))?;

    let key = ChatKey::parse(&character_id, &chat_id)
        .ok_or_else(|| AppError::NotFound(HISTORY_NOT_FOUND.to_string()))?;

    let mode = CommitMode::for_request(&message, request.history_override.as_ref());
    let history = match request.history_override {
        Some(history) => {
            if !state.chats.exists(&key).await {
                return Err(AppError::NotFound(HISTORY_NOT_FOUND.to_string()));
            }
            history
        }
        None => state
            .chats
            .load(&key)
            .await
            .map_err(|e| AppError::from_storage(e, HISTORY_NOT_FOUND))?,
    };

    let prompt_mode = PromptMode::from_request(request.mode.as_deref());
    let system_prompt = resolve_system_prompt(
        request.system_prompt,
        &character,
        request.user_persona.as_deref(),
        prompt_mode,
    );
    let messages = assemble_messages(system_prompt, &history, &message);
    let settings = request.llm_settings.unwrap_or_default();
    let payload = state.llm.payload(messages, &settings, stream);

    tracing::info!(
        chat = %key,
        history_len = history.len(),
        regenerate = matches!(mode, CommitMode::Regenerate { .. }),
        stream,
        "Prepared completion request"
    );

    Ok(PreparedCompletion {
        relay: CompletionRelay::new(state.llm.clone(), state.chats.clone(), key, mode),
        payload,
    })
}

/// Waits for the whole reply, commits it and returns it in one body.
pub async fn chat(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CompletionRequest>, JsonRejection>,
) -> AppResult<Json<CompletionReply>> {
    let Json(request) = body?;
    let PreparedCompletion { mut relay, payload } = prepare(&state, request, false).await?;
    let reply = relay.run_buffered(payload).await?;
    Ok(Json(CompletionReply { reply }))
}

/// Relays the reply as `data: {"type": ...}` events. Failures after the
/// response has started arrive as a single `error` event. The relay runs on
/// its own task, so a client that disconnects early still gets its reply saved.
pub async fn chat_stream(
    Extension(state): Extension<Arc<AppState>>,
    body: Result<Json<CompletionRequest>, JsonRejection>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, axum::Error>>>> {
    let Json(request) = body?;
    let PreparedCompletion { relay, payload } = prepare(&state, request, true).await?;
    let events = relay
        .spawn_streaming(payload)
        .map(|event| Event::default().json_data(event));
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}
