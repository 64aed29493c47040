// src/handlers/upload.rs
use crate::error::{AppError, AppResult};
use crate::state::AppState;
use crate::utils::upload_file_name;
use axum::{
    extract::{multipart::Multipart, DefaultBodyLimit, Extension},
    response::Json,
    routing::post,
    Router,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tower_http::services::ServeDir;

const IMAGE_FIELD: &str = "image";

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub url: String,
}

/// `POST /api/upload-image` plus the static route that serves what it stores.
pub fn upload_routes(uploads_dir: &Path) -> Router {
    Router::new()
        .route("/api/upload-image", post(upload_image))
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024)) // 20MB limit for avatars
        .nest_service("/data/uploads", ServeDir::new(uploads_dir))
}

/// Stores the `image` field under a fresh uuid name and returns its public URL.
pub async fn upload_image(
    Extension(state): Extension<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<UploadResponse>> {
    let upload_dir = state.config.uploads_dir();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Invalid multipart body: {}", e)))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let original = field.file_name().unwrap_or_default().to_string();
        if original.is_empty() {
            return Err(AppError::Validation("No selected file".to_string()));
        }

        let stored_name = upload_file_name(&original);
        let file_path = upload_dir.join(&stored_name);
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::Validation(format!("Failed to read upload: {}", e)))?;

        fs::create_dir_all(&upload_dir)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to prepare upload directory: {}", e)))?;
        let mut file = fs::File::create(&file_path)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to store upload: {}", e)))?;
        file.write_all(&data)
            .await
            .map_err(|e| AppError::Persistence(format!("Failed to store upload: {}", e)))?;

        tracing::info!("Uploaded image: {} -> {}", original, file_path.display());
        return Ok(Json(UploadResponse {
            url: format!("/data/uploads/{}", stored_name),
        }));
    }

    Err(AppError::Validation("No file part".to_string()))
}
