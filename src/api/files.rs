use axum::{
    Extension, Json, Router,
    extract::{Multipart, Path, State, multipart::MultipartError},
    http::{StatusCode, header},
    response::IntoResponse,
    routing::{delete, get, post},
};
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;

use crate::api::AppState;
use crate::middleware::auth::CurrentUser;
use crate::services::file_storage::{
    delete_file, list_user_files, open_shared_file, regenerate_share_token, rename_file,
    save_file, set_visibility, update_content,
};
use crate::services::file_validation::content_disposition;
use crate::utils::error::{AppError, AppResult};
use crate::utils::helpers::{json_response, success};

/// Bodies cut off by the request size limit surface as multipart errors;
/// those become 413, everything else is a malformed request.
fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge("Upload exceeds the maximum request size".to_string())
    } else {
        AppError::BadRequest(format!("Invalid multipart body: {}", e.body_text()))
    }
}

async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<Json<serde_json::Value>> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(multipart_error)?
    {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or("upload").to_string();
        let claimed_mime = field.content_type().map(str::to_string);
        let data = field.bytes().await.map_err(multipart_error)?;

        let file = save_file(
            &state.db,
            &state.blobs,
            &user.id,
            &file_name,
            claimed_mime.as_deref(),
            data.to_vec(),
        )
        .await?;

        return Ok(Json(serde_json::json!({
            "success": true,
            "shareToken": file.share_token,
            "file": file,
        })));
    }

    Err(AppError::BadRequest("No file provided".to_string()))
}

async fn download(
    State(state): State<Arc<AppState>>,
    Path(token): Path<String>,
    user: Option<Extension<CurrentUser>>,
) -> AppResult<impl IntoResponse> {
    let requester = user.as_ref().map(|Extension(u)| u.id.as_str());
    let (file, contents) = open_shared_file(&state.db, &state.blobs, &token, requester).await?;

    Ok((
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, file.content_type().to_string()),
            (
                header::CONTENT_DISPOSITION,
                content_disposition(&file.original_name),
            ),
            (header::CONTENT_LENGTH, contents.len().to_string()),
        ],
        contents,
    ))
}

async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
) -> AppResult<Json<serde_json::Value>> {
    let files = list_user_files(&state.db, &user.id).await?;
    json_response(&files)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisibilityRequest {
    file_id: String,
    make_public: bool,
}

async fn change_visibility(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<VisibilityRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let file = set_visibility(&state.db, &req.file_id, &user.id, req.make_public).await?;
    Ok(Json(serde_json::json!({ "success": true, "file": file })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegenerateRequest {
    file_id: String,
}

async fn regenerate(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<RegenerateRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let token = regenerate_share_token(&state.db, &req.file_id, &user.id).await?;
    Ok(Json(serde_json::json!({ "success": true, "shareToken": token })))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RenameRequest {
    file_id: String,
    new_name: String,
}

async fn rename(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<RenameRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let file = rename_file(&state.db, &req.file_id, &user.id, &req.new_name).await?;
    Ok(Json(serde_json::json!({ "success": true, "file": file })))
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "lowercase")]
enum ContentEncoding {
    #[default]
    Utf8,
    Base64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateContentRequest {
    file_id: String,
    content: String,
    file_name: Option<String>,
    #[serde(default)]
    encoding: ContentEncoding,
}

async fn replace_content(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Json(req): Json<UpdateContentRequest>,
) -> AppResult<Json<serde_json::Value>> {
    let data = match req.encoding {
        ContentEncoding::Utf8 => req.content.into_bytes(),
        ContentEncoding::Base64 => base64::engine::general_purpose::STANDARD
            .decode(req.content.trim())
            .map_err(|e| AppError::BadRequest(format!("Invalid base64: {}", e)))?,
    };

    let file = update_content(
        &state.db,
        &state.blobs,
        &req.file_id,
        &user.id,
        data,
        req.file_name.as_deref(),
    )
    .await?;

    Ok(Json(serde_json::json!({ "success": true, "file": file })))
}

async fn remove_file(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<CurrentUser>,
    Path(file_id): Path<String>,
) -> AppResult<Json<serde_json::Value>> {
    delete_file(&state.db, &state.blobs, &file_id, &user.id).await?;
    Ok(success())
}

pub fn routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files", get(list_files))
        .route("/files/upload", post(upload))
        .route("/files/visibility", post(change_visibility))
        .route("/files/regenerate", post(regenerate))
        .route("/files/rename", post(rename))
        .route("/files/update-content", post(replace_content))
        .route("/files/:file_id", delete(remove_file))
        .with_state(state)
}

pub fn public_routes(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/files/download/:token", get(download))
        .with_state(state)
}
