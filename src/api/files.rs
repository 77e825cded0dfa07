use axum::{
    Extension, Json,
    extract::State,
};
use serde::Deserialize;
use std::sync::Arc;

use super::{
    ApiError, ApiJson, ApiPath, ApiQuery, ApiResponse, AppState, MessageResponse, PageQuery,
};
use crate::constants::limits::DEFAULT_PAGE_SIZE;
use crate::models::FileRecord;
use crate::services::{FilePage, NewUpload, Principal};

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRequest {
    pub file_name: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
    pub size: i64,
}

fn default_content_type() -> String {
    "application/octet-stream".to_string()
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisibilityRequest {
    #[serde(alias = "makePublic", alias = "public")]
    pub is_public: bool,
}

#[derive(Deserialize)]
pub struct ModerateRequest {
    pub status: String,
}

/// GET /files/public
pub async fn list_public(
    State(state): State<Arc<AppState>>,
    ApiQuery(query): ApiQuery<PageQuery>,
) -> Result<Json<ApiResponse<FilePage>>, ApiError> {
    let page = state
        .file_service()
        .list_public(
            query.page.unwrap_or(1),
            query.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
        )
        .await?;

    Ok(Json(ApiResponse::success(page)))
}

/// GET /files
pub async fn list_files(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
) -> Result<Json<ApiResponse<Vec<FileRecord>>>, ApiError> {
    let files = state.file_service().list_for(&principal).await?;
    Ok(Json(ApiResponse::success(files)))
}

/// POST /files/upload
///
/// Records metadata for bytes the storage collaborator has accepted.
pub async fn upload(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiJson(payload): ApiJson<UploadRequest>,
) -> Result<Json<ApiResponse<FileRecord>>, ApiError> {
    let file = state
        .file_service()
        .register_upload(
            &principal,
            NewUpload {
                file_name: payload.file_name,
                content_type: payload.content_type,
                size: payload.size,
            },
        )
        .await?;

    Ok(Json(ApiResponse::success(file)))
}

/// GET /files/{id}/info
pub async fn get_info(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(file_id): ApiPath<String>,
) -> Result<Json<ApiResponse<FileRecord>>, ApiError> {
    let file = state
        .file_service()
        .get(&file_id, Some(&principal))
        .await?;

    Ok(Json(ApiResponse::success(file)))
}

/// POST|PATCH /files/{id}/visibility
pub async fn set_visibility(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(file_id): ApiPath<String>,
    ApiJson(payload): ApiJson<VisibilityRequest>,
) -> Result<Json<ApiResponse<FileRecord>>, ApiError> {
    let file = state
        .file_service()
        .set_visibility(&file_id, payload.is_public, &principal)
        .await?;

    Ok(Json(ApiResponse::success(file)))
}

/// POST|PATCH /files/{id}/moderate
pub async fn moderate(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(file_id): ApiPath<String>,
    ApiJson(payload): ApiJson<ModerateRequest>,
) -> Result<Json<ApiResponse<FileRecord>>, ApiError> {
    let file = state
        .file_service()
        .moderate(&file_id, &payload.status, &principal)
        .await?;

    Ok(Json(ApiResponse::success(file)))
}

/// DELETE /files/{id}
pub async fn delete_file(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath(file_id): ApiPath<String>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    state.file_service().delete(&file_id, &principal).await?;

    Ok(Json(ApiResponse::success(MessageResponse::new(format!(
        "File {file_id} deleted"
    )))))
}
