use axum::{
    Extension, Json,
    extract::State,
};
use std::sync::Arc;

use super::{ApiError, ApiPath, ApiResponse, AppState};
use crate::models::Role;
use crate::services::{Principal, UserInfo};

fn parse_role(role: &str) -> Result<Role, ApiError> {
    role.parse::<Role>()
        .map_err(|e| ApiError::validation(e.to_string()))
}

/// PUT /users/{id}/roles/{role}
pub async fn assign_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath((user_id, role)): ApiPath<(String, String)>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let role = parse_role(&role)?;
    let user = state
        .auth_service()
        .assign_role(&principal, &user_id, role)
        .await?;

    Ok(Json(ApiResponse::success(user)))
}

/// DELETE /users/{id}/roles/{role}
pub async fn remove_role(
    State(state): State<Arc<AppState>>,
    Extension(principal): Extension<Principal>,
    ApiPath((user_id, role)): ApiPath<(String, String)>,
) -> Result<Json<ApiResponse<UserInfo>>, ApiError> {
    let role = parse_role(&role)?;
    let user = state
        .auth_service()
        .remove_role(&principal, &user_id, role)
        .await?;

    Ok(Json(ApiResponse::success(user)))
}
