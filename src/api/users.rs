//! User API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, ApiJson, ApiResult};
use crate::errors::AppError;
use crate::models::{CreateUserRequest, UserWithProfile};
use crate::AppState;

/// POST /api/users - Register a user with a profile.
pub async fn create_user(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateUserRequest>,
) -> ApiResult<UserWithProfile> {
    require_text(&request.username, "Username")?;

    Ok(Json(state.users.create_user(&request).await?))
}

/// GET /api/users/:id - Get a user with their profile.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<UserWithProfile> {
    match state.users.get_user(&id).await? {
        Some(user) => Ok(Json(user)),
        None => Err(AppError::NotFound(format!("User [{}] not found", id))),
    }
}
