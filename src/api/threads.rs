//! Thread API endpoints: posts, replies, likes and deletion.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, ApiJson, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{CreatePostRequest, CreateReplyRequest, NewPost, NewReply, Thread, ThreadView};
use crate::AppState;

/// GET /api/threads - List every thread with two levels of replies.
pub async fn list_threads(State(state): State<AppState>) -> ApiResult<Vec<ThreadView>> {
    Ok(Json(state.threads.get_all_threads().await?))
}

/// GET /api/posts - List top-level threads.
pub async fn list_posts(State(state): State<AppState>) -> ApiResult<Vec<ThreadView>> {
    Ok(Json(state.threads.get_all_posts().await?))
}

/// GET /api/threads/recent - The newest posts.
pub async fn recent_posts(State(state): State<AppState>) -> ApiResult<Vec<ThreadView>> {
    Ok(Json(state.threads.get_most_recent_posts().await?))
}

/// GET /api/threads/:id - A single thread with three levels of replies.
pub async fn get_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ThreadView> {
    match state.threads.get_thread_by_id(&id).await? {
        Some(thread) => Ok(Json(thread)),
        None => Err(AppError::NotFound(format!("Thread [{}] not found", id))),
    }
}

/// GET /api/threads/:id/replies - Direct replies to a thread.
pub async fn list_replies(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Vec<Thread>> {
    Ok(Json(state.threads.get_replies_by_thread(&id).await?))
}

/// POST /api/posts - Create a post authored by the current user.
pub async fn create_post(
    State(state): State<AppState>,
    user: CurrentUser,
    ApiJson(request): ApiJson<CreatePostRequest>,
) -> ApiResult<ThreadView> {
    require_text(&request.title, "Title")?;
    require_text(&request.content, "Content")?;
    require_text(&request.category, "Category")?;

    let mut tags: Vec<String> = Vec::with_capacity(request.tags.len());
    for tag in &request.tags {
        let name = tag.name.trim();
        if name.is_empty() {
            return Err(AppError::Validation("Tag name must not be empty".to_string()));
        }
        if !tags.iter().any(|t| t == name) {
            tags.push(name.to_string());
        }
    }

    let post = NewPost {
        title: request.title,
        author_id: user.id,
        content: request.content,
        category: request.category,
        tags,
    };

    Ok(Json(state.threads.create_post(&post).await?))
}

/// POST /api/threads/:id/replies - Reply to a thread as the current user.
pub async fn create_reply(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CreateReplyRequest>,
) -> ApiResult<ThreadView> {
    require_text(&request.content, "Content")?;

    let reply = NewReply {
        author_id: user.id,
        content: request.content,
        reply_to_id: id,
    };

    Ok(Json(state.threads.create_thread(&reply).await?))
}

/// POST /api/threads/:id/like - Like a thread as the current user.
pub async fn like_thread(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Thread> {
    Ok(Json(state.threads.like_thread(&id, &user.id).await?))
}

/// DELETE /api/threads/:id/like - Withdraw the current user's like.
pub async fn unlike_thread(
    State(state): State<AppState>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Thread> {
    Ok(Json(state.threads.unlike_thread(&id, &user.id).await?))
}

/// DELETE /api/threads/:id - Delete a thread, soft-deleting replies that have replies.
pub async fn delete_thread(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Thread> {
    Ok(Json(state.threads.delete_thread(&id).await?))
}

/// DELETE /api/replies/:id - Delete a reply.
pub async fn delete_reply(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Thread> {
    Ok(Json(state.threads.delete_reply(&id).await?))
}
