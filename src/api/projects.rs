//! Project and idea API endpoints.

use axum::{
    extract::{Path, State},
    Json,
};

use super::{require_text, ApiJson, ApiResult};
use crate::auth::CurrentUser;
use crate::errors::AppError;
use crate::models::{
    AddCollaboratorRequest, CreateIdeaRequest, CreateProjectRequest, Idea, Project, ProjectView,
    UpdateIdeaRequest,
};
use crate::AppState;

/// GET /api/projects - List all projects.
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Vec<ProjectView>> {
    Ok(Json(state.projects.get_all_projects().await?))
}

/// GET /api/projects/:id - Get a single project.
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<ProjectView> {
    match state.projects.get_project_by_id(&id).await? {
        Some(project) => Ok(Json(project)),
        None => Err(AppError::NotFound(format!("Project [{}] not found", id))),
    }
}

/// POST /api/projects - Create a project.
pub async fn create_project(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<CreateProjectRequest>,
) -> ApiResult<ProjectView> {
    require_text(&request.title, "Title")?;
    require_text(&request.owner_id, "Owner (ownerId)")?;

    Ok(Json(state.projects.create_project(&request).await?))
}

/// DELETE /api/projects/:id - Delete a project and its ideas.
pub async fn delete_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Project> {
    Ok(Json(state.projects.delete_project(&id).await?))
}

/// POST /api/projects/:id/collaborators - Add a collaborator.
pub async fn add_collaborator(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<AddCollaboratorRequest>,
) -> ApiResult<ProjectView> {
    require_text(&request.user_id, "User (userId)")?;

    Ok(Json(state.projects.add_collaborator(&id, &request).await?))
}

/// POST /api/projects/:id/ideas - Create an idea in a project.
pub async fn create_idea(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(request): ApiJson<CreateIdeaRequest>,
) -> ApiResult<Idea> {
    require_text(&request.title, "Title")?;

    Ok(Json(state.projects.create_idea(&id, &request).await?))
}

/// GET /api/projects/:id/ideas/:idea_id - Get a single idea.
pub async fn get_idea(
    State(state): State<AppState>,
    Path((project_id, idea_id)): Path<(String, String)>,
) -> ApiResult<Idea> {
    match state.projects.get_idea_by_id(&project_id, &idea_id).await? {
        Some(idea) => Ok(Json(idea)),
        None => Err(AppError::NotFound(format!(
            "Idea [{}] not found in project [{}]",
            idea_id, project_id
        ))),
    }
}

/// PUT /api/projects/:id/ideas/:idea_id - Update an idea.
pub async fn update_idea(
    State(state): State<AppState>,
    Path((project_id, idea_id)): Path<(String, String)>,
    ApiJson(request): ApiJson<UpdateIdeaRequest>,
) -> ApiResult<Idea> {
    if let Some(title) = &request.title {
        require_text(title, "Title")?;
    }

    Ok(Json(
        state
            .projects
            .update_idea(&project_id, &idea_id, &request)
            .await?,
    ))
}

/// DELETE /api/projects/:id/ideas/:idea_id - Delete an idea.
pub async fn delete_idea(
    State(state): State<AppState>,
    Path((project_id, idea_id)): Path<(String, String)>,
) -> ApiResult<Idea> {
    Ok(Json(state.projects.delete_idea(&project_id, &idea_id).await?))
}

/// POST /api/projects/:id/ideas/:idea_id/bookmark - Bookmark an idea.
pub async fn bookmark_idea(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((project_id, idea_id)): Path<(String, String)>,
) -> ApiResult<Idea> {
    Ok(Json(
        state
            .projects
            .bookmark_idea(&user.id, &project_id, &idea_id)
            .await?,
    ))
}

/// DELETE /api/projects/:id/ideas/:idea_id/bookmark - Remove a bookmark.
pub async fn unbookmark_idea(
    State(state): State<AppState>,
    user: CurrentUser,
    Path((project_id, idea_id)): Path<(String, String)>,
) -> ApiResult<Idea> {
    Ok(Json(
        state
            .projects
            .unbookmark_idea(&user.id, &project_id, &idea_id)
            .await?,
    ))
}

/// GET /api/ideas/bookmarked - Ideas bookmarked by the current user.
pub async fn bookmarked_ideas(
    State(state): State<AppState>,
    user: CurrentUser,
) -> ApiResult<Vec<Idea>> {
    tracing::info!(user_id = %user.id, "Fetching bookmarked ideas");

    Ok(Json(state.projects.get_bookmarked_ideas(&user.id).await?))
}
