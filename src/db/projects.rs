//! Project, collaborator, idea and bookmark persistence.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};

use super::users::{ensure_user, user_from_row};
use super::{new_id, now_timestamp, ProjectStore, Repository};
use crate::errors::AppError;
use crate::models::{
    AddCollaboratorRequest, CreateIdeaRequest, CreateProjectRequest, Idea, Project, ProjectView,
    UpdateIdeaRequest, User,
};

const PROJECT_COLUMNS: &str = "id, title, description, created_at, updated_at";
const IDEA_COLUMNS: &str = "id, project_id, title, content, created_at, updated_at";
const COLLABORATOR_QUERY: &str = "SELECT pc.project_id AS project_id, u.id AS id, \
     u.username AS username, u.email AS email, u.created_at AS created_at \
     FROM project_collaborators pc JOIN users u ON u.id = pc.user_id";

async fn fetch_project(conn: &mut SqliteConnection, id: &str) -> Result<Option<Project>, AppError> {
    let row = sqlx::query(&format!("SELECT {} FROM projects WHERE id = ?", PROJECT_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(project_from_row))
}

async fn require_project(conn: &mut SqliteConnection, id: &str) -> Result<Project, AppError> {
    fetch_project(conn, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Project [{}] not found", id)))
}

/// Fetch an idea, scoped to the project that owns it.
async fn require_idea(
    conn: &mut SqliteConnection,
    project_id: &str,
    idea_id: &str,
) -> Result<Idea, AppError> {
    let row = sqlx::query(&format!(
        "SELECT {} FROM ideas WHERE id = ? AND project_id = ?",
        IDEA_COLUMNS
    ))
    .bind(idea_id)
    .bind(project_id)
    .fetch_optional(&mut *conn)
    .await?;

    row.as_ref().map(idea_from_row).ok_or_else(|| {
        AppError::NotFound(format!(
            "Idea [{}] not found in project [{}]",
            idea_id, project_id
        ))
    })
}

/// Attach collaborators and ideas to a single project.
async fn load_project_view(
    conn: &mut SqliteConnection,
    project: Project,
) -> Result<ProjectView, AppError> {
    let collaborators = sqlx::query(&format!(
        "{} WHERE pc.project_id = ? ORDER BY pc.created_at, u.username",
        COLLABORATOR_QUERY
    ))
    .bind(&project.id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(user_from_row)
    .collect();

    let ideas = sqlx::query(&format!(
        "SELECT {} FROM ideas WHERE project_id = ? ORDER BY created_at, rowid",
        IDEA_COLUMNS
    ))
    .bind(&project.id)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(idea_from_row)
    .collect();

    Ok(ProjectView {
        project,
        collaborators,
        ideas,
    })
}

#[async_trait]
impl ProjectStore for Repository {
    async fn get_all_projects(&self) -> Result<Vec<ProjectView>, AppError> {
        let mut conn = self.pool.acquire().await?;

        let projects: Vec<Project> = sqlx::query(&format!(
            "SELECT {} FROM projects ORDER BY created_at, rowid",
            PROJECT_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(project_from_row)
        .collect();

        let mut collaborators: HashMap<String, Vec<User>> = HashMap::new();
        let rows = sqlx::query(&format!(
            "{} ORDER BY pc.created_at, u.username",
            COLLABORATOR_QUERY
        ))
        .fetch_all(&mut *conn)
        .await?;
        for row in &rows {
            let project_id: String = row.get("project_id");
            collaborators
                .entry(project_id)
                .or_default()
                .push(user_from_row(row));
        }

        let mut ideas: HashMap<String, Vec<Idea>> = HashMap::new();
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ideas ORDER BY created_at, rowid",
            IDEA_COLUMNS
        ))
        .fetch_all(&mut *conn)
        .await?;
        for row in &rows {
            let idea = idea_from_row(row);
            ideas.entry(idea.project_id.clone()).or_default().push(idea);
        }

        Ok(projects
            .into_iter()
            .map(|project| ProjectView {
                collaborators: collaborators.remove(&project.id).unwrap_or_default(),
                ideas: ideas.remove(&project.id).unwrap_or_default(),
                project,
            })
            .collect())
    }

    async fn get_project_by_id(&self, id: &str) -> Result<Option<ProjectView>, AppError> {
        let mut conn = self.pool.acquire().await?;
        match fetch_project(&mut conn, id).await? {
            Some(project) => Ok(Some(load_project_view(&mut conn, project).await?)),
            None => Ok(None),
        }
    }

    async fn get_idea_by_id(
        &self,
        project_id: &str,
        idea_id: &str,
    ) -> Result<Option<Idea>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM ideas WHERE id = ? AND project_id = ?",
            IDEA_COLUMNS
        ))
        .bind(idea_id)
        .bind(project_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(idea_from_row))
    }

    async fn create_project(
        &self,
        request: &CreateProjectRequest,
    ) -> Result<ProjectView, AppError> {
        let now = now_timestamp();
        let project = Project {
            id: new_id(),
            title: request.title.clone(),
            description: request.description.clone(),
            created_at: now.clone(),
            updated_at: now.clone(),
        };

        let mut tx = self.begin_write().await?;
        ensure_user(&mut tx, &request.owner_id).await?;

        sqlx::query(
            "INSERT INTO projects (id, title, description, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&project.title)
        .bind(&project.description)
        .bind(&project.created_at)
        .bind(&project.updated_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO project_collaborators (project_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(&project.id)
        .bind(&request.owner_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        let view = load_project_view(&mut tx, project).await?;
        tx.commit().await?;

        tracing::info!(project_id = %view.project.id, "Project created");
        Ok(view)
    }

    async fn add_collaborator(
        &self,
        project_id: &str,
        request: &AddCollaboratorRequest,
    ) -> Result<ProjectView, AppError> {
        let mut tx = self.begin_write().await?;
        require_project(&mut tx, project_id).await?;
        ensure_user(&mut tx, &request.user_id).await?;

        let now = now_timestamp();
        let added = sqlx::query(
            "INSERT OR IGNORE INTO project_collaborators (project_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(project_id)
        .bind(&request.user_id)
        .bind(&now)
        .execute(&mut *tx)
        .await?;

        if added.rows_affected() > 0 {
            sqlx::query("UPDATE projects SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(project_id)
                .execute(&mut *tx)
                .await?;
        }

        let project = require_project(&mut tx, project_id).await?;
        let view = load_project_view(&mut tx, project).await?;
        tx.commit().await?;

        Ok(view)
    }

    async fn create_idea(
        &self,
        project_id: &str,
        request: &CreateIdeaRequest,
    ) -> Result<Idea, AppError> {
        let now = now_timestamp();
        let idea = Idea {
            id: new_id(),
            project_id: project_id.to_string(),
            title: request.title.clone(),
            content: request.content.clone(),
            created_at: now.clone(),
            updated_at: now,
        };

        let mut tx = self.begin_write().await?;
        require_project(&mut tx, project_id).await?;

        sqlx::query(
            "INSERT INTO ideas (id, project_id, title, content, created_at, updated_at) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&idea.id)
        .bind(&idea.project_id)
        .bind(&idea.title)
        .bind(&idea.content)
        .bind(&idea.created_at)
        .bind(&idea.updated_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(idea)
    }

    async fn update_idea(
        &self,
        project_id: &str,
        idea_id: &str,
        request: &UpdateIdeaRequest,
    ) -> Result<Idea, AppError> {
        let mut tx = self.begin_write().await?;
        let existing = require_idea(&mut tx, project_id, idea_id).await?;

        let title = request.title.clone().unwrap_or(existing.title);
        let content = match &request.content {
            Some(content) => content.clone(),
            None => existing.content,
        };
        let now = now_timestamp();

        sqlx::query("UPDATE ideas SET title = ?, content = ?, updated_at = ? WHERE id = ?")
            .bind(&title)
            .bind(&content)
            .bind(&now)
            .bind(idea_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(Idea {
            id: existing.id,
            project_id: existing.project_id,
            title,
            content,
            created_at: existing.created_at,
            updated_at: now,
        })
    }

    async fn delete_project(&self, id: &str) -> Result<Project, AppError> {
        let mut tx = self.begin_write().await?;
        let project = require_project(&mut tx, id).await?;

        sqlx::query("DELETE FROM projects WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        tracing::info!(project_id = %id, "Project deleted");
        Ok(project)
    }

    async fn delete_idea(&self, project_id: &str, idea_id: &str) -> Result<Idea, AppError> {
        let mut tx = self.begin_write().await?;
        let idea = require_idea(&mut tx, project_id, idea_id).await?;

        sqlx::query("DELETE FROM ideas WHERE id = ?")
            .bind(idea_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(idea)
    }

    async fn get_bookmarked_ideas(&self, user_id: &str) -> Result<Vec<Idea>, AppError> {
        let rows = sqlx::query(
            "SELECT i.id AS id, i.project_id AS project_id, i.title AS title, i.content AS content, \
             i.created_at AS created_at, i.updated_at AS updated_at \
             FROM idea_bookmarks b JOIN ideas i ON i.id = b.idea_id \
             WHERE b.user_id = ? ORDER BY b.created_at DESC, b.rowid DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(idea_from_row).collect())
    }

    async fn bookmark_idea(
        &self,
        user_id: &str,
        project_id: &str,
        idea_id: &str,
    ) -> Result<Idea, AppError> {
        let mut tx = self.begin_write().await?;
        let idea = require_idea(&mut tx, project_id, idea_id).await?;
        ensure_user(&mut tx, user_id).await?;

        sqlx::query(
            "INSERT OR IGNORE INTO idea_bookmarks (user_id, idea_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(user_id)
        .bind(idea_id)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(idea)
    }

    async fn unbookmark_idea(
        &self,
        user_id: &str,
        project_id: &str,
        idea_id: &str,
    ) -> Result<Idea, AppError> {
        let mut tx = self.begin_write().await?;
        let idea = require_idea(&mut tx, project_id, idea_id).await?;

        sqlx::query("DELETE FROM idea_bookmarks WHERE user_id = ? AND idea_id = ?")
            .bind(user_id)
            .bind(idea_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(idea)
    }
}

// Helper functions for row conversion

fn project_from_row(row: &sqlx::sqlite::SqliteRow) -> Project {
    Project {
        id: row.get("id"),
        title: row.get("title"),
        description: row.get("description"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

fn idea_from_row(row: &sqlx::sqlite::SqliteRow) -> Idea {
    Idea {
        id: row.get("id"),
        project_id: row.get("project_id"),
        title: row.get("title"),
        content: row.get("content"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}
