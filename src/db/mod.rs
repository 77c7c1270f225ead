//! Database module for SQLite persistence.
//!
//! SQLite is the source of truth for all application data. Handlers only see the
//! store traits defined here; [`Repository`] is the SQLite implementation.

mod projects;
mod threads;
mod users;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{Sqlite, Transaction};
use std::path::Path;
use std::str::FromStr;

use crate::errors::AppError;
use crate::models::{
    AddCollaboratorRequest, CreateIdeaRequest, CreateProjectRequest, CreateUserRequest, Idea,
    NewPost, NewReply, Project, ProjectView, Thread, ThreadView, UpdateIdeaRequest,
    UserWithProfile,
};

/// Maximum number of posts returned by the recent-posts feed.
pub const RECENT_POSTS_LIMIT: i64 = 2;

/// Persistence contract for threads (posts and replies).
#[async_trait]
pub trait ThreadStore: Send + Sync {
    /// Every thread, posts and replies alike, with two levels of replies.
    async fn get_all_threads(&self) -> Result<Vec<ThreadView>, AppError>;
    /// Top-level threads only, with two levels of replies.
    async fn get_all_posts(&self) -> Result<Vec<ThreadView>, AppError>;
    async fn get_replies_by_thread(&self, id: &str) -> Result<Vec<Thread>, AppError>;
    async fn get_thread_by_id(&self, id: &str) -> Result<Option<ThreadView>, AppError>;
    async fn create_post(&self, post: &NewPost) -> Result<ThreadView, AppError>;
    /// Reply to an existing thread, inheriting its category and tags.
    async fn create_thread(&self, reply: &NewReply) -> Result<ThreadView, AppError>;
    async fn like_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread, AppError>;
    async fn unlike_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread, AppError>;
    async fn delete_thread(&self, id: &str) -> Result<Thread, AppError>;
    async fn delete_reply(&self, id: &str) -> Result<Thread, AppError>;
    async fn get_most_recent_posts(&self) -> Result<Vec<ThreadView>, AppError>;
}

/// Persistence contract for projects, their collaborators and ideas.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_all_projects(&self) -> Result<Vec<ProjectView>, AppError>;
    async fn get_project_by_id(&self, id: &str) -> Result<Option<ProjectView>, AppError>;
    async fn get_idea_by_id(&self, project_id: &str, idea_id: &str)
        -> Result<Option<Idea>, AppError>;
    async fn create_project(&self, request: &CreateProjectRequest)
        -> Result<ProjectView, AppError>;
    async fn add_collaborator(
        &self,
        project_id: &str,
        request: &AddCollaboratorRequest,
    ) -> Result<ProjectView, AppError>;
    async fn create_idea(
        &self,
        project_id: &str,
        request: &CreateIdeaRequest,
    ) -> Result<Idea, AppError>;
    async fn update_idea(
        &self,
        project_id: &str,
        idea_id: &str,
        request: &UpdateIdeaRequest,
    ) -> Result<Idea, AppError>;
    async fn delete_project(&self, id: &str) -> Result<Project, AppError>;
    async fn delete_idea(&self, project_id: &str, idea_id: &str) -> Result<Idea, AppError>;
    async fn get_bookmarked_ideas(&self, user_id: &str) -> Result<Vec<Idea>, AppError>;
    async fn bookmark_idea(
        &self,
        user_id: &str,
        project_id: &str,
        idea_id: &str,
    ) -> Result<Idea, AppError>;
    async fn unbookmark_idea(
        &self,
        user_id: &str,
        project_id: &str,
        idea_id: &str,
    ) -> Result<Idea, AppError>;
}

/// Persistence contract for users and profiles.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn create_user(&self, request: &CreateUserRequest) -> Result<UserWithProfile, AppError>;
    async fn get_user(&self, id: &str) -> Result<Option<UserWithProfile>, AppError>;
}

/// SQLite-backed implementation of every store trait.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Start a transaction that holds the write lock from its first statement.
    ///
    /// A deferred transaction that reads and then writes cannot wait for the lock
    /// in WAL mode; SQLite fails it with SQLITE_BUSY instead.
    pub(crate) async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>, sqlx::Error> {
        self.pool.begin_with("BEGIN IMMEDIATE").await
    }
}

/// Current time as a fixed-width RFC 3339 string, so text order is time order.
pub(crate) fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Initialize the database connection pool and run migrations.
pub async fn init_database(db_path: &Path) -> Result<SqlitePool, sqlx::Error> {
    // Ensure the parent directory exists
    if let Some(parent) = db_path.parent() {
        tokio::fs::create_dir_all(parent).await.ok();
    }

    let db_url = format!("sqlite:{}?mode=rwc", db_path.display());

    let options = SqliteConnectOptions::from_str(&db_url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .busy_timeout(std::time::Duration::from_secs(30));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    // Run embedded migrations
    run_migrations(&pool).await?;

    Ok(pool)
}

/// Run database migrations.
async fn run_migrations(pool: &SqlitePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            created_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS profiles (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL UNIQUE REFERENCES users(id) ON DELETE CASCADE,
            display_name TEXT,
            bio TEXT,
            avatar_url TEXT
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Replies reference their parent; removing a thread removes its subtree.
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS threads (
            id TEXT PRIMARY KEY,
            title TEXT,
            content TEXT NOT NULL,
            category TEXT NOT NULL,
            author_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            like_count INTEGER NOT NULL DEFAULT 0,
            deleted INTEGER NOT NULL DEFAULT 0,
            reply_to_id TEXT REFERENCES threads(id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS tags (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS thread_tags (
            thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            tag_id TEXT NOT NULL REFERENCES tags(id) ON DELETE CASCADE,
            PRIMARY KEY (thread_id, tag_id)
        );

        CREATE TABLE IF NOT EXISTS thread_likes (
            thread_id TEXT NOT NULL REFERENCES threads(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (thread_id, user_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS projects (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            description TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS project_collaborators (
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (project_id, user_id)
        );

        CREATE TABLE IF NOT EXISTS ideas (
            id TEXT PRIMARY KEY,
            project_id TEXT NOT NULL REFERENCES projects(id) ON DELETE CASCADE,
            title TEXT NOT NULL,
            content TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS idea_bookmarks (
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            idea_id TEXT NOT NULL REFERENCES ideas(id) ON DELETE CASCADE,
            created_at TEXT NOT NULL,
            PRIMARY KEY (user_id, idea_id)
        );
        "#,
    )
    .execute(pool)
    .await?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_threads_reply_to_id ON threads(reply_to_id);
        CREATE INDEX IF NOT EXISTS idx_threads_created_at ON threads(created_at);
        CREATE INDEX IF NOT EXISTS idx_thread_likes_user_id ON thread_likes(user_id);
        CREATE INDEX IF NOT EXISTS idx_ideas_project_id ON ideas(project_id);
        CREATE INDEX IF NOT EXISTS idx_idea_bookmarks_idea_id ON idea_bookmarks(idea_id);
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
