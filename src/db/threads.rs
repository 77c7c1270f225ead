//! Thread persistence: posts, replies, likes, tags and deletion.
//!
//! Read paths load flat rows level by level into a [`ThreadArena`] and render
//! nested views from it. Every read-branch-write sequence runs in one transaction.

use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};

use super::users::{ensure_user, user_from_row, user_with_profile_from_row, USER_WITH_PROFILE_COLUMNS};
use super::{new_id, now_timestamp, Repository, ThreadStore, RECENT_POSTS_LIMIT};
use crate::errors::AppError;
use crate::models::arena::{self, Include};
use crate::models::{
    DeleteAction, NewPost, NewReply, Tag, Thread, ThreadArena, ThreadView,
};

const THREAD_COLUMNS: &str =
    "id, title, content, category, author_id, created_at, like_count, deleted, reply_to_id";

/// Upper bound on ids bound into one `IN (...)` list, well under SQLite's
/// host-parameter limit.
const ID_CHUNK: usize = 500;

/// Append `(?, ?, ...)` bound to `ids`. Callers guarantee `ids` is non-empty.
fn push_id_list(builder: &mut QueryBuilder<'_, Sqlite>, ids: &[String]) {
    builder.push(" (");
    let mut separated = builder.separated(", ");
    for id in ids {
        separated.push_bind(id.clone());
    }
    separated.push_unseparated(")");
}

/// Run `head IN (...) tail` once per chunk of `ids` and collect every row.
///
/// Rows matching different chunks never share a grouping key, so per-key
/// ordering from `tail` survives the split.
async fn fetch_by_ids(
    conn: &mut SqliteConnection,
    head: &str,
    ids: &[String],
    tail: &str,
) -> Result<Vec<SqliteRow>, AppError> {
    let mut rows = Vec::new();
    for chunk in ids.chunks(ID_CHUNK) {
        let mut builder = QueryBuilder::<Sqlite>::new(head);
        push_id_list(&mut builder, chunk);
        builder.push(tail);
        rows.extend(builder.build().fetch_all(&mut *conn).await?);
    }
    Ok(rows)
}

async fn fetch_thread(conn: &mut SqliteConnection, id: &str) -> Result<Option<Thread>, AppError> {
    let row = sqlx::query(&format!("SELECT {} FROM threads WHERE id = ?", THREAD_COLUMNS))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    Ok(row.as_ref().map(thread_from_row))
}

/// Load `roots`, their replies down to `include.depth()` levels, and the
/// relations `include` asks for.
async fn load_arena(
    conn: &mut SqliteConnection,
    roots: Vec<Thread>,
    include: &Include,
) -> Result<ThreadArena, AppError> {
    let mut arena = ThreadArena::new();
    let mut frontier: Vec<String> = Vec::with_capacity(roots.len());
    for thread in roots {
        frontier.push(thread.id.clone());
        arena.insert(thread);
    }

    for _ in 0..include.depth() {
        if frontier.is_empty() {
            break;
        }

        let rows = fetch_by_ids(
            conn,
            &format!("SELECT {} FROM threads WHERE reply_to_id IN", THREAD_COLUMNS),
            &frontier,
            " ORDER BY created_at, rowid",
        )
        .await?;

        frontier.clear();
        for row in &rows {
            let thread = thread_from_row(row);
            // Threads already in the arena had their own replies loaded with them.
            if arena.get(&thread.id).is_none() {
                frontier.push(thread.id.clone());
                arena.insert(thread);
            }
        }
    }

    if arena.is_empty() {
        return Ok(arena);
    }

    if include.any_level(|i| i.author) {
        let rows = fetch_by_ids(
            conn,
            &format!(
                "SELECT {} FROM users u LEFT JOIN profiles p ON p.user_id = u.id WHERE u.id IN",
                USER_WITH_PROFILE_COLUMNS
            ),
            &arena.author_ids(),
            "",
        )
        .await?;
        for row in rows {
            arena.insert_author(user_with_profile_from_row(&row));
        }
    }

    let thread_ids = arena.thread_ids();

    if include.any_level(|i| i.liked_by) {
        let rows = fetch_by_ids(
            conn,
            "SELECT tl.thread_id AS thread_id, u.id AS id, u.username AS username, \
             u.email AS email, u.created_at AS created_at \
             FROM thread_likes tl JOIN users u ON u.id = tl.user_id WHERE tl.thread_id IN",
            &thread_ids,
            " ORDER BY tl.created_at, u.username",
        )
        .await?;
        for row in rows {
            let thread_id: String = row.get("thread_id");
            arena.insert_like(&thread_id, user_from_row(&row));
        }
    }

    if include.any_level(|i| i.tags) {
        let rows = fetch_by_ids(
            conn,
            "SELECT tt.thread_id AS thread_id, t.id AS id, t.name AS name \
             FROM thread_tags tt JOIN tags t ON t.id = tt.tag_id WHERE tt.thread_id IN",
            &thread_ids,
            " ORDER BY t.name",
        )
        .await?;
        for row in rows {
            let thread_id: String = row.get("thread_id");
            arena.insert_tag(
                &thread_id,
                Tag {
                    id: row.get("id"),
                    name: row.get("name"),
                },
            );
        }
    }

    Ok(arena)
}

/// Render `roots` in order using `include`.
async fn render_roots(
    conn: &mut SqliteConnection,
    roots: Vec<Thread>,
    include: &Include,
) -> Result<Vec<ThreadView>, AppError> {
    let ids: Vec<String> = roots.iter().map(|t| t.id.clone()).collect();
    let arena = load_arena(conn, roots, include).await?;
    Ok(arena.render_all(&ids, include))
}

/// Render a single thread that is known to exist.
async fn render_one(
    conn: &mut SqliteConnection,
    root: Thread,
    include: &Include,
) -> Result<ThreadView, AppError> {
    let id = root.id.clone();
    render_roots(conn, vec![root], include)
        .await?
        .pop()
        .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", id)))
}

impl Repository {
    async fn list_threads(&self, posts_only: bool, include: &Include) -> Result<Vec<ThreadView>, AppError> {
        let filter = if posts_only {
            " WHERE reply_to_id IS NULL"
        } else {
            ""
        };

        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM threads{} ORDER BY created_at, rowid",
            THREAD_COLUMNS, filter
        ))
        .fetch_all(&mut *conn)
        .await?;

        let roots = rows.iter().map(thread_from_row).collect();
        render_roots(&mut conn, roots, include).await
    }

    async fn recent_posts(&self, limit: i64) -> Result<Vec<ThreadView>, AppError> {
        let mut conn = self.pool.acquire().await?;
        let rows = sqlx::query(&format!(
            "SELECT {} FROM threads WHERE reply_to_id IS NULL \
             ORDER BY created_at DESC, rowid DESC LIMIT ?",
            THREAD_COLUMNS
        ))
        .bind(limit)
        .fetch_all(&mut *conn)
        .await?;

        let roots = rows.iter().map(thread_from_row).collect();
        render_roots(&mut conn, roots, &arena::RECENT).await
    }

    /// Shared by `delete_thread` and `delete_reply`.
    async fn remove_or_toggle(&self, id: &str) -> Result<Thread, AppError> {
        let mut tx = self.begin_write().await?;

        let thread = fetch_thread(&mut tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", id)))?;

        let reply_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM threads WHERE reply_to_id = ?")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;

        let result = match DeleteAction::for_thread(&thread, reply_count) {
            DeleteAction::Remove => {
                sqlx::query("DELETE FROM threads WHERE id = ?")
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                tracing::debug!(thread_id = %id, "Thread removed");
                thread
            }
            DeleteAction::ToggleDeleted => {
                sqlx::query(
                    "UPDATE threads SET deleted = CASE deleted WHEN 0 THEN 1 ELSE 0 END WHERE id = ?",
                )
                .bind(id)
                .execute(&mut *tx)
                .await?;
                tracing::debug!(thread_id = %id, reply_count, "Thread soft-delete toggled");
                Thread {
                    deleted: !thread.deleted,
                    ..thread
                }
            }
        };

        tx.commit().await?;
        Ok(result)
    }
}

#[async_trait]
impl ThreadStore for Repository {
    async fn get_all_threads(&self) -> Result<Vec<ThreadView>, AppError> {
        self.list_threads(false, &arena::LIST).await
    }

    async fn get_all_posts(&self) -> Result<Vec<ThreadView>, AppError> {
        self.list_threads(true, &arena::LIST).await
    }

    async fn get_replies_by_thread(&self, id: &str) -> Result<Vec<Thread>, AppError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM threads WHERE reply_to_id = ? ORDER BY created_at, rowid",
            THREAD_COLUMNS
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(thread_from_row).collect())
    }

    async fn get_thread_by_id(&self, id: &str) -> Result<Option<ThreadView>, AppError> {
        let mut conn = self.pool.acquire().await?;
        match fetch_thread(&mut conn, id).await? {
            Some(thread) => Ok(Some(render_one(&mut conn, thread, &arena::DETAIL).await?)),
            None => Ok(None),
        }
    }

    async fn create_post(&self, post: &NewPost) -> Result<ThreadView, AppError> {
        let thread = Thread {
            id: new_id(),
            title: Some(post.title.clone()),
            content: post.content.clone(),
            category: post.category.clone(),
            author_id: post.author_id.clone(),
            created_at: now_timestamp(),
            like_count: 0,
            deleted: false,
            reply_to_id: None,
        };

        let mut tx = self.begin_write().await?;
        ensure_user(&mut tx, &post.author_id).await?;

        sqlx::query(
            "INSERT INTO threads (id, title, content, category, author_id, created_at, like_count, deleted, reply_to_id) \
             VALUES (?, ?, ?, ?, ?, ?, 0, 0, NULL)",
        )
        .bind(&thread.id)
        .bind(&thread.title)
        .bind(&thread.content)
        .bind(&thread.category)
        .bind(&thread.author_id)
        .bind(&thread.created_at)
        .execute(&mut *tx)
        .await?;

        // Tags are shared by name: reuse an existing row or create it.
        for name in &post.tags {
            sqlx::query("INSERT INTO tags (id, name) VALUES (?, ?) ON CONFLICT(name) DO NOTHING")
                .bind(new_id())
                .bind(name)
                .execute(&mut *tx)
                .await?;

            sqlx::query(
                "INSERT OR IGNORE INTO thread_tags (thread_id, tag_id) SELECT ?, id FROM tags WHERE name = ?",
            )
            .bind(&thread.id)
            .bind(name)
            .execute(&mut *tx)
            .await?;
        }

        let view = render_one(&mut tx, thread, &arena::WITH_TAGS).await?;
        tx.commit().await?;

        tracing::info!(thread_id = %view.thread.id, tags = post.tags.len(), "Post created");
        Ok(view)
    }

    async fn create_thread(&self, reply: &NewReply) -> Result<ThreadView, AppError> {
        let mut tx = self.begin_write().await?;

        let parent = fetch_thread(&mut tx, &reply.reply_to_id)
            .await?
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "Thread [{}] not found to reply to",
                    reply.reply_to_id
                ))
            })?;
        ensure_user(&mut tx, &reply.author_id).await?;

        let thread = Thread {
            id: new_id(),
            title: None,
            content: reply.content.clone(),
            category: parent.category.clone(),
            author_id: reply.author_id.clone(),
            created_at: now_timestamp(),
            like_count: 0,
            deleted: false,
            reply_to_id: Some(parent.id.clone()),
        };

        sqlx::query(
            "INSERT INTO threads (id, title, content, category, author_id, created_at, like_count, deleted, reply_to_id) \
             VALUES (?, NULL, ?, ?, ?, ?, 0, 0, ?)",
        )
        .bind(&thread.id)
        .bind(&thread.content)
        .bind(&thread.category)
        .bind(&thread.author_id)
        .bind(&thread.created_at)
        .bind(&thread.reply_to_id)
        .execute(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO thread_tags (thread_id, tag_id) SELECT ?, tag_id FROM thread_tags WHERE thread_id = ?",
        )
        .bind(&thread.id)
        .bind(&parent.id)
        .execute(&mut *tx)
        .await?;

        let view = render_one(&mut tx, thread, &arena::CREATED_REPLY).await?;
        tx.commit().await?;

        Ok(view)
    }

    async fn like_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread, AppError> {
        let mut tx = self.begin_write().await?;

        fetch_thread(&mut tx, thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", thread_id)))?;
        ensure_user(&mut tx, user_id).await?;

        let inserted = sqlx::query(
            "INSERT OR IGNORE INTO thread_likes (thread_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(thread_id)
        .bind(user_id)
        .bind(now_timestamp())
        .execute(&mut *tx)
        .await?;

        if inserted.rows_affected() == 0 {
            return Err(AppError::AlreadyLiked {
                thread_id: thread_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        sqlx::query("UPDATE threads SET like_count = like_count + 1 WHERE id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        let thread = fetch_thread(&mut tx, thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", thread_id)))?;
        tx.commit().await?;

        Ok(thread)
    }

    async fn unlike_thread(&self, thread_id: &str, user_id: &str) -> Result<Thread, AppError> {
        let mut tx = self.begin_write().await?;

        fetch_thread(&mut tx, thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", thread_id)))?;

        let removed = sqlx::query("DELETE FROM thread_likes WHERE thread_id = ? AND user_id = ?")
            .bind(thread_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if removed.rows_affected() == 0 {
            return Err(AppError::NotLiked {
                thread_id: thread_id.to_string(),
                user_id: user_id.to_string(),
            });
        }

        sqlx::query("UPDATE threads SET like_count = MAX(like_count - 1, 0) WHERE id = ?")
            .bind(thread_id)
            .execute(&mut *tx)
            .await?;

        let thread = fetch_thread(&mut tx, thread_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Thread [{}] not found", thread_id)))?;
        tx.commit().await?;

        Ok(thread)
    }

    async fn delete_thread(&self, id: &str) -> Result<Thread, AppError> {
        self.remove_or_toggle(id).await
    }

    async fn delete_reply(&self, id: &str) -> Result<Thread, AppError> {
        self.remove_or_toggle(id).await
    }

    async fn get_most_recent_posts(&self) -> Result<Vec<ThreadView>, AppError> {
        self.recent_posts(RECENT_POSTS_LIMIT).await.map_err(|e| {
            tracing::error!("Error fetching recent threads: {}", e);
            AppError::Internal("Unable to fetch recent threads.".to_string())
        })
    }
}

// Helper functions for row conversion

fn thread_from_row(row: &sqlx::sqlite::SqliteRow) -> Thread {
    let deleted: i32 = row.get("deleted");
    Thread {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        category: row.get("category"),
        author_id: row.get("author_id"),
        created_at: row.get("created_at"),
        like_count: row.get("like_count"),
        deleted: deleted != 0,
        reply_to_id: row.get("reply_to_id"),
    }
}
