//! User and profile persistence.

use async_trait::async_trait;
use sqlx::{Row, SqliteConnection};

use super::{new_id, now_timestamp, Repository, UserStore};
use crate::errors::AppError;
use crate::models::{CreateUserRequest, Profile, User, UserWithProfile};

/// Columns expected by [`user_with_profile_from_row`].
pub(super) const USER_WITH_PROFILE_COLUMNS: &str = "u.id AS id, u.username AS username, \
     u.email AS email, u.created_at AS created_at, p.id AS profile_id, \
     p.display_name AS display_name, p.bio AS bio, p.avatar_url AS avatar_url";

/// Fail with NotFound unless the user exists.
pub(super) async fn ensure_user(conn: &mut SqliteConnection, id: &str) -> Result<(), AppError> {
    let exists: Option<i64> = sqlx::query_scalar("SELECT 1 FROM users WHERE id = ?")
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;

    match exists {
        Some(_) => Ok(()),
        None => Err(AppError::NotFound(format!("User [{}] not found", id))),
    }
}

#[async_trait]
impl UserStore for Repository {
    async fn create_user(&self, request: &CreateUserRequest) -> Result<UserWithProfile, AppError> {
        let user = User {
            id: new_id(),
            username: request.username.trim().to_string(),
            email: request.email.clone(),
            created_at: now_timestamp(),
        };
        let profile = Profile {
            id: new_id(),
            user_id: user.id.clone(),
            display_name: request.display_name.clone(),
            bio: request.bio.clone(),
            avatar_url: request.avatar_url.clone(),
        };

        let mut tx = self.begin_write().await?;

        sqlx::query("INSERT INTO users (id, username, email, created_at) VALUES (?, ?, ?, ?)")
            .bind(&user.id)
            .bind(&user.username)
            .bind(&user.email)
            .bind(&user.created_at)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "INSERT INTO profiles (id, user_id, display_name, bio, avatar_url) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&profile.id)
        .bind(&profile.user_id)
        .bind(&profile.display_name)
        .bind(&profile.bio)
        .bind(&profile.avatar_url)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(UserWithProfile {
            user,
            profile: Some(profile),
        })
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserWithProfile>, AppError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM users u LEFT JOIN profiles p ON p.user_id = u.id WHERE u.id = ?",
            USER_WITH_PROFILE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_with_profile_from_row))
    }
}

// Helper functions for row conversion

pub(super) fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> User {
    User {
        id: row.get("id"),
        username: row.get("username"),
        email: row.get("email"),
        created_at: row.get("created_at"),
    }
}

pub(super) fn user_with_profile_from_row(row: &sqlx::sqlite::SqliteRow) -> UserWithProfile {
    let user = user_from_row(row);
    let profile_id: Option<String> = row.get("profile_id");
    let profile = profile_id.map(|id| Profile {
        id,
        user_id: user.id.clone(),
        display_name: row.get("display_name"),
        bio: row.get("bio"),
        avatar_url: row.get("avatar_url"),
    });
    UserWithProfile { user, profile }
}

#[cfg(test)]
mod tests {
    use super::super::test_support;
    use super::*;

    #[tokio::test]
    async fn test_create_and_get_user() {
        let (repo, _dir) = test_support::repository().await;

        let created = repo
            .create_user(&CreateUserRequest {
                username: " alice ".to_string(),
                email: Some("alice@example.com".to_string()),
                display_name: Some("Alice".to_string()),
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap();
        assert_eq!(created.user.username, "alice");

        let fetched = repo.get_user(&created.user.id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(
            fetched.profile.unwrap().display_name.as_deref(),
            Some("Alice")
        );
    }

    #[tokio::test]
    async fn test_duplicate_username_conflicts() {
        let (repo, _dir) = test_support::repository().await;
        test_support::user(&repo, "bob").await;

        let err = repo
            .create_user(&CreateUserRequest {
                username: "bob".to_string(),
                email: None,
                display_name: None,
                bio: None,
                avatar_url: None,
            })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_get_missing_user() {
        let (repo, _dir) = test_support::repository().await;
        assert!(repo.get_user("missing").await.unwrap().is_none());
    }
}
