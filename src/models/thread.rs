//! Thread model: one self-referential entity for posts and replies.

use serde::{Deserialize, Serialize};

use super::{User, UserWithProfile};

/// A thread row. `reply_to_id == None` marks a post, anything else a reply.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    pub id: String,
    pub title: Option<String>,
    pub content: String,
    pub category: String,
    pub author_id: String,
    pub created_at: String,
    pub like_count: i64,
    pub deleted: bool,
    pub reply_to_id: Option<String>,
}

impl Thread {
    pub fn is_post(&self) -> bool {
        self.reply_to_id.is_none()
    }
}

/// What deleting a thread does to its row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteAction {
    /// Remove the row; replies go with it.
    Remove,
    /// Flip the `deleted` flag and keep the row so its replies stay attached.
    ToggleDeleted,
}

impl DeleteAction {
    /// Posts are always removed. A reply that has replies of its own is
    /// soft-deleted; a reply without replies is removed.
    pub fn for_thread(thread: &Thread, reply_count: i64) -> Self {
        if thread.is_post() || reply_count == 0 {
            DeleteAction::Remove
        } else {
            DeleteAction::ToggleDeleted
        }
    }
}

/// A unique, named label shared between threads.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tag {
    pub id: String,
    pub name: String,
}

/// A thread with whichever relations the query asked for.
///
/// Relation fields left as `None` are omitted from the JSON output, so a bare
/// reply serializes exactly like a [`Thread`].
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ThreadView {
    #[serde(flatten)]
    pub thread: Thread,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub author: Option<UserWithProfile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub liked_by: Option<Vec<User>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tags: Option<Vec<Tag>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replies: Option<Vec<ThreadView>>,
}

/// Tag reference inside a create-post body; tags are matched by name.
#[derive(Debug, Clone, Deserialize)]
pub struct TagInput {
    pub name: String,
}

/// Request body for creating a post.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePostRequest {
    pub title: String,
    pub content: String,
    pub category: String,
    #[serde(default)]
    pub tags: Vec<TagInput>,
}

/// Request body for replying to a thread.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateReplyRequest {
    pub content: String,
}

/// Everything the store needs to create a post.
#[derive(Debug, Clone)]
pub struct NewPost {
    pub title: String,
    pub author_id: String,
    pub content: String,
    pub category: String,
    pub tags: Vec<String>,
}

/// Everything the store needs to create a reply.
#[derive(Debug, Clone)]
pub struct NewReply {
    pub author_id: String,
    pub content: String,
    pub reply_to_id: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread(reply_to_id: Option<&str>) -> Thread {
        Thread {
            id: "t".to_string(),
            title: None,
            content: "c".to_string(),
            category: "general".to_string(),
            author_id: "u".to_string(),
            created_at: "2024-01-01T00:00:00.000000Z".to_string(),
            like_count: 0,
            deleted: false,
            reply_to_id: reply_to_id.map(str::to_string),
        }
    }

    #[test]
    fn test_post_is_always_removed() {
        assert_eq!(DeleteAction::for_thread(&thread(None), 0), DeleteAction::Remove);
        assert_eq!(DeleteAction::for_thread(&thread(None), 3), DeleteAction::Remove);
    }

    #[test]
    fn test_reply_with_replies_is_soft_deleted() {
        assert_eq!(
            DeleteAction::for_thread(&thread(Some("p")), 1),
            DeleteAction::ToggleDeleted
        );
    }

    #[test]
    fn test_leaf_reply_is_removed() {
        assert_eq!(
            DeleteAction::for_thread(&thread(Some("p")), 0),
            DeleteAction::Remove
        );
    }

    #[test]
    fn test_create_post_request_defaults_tags() {
        let request: CreatePostRequest = serde_json::from_value(serde_json::json!({
            "title": "T",
            "content": "C",
            "category": "general"
        }))
        .unwrap();
        assert!(request.tags.is_empty());
    }
}
