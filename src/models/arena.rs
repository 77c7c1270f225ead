//! Id-keyed arena for thread graphs.
//!
//! Threads reference their parent by id only. The store loads flat rows into a
//! [`ThreadArena`] and nested [`ThreadView`]s are rendered from it on demand,
//! following an [`Include`] shape that says which relations to attach at each depth.

use std::collections::HashMap;

use super::{Tag, Thread, ThreadView, User, UserWithProfile};

/// Which relations to attach to a rendered thread, and how to render its replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Include {
    pub author: bool,
    pub liked_by: bool,
    pub tags: bool,
    pub replies: Option<&'static Include>,
}

impl Include {
    /// Number of reply levels below the root this shape renders.
    pub fn depth(&self) -> usize {
        match self.replies {
            Some(inner) => 1 + inner.depth(),
            None => 0,
        }
    }

    /// Whether `pick` holds at this level or any nested reply level.
    pub fn any_level(&self, pick: fn(&Include) -> bool) -> bool {
        pick(self) || self.replies.is_some_and(|inner| inner.any_level(pick))
    }
}

/// Scalar fields only.
pub const BARE: Include = Include {
    author: false,
    liked_by: false,
    tags: false,
    replies: None,
};

const LIST_REPLY: Include = Include {
    author: false,
    liked_by: true,
    tags: false,
    replies: Some(&BARE),
};

/// Shape used by the thread and post listings.
pub const LIST: Include = Include {
    author: true,
    liked_by: true,
    tags: true,
    replies: Some(&LIST_REPLY),
};

const AUTHORED_REPLY: Include = Include {
    author: true,
    liked_by: true,
    tags: false,
    replies: Some(&BARE),
};

const DETAIL_REPLY: Include = Include {
    author: true,
    liked_by: true,
    tags: false,
    replies: Some(&AUTHORED_REPLY),
};

/// Shape used when fetching a single thread.
pub const DETAIL: Include = Include {
    author: true,
    liked_by: true,
    tags: true,
    replies: Some(&DETAIL_REPLY),
};

/// Shape returned after creating a reply.
pub const CREATED_REPLY: Include = Include {
    author: true,
    liked_by: true,
    tags: true,
    replies: Some(&AUTHORED_REPLY),
};

/// Shape returned after creating a post.
pub const WITH_TAGS: Include = Include {
    author: false,
    liked_by: false,
    tags: true,
    replies: None,
};

/// Shape used by the recent-posts feed.
pub const RECENT: Include = Include {
    author: true,
    liked_by: true,
    tags: false,
    replies: None,
};

/// Flat storage of threads plus their relations, keyed by id.
#[derive(Debug, Default)]
pub struct ThreadArena {
    nodes: HashMap<String, Thread>,
    children: HashMap<String, Vec<String>>,
    authors: HashMap<String, UserWithProfile>,
    likes: HashMap<String, Vec<User>>,
    tags: HashMap<String, Vec<Tag>>,
}

impl ThreadArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a thread. Replies are indexed under their parent in insertion order;
    /// inserting the same id twice is a no-op.
    pub fn insert(&mut self, thread: Thread) {
        if self.nodes.contains_key(&thread.id) {
            return;
        }
        if let Some(parent) = &thread.reply_to_id {
            self.children
                .entry(parent.clone())
                .or_default()
                .push(thread.id.clone());
        }
        self.nodes.insert(thread.id.clone(), thread);
    }

    pub fn insert_author(&mut self, author: UserWithProfile) {
        self.authors.insert(author.user.id.clone(), author);
    }

    pub fn insert_like(&mut self, thread_id: &str, user: User) {
        self.likes.entry(thread_id.to_string()).or_default().push(user);
    }

    pub fn insert_tag(&mut self, thread_id: &str, tag: Tag) {
        self.tags.entry(thread_id.to_string()).or_default().push(tag);
    }

    pub fn get(&self, id: &str) -> Option<&Thread> {
        self.nodes.get(id)
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of every thread in the arena.
    pub fn thread_ids(&self) -> Vec<String> {
        self.nodes.keys().cloned().collect()
    }

    /// Distinct author ids across all threads in the arena.
    pub fn author_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.nodes.values().map(|t| t.author_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }

    /// Ids of the direct replies to `id` that are loaded in the arena.
    pub fn child_ids(&self, id: &str) -> &[String] {
        self.children.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Render a nested view of thread `id` following `include`.
    pub fn render(&self, id: &str, include: &Include) -> Option<ThreadView> {
        let thread = self.nodes.get(id)?;

        let author = if include.author {
            self.authors.get(&thread.author_id).cloned()
        } else {
            None
        };
        let liked_by = include
            .liked_by
            .then(|| self.likes.get(id).cloned().unwrap_or_default());
        let tags = include
            .tags
            .then(|| self.tags.get(id).cloned().unwrap_or_default());
        let replies = include.replies.map(|inner| {
            self.child_ids(id)
                .iter()
                .filter_map(|child| self.render(child, inner))
                .collect()
        });

        Some(ThreadView {
            thread: thread.clone(),
            author,
            liked_by,
            tags,
            replies,
        })
    }

    /// Render several roots in the given order, skipping ids not in the arena.
    pub fn render_all(&self, ids: &[String], include: &Include) -> Vec<ThreadView> {
        ids.iter()
            .filter_map(|id| self.render(id, include))
            .collect()
    }
}
