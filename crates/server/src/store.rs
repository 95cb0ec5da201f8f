//! In-memory community data: posts, their comments and known users.

use std::{cmp::Reverse, collections::HashMap, sync::Arc};

use chrono::{Duration, Utc};
use shared::{
    domain::{CommentId, PostCategory, PostId, UserId},
    protocol::{Author, Comment, Post, UserProfile},
};
use thiserror::Error;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("post {0} not found")]
    PostNotFound(PostId),
    #[error("comment {0} not found")]
    CommentNotFound(CommentId),
    #[error("parent comment {0} does not belong to this post")]
    UnknownParent(CommentId),
    #[error("only the author can delete this {0}")]
    NotAuthor(&'static str),
}

#[derive(Debug, Clone, Default)]
pub struct PostFilter {
    pub category: Option<PostCategory>,
    pub search: Option<String>,
    pub author: Option<UserId>,
}

impl PostFilter {
    fn matches(&self, post: &Post) -> bool {
        if self.category.is_some_and(|category| category != post.category) {
            return false;
        }
        if self.author.as_ref().is_some_and(|author| author != &post.author.id) {
            return false;
        }
        match self.search.as_deref().map(str::trim) {
            Some(needle) if !needle.is_empty() => {
                let needle = needle.to_lowercase();
                post.title.to_lowercase().contains(&needle)
                    || post.content.to_lowercase().contains(&needle)
                    || post
                        .summary
                        .as_deref()
                        .is_some_and(|summary| summary.to_lowercase().contains(&needle))
            }
            _ => true,
        }
    }
}

#[derive(Default)]
struct Inner {
    posts: Vec<Post>,
    users: HashMap<String, UserProfile>,
}

impl Inner {
    fn post_mut(&mut self, id: &PostId) -> Result<&mut Post, StoreError> {
        self.posts
            .iter_mut()
            .find(|post| &post.id == id)
            .ok_or_else(|| StoreError::PostNotFound(id.clone()))
    }
}

#[derive(Clone, Default)]
pub struct CommunityStore {
    inner: Arc<RwLock<Inner>>,
}

impl CommunityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_post(&self, mut post: Post) -> Post {
        post.comments.get_or_insert_with(Vec::new);
        self.inner.write().await.posts.push(post.clone());
        post
    }

    /// Pinned posts first, then newest first. Returns the requested slice and the match count.
    /// Listed posts carry no comments.
    pub async fn list_posts(&self, filter: &PostFilter, offset: usize, limit: usize) -> (Vec<Post>, u64) {
        let inner = self.inner.read().await;
        let mut matching: Vec<&Post> = inner.posts.iter().filter(|post| filter.matches(post)).collect();
        matching.sort_by_key(|post| (Reverse(post.is_pinned), Reverse(post.created_at)));

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|post| Post {
                comments: None,
                ..post.clone()
            })
            .collect();
        (items, total)
    }

    /// Returns the post with its comments and counts the view.
    pub async fn view_post(&self, id: &PostId) -> Result<Post, StoreError> {
        let mut inner = self.inner.write().await;
        let post = inner.post_mut(id)?;
        post.views = post.views.saturating_add(1);
        Ok(post.clone())
    }

    pub async fn like_post(&self, id: &PostId) -> Result<Post, StoreError> {
        let mut inner = self.inner.write().await;
        let post = inner.post_mut(id)?;
        post.likes = post.likes.saturating_add(1);
        Ok(Post {
            comments: None,
            ..post.clone()
        })
    }

    pub async fn add_comment(&self, post_id: &PostId, comment: Comment) -> Result<Comment, StoreError> {
        let mut inner = self.inner.write().await;
        let post = inner.post_mut(post_id)?;
        let comments = post.comments.get_or_insert_with(Vec::new);
        if let Some(parent) = &comment.parent_id {
            if !comments.iter().any(|existing| &existing.id == parent) {
                return Err(StoreError::UnknownParent(parent.clone()));
            }
        }
        comments.push(comment.clone());
        Ok(comment)
    }

    pub async fn like_comment(&self, id: &CommentId) -> Result<Comment, StoreError> {
        let mut inner = self.inner.write().await;
        let comment = inner
            .posts
            .iter_mut()
            .filter_map(|post| post.comments.as_mut())
            .flatten()
            .find(|comment| &comment.id == id)
            .ok_or_else(|| StoreError::CommentNotFound(id.clone()))?;
        comment.likes = comment.likes.saturating_add(1);
        Ok(comment.clone())
    }

    pub async fn delete_post(&self, id: &PostId, caller: &UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let index = inner
            .posts
            .iter()
            .position(|post| &post.id == id)
            .ok_or_else(|| StoreError::PostNotFound(id.clone()))?;
        if &inner.posts[index].author.id != caller {
            return Err(StoreError::NotAuthor("post"));
        }
        inner.posts.remove(index);
        Ok(())
    }

    /// Removes the comment together with its direct replies.
    pub async fn delete_comment(&self, id: &CommentId, caller: &UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.write().await;
        let comments = inner
            .posts
            .iter_mut()
            .filter_map(|post| post.comments.as_mut())
            .find(|comments| comments.iter().any(|comment| &comment.id == id))
            .ok_or_else(|| StoreError::CommentNotFound(id.clone()))?;
        if comments
            .iter()
            .any(|comment| &comment.id == id && &comment.author.id != caller)
        {
            return Err(StoreError::NotAuthor("comment"));
        }
        comments.retain(|comment| &comment.id != id && comment.parent_id.as_ref() != Some(id));
        Ok(())
    }

    /// Returns the profile for `email`, registering it on first sight.
    pub async fn upsert_user(&self, email: &str) -> UserProfile {
        let key = email.trim().to_lowercase();
        let mut inner = self.inner.write().await;
        inner
            .users
            .entry(key.clone())
            .or_insert_with(|| {
                let name = key.split('@').next().unwrap_or(&key).to_string();
                UserProfile {
                    id: UserId::new(uuid::Uuid::new_v4().to_string()),
                    email: key.clone(),
                    name,
                    avatar: None,
                }
            })
            .clone()
    }

    pub async fn post_count(&self) -> usize {
        self.inner.read().await.posts.len()
    }

    /// Fills the store with `count` demo posts, one hour apart, the oldest pinned.
    pub async fn seed_demo_posts(&self, count: usize) {
        const TOPICS: [(&str, &str); 6] = [
            ("Rate decision preview", "FOMC"),
            ("Earnings season notes", "AAPL"),
            ("Semiconductor supply check", "NVDA"),
            ("Energy sector rotation", "XOM"),
            ("Small caps breadth", "IWM"),
            ("Dollar strength and EM", "DXY"),
        ];
        let authors = [
            Author {
                id: UserId::new("seed-research-desk"),
                name: "Research Desk".into(),
                avatar: None,
            },
            Author {
                id: UserId::new("seed-macro-notes"),
                name: "Macro Notes".into(),
                avatar: None,
            },
        ];

        let now = Utc::now();
        let mut inner = self.inner.write().await;
        for index in 0..count {
            let (topic, symbol) = TOPICS[index % TOPICS.len()];
            let category = PostCategory::ALL[index % PostCategory::ALL.len()];
            let created_at = now - Duration::hours((count - index) as i64);
            inner.posts.push(Post {
                id: PostId::new(uuid::Uuid::new_v4().to_string()),
                title: format!("{topic} #{}", index + 1),
                content: format!("Notes on {symbol} for the week ahead."),
                summary: Some(format!("{category} thread about {symbol}")),
                category,
                tags: vec![category.as_str().to_lowercase()],
                symbols: vec![symbol.to_string()],
                thumbnail: None,
                views: 0,
                likes: (index % 7) as u32,
                is_published: true,
                is_pinned: index == 0,
                created_at,
                updated_at: created_at,
                author: authors[index % authors.len()].clone(),
                comments: Some(Vec::new()),
            });
        }
    }
}

#[cfg(test)]
#[path = "tests/store_tests.rs"]
mod tests;
