//! Fixtures and a scripted `CommunitySource` for controller tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use shared::{
    domain::{CommentId, PostCategory, PostId, UserId},
    protocol::{Author, Comment, CommentDraft, Post, PostDraft},
};
use tokio::sync::oneshot;

use crate::{
    error::ClientError,
    source::{CommunitySource, FeedQuery, Page, PageCursor},
};

pub fn author() -> Author {
    Author {
        id: UserId::new("u-1"),
        name: "Minh".to_string(),
        avatar: None,
    }
}

pub fn post(id: &str, likes: u32) -> Post {
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
    Post {
        id: PostId::new(id),
        title: format!("post {id}"),
        content: "VN-Index retest of 1,250".to_string(),
        summary: None,
        category: PostCategory::Discussion,
        tags: Vec::new(),
        symbols: Vec::new(),
        thumbnail: None,
        views: 0,
        likes,
        is_published: true,
        is_pinned: false,
        created_at: at,
        updated_at: at,
        author: author(),
        comments: None,
    }
}

pub fn comment(id: &str, likes: u32) -> Comment {
    let at = Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).unwrap();
    Comment {
        id: CommentId::new(id),
        content: format!("comment {id}"),
        likes,
        created_at: at,
        updated_at: at,
        author: author(),
        parent_id: None,
    }
}

pub fn page(items: Vec<Post>, next: Option<u32>) -> Page {
    Page {
        items,
        next_cursor: next.map(PageCursor),
        has_more: next.is_some(),
    }
}

pub fn network_error() -> ClientError {
    ClientError::Network("connection reset".to_string())
}

/// Queue of responses; each call takes the next one and waits until it is released.
pub struct Script<T> {
    pending: Mutex<VecDeque<oneshot::Receiver<Result<T, ClientError>>>>,
}

impl<T> Default for Script<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
        }
    }
}

impl<T> Script<T> {
    pub fn ready(&self, outcome: Result<T, ClientError>) {
        let tx = self.gated();
        let _ = tx.send(outcome);
    }

    pub fn gated(&self) -> oneshot::Sender<Result<T, ClientError>> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().push_back(rx);
        tx
    }

    async fn next(&self) -> Result<T, ClientError> {
        let rx = self.pending.lock().unwrap().pop_front();
        match rx {
            Some(rx) => rx
                .await
                .unwrap_or_else(|_| Err(ClientError::Network("script dropped".to_string()))),
            None => Err(ClientError::Network("unscripted call".to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchCall {
    pub query: FeedQuery,
    pub cursor: Option<PageCursor>,
    pub page_size: u32,
}

#[derive(Default)]
pub struct ScriptedSource {
    pub pages: Script<Page>,
    pub likes: Script<u32>,
    pub creates: Script<Post>,
    pub posts: Script<Post>,
    pub comments: Script<Comment>,
    pub comment_likes: Script<u32>,
    pub deletes: Script<()>,
    pub comment_deletes: Script<()>,
    pub fetch_calls: Mutex<Vec<FetchCall>>,
    pub like_calls: Mutex<Vec<PostId>>,
    pub delete_calls: Mutex<Vec<PostId>>,
}

impl ScriptedSource {
    pub fn shared() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.fetch_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl CommunitySource for ScriptedSource {
    async fn fetch_page(
        &self,
        query: &FeedQuery,
        cursor: Option<PageCursor>,
        page_size: u32,
    ) -> Result<Page, ClientError> {
        self.fetch_calls.lock().unwrap().push(FetchCall {
            query: query.clone(),
            cursor,
            page_size,
        });
        self.pages.next().await
    }

    async fn like_post(&self, id: &PostId) -> Result<u32, ClientError> {
        self.like_calls.lock().unwrap().push(id.clone());
        self.likes.next().await
    }

    async fn create_post(&self, _draft: &PostDraft) -> Result<Post, ClientError> {
        self.creates.next().await
    }

    async fn fetch_post(&self, _id: &PostId) -> Result<Post, ClientError> {
        self.posts.next().await
    }

    async fn add_comment(
        &self,
        _post_id: &PostId,
        _draft: &CommentDraft,
    ) -> Result<Comment, ClientError> {
        self.comments.next().await
    }

    async fn like_comment(&self, _id: &CommentId) -> Result<u32, ClientError> {
        self.comment_likes.next().await
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), ClientError> {
        self.delete_calls.lock().unwrap().push(id.clone());
        self.deletes.next().await
    }

    async fn delete_comment(&self, _id: &CommentId) -> Result<(), ClientError> {
        self.comment_deletes.next().await
    }
}
