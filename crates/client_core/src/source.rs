use async_trait::async_trait;
use shared::{
    domain::{CommentId, PostCategory, PostId},
    protocol::{Comment, CommentDraft, Post, PostDraft, PostsResponse},
};

use crate::error::ClientError;

/// Which listing a feed pages through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FeedScope {
    #[default]
    Community,
    Mine,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedQuery {
    pub scope: FeedScope,
    pub category: Option<PostCategory>,
    pub search: Option<String>,
}

impl FeedQuery {
    pub fn mine() -> Self {
        Self {
            scope: FeedScope::Mine,
            ..Self::default()
        }
    }
}

/// Page-number cursor. The first page is requested with no cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PageCursor(pub u32);

impl PageCursor {
    pub const FIRST: PageCursor = PageCursor(1);

    pub fn page(self) -> u32 {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page {
    pub items: Vec<Post>,
    pub next_cursor: Option<PageCursor>,
    pub has_more: bool,
}

impl From<PostsResponse> for Page {
    fn from(response: PostsResponse) -> Self {
        let has_more = response.meta.has_more();
        Self {
            items: response.data,
            next_cursor: has_more.then(|| PageCursor(response.meta.page + 1)),
            has_more,
        }
    }
}

/// Remote collaborator the controllers fetch from and mutate through.
#[async_trait]
pub trait CommunitySource: Send + Sync {
    async fn fetch_page(
        &self,
        query: &FeedQuery,
        cursor: Option<PageCursor>,
        page_size: u32,
    ) -> Result<Page, ClientError>;

    /// Returns the authoritative like count after the like is recorded.
    async fn like_post(&self, id: &PostId) -> Result<u32, ClientError>;

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, ClientError>;

    async fn fetch_post(&self, id: &PostId) -> Result<Post, ClientError>;

    async fn add_comment(
        &self,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Comment, ClientError>;

    async fn like_comment(&self, id: &CommentId) -> Result<u32, ClientError>;

    /// Deletes a post written by the signed-in user.
    async fn delete_post(&self, id: &PostId) -> Result<(), ClientError>;

    async fn delete_comment(&self, id: &CommentId) -> Result<(), ClientError>;
}
