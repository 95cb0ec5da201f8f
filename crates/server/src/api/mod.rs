use chrono::Utc;
use serde::{Deserialize, Serialize};
use shared::{
    domain::{CommentId, PostCategory, PostId},
    error::ApiError,
    protocol::{
        Author, Comment, CommentDraft, LoginRequest, LoginResponse, PageMeta, Post, PostDraft,
        PostsResponse, RefreshRequest, TokenPair,
    },
};
use tracing::info;

use crate::{
    auth::{TokenIssuer, TokenKind},
    store::{CommunityStore, PostFilter, StoreError},
};

pub const DEFAULT_LIMIT: u32 = 20;
pub const MAX_LIMIT: u32 = 100;

#[derive(Clone)]
pub struct ApiContext {
    pub store: CommunityStore,
    pub tokens: TokenIssuer,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct ListPostsQuery {
    pub category: Option<PostCategory>,
    pub search: Option<String>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl ListPostsQuery {
    fn page(&self) -> u32 {
        self.page.unwrap_or(1).max(1)
    }

    fn limit(&self) -> u32 {
        self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT)
    }
}

pub async fn list_posts(ctx: &ApiContext, query: &ListPostsQuery) -> Result<PostsResponse, ApiError> {
    let filter = PostFilter {
        category: query.category,
        search: query.search.clone(),
        author: None,
    };
    Ok(paginate(ctx, &filter, query).await)
}

/// Paging only; category and search are ignored for the caller's own posts.
pub async fn list_my_posts(
    ctx: &ApiContext,
    caller: &Author,
    query: &ListPostsQuery,
) -> Result<PostsResponse, ApiError> {
    let filter = PostFilter {
        author: Some(caller.id.clone()),
        ..PostFilter::default()
    };
    Ok(paginate(ctx, &filter, query).await)
}

async fn paginate(ctx: &ApiContext, filter: &PostFilter, query: &ListPostsQuery) -> PostsResponse {
    let page = query.page();
    let limit = query.limit();
    let offset = (page as usize - 1) * limit as usize;
    let (data, total) = ctx.store.list_posts(filter, offset, limit as usize).await;
    PostsResponse {
        data,
        meta: PageMeta {
            page,
            limit,
            total,
            total_pages: total.div_ceil(u64::from(limit)) as u32,
        },
    }
}

pub async fn get_post(ctx: &ApiContext, id: &PostId) -> Result<Post, ApiError> {
    ctx.store.view_post(id).await.map_err(rejected)
}

pub async fn create_post(ctx: &ApiContext, caller: &Author, draft: PostDraft) -> Result<Post, ApiError> {
    draft
        .validate()
        .map_err(|err| ApiError::validation(err.to_string()))?;
    let draft = draft.normalized();

    let now = Utc::now();
    let post = ctx
        .store
        .insert_post(Post {
            id: PostId::new(uuid::Uuid::new_v4().to_string()),
            title: draft.title,
            content: draft.content,
            summary: draft.summary,
            category: draft.category.unwrap_or(PostCategory::Discussion),
            tags: draft.tags,
            symbols: draft.symbols,
            thumbnail: draft.thumbnail,
            views: 0,
            likes: 0,
            is_published: draft.is_published.unwrap_or(true),
            is_pinned: false,
            created_at: now,
            updated_at: now,
            author: caller.clone(),
            comments: None,
        })
        .await;
    info!(post_id = %post.id, author = %caller.id, "post created");
    Ok(post)
}

pub async fn like_post(ctx: &ApiContext, id: &PostId) -> Result<Post, ApiError> {
    ctx.store.like_post(id).await.map_err(rejected)
}

pub async fn add_comment(
    ctx: &ApiContext,
    caller: &Author,
    post_id: &PostId,
    draft: CommentDraft,
) -> Result<Comment, ApiError> {
    draft
        .validate()
        .map_err(|err| ApiError::validation(err.to_string()))?;

    let now = Utc::now();
    let comment = Comment {
        id: CommentId::new(uuid::Uuid::new_v4().to_string()),
        content: draft.content.trim().to_string(),
        likes: 0,
        created_at: now,
        updated_at: now,
        author: caller.clone(),
        parent_id: draft.parent_id,
    };
    ctx.store
        .add_comment(post_id, comment)
        .await
        .map_err(rejected)
}

pub async fn like_comment(ctx: &ApiContext, id: &CommentId) -> Result<Comment, ApiError> {
    ctx.store.like_comment(id).await.map_err(rejected)
}

pub async fn delete_post(ctx: &ApiContext, caller: &Author, id: &PostId) -> Result<(), ApiError> {
    ctx.store
        .delete_post(id, &caller.id)
        .await
        .map_err(rejected)?;
    info!(post_id = %id, author = %caller.id, "post deleted");
    Ok(())
}

pub async fn delete_comment(
    ctx: &ApiContext,
    caller: &Author,
    id: &CommentId,
) -> Result<(), ApiError> {
    ctx.store
        .delete_comment(id, &caller.id)
        .await
        .map_err(rejected)
}

/// Any non-blank password is accepted; the account is created on first login.
pub async fn login(ctx: &ApiContext, request: LoginRequest) -> Result<LoginResponse, ApiError> {
    if request.email.trim().is_empty() || request.password.trim().is_empty() {
        return Err(ApiError::validation("email and password are required"));
    }

    let user = ctx.store.upsert_user(&request.email).await;
    let tokens = ctx.tokens.issue(&Author {
        id: user.id.clone(),
        name: user.name.clone(),
        avatar: user.avatar.clone(),
    })?;
    info!(user_id = %user.id, "user signed in");
    Ok(LoginResponse {
        user,
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    })
}

pub async fn refresh(ctx: &ApiContext, request: RefreshRequest) -> Result<TokenPair, ApiError> {
    let claims = ctx.tokens.verify(&request.refresh_token, TokenKind::Refresh)?;
    ctx.tokens.issue(&claims.author())
}

fn rejected(err: StoreError) -> ApiError {
    match err {
        StoreError::PostNotFound(_) | StoreError::CommentNotFound(_) => {
            ApiError::not_found(err.to_string())
        }
        StoreError::UnknownParent(_) => ApiError::validation(err.to_string()),
        StoreError::NotAuthor(_) => ApiError::forbidden(err.to_string()),
    }
}

#[cfg(test)]
#[path = "tests/mod_tests.rs"]
mod tests;
