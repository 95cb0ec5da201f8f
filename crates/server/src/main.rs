use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    routing::{delete, get, post},
    Json, Router,
};
use shared::{
    domain::{CommentId, PostId},
    error::ApiError,
    protocol::{
        Comment, CommentDraft, LoginRequest, LoginResponse, Post, PostDraft, PostsResponse,
        RefreshRequest, TokenPair,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod config;
mod store;

use api::{
    add_comment, create_post, delete_comment, delete_post, get_post, like_comment, like_post,
    list_my_posts, list_posts, login, refresh, ApiContext, ListPostsQuery,
};
use auth::TokenIssuer;
use config::{load_settings, Settings};
use store::CommunityStore;

const MAX_BODY_BYTES: usize = 64 * 1024;

#[derive(Clone)]
struct AppState {
    api: ApiContext,
}

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = load_settings();
    let state = Arc::new(build_state(&settings).await);
    let posts = state.api.store.post_count().await;
    let app = build_router(state);

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, posts, "server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

async fn build_state(settings: &Settings) -> AppState {
    let store = CommunityStore::new();
    store.seed_demo_posts(settings.seed_posts).await;
    AppState {
        api: ApiContext {
            store,
            tokens: TokenIssuer::new(
                &settings.jwt_secret,
                settings.access_token_ttl_seconds,
                settings.refresh_token_ttl_seconds,
            ),
        },
    }
}

fn build_router(state: Arc<AppState>) -> Router {
    let api = Router::new()
        .route("/auth/login", post(http_login))
        .route("/auth/refresh", post(http_refresh))
        .route("/community/posts", get(http_list_posts).post(http_create_post))
        .route(
            "/community/posts/:post_id",
            get(http_get_post).delete(http_delete_post),
        )
        .route("/community/posts/:post_id/like", post(http_like_post))
        .route("/community/posts/:post_id/comments", post(http_add_comment))
        .route("/community/comments/:comment_id", delete(http_delete_comment))
        .route("/community/comments/:comment_id/like", post(http_like_comment))
        .route("/community/my-posts", get(http_my_posts));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/api", api)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_BYTES))
        .with_state(state)
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status =
        StatusCode::from_u16(err.code.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(err))
}

async fn healthz() -> &'static str {
    "ok"
}

async fn http_login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> HttpResult<Json<LoginResponse>> {
    login(&state.api, req).await.map(Json).map_err(reject)
}

async fn http_refresh(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> HttpResult<Json<TokenPair>> {
    refresh(&state.api, req).await.map(Json).map_err(reject)
}

async fn http_list_posts(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ListPostsQuery>,
) -> HttpResult<Json<PostsResponse>> {
    list_posts(&state.api, &query).await.map(Json).map_err(reject)
}

async fn http_my_posts(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<ListPostsQuery>,
) -> HttpResult<Json<PostsResponse>> {
    let caller = state.api.tokens.authenticate(&headers).map_err(reject)?;
    list_my_posts(&state.api, &caller, &query)
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_create_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Json(draft): Json<PostDraft>,
) -> HttpResult<(StatusCode, Json<Post>)> {
    let caller = state.api.tokens.authenticate(&headers).map_err(reject)?;
    let post = create_post(&state.api, &caller, draft).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(post)))
}

async fn http_get_post(
    State(state): State<Arc<AppState>>,
    Path(post_id): Path<String>,
) -> HttpResult<Json<Post>> {
    get_post(&state.api, &PostId::new(post_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_like_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> HttpResult<Json<Post>> {
    state.api.tokens.authenticate(&headers).map_err(reject)?;
    like_post(&state.api, &PostId::new(post_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_add_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
    Json(draft): Json<CommentDraft>,
) -> HttpResult<(StatusCode, Json<Comment>)> {
    let caller = state.api.tokens.authenticate(&headers).map_err(reject)?;
    let comment = add_comment(&state.api, &caller, &PostId::new(post_id), draft)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(comment)))
}

async fn http_like_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(comment_id): Path<String>,
) -> HttpResult<Json<Comment>> {
    state.api.tokens.authenticate(&headers).map_err(reject)?;
    like_comment(&state.api, &CommentId::new(comment_id))
        .await
        .map(Json)
        .map_err(reject)
}

async fn http_delete_post(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(post_id): Path<String>,
) -> HttpResult<StatusCode> {
    let caller = state.api.tokens.authenticate(&headers).map_err(reject)?;
    delete_post(&state.api, &caller, &PostId::new(post_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_delete_comment(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(comment_id): Path<String>,
) -> HttpResult<StatusCode> {
    let caller = state.api.tokens.authenticate(&headers).map_err(reject)?;
    delete_comment(&state.api, &caller, &CommentId::new(comment_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
