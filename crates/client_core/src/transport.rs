//! REST adapter for the community backend.

use async_trait::async_trait;
use reqwest::{Client, Method, Response, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use shared::{
    domain::{CommentId, PostId},
    protocol::{
        Comment, CommentDraft, LoginRequest, LoginResponse, Post, PostDraft, PostsResponse,
        RefreshRequest, TokenPair, UserProfile,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use url::Url;

use crate::{
    config::{ClientSettings, SettingsError},
    error::ClientError,
    source::{CommunitySource, FeedQuery, FeedScope, Page, PageCursor},
};

#[derive(Debug, Deserialize)]
struct LikeCount {
    likes: u32,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: serde_json::Value,
}

struct ApiRequest {
    method: Method,
    segments: Vec<String>,
    query: Vec<(&'static str, String)>,
    body: Option<serde_json::Value>,
    allow_refresh: bool,
}

impl ApiRequest {
    fn new(method: Method, segments: &[&str]) -> Self {
        Self {
            method,
            segments: segments.iter().map(|s| s.to_string()).collect(),
            query: Vec::new(),
            body: None,
            allow_refresh: true,
        }
    }

    fn get(segments: &[&str]) -> Self {
        Self::new(Method::GET, segments)
    }

    fn post(segments: &[&str]) -> Self {
        Self::new(Method::POST, segments)
    }

    fn delete(segments: &[&str]) -> Self {
        Self::new(Method::DELETE, segments)
    }

    fn query(mut self, key: &'static str, value: impl ToString) -> Self {
        self.query.push((key, value.to_string()));
        self
    }

    fn json(mut self, body: &impl Serialize) -> Result<Self, ClientError> {
        let value = serde_json::to_value(body)
            .map_err(|err| ClientError::Validation(format!("unserializable request body: {err}")))?;
        self.body = Some(value);
        Ok(self)
    }

    fn without_refresh(mut self) -> Self {
        self.allow_refresh = false;
        self
    }
}

pub struct HttpCommunitySource {
    http: Client,
    base_url: Url,
    session: RwLock<Option<TokenPair>>,
}

impl HttpCommunitySource {
    pub fn new(settings: &ClientSettings) -> Result<Self, SettingsError> {
        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|err| SettingsError::HttpClient(err.to_string()))?;
        Ok(Self {
            http,
            base_url: settings.base_url()?,
            session: RwLock::new(None),
        })
    }

    pub async fn set_session(&self, tokens: TokenPair) {
        *self.session.write().await = Some(tokens);
    }

    pub async fn clear_session(&self) {
        *self.session.write().await = None;
    }

    pub async fn session(&self) -> Option<TokenPair> {
        self.session.read().await.clone()
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile, ClientError> {
        let request = ApiRequest::post(&["auth", "login"])
            .json(&LoginRequest {
                email: email.to_string(),
                password: password.to_string(),
            })?
            .without_refresh();
        let response: LoginResponse = self.execute(&request).await?;
        self.set_session(TokenPair {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
        })
        .await;
        Ok(response.user)
    }

    /// Exchanges the refresh token for a new pair. `Ok(false)` when there is no session.
    async fn refresh_session(&self) -> Result<bool, ClientError> {
        let Some(refresh_token) = self
            .session
            .read()
            .await
            .as_ref()
            .map(|tokens| tokens.refresh_token.clone())
        else {
            return Ok(false);
        };

        let request = ApiRequest::post(&["auth", "refresh"])
            .json(&RefreshRequest { refresh_token })?
            .without_refresh();
        let response = self.dispatch(&request).await?;
        let tokens: TokenPair = decode(response).await?;
        self.set_session(tokens).await;
        Ok(true)
    }

    fn endpoint(&self, segments: &[String]) -> Result<Url, ClientError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::Validation(format!("base url '{}' cannot hold paths", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn dispatch(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        let url = self.endpoint(&request.segments)?;
        debug!(method = %request.method, %url, "community request");

        let mut builder = self.http.request(request.method.clone(), url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(tokens) = self.session.read().await.as_ref() {
            builder = builder.bearer_auth(&tokens.access_token);
        }
        Ok(builder.send().await?)
    }

    async fn execute<T: DeserializeOwned>(&self, request: &ApiRequest) -> Result<T, ClientError> {
        decode(self.send(request).await?).await
    }

    /// For endpoints answering with an empty body.
    async fn execute_empty(&self, request: &ApiRequest) -> Result<(), ClientError> {
        successful_body(self.send(request).await?).await.map(drop)
    }

    /// Dispatches once, refreshing the session and replaying on a 401.
    async fn send(&self, request: &ApiRequest) -> Result<Response, ClientError> {
        let mut response = self.dispatch(request).await?;

        if response.status() == StatusCode::UNAUTHORIZED && request.allow_refresh {
            match self.refresh_session().await {
                Ok(true) => response = self.dispatch(request).await?,
                Ok(false) => {}
                Err(err) => {
                    warn!(error = %err, "session refresh failed; signing out");
                    self.clear_session().await;
                }
            }
        }

        Ok(response)
    }
}

async fn successful_body(response: Response) -> Result<Vec<u8>, ClientError> {
    let status = response.status();
    let body = response.bytes().await?;
    if !status.is_success() {
        return Err(ClientError::Server {
            status: status.as_u16(),
            message: error_message(status, &body),
        });
    }
    Ok(body.to_vec())
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
    let status = response.status();
    let body = successful_body(response).await?;
    serde_json::from_slice(&body).map_err(|err| ClientError::Server {
        status: status.as_u16(),
        message: format!("malformed response body: {err}"),
    })
}

fn error_message(status: StatusCode, body: &[u8]) -> String {
    serde_json::from_slice::<ErrorBody>(body)
        .ok()
        .and_then(|body| match body.message {
            serde_json::Value::String(message) => Some(message),
            serde_json::Value::Array(items) => Some(
                items
                    .iter()
                    .filter_map(serde_json::Value::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        })
        .filter(|message| !message.trim().is_empty())
        .unwrap_or_else(|| {
            status
                .canonical_reason()
                .unwrap_or("request failed")
                .to_string()
        })
}

#[async_trait]
impl CommunitySource for HttpCommunitySource {
    async fn fetch_page(
        &self,
        query: &FeedQuery,
        cursor: Option<PageCursor>,
        page_size: u32,
    ) -> Result<Page, ClientError> {
        let page = cursor.unwrap_or(PageCursor::FIRST).page();
        let mut request = match query.scope {
            FeedScope::Community => {
                let mut request = ApiRequest::get(&["community", "posts"]);
                if let Some(category) = query.category {
                    request = request.query("category", category);
                }
                if let Some(search) = &query.search {
                    request = request.query("search", search);
                }
                request
            }
            FeedScope::Mine => ApiRequest::get(&["community", "my-posts"]),
        };
        request = request.query("page", page).query("limit", page_size);

        let response: PostsResponse = self.execute(&request).await?;
        Ok(Page::from(response))
    }

    async fn like_post(&self, id: &PostId) -> Result<u32, ClientError> {
        let request = ApiRequest::post(&["community", "posts", id.as_str(), "like"]);
        let liked: LikeCount = self.execute(&request).await?;
        Ok(liked.likes)
    }

    async fn create_post(&self, draft: &PostDraft) -> Result<Post, ClientError> {
        let request = ApiRequest::post(&["community", "posts"]).json(draft)?;
        self.execute(&request).await
    }

    async fn fetch_post(&self, id: &PostId) -> Result<Post, ClientError> {
        self.execute(&ApiRequest::get(&["community", "posts", id.as_str()]))
            .await
    }

    async fn add_comment(
        &self,
        post_id: &PostId,
        draft: &CommentDraft,
    ) -> Result<Comment, ClientError> {
        let request =
            ApiRequest::post(&["community", "posts", post_id.as_str(), "comments"]).json(draft)?;
        self.execute(&request).await
    }

    async fn like_comment(&self, id: &CommentId) -> Result<u32, ClientError> {
        let request = ApiRequest::post(&["community", "comments", id.as_str(), "like"]);
        let liked: LikeCount = self.execute(&request).await?;
        Ok(liked.likes)
    }

    async fn delete_post(&self, id: &PostId) -> Result<(), ClientError> {
        self.execute_empty(&ApiRequest::delete(&["community", "posts", id.as_str()]))
            .await
    }

    async fn delete_comment(&self, id: &CommentId) -> Result<(), ClientError> {
        self.execute_empty(&ApiRequest::delete(&["community", "comments", id.as_str()]))
            .await
    }
}

#[cfg(test)]
#[path = "tests/transport_tests.rs"]
mod tests;
