//! Single-post view: the opened post, its comments and their likes.

use std::sync::Arc;

use shared::{
    domain::{CommentId, PostId},
    protocol::{Comment, CommentDraft, Post},
};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tracing::warn;

use crate::{
    error::{ClientError, FeedError},
    source::CommunitySource,
};

#[derive(Debug, Clone, Default)]
pub struct DetailState {
    pub post: Option<Post>,
    pub loading: bool,
    pub last_error: Option<FeedError>,
    generation: u64,
    submissions: u32,
}

impl DetailState {
    /// True while any comment submission is outstanding.
    pub fn is_submitting(&self) -> bool {
        self.submissions > 0
    }

    pub fn comment(&self, id: &CommentId) -> Option<&Comment> {
        self.post
            .as_ref()
            .and_then(|post| post.comments.as_ref())
            .and_then(|comments| comments.iter().find(|comment| &comment.id == id))
    }

    fn post_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.post.as_mut().filter(|post| &post.id == id)
    }

    fn fail(&mut self, err: &ClientError) {
        self.last_error = Some(FeedError::from(err));
    }
}

pub struct PostDetailController {
    source: Arc<dyn CommunitySource>,
    runtime: Handle,
    state: Arc<watch::Sender<DetailState>>,
}

impl PostDetailController {
    pub fn new(source: Arc<dyn CommunitySource>) -> Self {
        Self::with_runtime(source, Handle::current())
    }

    pub fn with_runtime(source: Arc<dyn CommunitySource>, runtime: Handle) -> Self {
        let (state, _) = watch::channel(DetailState::default());
        Self {
            source,
            runtime,
            state: Arc::new(state),
        }
    }

    pub fn snapshot(&self) -> DetailState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<DetailState> {
        self.state.subscribe()
    }

    /// Opens `id`, superseding any post still loading.
    pub fn open(&self, id: &PostId) -> JoinHandle<()> {
        let mut generation = 0;
        self.state.send_modify(|state| {
            state.generation += 1;
            state.post = None;
            state.loading = true;
            state.last_error = None;
            generation = state.generation;
        });

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let id = id.clone();
        self.runtime.spawn(async move {
            let outcome = source.fetch_post(&id).await;
            state.send_if_modified(|state| {
                if state.generation != generation {
                    return false;
                }
                state.loading = false;
                match outcome {
                    Ok(post) => state.post = Some(post),
                    Err(err) => {
                        warn!(post_id = %id, error = %err, "fetch post failed");
                        state.fail(&err);
                    }
                }
                true
            });
        })
    }

    /// Likes the open post. Resolves to the server's count on success.
    pub fn like_post(&self) -> Option<JoinHandle<Option<u32>>> {
        let id = self.state.borrow().post.as_ref().map(|post| post.id.clone())?;

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        Some(self.runtime.spawn(async move {
            let outcome = source.like_post(&id).await;
            state.send_modify(|state| match &outcome {
                Ok(likes) => {
                    if let Some(post) = state.post_mut(&id) {
                        post.likes = *likes;
                    }
                }
                Err(err) => {
                    warn!(post_id = %id, error = %err, "like post failed");
                    state.fail(err);
                }
            });
            outcome.ok()
        }))
    }

    pub fn add_comment(&self, draft: CommentDraft) -> Option<JoinHandle<Option<Comment>>> {
        let post_id = self.state.borrow().post.as_ref().map(|post| post.id.clone())?;
        self.state.send_modify(|state| {
            state.submissions += 1;
            state.last_error = None;
        });

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        Some(self.runtime.spawn(async move {
            let outcome = source.add_comment(&post_id, &draft).await;
            state.send_modify(|state| {
                state.submissions = state.submissions.saturating_sub(1);
                match &outcome {
                    Ok(comment) => {
                        if let Some(post) = state.post_mut(&post_id) {
                            post.comments
                                .get_or_insert_with(Vec::new)
                                .push(comment.clone());
                        }
                    }
                    Err(err) => {
                        warn!(%post_id, error = %err, "add comment failed");
                        state.fail(err);
                    }
                }
            });
            outcome.ok()
        }))
    }

    pub fn like_comment(&self, id: &CommentId) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let id = id.clone();
        self.runtime.spawn(async move {
            let outcome = source.like_comment(&id).await;
            state.send_modify(|state| match outcome {
                Ok(likes) => {
                    let comment = state
                        .post
                        .as_mut()
                        .and_then(|post| post.comments.as_mut())
                        .and_then(|comments| comments.iter_mut().find(|comment| comment.id == id));
                    if let Some(comment) = comment {
                        comment.likes = likes;
                    }
                }
                Err(err) => {
                    warn!(comment_id = %id, error = %err, "like comment failed");
                    state.fail(&err);
                }
            });
        })
    }

    /// Deletes a comment; on success it and its direct replies leave the thread.
    pub fn delete_comment(&self, id: &CommentId) -> JoinHandle<bool> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let id = id.clone();
        self.runtime.spawn(async move {
            let outcome = source.delete_comment(&id).await;
            let deleted = outcome.is_ok();
            state.send_modify(|state| match outcome {
                Ok(()) => {
                    if let Some(comments) = state.post.as_mut().and_then(|post| post.comments.as_mut()) {
                        comments.retain(|comment| {
                            comment.id != id && comment.parent_id.as_ref() != Some(&id)
                        });
                    }
                }
                Err(err) => {
                    warn!(comment_id = %id, error = %err, "delete comment failed");
                    state.fail(&err);
                }
            });
            deleted
        })
    }

    pub fn clear_error(&self) {
        self.state
            .send_if_modified(|state| state.last_error.take().is_some());
    }
}

#[cfg(test)]
#[path = "tests/detail_tests.rs"]
mod tests;
