//! Filterable, paginated community feed with optimistic likes.
//!
//! The controller owns a single [`FeedState`] behind a `watch` channel. Every
//! public operation mutates that state synchronously and then schedules at most
//! one task on the captured runtime, so callers never block and observe progress
//! through [`FeedController::subscribe`] or [`FeedController::snapshot`].
//!
//! Page loads are serialized by [`LoadingState`]: a load is only dispatched from
//! `Idle`. Query changes bypass that gate and bump a generation counter instead;
//! completions carrying an older generation are dropped on arrival.

use std::{collections::HashMap, sync::Arc};

use shared::{
    domain::{PostCategory, PostId},
    protocol::{Post, PostDraft},
};
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, warn};

use crate::{
    error::{ClientError, FeedError},
    source::{CommunitySource, FeedQuery, Page, PageCursor},
};

pub const DEFAULT_PAGE_SIZE: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadingState {
    #[default]
    Idle,
    LoadingInitial,
    LoadingMore,
    Refreshing,
}

#[derive(Debug, Clone, Default)]
pub struct FeedState {
    pub items: Vec<Post>,
    pub cursor: Option<PageCursor>,
    pub query: FeedQuery,
    pub has_more: bool,
    pub loading: LoadingState,
    pub last_error: Option<FeedError>,
    generation: u64,
    submissions: u32,
    // Outstanding optimistic +1s per post, retired by server data.
    like_patches: HashMap<PostId, u32>,
}

impl FeedState {
    fn for_query(query: FeedQuery) -> Self {
        Self {
            query,
            ..Self::default()
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_submitting(&self) -> bool {
        self.submissions > 0
    }

    pub fn active_filter(&self) -> Option<PostCategory> {
        self.query.category
    }

    pub fn item(&self, id: &PostId) -> Option<&Post> {
        self.items.iter().find(|post| &post.id == id)
    }

    fn item_mut(&mut self, id: &PostId) -> Option<&mut Post> {
        self.items.iter_mut().find(|post| &post.id == id)
    }

    fn begin_generation(&mut self, loading: LoadingState) -> u64 {
        self.generation += 1;
        self.loading = loading;
        self.last_error = None;
        self.generation
    }

    fn clear_items(&mut self) {
        self.items.clear();
        self.cursor = None;
        self.has_more = false;
        self.like_patches.clear();
    }

    fn replace_items(&mut self, items: Vec<Post>) {
        self.items.clear();
        self.like_patches.clear();
        self.merge_items(items);
    }

    /// Appends unseen posts and overwrites known ones in place.
    fn merge_items(&mut self, items: Vec<Post>) {
        for post in items {
            self.like_patches.remove(&post.id);
            match self.items.iter().position(|existing| existing.id == post.id) {
                Some(index) => self.items[index] = post,
                None => self.items.push(post),
            }
        }
    }

    fn prepend_item(&mut self, post: Post) {
        self.like_patches.remove(&post.id);
        self.items.retain(|existing| existing.id != post.id);
        self.items.insert(0, post);
    }

    fn apply_optimistic_like(&mut self, id: &PostId) -> bool {
        let Some(post) = self.item_mut(id) else {
            return false;
        };
        post.likes = post.likes.saturating_add(1);
        *self.like_patches.entry(id.clone()).or_default() += 1;
        true
    }

    fn retire_like_patch(&mut self, id: &PostId) -> bool {
        match self.like_patches.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.like_patches.remove(id);
                true
            }
            None => false,
        }
    }

    fn settle_like(&mut self, id: &PostId, outcome: &Result<u32, ClientError>) -> bool {
        let patched = self.retire_like_patch(id);
        match outcome {
            Ok(likes) => {
                self.last_error = None;
                if let Some(post) = self.item_mut(id) {
                    post.likes = *likes;
                }
            }
            Err(err) => {
                self.last_error = Some(FeedError::from(err));
                if patched {
                    if let Some(post) = self.item_mut(id) {
                        post.likes = post.likes.saturating_sub(1);
                    }
                }
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy)]
enum PageApply {
    Replace,
    Append,
}

pub struct FeedController {
    source: Arc<dyn CommunitySource>,
    runtime: Handle,
    state: Arc<watch::Sender<FeedState>>,
    page_size: u32,
}

impl FeedController {
    /// Community feed on the current tokio runtime.
    ///
    /// Panics when called outside a runtime; use [`FeedController::with_runtime`]
    /// from plain threads.
    pub fn new(source: Arc<dyn CommunitySource>) -> Self {
        Self::with_runtime(source, FeedQuery::default(), Handle::current())
    }

    /// Feed of the signed-in user's own posts.
    pub fn mine(source: Arc<dyn CommunitySource>) -> Self {
        Self::with_runtime(source, FeedQuery::mine(), Handle::current())
    }

    pub fn with_runtime(source: Arc<dyn CommunitySource>, query: FeedQuery, runtime: Handle) -> Self {
        let (state, _) = watch::channel(FeedState::for_query(query));
        Self {
            source,
            runtime,
            state: Arc::new(state),
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    pub fn snapshot(&self) -> FeedState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedState> {
        self.state.subscribe()
    }

    pub fn updates(&self) -> WatchStream<FeedState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Loads the first page. Coalesced into a no-op while any load is running.
    pub fn load_initial(&self) -> Option<JoinHandle<()>> {
        self.start_reload(LoadingState::LoadingInitial)
    }

    /// Same as [`FeedController::load_initial`], reported as `Refreshing`.
    pub fn refresh(&self) -> Option<JoinHandle<()>> {
        self.start_reload(LoadingState::Refreshing)
    }

    pub fn load_more(&self) -> Option<JoinHandle<()>> {
        let mut dispatch = None;
        self.state.send_if_modified(|state| {
            if !state.has_more || state.loading != LoadingState::Idle {
                return false;
            }
            state.loading = LoadingState::LoadingMore;
            dispatch = Some((state.generation, state.query.clone(), state.cursor));
            true
        });

        let Some((generation, query, cursor)) = dispatch else {
            debug!("feed load_more skipped");
            return None;
        };
        Some(self.spawn_page_fetch(generation, query, cursor, PageApply::Append))
    }

    pub fn set_filter(&self, category: Option<PostCategory>) -> Option<JoinHandle<()>> {
        self.change_query(|query| {
            if query.category == category {
                return false;
            }
            query.category = category;
            true
        })
    }

    /// Blank text clears the search.
    pub fn set_search(&self, text: &str) -> Option<JoinHandle<()>> {
        let search = Some(text.trim().to_string()).filter(|text| !text.is_empty());
        self.change_query(move |query| {
            if query.search == search {
                return false;
            }
            query.search = search;
            true
        })
    }

    pub fn like_item(&self, id: &PostId) -> JoinHandle<()> {
        self.state
            .send_if_modified(|state| state.apply_optimistic_like(id));

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let id = id.clone();
        self.runtime.spawn(async move {
            let outcome = source.like_post(&id).await;
            if let Err(err) = &outcome {
                warn!(post_id = %id, error = %err, "like request failed");
            }
            state.send_if_modified(|state| state.settle_like(&id, &outcome));
        })
    }

    /// Resolves to the canonical post on success. The draft is sent as given;
    /// callers validate it first.
    pub fn create_item(&self, draft: PostDraft) -> JoinHandle<Option<Post>> {
        self.state.send_modify(|state| state.submissions += 1);

        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        self.runtime.spawn(async move {
            let outcome = source.create_post(&draft).await;
            let mut created = None;
            state.send_modify(|state| {
                state.submissions = state.submissions.saturating_sub(1);
                match outcome {
                    Ok(post) => {
                        state.last_error = None;
                        state.prepend_item(post.clone());
                        created = Some(post);
                    }
                    Err(err) => {
                        warn!(error = %err, "create post failed");
                        state.last_error = Some(FeedError::from(&err));
                    }
                }
            });
            created
        })
    }

    /// Deletes a post remotely and drops it from the list once the server confirms.
    /// Resolves to whether the delete went through.
    pub fn remove_item(&self, id: &PostId) -> JoinHandle<bool> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let id = id.clone();
        self.runtime.spawn(async move {
            let outcome = source.delete_post(&id).await;
            let removed = outcome.is_ok();
            state.send_modify(|state| match outcome {
                Ok(()) => {
                    state.last_error = None;
                    state.items.retain(|post| post.id != id);
                    state.like_patches.remove(&id);
                }
                Err(err) => {
                    warn!(post_id = %id, error = %err, "delete post failed");
                    state.last_error = Some(FeedError::from(&err));
                }
            });
            removed
        })
    }

    /// Overwrites a post's like count with an authoritative value obtained elsewhere.
    pub fn apply_like_count(&self, id: &PostId, likes: u32) {
        self.state.send_if_modified(|state| {
            let Some(post) = state.item_mut(id) else {
                return false;
            };
            post.likes = likes;
            state.like_patches.remove(id);
            true
        });
    }

    pub fn clear_error(&self) {
        self.state
            .send_if_modified(|state| state.last_error.take().is_some());
    }

    /// Back to the empty state for the same scope; outstanding page loads are dropped.
    pub fn reset(&self) {
        self.state.send_modify(|state| {
            let generation = state.generation + 1;
            let submissions = state.submissions;
            let scope = state.query.scope;
            *state = FeedState::for_query(FeedQuery {
                scope,
                ..FeedQuery::default()
            });
            state.generation = generation;
            state.submissions = submissions;
        });
    }

    fn start_reload(&self, loading: LoadingState) -> Option<JoinHandle<()>> {
        let mut dispatch = None;
        self.state.send_if_modified(|state| {
            if state.loading != LoadingState::Idle {
                return false;
            }
            let generation = state.begin_generation(loading);
            dispatch = Some((generation, state.query.clone()));
            true
        });

        let Some((generation, query)) = dispatch else {
            debug!(?loading, "feed reload coalesced with running load");
            return None;
        };
        Some(self.spawn_page_fetch(generation, query, None, PageApply::Replace))
    }

    fn change_query(&self, update: impl FnOnce(&mut FeedQuery) -> bool) -> Option<JoinHandle<()>> {
        let mut dispatch = None;
        self.state.send_if_modified(|state| {
            if !update(&mut state.query) {
                return false;
            }
            state.clear_items();
            let generation = state.begin_generation(LoadingState::LoadingInitial);
            dispatch = Some((generation, state.query.clone()));
            true
        });

        let (generation, query) = dispatch?;
        debug!(generation, ?query, "feed query changed");
        Some(self.spawn_page_fetch(generation, query, None, PageApply::Replace))
    }

    fn spawn_page_fetch(
        &self,
        generation: u64,
        query: FeedQuery,
        cursor: Option<PageCursor>,
        apply: PageApply,
    ) -> JoinHandle<()> {
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        let page_size = self.page_size;
        self.runtime.spawn(async move {
            let outcome = source.fetch_page(&query, cursor, page_size).await;
            state.send_if_modified(|state| apply_page(state, generation, apply, outcome));
        })
    }
}

fn apply_page(
    state: &mut FeedState,
    generation: u64,
    apply: PageApply,
    outcome: Result<Page, ClientError>,
) -> bool {
    if state.generation != generation {
        debug!(
            stale = generation,
            current = state.generation,
            "dropping stale feed page"
        );
        return false;
    }

    state.loading = LoadingState::Idle;
    match outcome {
        Ok(page) => {
            match apply {
                PageApply::Replace => state.replace_items(page.items),
                PageApply::Append => state.merge_items(page.items),
            }
            state.cursor = page.next_cursor;
            state.has_more = page.has_more;
            state.last_error = None;
        }
        Err(err) => {
            warn!(?apply, error = %err, "feed page request failed");
            state.last_error = Some(FeedError::from(&err));
        }
    }
    true
}

#[cfg(test)]
#[path = "tests/feed_tests.rs"]
mod tests;
