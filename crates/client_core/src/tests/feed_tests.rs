use super::*;
use crate::{
    error::ErrorKind,
    source::FeedScope,
    test_support::{network_error, page, post, ScriptedSource},
};

fn controller(source: &Arc<ScriptedSource>) -> FeedController {
    FeedController::new(source.clone())
}

fn likes_of(state: &FeedState, id: &str) -> Option<u32> {
    state.item(&PostId::new(id)).map(|post| post.likes)
}

fn ids(state: &FeedState) -> Vec<&str> {
    state.items.iter().map(|post| post.id.as_str()).collect()
}

/// Initial page `[{1, likes 2}]` with a next page available.
async fn loaded_feed(source: &Arc<ScriptedSource>) -> FeedController {
    let feed = controller(source);
    source.pages.ready(Ok(page(vec![post("1", 2)], Some(2))));
    feed.load_initial()
        .expect("dispatched")
        .await
        .expect("task");
    feed
}

#[tokio::test]
async fn initial_load_populates_items_cursor_and_has_more() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1"]);
    assert_eq!(likes_of(&state, "1"), Some(2));
    assert_eq!(state.cursor, Some(PageCursor(2)));
    assert!(state.has_more);
    assert_eq!(state.loading, LoadingState::Idle);
    assert_eq!(state.last_error, None);

    let calls = source.fetch_calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].cursor, None);
    assert_eq!(calls[0].page_size, DEFAULT_PAGE_SIZE);
}

#[tokio::test]
async fn loading_state_is_set_before_the_fetch_resolves() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    let release = source.pages.gated();

    let handle = feed.refresh().expect("dispatched");
    assert_eq!(feed.snapshot().loading, LoadingState::Refreshing);

    release
        .send(Ok(page(vec![post("1", 0)], None)))
        .expect("release");
    handle.await.expect("task");
    assert_eq!(feed.snapshot().loading, LoadingState::Idle);
}

#[tokio::test]
async fn second_load_initial_while_loading_is_coalesced() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    let release = source.pages.gated();

    let first = feed.load_initial().expect("dispatched");
    assert!(feed.load_initial().is_none());
    assert!(feed.refresh().is_none());
    assert!(feed.load_more().is_none());

    release.send(Ok(page(vec![post("1", 0)], None))).expect("release");
    first.await.expect("task");

    assert_eq!(source.fetch_calls().len(), 1);
}

#[tokio::test]
async fn failed_reload_keeps_previous_items_and_reports_error() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.pages.ready(Err(network_error()));
    feed.refresh().expect("dispatched").await.expect("task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1"]);
    assert_eq!(state.loading, LoadingState::Idle);
    let error = state.last_error.expect("error recorded");
    assert_eq!(error.kind, ErrorKind::Network);
    assert_eq!(error.message, "connection reset");
}

#[tokio::test]
async fn load_more_replaces_overlapping_ids_in_place() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source
        .pages
        .ready(Ok(page(vec![post("1", 5), post("2", 0)], None)));
    feed.load_more().expect("dispatched").await.expect("task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1", "2"]);
    assert_eq!(likes_of(&state, "1"), Some(5));
    assert_eq!(likes_of(&state, "2"), Some(0));
    assert!(!state.has_more);
    assert_eq!(state.cursor, None);
    assert_eq!(source.fetch_calls()[1].cursor, Some(PageCursor(2)));
}

#[tokio::test]
async fn overlapping_pages_never_duplicate_ids() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    source
        .pages
        .ready(Ok(page(vec![post("a", 1), post("b", 1), post("c", 1)], Some(2))));
    feed.load_initial().expect("dispatched").await.expect("task");

    source
        .pages
        .ready(Ok(page(vec![post("c", 2), post("d", 1), post("d", 4)], Some(3))));
    feed.load_more().expect("dispatched").await.expect("task");

    source
        .pages
        .ready(Ok(page(vec![post("a", 9), post("e", 1)], None)));
    feed.load_more().expect("dispatched").await.expect("task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["a", "b", "c", "d", "e"]);
    assert_eq!(likes_of(&state, "a"), Some(9));
    assert_eq!(likes_of(&state, "c"), Some(2));
    assert_eq!(likes_of(&state, "d"), Some(4));
}

#[tokio::test]
async fn load_more_is_a_no_op_once_exhausted() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    source.pages.ready(Ok(page(vec![post("1", 0)], None)));
    feed.load_initial().expect("dispatched").await.expect("task");

    assert!(feed.load_more().is_none());
    assert!(feed.load_more().is_none());
    assert_eq!(source.fetch_calls().len(), 1);
}

#[tokio::test]
async fn failed_load_more_retries_from_the_same_cursor() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.pages.ready(Err(network_error()));
    feed.load_more().expect("dispatched").await.expect("task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1"]);
    assert_eq!(state.cursor, Some(PageCursor(2)));
    assert!(state.has_more);
    assert!(state.last_error.is_some());

    source.pages.ready(Ok(page(vec![post("2", 0)], None)));
    feed.load_more().expect("dispatched").await.expect("task");

    let calls = source.fetch_calls();
    assert_eq!(calls[1].cursor, Some(PageCursor(2)));
    assert_eq!(calls[2].cursor, Some(PageCursor(2)));
    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1", "2"]);
    assert_eq!(state.last_error, None);
}

#[tokio::test]
async fn filter_change_discards_items_and_refetches() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release = source.pages.gated();

    let handle = feed
        .set_filter(Some(PostCategory::News))
        .expect("dispatched");
    let state = feed.snapshot();
    assert!(state.items.is_empty());
    assert_eq!(state.cursor, None);
    assert!(!state.has_more);
    assert_eq!(state.loading, LoadingState::LoadingInitial);
    assert_eq!(state.active_filter(), Some(PostCategory::News));

    release.send(Ok(page(vec![post("n1", 0)], None))).expect("release");
    handle.await.expect("task");

    assert_eq!(ids(&feed.snapshot()), vec!["n1"]);
    let calls = source.fetch_calls();
    assert_eq!(calls[1].query.category, Some(PostCategory::News));
    assert_eq!(calls[1].cursor, None);
}

#[tokio::test]
async fn setting_the_same_filter_is_a_no_op() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    assert!(feed.set_filter(None).is_none());
    assert_eq!(ids(&feed.snapshot()), vec!["1"]);
    assert_eq!(source.fetch_calls().len(), 1);
}

#[tokio::test]
async fn late_response_for_previous_filter_is_discarded() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    let release_a = source.pages.gated();
    let release_b = source.pages.gated();

    let handle_a = feed
        .set_filter(Some(PostCategory::Analysis))
        .expect("dispatched");
    tokio::task::yield_now().await;
    let handle_b = feed
        .set_filter(Some(PostCategory::Education))
        .expect("dispatched");
    tokio::task::yield_now().await;

    release_b
        .send(Ok(page(vec![post("edu", 0)], None)))
        .expect("release b");
    handle_b.await.expect("task b");
    release_a
        .send(Ok(page(vec![post("analysis", 0)], Some(2))))
        .expect("release a");
    handle_a.await.expect("task a");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["edu"]);
    assert!(!state.has_more);
    assert_eq!(state.loading, LoadingState::Idle);
    assert_eq!(state.active_filter(), Some(PostCategory::Education));
}

#[tokio::test]
async fn stale_failure_is_not_reported() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    let release_a = source.pages.gated();
    source.pages.ready(Ok(page(vec![post("s1", 0)], None)));

    let handle_a = feed
        .set_filter(Some(PostCategory::Strategy))
        .expect("dispatched");
    tokio::task::yield_now().await;
    let handle_b = feed.set_filter(None).expect("dispatched");
    handle_b.await.expect("task b");

    release_a.send(Err(network_error())).expect("release a");
    handle_a.await.expect("task a");

    let state = feed.snapshot();
    assert_eq!(state.last_error, None);
    assert_eq!(ids(&state), vec!["s1"]);
}

#[tokio::test]
async fn filter_change_during_load_more_drops_the_old_page() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release_more = source.pages.gated();
    source.pages.ready(Ok(page(vec![post("news", 1)], None)));

    let more = feed.load_more().expect("dispatched");
    tokio::task::yield_now().await;
    let filtered = feed
        .set_filter(Some(PostCategory::News))
        .expect("filter change is never coalesced");
    filtered.await.expect("filter task");

    release_more
        .send(Ok(page(vec![post("old-2", 0)], Some(3))))
        .expect("release");
    more.await.expect("more task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["news"]);
    assert!(!state.has_more);
}

#[tokio::test]
async fn search_change_restarts_the_feed() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.pages.ready(Ok(page(vec![post("fpt", 3)], None)));
    feed.set_search("  FPT ")
        .expect("dispatched")
        .await
        .expect("task");
    assert!(feed.set_search("FPT").is_none());

    source.pages.ready(Ok(page(vec![post("1", 2)], Some(2))));
    feed.set_search("").expect("dispatched").await.expect("task");

    let calls = source.fetch_calls();
    assert_eq!(calls[1].query.search.as_deref(), Some("FPT"));
    assert_eq!(calls[2].query.search, None);
    assert_eq!(ids(&feed.snapshot()), vec!["1"]);
}

#[tokio::test]
async fn like_is_applied_immediately_and_reconciled_to_server_count() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release = source.likes.gated();

    let handle = feed.like_item(&PostId::new("1"));
    assert_eq!(likes_of(&feed.snapshot(), "1"), Some(3));

    release.send(Ok(5)).expect("release");
    handle.await.expect("task");
    assert_eq!(likes_of(&feed.snapshot(), "1"), Some(5));
}

#[tokio::test]
async fn failed_like_restores_the_previous_count() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.likes.ready(Err(ClientError::Server {
        status: 500,
        message: "like failed".to_string(),
    }));
    feed.like_item(&PostId::new("1")).await.expect("task");

    let state = feed.snapshot();
    assert_eq!(likes_of(&state, "1"), Some(2));
    let error = state.last_error.expect("error recorded");
    assert_eq!(error.kind, ErrorKind::Server);
    assert_eq!(error.message, "like failed");
}

#[tokio::test]
async fn like_response_for_evicted_item_changes_nothing() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release_like = source.likes.gated();
    source.pages.ready(Ok(page(vec![post("n1", 7)], None)));

    let like = feed.like_item(&PostId::new("1"));
    feed.set_filter(Some(PostCategory::News))
        .expect("dispatched")
        .await
        .expect("filter task");

    release_like.send(Ok(40)).expect("release");
    like.await.expect("like task");

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["n1"]);
    assert_eq!(likes_of(&state, "n1"), Some(7));
}

#[tokio::test]
async fn failed_like_after_fresh_page_does_not_double_revert() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release_like = source.likes.gated();

    let like = feed.like_item(&PostId::new("1"));
    source.pages.ready(Ok(page(vec![post("1", 10)], None)));
    feed.refresh().expect("dispatched").await.expect("refresh task");
    assert_eq!(likes_of(&feed.snapshot(), "1"), Some(10));

    release_like.send(Err(network_error())).expect("release");
    like.await.expect("like task");

    let state = feed.snapshot();
    assert_eq!(likes_of(&state, "1"), Some(10));
    assert!(state.last_error.is_some());
}

#[tokio::test]
async fn like_of_unknown_item_still_reaches_the_source() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.likes.ready(Ok(1));
    feed.like_item(&PostId::new("missing")).await.expect("task");

    assert_eq!(
        source.like_calls.lock().unwrap().clone(),
        vec![PostId::new("missing")]
    );
    assert_eq!(likes_of(&feed.snapshot(), "1"), Some(2));
}

#[tokio::test]
async fn created_post_is_prepended() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    let release = source.creates.gated();

    let handle = feed.create_item(PostDraft::new("Gold outlook", "Bullish into Q3"));
    assert!(feed.snapshot().is_submitting());

    release.send(Ok(post("new", 0))).expect("release");
    let created = handle.await.expect("task").expect("created");

    assert_eq!(created.id, PostId::new("new"));
    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["new", "1"]);
    assert!(!state.is_submitting());
}

#[tokio::test]
async fn failed_create_leaves_items_untouched() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.creates.ready(Err(ClientError::Server {
        status: 400,
        message: "title should not be empty".to_string(),
    }));
    let created = feed
        .create_item(PostDraft::new("", "body"))
        .await
        .expect("task");

    assert!(created.is_none());
    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1"]);
    assert_eq!(
        state.last_error.map(|err| err.message),
        Some("title should not be empty".to_string())
    );
}

#[tokio::test]
async fn reset_returns_to_empty_and_ignores_outstanding_loads() {
    let source = ScriptedSource::shared();
    let feed = FeedController::mine(source.clone());
    let release = source.pages.gated();

    let handle = feed.load_initial().expect("dispatched");
    feed.reset();
    release.send(Ok(page(vec![post("mine", 0)], None))).expect("release");
    handle.await.expect("task");

    let state = feed.snapshot();
    assert!(state.items.is_empty());
    assert_eq!(state.loading, LoadingState::Idle);
    assert_eq!(state.query.scope, FeedScope::Mine);
    assert_eq!(source.fetch_calls()[0].query.scope, FeedScope::Mine);
}

#[tokio::test]
async fn clear_error_and_apply_like_count() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;
    source.pages.ready(Err(network_error()));
    feed.refresh().expect("dispatched").await.expect("task");

    feed.clear_error();
    feed.apply_like_count(&PostId::new("1"), 12);

    let state = feed.snapshot();
    assert_eq!(state.last_error, None);
    assert_eq!(likes_of(&state, "1"), Some(12));
}

#[tokio::test]
async fn subscribers_see_state_transitions() {
    let source = ScriptedSource::shared();
    let feed = controller(&source).with_page_size(5);
    let mut rx = feed.subscribe();
    source.pages.ready(Ok(page(vec![post("1", 0)], None)));

    let handle = feed.load_initial().expect("dispatched");
    assert!(rx.has_changed().expect("sender alive"));
    assert_eq!(rx.borrow_and_update().loading, LoadingState::LoadingInitial);

    handle.await.expect("task");
    assert!(rx.has_changed().expect("sender alive"));
    let state = rx.borrow_and_update().clone();
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.loading, LoadingState::Idle);
    assert_eq!(source.fetch_calls()[0].page_size, 5);
}

#[tokio::test]
async fn update_stream_yields_current_then_latest_state() {
    use tokio_stream::StreamExt;

    let source = ScriptedSource::shared();
    let feed = controller(&source);
    let mut updates = feed.updates();
    let first = updates.next().await.expect("initial state");
    assert!(first.items.is_empty());

    source.pages.ready(Ok(page(vec![post("1", 0)], None)));
    feed.load_initial()
        .expect("dispatched")
        .await
        .expect("task");

    let latest = updates.next().await.expect("loaded state");
    assert_eq!(ids(&latest), vec!["1"]);
    assert_eq!(latest.loading, LoadingState::Idle);
}

#[tokio::test]
async fn removed_item_leaves_the_list_after_the_server_confirms() {
    let source = ScriptedSource::shared();
    let feed = controller(&source);
    source
        .pages
        .ready(Ok(page(vec![post("1", 0), post("2", 0)], None)));
    feed.load_initial()
        .expect("dispatched")
        .await
        .expect("task");

    let release = source.deletes.gated();
    let handle = feed.remove_item(&PostId::new("1"));
    tokio::task::yield_now().await;
    assert_eq!(ids(&feed.snapshot()), vec!["1", "2"]);

    release.send(Ok(())).expect("release");
    assert!(handle.await.expect("task"));

    assert_eq!(ids(&feed.snapshot()), vec!["2"]);
    assert_eq!(
        source.delete_calls.lock().unwrap().clone(),
        vec![PostId::new("1")]
    );
}

#[tokio::test]
async fn failed_remove_keeps_the_item_and_reports() {
    let source = ScriptedSource::shared();
    let feed = loaded_feed(&source).await;

    source.deletes.ready(Err(ClientError::Server {
        status: 403,
        message: "You can only delete your own posts".to_string(),
    }));
    assert!(!feed.remove_item(&PostId::new("1")).await.expect("task"));

    let state = feed.snapshot();
    assert_eq!(ids(&state), vec!["1"]);
    let err = state.last_error.expect("error recorded");
    assert_eq!(err.kind, ErrorKind::Server);
    assert_eq!(err.message, "You can only delete your own posts");
}
