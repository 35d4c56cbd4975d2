mod support;

use cinefave::auth::{SessionObserver, SessionState, User};
use cinefave::components::{CardGrid, Navigation};
use cinefave::favorites::{FavoritesError, FavoritesRegistry, Toggle};
use cinefave::models::MediaType;
use std::sync::Arc;
use std::time::Duration;
use support::{eventually, movie, show, MemoryStore};

fn signed_in(uid: &str) -> SessionObserver {
    SessionObserver::new(SessionState::Authenticated(User::new(uid)))
}

fn expect_applied(toggle: Toggle) -> (bool, cinefave::favorites::PendingWrite) {
    match toggle {
        Toggle::Applied {
            favorite, write, ..
        } => (favorite, write),
        Toggle::LoginRequired => panic!("expected toggle to apply"),
    }
}

#[tokio::test]
async fn renders_one_card_per_item_with_source_titles() {
    let items = vec![movie(1, "Heat"), movie(2, "Ronin"), movie(3, "Collateral")];
    let grid = CardGrid::mount(
        items.clone(),
        MediaType::Movie,
        &SessionObserver::default(),
        Arc::new(MemoryStore::default()),
    )
    .await;

    let cards = grid.cards();
    assert_eq!(cards.len(), items.len());
    for (card, item) in cards.iter().zip(&items) {
        assert_eq!(card.title, item.display_title());
        assert_eq!(card.poster_url, format!("https://image.tmdb.org/t/p/w500/{}.jpg", item.id));
    }
    let html = grid.render();
    assert_eq!(html.matches("<article class=\"card\"").count(), 3);
    assert!(html.contains("<h3 class=\"card-title\">Collateral</h3>"));
}

#[tokio::test]
async fn empty_list_renders_no_cards() {
    let grid = CardGrid::mount(
        Vec::new(),
        MediaType::Movie,
        &SessionObserver::default(),
        Arc::new(MemoryStore::default()),
    )
    .await;
    assert!(grid.cards().is_empty());
    assert!(!grid.render().contains("<article"));
}

#[tokio::test]
async fn signed_in_user_sees_remote_favorites() {
    let store = MemoryStore::with_user("u1", vec![42]);
    let grid = CardGrid::mount(
        vec![movie(42, "Blade Runner"), movie(7, "Alien")],
        MediaType::Movie,
        &signed_in("u1"),
        store,
    )
    .await;

    let cards = grid.cards();
    assert!(cards[0].favorite);
    assert!(!cards[1].favorite);

    let html = grid.render();
    let first = html.find("data-id=\"42\"").unwrap();
    let second = html.find("data-id=\"7\"").unwrap();
    assert!(html[first..second].contains("heart filled"));
    assert!(html[second..].contains("heart outline"));
}

#[tokio::test]
async fn toggling_twice_restores_membership() {
    let store = MemoryStore::with_user("u1", vec![3]);
    let grid = CardGrid::mount(
        vec![movie(7, "Alien")],
        MediaType::Movie,
        &signed_in("u1"),
        store.clone(),
    )
    .await;

    let (favorite, write) = expect_applied(grid.toggle_favorite(7));
    assert!(favorite);
    assert!(grid.is_favorite(7));
    write.outcome().await.unwrap();
    assert_eq!(store.remote("u1"), Some(vec![3, 7]));

    let (favorite, write) = expect_applied(grid.toggle_favorite(7));
    assert!(!favorite);
    assert!(!grid.is_favorite(7));
    write.outcome().await.unwrap();
    assert_eq!(store.remote("u1"), Some(vec![3]));
    assert_eq!(grid.favorites().snapshot().ids(), &[3]);
}

#[tokio::test]
async fn toggle_without_session_requires_login_and_changes_nothing() {
    let store = Arc::new(MemoryStore::default());
    let grid = CardGrid::mount(
        vec![movie(7, "Alien")],
        MediaType::Movie,
        &SessionObserver::default(),
        store.clone(),
    )
    .await;

    for _ in 0..3 {
        assert!(matches!(grid.toggle_favorite(7), Toggle::LoginRequired));
    }
    assert!(grid.favorites().snapshot().is_empty());
    assert!(!grid.cards()[0].favorite);
    tokio::task::yield_now().await;
    assert_eq!(store.save_count(), 0);
}

#[tokio::test]
async fn writes_reach_the_store_in_toggle_order() {
    let store = MemoryStore::with_user("u1", Vec::new());
    let grid = CardGrid::mount(Vec::new(), MediaType::Movie, &signed_in("u1"), store.clone()).await;

    let _ = grid.toggle_favorite(1);
    let _ = grid.toggle_favorite(2);
    let (_, last) = expect_applied(grid.toggle_favorite(3));
    last.outcome().await.unwrap();

    let saves = store.saves.lock().unwrap().clone();
    let lists: Vec<Vec<i64>> = saves.into_iter().map(|(_, l)| l).collect();
    assert_eq!(lists, vec![vec![1], vec![1, 2], vec![1, 2, 3]]);
}

#[tokio::test]
async fn failed_write_is_reported_and_local_state_kept() {
    let store = MemoryStore::with_user("u1", Vec::new());
    store.fail_saves();
    let grid = CardGrid::mount(
        vec![movie(7, "Alien")],
        MediaType::Movie,
        &signed_in("u1"),
        store.clone(),
    )
    .await;

    let (favorite, write) = expect_applied(grid.toggle_favorite(7));
    assert!(favorite);
    let err = write.outcome().await.unwrap_err();
    assert!(matches!(err, FavoritesError::Save { ref uid, .. } if uid == "u1"));
    assert!(err.to_string().contains("permission denied"));

    // No rollback: the heart stays filled even though the store did not change.
    assert!(grid.is_favorite(7));
    assert_eq!(store.remote("u1"), Some(Vec::new()));
}

#[tokio::test]
async fn failed_load_starts_from_an_empty_list() {
    let store = MemoryStore::with_user("u1", vec![42]);
    store.fail_loads();
    let grid = CardGrid::mount(
        vec![movie(42, "Blade Runner")],
        MediaType::Movie,
        &signed_in("u1"),
        store,
    )
    .await;

    assert!(!grid.cards()[0].favorite);
    assert_eq!(grid.favorites().user().map(|u| u.uid), Some("u1".to_string()));
    assert!(matches!(grid.toggle_favorite(42), Toggle::Applied { favorite: true, .. }));
}

#[tokio::test]
async fn sign_in_after_mount_loads_favorites() {
    let store = MemoryStore::with_user("u1", vec![42]);
    let session = SessionObserver::default();
    let grid = CardGrid::mount(
        vec![movie(42, "Blade Runner")],
        MediaType::Movie,
        &session,
        store,
    )
    .await;
    assert!(!grid.is_favorite(42));

    session.sign_in(User::new("u1"));
    eventually("favorites to load", || grid.is_favorite(42)).await;
    assert!(grid.cards()[0].favorite);
}

#[tokio::test]
async fn sign_out_clears_local_favorites() {
    let store = MemoryStore::with_user("u1", vec![42, 7]);
    let session = signed_in("u1");
    let grid = CardGrid::mount(
        vec![movie(42, "Blade Runner")],
        MediaType::Movie,
        &session,
        store.clone(),
    )
    .await;
    assert_eq!(grid.favorites().snapshot().len(), 2);

    session.sign_out();
    eventually("favorites to clear", || grid.favorites().snapshot().is_empty()).await;
    assert!(matches!(grid.toggle_favorite(42), Toggle::LoginRequired));
    // Signing out never touches the remote document.
    assert_eq!(store.remote("u1"), Some(vec![42, 7]));
}

#[tokio::test]
async fn switching_users_reloads_for_the_new_user() {
    let store = MemoryStore::with_user("u1", vec![42]);
    store.docs.lock().unwrap().insert("u2".to_string(), vec![7]);
    let session = signed_in("u1");
    let grid = CardGrid::mount(Vec::new(), MediaType::Movie, &session, store).await;
    assert!(grid.is_favorite(42));

    session.sign_in(User::new("u2"));
    eventually("second user's favorites", || grid.is_favorite(7)).await;
    assert!(!grid.is_favorite(42));
}

#[tokio::test]
async fn clicking_a_card_opens_its_overview() {
    let grid = CardGrid::mount(
        vec![movie(42, "Blade Runner")],
        MediaType::Movie,
        &SessionObserver::default(),
        Arc::new(MemoryStore::default()),
    )
    .await;
    assert_eq!(
        grid.click_card(42),
        Navigation::Route("/moviesOverview/42".to_string())
    );
    assert_eq!(grid.cards()[0].href, "/moviesOverview/42");
}

#[tokio::test]
async fn unmount_cancels_the_session_subscription() {
    let session = SessionObserver::default();
    let grid = CardGrid::mount(
        Vec::new(),
        MediaType::Movie,
        &session,
        Arc::new(MemoryStore::default()),
    )
    .await;
    assert!(grid.is_subscribed());
    assert_eq!(session.subscriber_count(), 1);

    grid.unmount();
    eventually("subscription to end", || session.subscriber_count() == 0).await;
}

#[tokio::test]
async fn queued_write_completes_after_unmount() {
    let store = MemoryStore::with_user("u1", Vec::new());
    let grid = CardGrid::mount(Vec::new(), MediaType::Movie, &signed_in("u1"), store.clone()).await;
    let (_, write) = expect_applied(grid.toggle_favorite(5));
    grid.unmount();

    write.outcome().await.unwrap();
    assert_eq!(store.remote("u1"), Some(vec![5]));
}

#[tokio::test]
async fn tv_cards_open_the_typed_overview() {
    let grid = CardGrid::mount(
        vec![show(1399, "Game of Thrones")],
        MediaType::Tv,
        &SessionObserver::default(),
        Arc::new(MemoryStore::default()),
    )
    .await;
    assert_eq!(
        grid.click_card(1399),
        Navigation::Route("/overview/tv/1399".to_string())
    );
    assert_eq!(grid.cards()[0].href, "/overview/tv/1399");
    assert!(grid.render().contains("href=\"/overview/tv/1399\""));
}

#[tokio::test]
async fn registry_shares_one_state_per_user() {
    let store = MemoryStore::with_user("u1", vec![42]);
    let registry = FavoritesRegistry::new(store.clone());
    let session = SessionState::Authenticated(User::new("u1"));

    let first = registry.sync_for(&session).await;
    let second = registry.sync_for(&session).await;
    assert_eq!(store.load_count(), 1);

    let (_, write) = expect_applied(first.toggle(7));
    assert!(second.contains(7));
    write.outcome().await.unwrap();
    assert_eq!(store.remote("u1"), Some(vec![42, 7]));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn registry_loads_once_for_concurrent_callers() {
    let store = MemoryStore::with_user("u1", vec![42]);
    store.slow_loads(Duration::from_millis(50));
    let registry = FavoritesRegistry::new(store.clone());
    let session = SessionState::Authenticated(User::new("u1"));

    let (a, b) = tokio::join!(registry.sync_for(&session), registry.sync_for(&session));
    assert!(a.contains(42));
    assert!(b.contains(42));
    assert_eq!(store.load_count(), 1);

    let _ = a.toggle(1);
    let (_, last) = expect_applied(b.toggle(2));
    last.outcome().await.unwrap();
    assert_eq!(store.remote("u1"), Some(vec![42, 1, 2]));
}

#[tokio::test]
async fn registry_retries_a_failed_load() {
    let store = MemoryStore::with_user("u1", vec![42]);
    store.fail_loads();
    let registry = FavoritesRegistry::new(store.clone());
    let session = SessionState::Authenticated(User::new("u1"));

    let unloaded = registry.sync_for(&session).await;
    assert!(unloaded.snapshot().is_empty());

    store.recover_loads();
    let loaded = registry.sync_for(&session).await;
    assert!(loaded.contains(42));
    assert_eq!(store.load_count(), 2);
}

#[tokio::test]
async fn registry_forgets_on_request() {
    let store = MemoryStore::with_user("u1", vec![42]);
    let registry = FavoritesRegistry::new(store.clone());
    let session = SessionState::Authenticated(User::new("u1"));

    registry.sync_for(&session).await;
    store.docs.lock().unwrap().insert("u1".to_string(), vec![42, 9]);
    registry.forget("u1");
    assert!(registry.is_empty());

    assert!(registry.sync_for(&session).await.contains(9));
}

#[tokio::test]
async fn signed_out_registry_callers_get_no_shared_state() {
    let registry = FavoritesRegistry::new(Arc::new(MemoryStore::default()));
    let sync = registry.sync_for(&SessionState::Unauthenticated).await;
    assert!(matches!(sync.toggle(1), Toggle::LoginRequired));
    assert!(registry.is_empty());
}
