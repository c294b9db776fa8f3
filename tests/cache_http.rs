mod support;

use std::time::Duration;

use axum::http::StatusCode;

use support::{TestApp, get, send};

#[tokio::test(start_paused = true)]
async fn index_is_served_stale_until_ttl_elapses() {
    let app = TestApp::with_cache();
    let leo = app.repos.seed_user("leo").await;
    app.repos.seed_post(&leo, "before caching", None).await;

    let first = get(&app.public, "/", None).await;
    assert_eq!(first.status, StatusCode::OK);
    assert!(first.body.contains("before caching"));

    app.repos.seed_post(&leo, "written later", None).await;

    tokio::time::advance(Duration::from_secs(19)).await;
    let stale = get(&app.public, "/", None).await;
    assert!(!stale.body.contains("written later"));
    assert_eq!(stale.body, first.body);

    tokio::time::advance(Duration::from_secs(1)).await;
    let fresh = get(&app.public, "/", None).await;
    assert!(fresh.body.contains("written later"));
}

#[tokio::test(start_paused = true)]
async fn admin_clear_forces_fresh_index() {
    let app = TestApp::with_cache();
    let leo = app.repos.seed_user("leo").await;

    let empty = get(&app.public, "/", None).await;
    assert!(empty.body.contains("No posts yet."));

    app.repos.seed_post(&leo, "after the cache filled", None).await;
    assert!(get(&app.public, "/", None).await.body.contains("No posts yet."));

    let request = axum::http::Request::post("/_cache/invalidate")
        .body(axum::body::Body::empty())
        .expect("request");
    let cleared = send(&app.admin, request).await;
    assert_eq!(cleared.status, StatusCode::NO_CONTENT);

    let fresh = get(&app.public, "/", None).await;
    assert!(fresh.body.contains("after the cache filled"));
}

#[tokio::test(start_paused = true)]
async fn cached_pages_vary_by_page_and_viewer() {
    let app = TestApp::with_cache();
    let leo = app.repos.seed_user("leo").await;
    for n in 1..=11 {
        app.repos
            .seed_post(&leo, &format!("entry-{n:02}"), None)
            .await;
    }

    let anonymous = get(&app.public, "/", None).await;
    assert!(anonymous.body.contains("Sign in"));

    let signed_in = get(&app.public, "/", Some("leo")).await;
    assert!(!signed_in.body.contains("Sign in"));
    assert!(signed_in.body.contains("href=\"/create/\""));

    let second = get(&app.public, "/?page=2", None).await;
    assert!(second.body.contains("entry-01"));
    assert!(!second.body.contains("entry-11"));

    let anonymous_again = get(&app.public, "/", None).await;
    assert_eq!(anonymous_again.body, anonymous.body);
}

#[tokio::test(start_paused = true)]
async fn only_the_index_is_cached() {
    let app = TestApp::with_cache();
    let leo = app.repos.seed_user("leo").await;

    get(&app.public, "/profile/leo/", None).await;
    app.repos.seed_post(&leo, "profile update", None).await;

    let profile = get(&app.public, "/profile/leo/", None).await;
    assert!(profile.body.contains("profile update"));
}

#[tokio::test]
async fn clearing_without_cache_still_succeeds() {
    let app = TestApp::new();
    assert!(app.cache.is_none());

    let request = axum::http::Request::post("/_cache/invalidate")
        .body(axum::body::Body::empty())
        .expect("request");
    assert_eq!(send(&app.admin, request).await.status, StatusCode::NO_CONTENT);
}

#[tokio::test(start_paused = true)]
async fn deleted_post_stays_visible_until_clear() {
    let app = TestApp::with_cache();
    let leo = app.repos.seed_user("leo").await;
    let doomed = app.repos.seed_post(&leo, "soon to vanish", None).await;

    let first = get(&app.public, "/", None).await;
    assert!(first.body.contains("soon to vanish"));

    let deleted = support::delete(&app.admin, &format!("/posts/{}", doomed.id)).await;
    assert_eq!(deleted.status, StatusCode::NO_CONTENT);

    let cached = get(&app.public, "/", None).await;
    assert_eq!(cached.body, first.body);

    if let Some(cache) = &app.cache {
        cache.clear();
    }
    let fresh = get(&app.public, "/", None).await;
    assert!(!fresh.body.contains("soon to vanish"));
}
