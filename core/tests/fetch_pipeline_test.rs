//! Exercises the fetch pipeline's store-level contract end to end: source
//! eligibility, the RSS fetcher against a mocked server, first-import
//! semantics, dedup, and conditional-GET (304) handling.

use std::time::Duration;

use briefing_core::context::Context;
use briefing_core::fetch::fetchers::{FetchCaching, Fetcher};
use briefing_core::fetch::fetchers::rss::RssFetcher;
use briefing_core::model::new_id;
use briefing_core::store::Store;
use common::init_db_pool;
use sqlx::SqlitePool;

async fn setup_test_db() -> SqlitePool {
    let db_path = format!("{}/fetch_test_{}.sqlite", std::env::temp_dir().display(), new_id());
    let pool = init_db_pool(&db_path).await.expect("init pool");
    common::run_migrations(&pool).await.expect("run migrations");
    pool
}

async fn seed_user_and_briefing(store: &Store, balance: i64) -> (String, String) {
    let user_id = new_id();
    let briefing_id = new_id();
    sqlx::query("INSERT INTO users (id, username, credit_balance) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(format!("user-{user_id}"))
        .bind(balance)
        .execute(store.pool())
        .await
        .expect("insert user");
    sqlx::query(
        "INSERT INTO briefings (id, user_id, title, briefing_criteria, frequency, local_time, timezone)
         VALUES (?, ?, 'Daily', 'tech news', 'DAILY', '08:00', 'UTC')",
    )
    .bind(&briefing_id)
    .bind(&user_id)
    .execute(store.pool())
    .await
    .expect("insert briefing");
    (user_id, briefing_id)
}

async fn seed_rss_source(store: &Store, briefing_id: &str, url: &str) -> String {
    let source_id = new_id();
    sqlx::query(
        "INSERT INTO sources (id, briefing_id, type, url, name, refresh_interval_minutes)
         VALUES (?, ?, 'RSS', ?, 'Example Feed', 60)",
    )
    .bind(&source_id)
    .bind(briefing_id)
    .bind(url)
    .execute(store.pool())
    .await
    .expect("insert source");
    source_id
}

const FEED_BODY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0">
  <channel>
    <title>Example Feed</title>
    <item>
      <guid>g1</guid>
      <title>First post</title>
      <link>https://example.test/g1</link>
      <description>first body</description>
      <pubDate>Mon, 01 Jan 2024 00:00:00 GMT</pubDate>
    </item>
    <item>
      <guid>g2</guid>
      <title>Second post</title>
      <link>https://example.test/g2</link>
      <description>second body</description>
      <pubDate>Mon, 01 Jan 2024 01:00:00 GMT</pubDate>
    </item>
  </channel>
</rss>"#;

#[tokio::test]
async fn rss_happy_path_first_import_marks_items_done_without_score() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let (_user_id, briefing_id) = seed_user_and_briefing(&store, 5).await;

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/feed.xml")
        .with_status(200)
        .with_header("content-type", "application/rss+xml")
        .with_body(FEED_BODY)
        .create_async()
        .await;

    let feed_url = format!("{}/feed.xml", server.url());
    let source_id = seed_rss_source(&store, &briefing_id, &feed_url).await;

    let source = store.get_source(&source_id).await.unwrap().unwrap();
    let briefing = store.get_briefing(&source.briefing_id).await.unwrap().unwrap();
    let eligible = store
        .list_sources_eligible_for_fetch(&[briefing.user_id.clone()], 10)
        .await
        .expect("eligibility query");
    assert_eq!(eligible.len(), 1, "source should be eligible before its first fetch");

    let fetcher = RssFetcher::new(Duration::from_secs(5));
    let ctx = Context::new(briefing.user_id.clone());
    let outcome = fetcher
        .fetch(&ctx, &feed_url, None, None, &FetchCaching::default())
        .await
        .expect("fetch should succeed");
    assert_eq!(outcome.items.len(), 2);

    let first_import = source.last_fetched_at.is_none();
    let inserted = store
        .apply_fetch_success(
            &source_id,
            &outcome.items,
            first_import,
            outcome.caching.etag.as_deref(),
            outcome.caching.last_modified.as_deref(),
        )
        .await
        .expect("apply fetch success");
    assert_eq!(inserted, 2);

    let rows: Vec<(String, Option<i64>)> =
        sqlx::query_as("SELECT status, score FROM items WHERE source_id = ? ORDER BY guid")
            .bind(&source_id)
            .fetch_all(store.pool())
            .await
            .unwrap();
    assert_eq!(rows.len(), 2);
    for (status, score) in rows {
        assert_eq!(status, "DONE", "first-import items must never be enriched");
        assert_eq!(score, None);
    }

    let refreshed = store.get_source(&source_id).await.unwrap().unwrap();
    assert!(refreshed.last_fetched_at.is_some());
    assert_eq!(refreshed.fetch_status, "IDLE");

    // Re-running the eligibility query immediately afterwards should find
    // nothing (refreshIntervalMinutes=60 hasn't elapsed).
    let eligible_again = store
        .list_sources_eligible_for_fetch(&[briefing.user_id.clone()], 10)
        .await
        .expect("eligibility query");
    assert!(eligible_again.is_empty());

    mock.assert_async().await;
}

#[tokio::test]
async fn dedup_skips_existing_guid_on_second_fetch() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let (_user_id, briefing_id) = seed_user_and_briefing(&store, 5).await;
    let source_id = seed_rss_source(&store, &briefing_id, "https://example.test/feed.xml").await;

    let fetcher_item = briefing_core::model::FetchedItem {
        guid: "g1".to_string(),
        title: "First post".to_string(),
        link: Some("https://example.test/g1".to_string()),
        author: None,
        published_at: None,
        raw_content: Some("body".to_string()),
        clean_content: None,
    };

    let inserted_first = store
        .apply_fetch_success(&source_id, &[fetcher_item.clone()], false, None, None)
        .await
        .expect("first insert");
    assert_eq!(inserted_first, 1);

    let inserted_second = store
        .apply_fetch_success(&source_id, &[fetcher_item], false, None, None)
        .await
        .expect("second insert should dedup silently");
    assert_eq!(inserted_second, 0, "duplicate guid must not be re-inserted");

    let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE source_id = ?")
        .bind(&source_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(count.0, 1);
}

#[tokio::test]
async fn conditional_get_304_leaves_caching_headers_untouched() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let (_user_id, briefing_id) = seed_user_and_briefing(&store, 5).await;

    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("GET", "/feed.xml")
        .match_header("if-none-match", "\"abc123\"")
        .with_status(304)
        .create_async()
        .await;

    let feed_url = format!("{}/feed.xml", server.url());
    let source_id = seed_rss_source(&store, &briefing_id, &feed_url).await;

    let fetcher = RssFetcher::new(Duration::from_secs(5));
    let ctx = Context::new("u1".to_string());
    let caching = FetchCaching {
        etag: Some("\"abc123\"".to_string()),
        last_modified: None,
    };
    let outcome = fetcher
        .fetch(&ctx, &feed_url, None, None, &caching)
        .await
        .expect("304 should not be an error");
    assert!(outcome.items.is_empty());
    assert_eq!(outcome.caching.etag.as_deref(), Some("\"abc123\""));

    let inserted = store
        .apply_fetch_success(
            &source_id,
            &outcome.items,
            true,
            outcome.caching.etag.as_deref(),
            outcome.caching.last_modified.as_deref(),
        )
        .await
        .expect("apply even with no items");
    assert_eq!(inserted, 0);

    let refreshed = store.get_source(&source_id).await.unwrap().unwrap();
    assert_eq!(refreshed.etag.as_deref(), Some("\"abc123\""));

    mock.assert_async().await;
}
