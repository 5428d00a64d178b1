//! Exercises the brief pipeline's store-level contract: due-check against a
//! briefing's own timezone, report generation ordering, and the
//! at-most-one-report-per-local-day constraint.

use chrono::{Duration as ChronoDuration, Utc, Weekday};

use briefing_core::brief::scheduler::is_due;
use briefing_core::model::{new_id, FetchedItem};
use briefing_core::store::Store;
use common::init_db_pool;
use sqlx::SqlitePool;

async fn setup_test_db() -> SqlitePool {
    let db_path = format!("{}/brief_test_{}.sqlite", std::env::temp_dir().display(), new_id());
    let pool = init_db_pool(&db_path).await.expect("init pool");
    common::run_migrations(&pool).await.expect("run migrations");
    pool
}

async fn seed_user(store: &Store, balance: i64) -> String {
    let user_id = new_id();
    sqlx::query("INSERT INTO users (id, username, credit_balance) VALUES (?, ?, ?)")
        .bind(&user_id)
        .bind(format!("user-{user_id}"))
        .bind(balance)
        .execute(store.pool())
        .await
        .expect("insert user");
    user_id
}

async fn seed_daily_briefing(store: &Store, user_id: &str) -> String {
    let briefing_id = new_id();
    sqlx::query(
        "INSERT INTO briefings (id, user_id, title, briefing_criteria, frequency, local_time, timezone)
         VALUES (?, ?, 'Daily', 'tech news', 'DAILY', '00:00', 'UTC')",
    )
    .bind(&briefing_id)
    .bind(user_id)
    .execute(store.pool())
    .await
    .expect("insert briefing");
    briefing_id
}

async fn seed_done_item(store: &Store, briefing_id: &str, guid: &str, score: i64) -> String {
    let source_id = new_id();
    sqlx::query(
        "INSERT INTO sources (id, briefing_id, type, url, name, refresh_interval_minutes)
         VALUES (?, ?, 'RSS', 'https://example.test/feed.xml', 'Example Feed', 60)",
    )
    .bind(&source_id)
    .bind(briefing_id)
    .execute(store.pool())
    .await
    .expect("insert source");

    let item = FetchedItem {
        guid: guid.to_string(),
        title: format!("headline {guid}"),
        link: None,
        author: None,
        published_at: Some(Utc::now()),
        raw_content: Some("body".to_string()),
        clean_content: None,
    };
    store
        .apply_fetch_success(&source_id, &[item], false, None, None)
        .await
        .expect("seed item");

    let item_id: (String,) = sqlx::query_as("SELECT id FROM items WHERE guid = ?")
        .bind(guid)
        .fetch_one(store.pool())
        .await
        .unwrap();
    sqlx::query("UPDATE items SET status = 'DONE', score = ? WHERE id = ?")
        .bind(score)
        .bind(&item_id.0)
        .execute(store.pool())
        .await
        .unwrap();
    item_id.0
}

#[tokio::test]
async fn daily_brief_due_in_user_timezone_produces_ordered_report() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;
    let briefing_id = seed_daily_briefing(&store, &user_id).await;

    seed_done_item(&store, &briefing_id, "low", 40).await;
    seed_done_item(&store, &briefing_id, "high", 90).await;
    seed_done_item(&store, &briefing_id, "mid", 65).await;

    let briefing = store.get_briefing(&briefing_id).await.unwrap().unwrap();
    assert!(is_due(&briefing).expect("due check"), "midnight UTC briefing should be due any time today");

    assert!(store.cas_briefing_status(&briefing_id, "ACTIVE", "QUEUED").await.unwrap());
    assert!(store.cas_briefing_status(&briefing_id, "QUEUED", "PROCESSING").await.unwrap());

    let since = Utc::now() - ChronoDuration::days(1);
    let items = store.top_scored_items_since(&briefing_id, since, 10).await.unwrap();
    assert_eq!(items.len(), 3);
    assert_eq!(items[0].score, Some(90));
    assert_eq!(items[1].score, Some(65));
    assert_eq!(items[2].score, Some(40));

    let local_date = Utc::now().format("%Y-%m-%d").to_string();
    let report = store.write_report(&briefing_id, &items, &local_date).await.unwrap();
    assert_eq!(report.local_date, local_date);

    let report_items = store.list_report_items(&report.id).await.unwrap();
    assert_eq!(report_items.len(), 3);
    // Positions reflect the score-descending selection order, 1-indexed.
    assert_eq!(report_items[0].position, 1);
    assert_eq!(report_items[0].score, 90);
    assert_eq!(report_items[1].position, 2);
    assert_eq!(report_items[2].position, 3);

    let refreshed = store.get_briefing(&briefing_id).await.unwrap().unwrap();
    assert_eq!(refreshed.status, "ACTIVE");
    assert!(refreshed.last_executed_at.is_some());
}

#[tokio::test]
async fn weekly_brief_on_wrong_day_is_not_due() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;

    let briefing_id = new_id();
    let wrong_day = Utc::now().with_timezone(&chrono_tz::UTC).weekday().pred().to_string();
    sqlx::query(
        "INSERT INTO briefings (id, user_id, title, briefing_criteria, frequency, day_of_week, local_time, timezone)
         VALUES (?, ?, 'Weekly', 'tech news', 'WEEKLY', ?, '00:00', 'UTC')",
    )
    .bind(&briefing_id)
    .bind(&user_id)
    .bind(&wrong_day)
    .execute(store.pool())
    .await
    .expect("insert briefing");

    let briefing = store.get_briefing(&briefing_id).await.unwrap().unwrap();
    assert!(!is_due(&briefing).expect("due check"));
}

#[tokio::test]
async fn weekly_brief_on_correct_day_is_due() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;

    let briefing_id = new_id();
    let today: Weekday = Utc::now().with_timezone(&chrono_tz::UTC).weekday();
    sqlx::query(
        "INSERT INTO briefings (id, user_id, title, briefing_criteria, frequency, day_of_week, local_time, timezone)
         VALUES (?, ?, 'Weekly', 'tech news', 'WEEKLY', ?, '00:00', 'UTC')",
    )
    .bind(&briefing_id)
    .bind(&user_id)
    .bind(today.to_string())
    .execute(store.pool())
    .await
    .expect("insert briefing");

    let briefing = store.get_briefing(&briefing_id).await.unwrap().unwrap();
    assert!(is_due(&briefing).expect("due check"));
}

#[tokio::test]
async fn at_most_one_report_per_local_day() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;
    let briefing_id = seed_daily_briefing(&store, &user_id).await;
    seed_done_item(&store, &briefing_id, "g1", 50).await;

    let since = Utc::now() - ChronoDuration::days(1);
    let items = store.top_scored_items_since(&briefing_id, since, 10).await.unwrap();
    let local_date = Utc::now().format("%Y-%m-%d").to_string();

    let first = store.write_report(&briefing_id, &items, &local_date).await;
    assert!(first.is_ok());

    let second = store.write_report(&briefing_id, &items, &local_date).await;
    assert!(second.is_err(), "a second report for the same briefing and local day must violate the UNIQUE constraint");
}

#[tokio::test]
async fn empty_selection_reverts_to_active_without_writing_a_report() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;
    let briefing_id = seed_daily_briefing(&store, &user_id).await;

    assert!(store.cas_briefing_status(&briefing_id, "ACTIVE", "QUEUED").await.unwrap());
    assert!(store.cas_briefing_status(&briefing_id, "QUEUED", "PROCESSING").await.unwrap());

    let since = Utc::now() - ChronoDuration::days(1);
    let items = store.top_scored_items_since(&briefing_id, since, 10).await.unwrap();
    assert!(items.is_empty());

    // Mirrors the worker's empty-selection branch: revert without writing a report.
    store.revert_briefing_status(&briefing_id, "ACTIVE").await.unwrap();

    let report_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM reports WHERE briefing_id = ?")
        .bind(&briefing_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(report_count.0, 0);

    let briefing = store.get_briefing(&briefing_id).await.unwrap().unwrap();
    assert_eq!(briefing.status, "ACTIVE");
    assert!(briefing.last_executed_at.is_none(), "lastExecutedAt must not advance on an empty selection");
}
