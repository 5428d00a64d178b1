//! Exercises the enrich pipeline's store-level contract: credit withdrawal
//! exactly once per successful enrichment, the out-of-credit filter, and
//! content-selection precedence.

use async_trait::async_trait;

use briefing_core::context::Context;
use briefing_core::credit::CreditGate;
use briefing_core::enricher::Enricher;
use briefing_core::model::{
    new_id, Entities, EnrichmentResult, ExtractedEmailItem, ExtractedWebItem, GeneratedReportEmail,
    Sentiment, TokenUsage, WithUsage,
};
use briefing_core::store::Store;
use common::init_db_pool;
use sqlx::SqlitePool;

async fn setup_test_db() -> SqlitePool {
    let db_path = format!("{}/enrich_test_{}.sqlite", std::env::temp_dir().display(), new_id());
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

async fn seed_briefing_and_source(store: &Store, user_id: &str) -> (String, String) {
    let briefing_id = new_id();
    sqlx::query(
        "INSERT INTO briefings (id, user_id, title, briefing_criteria, frequency, local_time, timezone)
         VALUES (?, ?, 'Daily', 'tech news', 'DAILY', '08:00', 'UTC')",
    )
    .bind(&briefing_id)
    .bind(user_id)
    .execute(store.pool())
    .await
    .expect("insert briefing");

    let source_id = new_id();
    sqlx::query(
        "INSERT INTO sources (id, briefing_id, type, url, name, refresh_interval_minutes)
         VALUES (?, ?, 'RSS', 'https://example.test/feed.xml', 'Example Feed', 60)",
    )
    .bind(&source_id)
    .bind(&briefing_id)
    .execute(store.pool())
    .await
    .expect("insert source");

    (briefing_id, source_id)
}

async fn seed_new_item(store: &Store, source_id: &str, guid: &str) -> String {
    let item_id = new_id();
    sqlx::query(
        "INSERT INTO items (id, source_id, guid, title, raw_content, status)
         VALUES (?, ?, ?, 'A headline', 'some raw content', 'NEW')",
    )
    .bind(&item_id)
    .bind(source_id)
    .bind(guid)
    .execute(store.pool())
    .await
    .expect("insert item");
    item_id
}

/// A stub enricher that always scores 75 and never calls out to a real model.
struct StubEnricher;

#[async_trait]
impl Enricher for StubEnricher {
    async fn enrich_and_score(
        &self,
        _ctx: &Context,
        _title: &str,
        _content: &str,
        _web_content: Option<&str>,
        _criteria: &str,
    ) -> anyhow::Result<WithUsage<EnrichmentResult>> {
        Ok(WithUsage {
            value: EnrichmentResult {
                summary: "a concise summary".to_string(),
                topics: vec!["rust".to_string()],
                entities: Entities::default(),
                sentiment: Sentiment::Neutral,
                score: 75,
                score_reasoning: "relevant to criteria".to_string(),
            },
            usage: TokenUsage {
                prompt_tokens: 120,
                completion_tokens: 40,
                total_tokens: 160,
            },
        })
    }

    async fn extract_from_web(
        &self,
        _ctx: &Context,
        _markdown: &str,
        _prompt: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedWebItem>>> {
        Ok(WithUsage {
            value: vec![],
            usage: TokenUsage::default(),
        })
    }

    async fn extract_from_email(
        &self,
        _ctx: &Context,
        _subject: &str,
        _markdown: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedEmailItem>>> {
        Ok(WithUsage {
            value: vec![],
            usage: TokenUsage::default(),
        })
    }

    async fn generate_report_email(
        &self,
        _ctx: &Context,
        _briefing_title: &str,
        _briefing_description: Option<&str>,
        _formatted_items: &str,
    ) -> anyhow::Result<WithUsage<GeneratedReportEmail>> {
        Ok(WithUsage {
            value: GeneratedReportEmail {
                subject: "Your briefing".to_string(),
                summary: "summary".to_string(),
            },
            usage: TokenUsage::default(),
        })
    }
}

/// Drives one item through the same sequence the enrich worker performs,
/// without spinning up the scheduler/queue/worker-pool machinery.
async fn enrich_one(store: &Store, enricher: &dyn Enricher, item_id: &str, user_id: &str) {
    assert!(store.cas_item_status(item_id, "NEW", "PENDING").await.unwrap());
    assert!(store.cas_item_status(item_id, "PENDING", "PROCESSING").await.unwrap());

    let item = store.get_item(item_id).await.unwrap().unwrap();
    let ctx = Context::new(user_id.to_string());
    let result = enricher
        .enrich_and_score(&ctx, &item.title, item.effective_enrich_content().unwrap_or(""), None, "tech news")
        .await
        .unwrap()
        .value;

    let tags_json = serde_json::json!({
        "topics": result.topics,
        "people": result.entities.people,
        "companies": result.entities.companies,
        "technologies": result.entities.technologies,
        "sentiment": result.sentiment,
    })
    .to_string();

    let credit = CreditGate::new(store.clone());
    let completed = credit
        .complete_enrichment(item_id, user_id, &result.summary, &tags_json, result.score, &result.score_reasoning)
        .await
        .unwrap();

    if !completed {
        store.mark_item_error(item_id, "insufficient credits").await.unwrap();
    }
}

#[tokio::test]
async fn enrich_deducts_exactly_one_credit() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 5).await;
    let (_briefing_id, source_id) = seed_briefing_and_source(&store, &user_id).await;
    let item_id = seed_new_item(&store, &source_id, "g1").await;

    enrich_one(&store, &StubEnricher, &item_id, &user_id).await;

    let balance: (i64,) = sqlx::query_as("SELECT credit_balance FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(balance.0, 4);

    let ledger_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM credit_ledger WHERE user_id = ?")
        .bind(&user_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(ledger_count.0, 1);

    let item = store.get_item(&item_id).await.unwrap().unwrap();
    assert_eq!(item.status, "DONE");
    let score = item.score.expect("score must be set");
    assert!((0..=100).contains(&score));
    assert!(!item.summary.unwrap_or_default().is_empty());
}

#[tokio::test]
async fn out_of_credit_user_yields_no_transitions_until_balance_restored() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 0).await;
    let (_briefing_id, source_id) = seed_briefing_and_source(&store, &user_id).await;

    let mut item_ids = Vec::new();
    for i in 0..10 {
        item_ids.push(seed_new_item(&store, &source_id, &format!("g{i}")).await);
    }

    let candidate_users = store.users_with_balance().await.unwrap();
    assert!(candidate_users.is_empty(), "zero-balance user must not be a candidate");

    // Raise balance to 2 and run through exactly two items.
    sqlx::query("UPDATE users SET credit_balance = 2 WHERE id = ?")
        .bind(&user_id)
        .execute(store.pool())
        .await
        .unwrap();

    let candidate_users = store.users_with_balance().await.unwrap();
    assert!(candidate_users.contains(&user_id));

    enrich_one(&store, &StubEnricher, &item_ids[0], &user_id).await;
    enrich_one(&store, &StubEnricher, &item_ids[1], &user_id).await;

    let balance: (i64,) = sqlx::query_as("SELECT credit_balance FROM users WHERE id = ?")
        .bind(&user_id)
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(balance.0, 0);

    let done_count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM items WHERE status = 'DONE'")
        .fetch_one(store.pool())
        .await
        .unwrap();
    assert_eq!(done_count.0, 2);

    // A third attempt with zero balance rolls the item to ERROR rather than DONE.
    enrich_one(&store, &StubEnricher, &item_ids[2], &user_id).await;
    let third = store.get_item(&item_ids[2]).await.unwrap().unwrap();
    assert_eq!(third.status, "ERROR");
    assert_eq!(third.error_message.as_deref(), Some("insufficient credits"));
}

#[tokio::test]
async fn content_precedence_prefers_web_over_clean_over_raw() {
    let pool = setup_test_db().await;
    let store = Store::new(pool);
    let user_id = seed_user(&store, 1).await;
    let (_briefing_id, source_id) = seed_briefing_and_source(&store, &user_id).await;
    let item_id = seed_new_item(&store, &source_id, "g1").await;

    store.set_item_web_content(&item_id, "full web body").await.unwrap();
    sqlx::query("UPDATE items SET clean_content = 'clean body' WHERE id = ?")
        .bind(&item_id)
        .execute(store.pool())
        .await
        .unwrap();

    let item = store.get_item(&item_id).await.unwrap().unwrap();
    assert_eq!(item.effective_display_content(), Some("full web body"));
    assert_eq!(item.effective_enrich_content(), Some("clean body"));
}
