//! Transactional store: typed CRUD plus the predicates the three pipelines
//! need. All cross-actor coordination happens through compare-and-swap
//! `UPDATE ... WHERE status = ?` statements, never read-then-write.

use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::collections::HashSet;

use crate::model::{new_id, Briefing, FetchedItem, Item, Report, ReportItem, Source};

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ---- credit gate -----------------------------------------------------

    /// Batched query: ids of users with a positive credit balance.
    pub async fn users_with_balance(&self) -> crate::error::CoreResult<HashSet<String>> {
        let rows = sqlx::query("SELECT id FROM users WHERE credit_balance > 0")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.get::<String, _>("id")).collect())
    }

    pub async fn has_balance(&self, user_id: &str) -> crate::error::CoreResult<bool> {
        let row = sqlx::query("SELECT credit_balance FROM users WHERE id = ?")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get::<i64, _>("credit_balance") > 0).unwrap_or(false))
    }

    // ---- sources -----------------------------------------------------------

    /// Sources eligible per the fetch invariant, joined against the set of
    /// users with a positive credit balance, ordered lastFetchedAt NULLS
    /// FIRST then updatedAt ASC.
    pub async fn list_sources_eligible_for_fetch(
        &self,
        user_ids: &[String],
        limit: i64,
    ) -> sqlx::Result<Vec<Source>> {
        if user_ids.is_empty() || limit <= 0 {
            return Ok(Vec::new());
        }
        let placeholders = user_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            "SELECT s.* FROM sources s
             JOIN briefings b ON b.id = s.briefing_id
             WHERE s.status = 'ACTIVE' AND s.fetch_status = 'IDLE'
               AND s.refresh_interval_minutes > 0
               AND (s.last_fetched_at IS NULL
                    OR datetime(s.last_fetched_at, '+' || s.refresh_interval_minutes || ' minutes') <= datetime('now'))
               AND b.user_id IN ({placeholders})
             ORDER BY s.last_fetched_at IS NOT NULL, s.last_fetched_at ASC, s.updated_at ASC
             LIMIT ?"
        );
        let mut q = sqlx::query_as::<_, Source>(&sql);
        for id in user_ids {
            q = q.bind(id);
        }
        q = q.bind(limit);
        q.fetch_all(&self.pool).await
    }

    pub async fn get_source(&self, id: &str) -> sqlx::Result<Option<Source>> {
        sqlx::query_as::<_, Source>("SELECT * FROM sources WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    /// CAS: source.fetch_status expected -> new, stamping queued_at/fetch_started_at as given.
    pub async fn cas_source_fetch_status(
        &self,
        id: &str,
        expected: &str,
        new_status: &str,
        stamp_column: Option<&str>,
    ) -> crate::error::CoreResult<bool> {
        let sql = match stamp_column {
            Some(col) => format!(
                "UPDATE sources SET fetch_status = ?, {col} = ?, updated_at = ? WHERE id = ? AND fetch_status = ?"
            ),
            None => "UPDATE sources SET fetch_status = ?, updated_at = ? WHERE id = ? AND fetch_status = ?"
                .to_string(),
        };
        let now = Utc::now();
        let result = if stamp_column.is_some() {
            sqlx::query(&sql)
                .bind(new_status)
                .bind(now)
                .bind(now)
                .bind(id)
                .bind(expected)
                .execute(&self.pool)
                .await?
        } else {
            sqlx::query(&sql)
                .bind(new_status)
                .bind(now)
                .bind(id)
                .bind(expected)
                .execute(&self.pool)
                .await?
        };
        Ok(result.rows_affected() > 0)
    }

    /// Revert a source's fetch_status in a compensating transaction (used
    /// when a queue offer fails after the CAS to QUEUED succeeded).
    pub async fn revert_source_fetch_status(&self, id: &str, to: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE sources SET fetch_status = ?, updated_at = ? WHERE id = ?")
            .bind(to)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Apply a successful fetch's results: insert dedup'd new items, update
    /// caching headers, clear error, set fetch_status = IDLE.
    #[allow(clippy::too_many_arguments)]
    pub async fn apply_fetch_success(
        &self,
        source_id: &str,
        items: &[FetchedItem],
        first_import: bool,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> sqlx::Result<usize> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0usize;

        for item in items {
            let exists: Option<(i64,)> =
                sqlx::query_as("SELECT 1 FROM items WHERE source_id = ? AND guid = ?")
                    .bind(source_id)
                    .bind(&item.guid)
                    .fetch_optional(&mut *tx)
                    .await?;
            if exists.is_some() {
                continue;
            }

            // First-import items start DONE (never enriched); later items start NEW.
            let status = if first_import { "DONE" } else { "NEW" };
            let now = Utc::now();
            let result = sqlx::query(
                "INSERT INTO items (id, source_id, guid, title, link, author, published_at,
                    raw_content, clean_content, status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(source_id)
            .bind(&item.guid)
            .bind(&item.title)
            .bind(&item.link)
            .bind(&item.author)
            .bind(item.published_at)
            .bind(&item.raw_content)
            .bind(&item.clean_content)
            .bind(status)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await;

            match result {
                Ok(_) => inserted += 1,
                Err(e) => {
                    tracing::warn!(source_id, guid = %item.guid, error = %e, "failed to insert fetched item");
                }
            }
        }

        sqlx::query(
            "UPDATE sources SET fetch_status = 'IDLE', last_fetched_at = ?, etag = ?, last_modified = ?,
                error_message = NULL, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(etag)
        .bind(last_modified)
        .bind(Utc::now())
        .bind(source_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(inserted)
    }

    /// Apply a fetch failure: fetch_status -> IDLE (never left FETCHING),
    /// status -> ERROR with a truncated message.
    pub async fn apply_fetch_failure(&self, source_id: &str, message: &str) -> sqlx::Result<()> {
        let truncated: String = message.chars().take(1024).collect();
        sqlx::query(
            "UPDATE sources SET fetch_status = 'IDLE', status = 'ERROR', error_message = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(truncated)
        .bind(Utc::now())
        .bind(source_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn exists_item_by_source_and_guid(&self, source_id: &str, guid: &str) -> sqlx::Result<bool> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT 1 FROM items WHERE source_id = ? AND guid = ?")
            .bind(source_id)
            .bind(guid)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    // ---- items ---------------------------------------------------------

    /// Up to `2*batch_size` NEW items oldest-first; caller filters by
    /// credit-eligible users and truncates to the queue's free capacity.
    pub async fn list_items_for_enrich(&self, limit: i64) -> sqlx::Result<Vec<(Item, String)>> {
        let rows = sqlx::query(
            "SELECT i.*, b.user_id as briefing_user_id FROM items i
             JOIN sources s ON s.id = i.source_id
             JOIN briefings b ON b.id = s.briefing_id
             WHERE i.status = 'NEW'
             ORDER BY i.created_at ASC
             LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            let item = Item {
                id: row.get("id"),
                source_id: row.get("source_id"),
                guid: row.get("guid"),
                title: row.get("title"),
                link: row.get("link"),
                author: row.get("author"),
                published_at: row.get("published_at"),
                raw_content: row.get("raw_content"),
                clean_content: row.get("clean_content"),
                web_content: row.get("web_content"),
                summary: row.get("summary"),
                tags_json: row.get("tags_json"),
                score: row.get("score"),
                score_reasoning: row.get("score_reasoning"),
                status: row.get("status"),
                error_message: row.get("error_message"),
                read_at: row.get("read_at"),
                saved: row.get("saved"),
                created_at: row.get("created_at"),
                updated_at: row.get("updated_at"),
            };
            let user_id: String = row.get("briefing_user_id");
            out.push((item, user_id));
        }
        Ok(out)
    }

    /// Resolves the owning user id for an item by joining through its
    /// source and briefing — items don't carry a back-reference directly.
    pub async fn get_item_owner(&self, item_id: &str) -> sqlx::Result<Option<String>> {
        let row = sqlx::query(
            "SELECT b.user_id as user_id FROM items i
             JOIN sources s ON s.id = i.source_id
             JOIN briefings b ON b.id = s.briefing_id
             WHERE i.id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("user_id")))
    }

    /// Resolves the briefing criteria for an item's owning briefing.
    pub async fn get_item_briefing_criteria(&self, item_id: &str) -> sqlx::Result<Option<String>> {
        let row = sqlx::query(
            "SELECT b.briefing_criteria as briefing_criteria FROM items i
             JOIN sources s ON s.id = i.source_id
             JOIN briefings b ON b.id = s.briefing_id
             WHERE i.id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|r| r.get::<String, _>("briefing_criteria")))
    }

    pub async fn get_item(&self, id: &str) -> sqlx::Result<Option<Item>> {
        sqlx::query_as::<_, Item>("SELECT * FROM items WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn cas_item_status(&self, id: &str, expected: &str, new_status: &str) -> crate::error::CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE items SET status = ?, updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(new_status)
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_item_web_content(&self, id: &str, web_content: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE items SET web_content = ?, updated_at = ? WHERE id = ?")
            .bind(web_content)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Writes enrichment fields, transitions the item to DONE, withdraws one
    /// credit and inserts a ledger row — all in one transaction. Returns
    /// `Err(InsufficientCredits)`-shaped `false` via the bool result when the
    /// withdraw step fails (caller rolls the item to ERROR instead).
    #[allow(clippy::too_many_arguments)]
    pub async fn complete_enrichment(
        &self,
        item_id: &str,
        user_id: &str,
        summary: &str,
        tags_json: &str,
        score: i64,
        score_reasoning: &str,
    ) -> crate::error::CoreResult<bool> {
        let mut tx = self.pool.begin().await?;

        let withdrew = crate::credit::withdraw_credit_tx(&mut tx, user_id).await?;
        if !withdrew {
            tx.rollback().await?;
            return Ok(false);
        }

        let result = sqlx::query(
            "UPDATE items SET summary = ?, tags_json = ?, score = ?, score_reasoning = ?,
                status = 'DONE', updated_at = ? WHERE id = ? AND status = 'PROCESSING'",
        )
        .bind(summary)
        .bind(tags_json)
        .bind(score)
        .bind(score_reasoning)
        .bind(Utc::now())
        .bind(item_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        tx.commit().await?;
        Ok(true)
    }

    pub async fn mark_item_error(&self, id: &str, message: &str) -> sqlx::Result<()> {
        let truncated: String = message.chars().take(1024).collect();
        sqlx::query("UPDATE items SET status = 'ERROR', error_message = ?, updated_at = ? WHERE id = ?")
            .bind(truncated)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    // ---- briefings -------------------------------------------------------

    pub async fn list_active_briefings(&self) -> sqlx::Result<Vec<Briefing>> {
        sqlx::query_as::<_, Briefing>("SELECT * FROM briefings WHERE status = 'ACTIVE'")
            .fetch_all(&self.pool)
            .await
    }

    pub async fn get_briefing(&self, id: &str) -> sqlx::Result<Option<Briefing>> {
        sqlx::query_as::<_, Briefing>("SELECT * FROM briefings WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    pub async fn cas_briefing_status(&self, id: &str, expected: &str, new_status: &str) -> crate::error::CoreResult<bool> {
        let result = sqlx::query(
            "UPDATE briefings SET status = ?, queued_at = CASE WHEN ? = 'QUEUED' THEN ? ELSE queued_at END,
                processing_started_at = CASE WHEN ? = 'PROCESSING' THEN ? ELSE processing_started_at END,
                updated_at = ? WHERE id = ? AND status = ?",
        )
        .bind(new_status)
        .bind(new_status)
        .bind(Utc::now())
        .bind(new_status)
        .bind(Utc::now())
        .bind(Utc::now())
        .bind(id)
        .bind(expected)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn revert_briefing_status(&self, id: &str, to: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE briefings SET status = ?, updated_at = ? WHERE id = ?")
            .bind(to)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Top-scored DONE items for a briefing since a cutoff, limit N.
    pub async fn top_scored_items_since(
        &self,
        briefing_id: &str,
        since: DateTime<Utc>,
        limit: i64,
    ) -> sqlx::Result<Vec<Item>> {
        sqlx::query_as::<_, Item>(
            "SELECT i.* FROM items i
             JOIN sources s ON s.id = i.source_id
             WHERE s.briefing_id = ? AND i.status = 'DONE'
               AND i.published_at > ? AND i.score IS NOT NULL
             ORDER BY i.score DESC, i.published_at DESC
             LIMIT ?",
        )
        .bind(briefing_id)
        .bind(since)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
    }

    /// Insert a Report + its ReportItems, set lastExecutedAt, and flip the
    /// briefing back to ACTIVE — all in one transaction.
    pub async fn write_report(
        &self,
        briefing_id: &str,
        items: &[Item],
        local_date: &str,
    ) -> sqlx::Result<Report> {
        let mut tx = self.pool.begin().await?;
        let now = Utc::now();
        let report_id = new_id();

        sqlx::query(
            "INSERT INTO reports (id, briefing_id, generated_at, local_date) VALUES (?, ?, ?, ?)",
        )
        .bind(&report_id)
        .bind(briefing_id)
        .bind(now)
        .bind(local_date)
        .execute(&mut *tx)
        .await?;

        for (idx, item) in items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO report_items (id, report_id, item_id, score, position) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(&report_id)
            .bind(&item.id)
            .bind(item.score.unwrap_or(0))
            .bind((idx + 1) as i64)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "UPDATE briefings SET last_executed_at = ?, status = 'ACTIVE', updated_at = ? WHERE id = ?",
        )
        .bind(now)
        .bind(now)
        .bind(briefing_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        Ok(Report {
            id: report_id,
            briefing_id: briefing_id.to_string(),
            generated_at: now,
            local_date: local_date.to_string(),
        })
    }

    pub async fn list_report_items(&self, report_id: &str) -> sqlx::Result<Vec<ReportItem>> {
        sqlx::query_as::<_, ReportItem>(
            "SELECT * FROM report_items WHERE report_id = ? ORDER BY position ASC",
        )
        .bind(report_id)
        .fetch_all(&self.pool)
        .await
    }

    // ---- recovery ----------------------------------------------------------

    pub async fn mark_stuck_sources(&self, threshold_min: i64) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "UPDATE sources SET fetch_status = 'IDLE', updated_at = ?
             WHERE fetch_status IN ('QUEUED','FETCHING')
               AND updated_at < datetime('now', '-' || ? || ' minutes')",
        )
        .bind(Utc::now())
        .bind(threshold_min)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    /// Items stuck in PENDING/PROCESSING are dead-lettered to ERROR, not
    /// returned to NEW (see the asymmetry this preserves from the source).
    pub async fn mark_stuck_items(&self, threshold_min: i64) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "UPDATE items SET status = 'ERROR', error_message = 'stuck recovery', updated_at = ?
             WHERE status IN ('PENDING','PROCESSING')
               AND updated_at < datetime('now', '-' || ? || ' minutes')",
        )
        .bind(Utc::now())
        .bind(threshold_min)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    pub async fn mark_stuck_briefings(&self, threshold_min: i64) -> sqlx::Result<u64> {
        let result = sqlx::query(
            "UPDATE briefings SET status = 'ACTIVE', updated_at = ?
             WHERE status IN ('QUEUED','PROCESSING')
               AND updated_at < datetime('now', '-' || ? || ' minutes')",
        )
        .bind(Utc::now())
        .bind(threshold_min)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
