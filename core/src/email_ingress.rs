//! `EmailIngress`: the push-side counterpart to the EMAIL fetcher, which is
//! otherwise a no-op. An inbound mail transport outside this core resolves
//! the routing token to a `Source` and calls `ingest` here.

use std::sync::Arc;

use chrono::Utc;
use sqlx::Row;

use crate::context::Context;
use crate::credit::CreditGate;
use crate::enricher::Enricher;
use crate::model::new_id;
use crate::store::Store;

pub struct EmailIngress {
    store: Store,
    credit: CreditGate,
    enricher: Arc<dyn Enricher>,
}

impl EmailIngress {
    pub fn new(store: Store, credit: CreditGate, enricher: Arc<dyn Enricher>) -> Self {
        Self { store, credit, enricher }
    }

    /// Archives the raw mail regardless of credit, then — if the owning
    /// user has balance — extracts items and inserts them as NEW.
    pub async fn ingest(
        &self,
        source_id: &str,
        message_id: &str,
        subject: &str,
        body_markdown: &str,
    ) -> anyhow::Result<usize> {
        self.archive_raw(source_id, message_id, subject, body_markdown).await?;

        let row = sqlx::query(
            "SELECT b.user_id as user_id FROM sources s JOIN briefings b ON b.id = s.briefing_id WHERE s.id = ?",
        )
        .bind(source_id)
        .fetch_optional(self.store.pool())
        .await?;
        let Some(row) = row else {
            tracing::warn!(source_id, "email ingress: source not found, dropping message");
            return Ok(0);
        };
        let user_id: String = row.get("user_id");

        if !self.credit.has_balance(&user_id).await? {
            tracing::info!(source_id, user_id, "email ingress: user out of credit, archived only");
            return Ok(0);
        }

        let ctx = Context::new(user_id);
        let extracted = self
            .enricher
            .extract_from_email(&ctx, subject, body_markdown)
            .await?
            .value;

        let mut inserted = 0usize;
        for (idx, entry) in extracted.iter().enumerate() {
            let guid = format!("{message_id}:{idx}");
            if self.store.exists_item_by_source_and_guid(source_id, &guid).await? {
                continue;
            }
            let now = Utc::now();
            sqlx::query(
                "INSERT INTO items (id, source_id, guid, title, link, raw_content, clean_content,
                    status, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 'NEW', ?, ?)",
            )
            .bind(new_id())
            .bind(source_id)
            .bind(&guid)
            .bind(&entry.title)
            .bind(&entry.url)
            .bind(&entry.summary)
            .bind(&entry.summary)
            .bind(now)
            .bind(now)
            .execute(self.store.pool())
            .await?;
            inserted += 1;
        }

        Ok(inserted)
    }

    async fn archive_raw(
        &self,
        source_id: &str,
        message_id: &str,
        subject: &str,
        body_markdown: &str,
    ) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO raw_emails (id, source_id, message_id, subject, body_markdown, received_at)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(new_id())
        .bind(source_id)
        .bind(message_id)
        .bind(subject)
        .bind(body_markdown)
        .bind(Utc::now())
        .execute(self.store.pool())
        .await?;
        tracing::info!(source_id, message_id, subject, len = body_markdown.len(), "archived inbound email");
        Ok(())
    }
}
