//! Decorator: `Enricher = Tracking(Provider)`. Wraps any concrete provider
//! and asynchronously persists a usage_log row after each call, capturing
//! the same `Context` the caller supplied. Never blocks the caller on the
//! write: logging failures are swallowed, matching the rest of the core's
//! fire-and-forget side channels.

use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;

use super::Enricher;
use crate::context::Context;
use crate::model::{
    new_id, EnrichmentResult, ExtractedEmailItem, ExtractedWebItem, GeneratedReportEmail,
    TokenUsage, WithUsage,
};
use crate::store::Store;

pub struct TrackingEnricher<E: Enricher> {
    inner: E,
    store: Store,
    model: String,
}

impl<E: Enricher> TrackingEnricher<E> {
    pub fn new(inner: E, store: Store, model: String) -> Self {
        Self { inner, store, model }
    }

    async fn record(
        &self,
        ctx: &Context,
        feature: &'static str,
        success: bool,
        error_message: Option<String>,
        duration_ms: i64,
        usage: TokenUsage,
    ) {
        let store = self.store.clone();
        let user_id = ctx.user_id.clone();
        let model = self.model.clone();
        tokio::spawn(async move {
            let result = sqlx::query(
                "INSERT INTO usage_log (id, user_id, feature, model, prompt_tokens, completion_tokens,
                    total_tokens, success, error_message, duration_ms, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(new_id())
            .bind(user_id)
            .bind(feature)
            .bind(model)
            .bind(usage.prompt_tokens)
            .bind(usage.completion_tokens)
            .bind(usage.total_tokens)
            .bind(success)
            .bind(error_message)
            .bind(duration_ms)
            .bind(Utc::now())
            .execute(store.pool())
            .await;
            if let Err(e) = result {
                tracing::warn!(error = %e, "failed to persist usage_log row");
            }
        });
    }
}

#[async_trait]
impl<E: Enricher> Enricher for TrackingEnricher<E> {
    async fn enrich_and_score(
        &self,
        ctx: &Context,
        title: &str,
        content: &str,
        web_content: Option<&str>,
        criteria: &str,
    ) -> anyhow::Result<WithUsage<EnrichmentResult>> {
        let start = Instant::now();
        let result = self
            .inner
            .enrich_and_score(ctx, title, content, web_content, criteria)
            .await;
        let elapsed = start.elapsed().as_millis() as i64;
        match &result {
            Ok(ok) => self.record(ctx, "enrich_and_score", true, None, elapsed, ok.usage).await,
            Err(e) => {
                self.record(ctx, "enrich_and_score", false, Some(e.to_string()), elapsed, TokenUsage::default())
                    .await
            }
        }
        result
    }

    async fn extract_from_web(
        &self,
        ctx: &Context,
        markdown: &str,
        prompt: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedWebItem>>> {
        let start = Instant::now();
        let result = self.inner.extract_from_web(ctx, markdown, prompt).await;
        let elapsed = start.elapsed().as_millis() as i64;
        match &result {
            Ok(ok) => self.record(ctx, "extract_from_web", true, None, elapsed, ok.usage).await,
            Err(e) => {
                self.record(ctx, "extract_from_web", false, Some(e.to_string()), elapsed, TokenUsage::default())
                    .await
            }
        }
        result
    }

    async fn extract_from_email(
        &self,
        ctx: &Context,
        subject: &str,
        markdown: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedEmailItem>>> {
        let start = Instant::now();
        let result = self.inner.extract_from_email(ctx, subject, markdown).await;
        let elapsed = start.elapsed().as_millis() as i64;
        match &result {
            Ok(ok) => self.record(ctx, "extract_from_email", true, None, elapsed, ok.usage).await,
            Err(e) => {
                self.record(ctx, "extract_from_email", false, Some(e.to_string()), elapsed, TokenUsage::default())
                    .await
            }
        }
        result
    }

    async fn generate_report_email(
        &self,
        ctx: &Context,
        briefing_title: &str,
        briefing_description: Option<&str>,
        formatted_items: &str,
    ) -> anyhow::Result<WithUsage<GeneratedReportEmail>> {
        let start = Instant::now();
        let result = self
            .inner
            .generate_report_email(ctx, briefing_title, briefing_description, formatted_items)
            .await;
        let elapsed = start.elapsed().as_millis() as i64;
        match &result {
            Ok(ok) => self.record(ctx, "generate_report_email", true, None, elapsed, ok.usage).await,
            Err(e) => {
                self.record(ctx, "generate_report_email", false, Some(e.to_string()), elapsed, TokenUsage::default())
                    .await
            }
        }
        result
    }
}
