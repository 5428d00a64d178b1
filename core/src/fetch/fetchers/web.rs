//! WEB fetcher: pull the full page, hand its markdown and the source's
//! extraction prompt to the enricher's `extractFromWeb` capability, then
//! resolve each result's link against the source URL — the normalized
//! link becomes the guid.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use readability::extractor;

use super::{FetchCaching, FetchOutcome, Fetcher, ValidateResult};
use crate::context::Context;
use crate::enricher::Enricher;
use crate::model::FetchedItem;
use crate::urlnorm;

pub struct WebFetcher {
    client: reqwest::Client,
    enricher: Arc<dyn Enricher>,
    body_max_chars: usize,
}

impl WebFetcher {
    pub fn new(timeout: Duration, enricher: Arc<dyn Enricher>, body_max_chars: usize) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("briefing-core/1.0 (+fetcher)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            enricher,
            body_max_chars,
        }
    }

    fn extract_markdown(&self, url: &str, html: &str) -> anyhow::Result<String> {
        let parsed_url = url.parse()?;
        let product = extractor::extract(&mut html.as_bytes(), &parsed_url)
            .map_err(|e| anyhow::anyhow!("readability extraction failed: {e}"))?;
        let markdown = html2text::from_read(product.content.as_bytes(), 100);
        let capped: String = markdown.chars().take(self.body_max_chars).collect();
        Ok(capped)
    }
}

#[async_trait]
impl Fetcher for WebFetcher {
    async fn validate(&self, url: &str) -> ValidateResult {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => ValidateResult {
                ok: true,
                ..Default::default()
            },
            Ok(resp) => ValidateResult {
                ok: false,
                failure_reason: Some(format!("unexpected status {}", resp.status())),
                ..Default::default()
            },
            Err(e) => ValidateResult {
                ok: false,
                failure_reason: Some(e.to_string()),
                ..Default::default()
            },
        }
    }

    async fn fetch(
        &self,
        ctx: &Context,
        url: &str,
        extraction_prompt: Option<&str>,
        _last_fetched_at: Option<DateTime<Utc>>,
        caching: &FetchCaching,
    ) -> anyhow::Result<FetchOutcome> {
        let html = self.client.get(url).send().await?.error_for_status()?.text().await?;
        let markdown = self.extract_markdown(url, &html)?;

        let extracted = self
            .enricher
            .extract_from_web(ctx, &markdown, extraction_prompt.unwrap_or(""))
            .await?
            .value;

        let mut items = Vec::with_capacity(extracted.len());
        for entry in extracted {
            let Some(raw_link) = entry.link else { continue };
            let Some(normalized) = urlnorm::resolve_link(url, &raw_link) else {
                continue;
            };
            if normalized.trim().is_empty() {
                continue;
            }

            items.push(FetchedItem {
                guid: normalized.clone(),
                title: entry.title,
                link: Some(normalized),
                author: None,
                published_at: Some(Utc::now()),
                raw_content: Some(entry.content.clone()),
                clean_content: Some(entry.content),
            });
        }

        Ok(FetchOutcome {
            items,
            caching: caching.clone(),
        })
    }
}
