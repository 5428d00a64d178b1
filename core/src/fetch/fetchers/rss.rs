//! RSS/Atom fetcher: conditional GET, tolerant feed parsing, guid/publishedAt
//! resolution per the fallback chains the spec names explicitly.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, IF_MODIFIED_SINCE, IF_NONE_MATCH};

use super::{FetchCaching, FetchOutcome, Fetcher, ValidateResult};
use crate::context::Context;
use crate::model::FetchedItem;

pub struct RssFetcher {
    client: reqwest::Client,
}

impl RssFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("briefing-core/1.0 (+fetcher)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
        }
    }
}

#[async_trait]
impl Fetcher for RssFetcher {
    async fn validate(&self, url: &str) -> ValidateResult {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let bytes = resp.bytes().await.unwrap_or_default();
                match feed_rs::parser::parse(&bytes[..]) {
                    Ok(feed) => ValidateResult {
                        ok: true,
                        detected_title: feed.title.map(|t| t.content),
                        detected_description: feed.description.map(|d| d.content),
                        failure_reason: None,
                    },
                    Err(e) => ValidateResult {
                        ok: false,
                        failure_reason: Some(format!("feed parse failed: {e}")),
                        ..Default::default()
                    },
                }
            }
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
        _ctx: &Context,
        url: &str,
        _extraction_prompt: Option<&str>,
        last_fetched_at: Option<DateTime<Utc>>,
        caching: &FetchCaching,
    ) -> anyhow::Result<FetchOutcome> {
        let mut headers = HeaderMap::new();
        if let Some(etag) = &caching.etag {
            if let Ok(v) = HeaderValue::from_str(etag) {
                headers.insert(IF_NONE_MATCH, v);
            }
        }
        if let Some(lm) = &caching.last_modified {
            if let Ok(v) = HeaderValue::from_str(lm) {
                headers.insert(IF_MODIFIED_SINCE, v);
            }
        }

        let resp = self.client.get(url).headers(headers).send().await?;

        if resp.status().as_u16() == 304 {
            return Ok(FetchOutcome {
                items: Vec::new(),
                caching: caching.clone(),
            });
        }

        let resp = resp.error_for_status()?;
        let new_etag = resp
            .headers()
            .get(reqwest::header::ETAG)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| caching.etag.clone());
        let new_last_modified = resp
            .headers()
            .get(reqwest::header::LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .or_else(|| caching.last_modified.clone());

        let bytes = resp.bytes().await?;
        let feed = feed_rs::parser::parse(&bytes[..])?;

        let mut items = Vec::with_capacity(feed.entries.len());
        for entry in feed.entries {
            let link = entry.links.first().map(|l| l.href.clone());

            let guid = if !entry.id.is_empty() {
                entry.id.clone()
            } else if let Some(link) = &link {
                link.clone()
            } else {
                let title = entry
                    .title
                    .as_ref()
                    .map(|t| t.content.clone())
                    .unwrap_or_default();
                let published = entry
                    .published
                    .map(|d| d.to_rfc3339())
                    .unwrap_or_default();
                let mut hasher = DefaultHasher::new();
                (title.clone(), published).hash(&mut hasher);
                format!("hash:{:x}", hasher.finish())
            };

            let published_at = entry.published.or(entry.updated);

            if let (Some(last_fetched), Some(published)) = (last_fetched_at, published_at) {
                if published < last_fetched {
                    continue;
                }
            }

            let title = entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "(untitled)".to_string());
            let author = entry.authors.first().map(|a| a.name.clone());

            let raw_content = entry
                .content
                .and_then(|c| c.body)
                .or_else(|| entry.summary.map(|s| s.content));
            let clean_content = raw_content
                .as_deref()
                .map(|html| html2text::from_read(html.as_bytes(), 100));

            items.push(FetchedItem {
                guid,
                title,
                link,
                author,
                published_at: published_at.or(Some(Utc::now())),
                raw_content,
                clean_content,
            });
        }

        Ok(FetchOutcome {
            items,
            caching: FetchCaching {
                etag: new_etag,
                last_modified: new_last_modified,
            },
        })
    }
}
