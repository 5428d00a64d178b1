//! Fetcher registry: a type-specific implementation per `SourceType`.

pub mod email;
pub mod reddit;
pub mod rss;
pub mod web;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::context::Context;
use crate::model::{FetchedItem, SourceType};

#[derive(Debug, Clone, Default)]
pub struct ValidateResult {
    pub ok: bool,
    pub detected_title: Option<String>,
    pub detected_description: Option<String>,
    pub failure_reason: Option<String>,
}

/// Caching headers carried across fetches for conditional GET support.
#[derive(Debug, Clone, Default)]
pub struct FetchCaching {
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

pub struct FetchOutcome {
    pub items: Vec<FetchedItem>,
    pub caching: FetchCaching,
}

#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn validate(&self, url: &str) -> ValidateResult;

    async fn fetch(
        &self,
        ctx: &Context,
        url: &str,
        extraction_prompt: Option<&str>,
        last_fetched_at: Option<DateTime<Utc>>,
        caching: &FetchCaching,
    ) -> anyhow::Result<FetchOutcome>;
}

pub struct FetcherRegistry {
    rss: rss::RssFetcher,
    web: web::WebFetcher,
    email: email::EmailFetcher,
    reddit: reddit::RedditFetcher,
}

impl FetcherRegistry {
    pub fn new(
        rss: rss::RssFetcher,
        web: web::WebFetcher,
        email: email::EmailFetcher,
        reddit: reddit::RedditFetcher,
    ) -> Self {
        Self { rss, web, email, reddit }
    }

    pub fn resolve(&self, source_type: SourceType) -> &dyn Fetcher {
        match source_type {
            SourceType::Rss => &self.rss,
            SourceType::Web => &self.web,
            SourceType::Email => &self.email,
            SourceType::Reddit => &self.reddit,
        }
    }
}
