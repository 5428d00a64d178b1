//! EMAIL source type: a no-op on the pull side. Items arrive only through
//! the push-side `EmailIngress` hook.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{FetchCaching, FetchOutcome, Fetcher, ValidateResult};
use crate::context::Context;

#[derive(Default)]
pub struct EmailFetcher;

#[async_trait]
impl Fetcher for EmailFetcher {
    async fn validate(&self, _url: &str) -> ValidateResult {
        ValidateResult {
            ok: true,
            ..Default::default()
        }
    }

    async fn fetch(
        &self,
        _ctx: &Context,
        _url: &str,
        _extraction_prompt: Option<&str>,
        _last_fetched_at: Option<DateTime<Utc>>,
        caching: &FetchCaching,
    ) -> anyhow::Result<FetchOutcome> {
        Ok(FetchOutcome {
            items: Vec::new(),
            caching: caching.clone(),
        })
    }
}
