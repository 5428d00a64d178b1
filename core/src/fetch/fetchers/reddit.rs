//! REDDIT fetcher: OAuth2 client-credentials flow against Reddit's API.
//! Absent a `reddit` config section, this fetcher is simply never resolved
//! (no source of type REDDIT can validate successfully).

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use common::RedditConfig;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{FetchCaching, FetchOutcome, Fetcher, ValidateResult};
use crate::context::Context;
use crate::model::FetchedItem;

const REDDIT_OWNED_MEDIA_HOSTS: &[&str] = &["i.redd.it", "v.redd.it", "reddit.com", "imgur.com"];
const TOKEN_REFRESH_BUFFER_SECS: i64 = 60;

struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

pub struct RedditFetcher {
    client: reqwest::Client,
    config: Option<RedditConfig>,
    token: Mutex<Option<CachedToken>>,
    max_age_hours: i64,
}

impl RedditFetcher {
    pub fn new(timeout: Duration, config: Option<RedditConfig>) -> Self {
        let max_age_hours = config.as_ref().map(|c| c.max_age_hours).unwrap_or(24);
        Self {
            client: reqwest::Client::builder()
                .timeout(timeout)
                .user_agent("briefing-core/1.0 (+fetcher)")
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
            token: Mutex::new(None),
            max_age_hours,
        }
    }

    async fn access_token(&self) -> anyhow::Result<String> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("REDDIT source type requires a [reddit] config section"))?;

        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_BUFFER_SECS) > Utc::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let resp: TokenResponse = self
            .client
            .post(&config.token_url)
            .basic_auth(&config.client_id, Some(&config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let expires_at = Utc::now() + ChronoDuration::seconds(resp.expires_in);
        let token = resp.access_token.clone();
        *guard = Some(CachedToken {
            access_token: resp.access_token,
            expires_at,
        });
        Ok(token)
    }

    fn is_blocked_domain(domain: &str) -> bool {
        let lowered = domain.to_lowercase();
        REDDIT_OWNED_MEDIA_HOSTS
            .iter()
            .any(|blocked| lowered == *blocked || lowered.ends_with(&format!(".{blocked}")))
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct RedditListing {
    data: RedditListingData,
}

#[derive(Debug, Deserialize)]
struct RedditListingData {
    children: Vec<RedditChild>,
}

#[derive(Debug, Deserialize)]
struct RedditChild {
    data: RedditPost,
}

#[derive(Debug, Deserialize)]
struct RedditPost {
    name: String,
    title: String,
    permalink: String,
    author: Option<String>,
    domain: Option<String>,
    is_self: bool,
    stickied: bool,
    over_18: bool,
    created_utc: f64,
    selftext: Option<String>,
    url: Option<String>,
}

fn subreddit_name(url: &str) -> String {
    url.trim()
        .trim_start_matches("https://www.reddit.com/r/")
        .trim_start_matches("https://reddit.com/r/")
        .trim_start_matches("r/")
        .trim_matches('/')
        .to_string()
}

#[async_trait]
impl Fetcher for RedditFetcher {
    async fn validate(&self, url: &str) -> ValidateResult {
        if self.config.is_none() {
            return ValidateResult {
                ok: false,
                failure_reason: Some("no reddit credentials configured".to_string()),
                ..Default::default()
            };
        }
        ValidateResult {
            ok: true,
            detected_title: Some(format!("r/{}", subreddit_name(url))),
            ..Default::default()
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
        let token = self.access_token().await?;
        let subreddit = subreddit_name(url);

        let listing: RedditListing = self
            .client
            .get(format!("https://oauth.reddit.com/r/{subreddit}/hot"))
            .query(&[("limit", "100")])
            .bearer_auth(&token)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let age_cutoff = Utc::now() - ChronoDuration::hours(self.max_age_hours);
        let cutoff = match last_fetched_at {
            Some(lf) if lf > age_cutoff => lf,
            _ => age_cutoff,
        };

        let mut items = Vec::new();
        for child in listing.data.children {
            let post = child.data;
            if post.is_self || post.stickied || post.over_18 {
                continue;
            }
            if let Some(domain) = &post.domain {
                if Self::is_blocked_domain(domain) {
                    continue;
                }
            }

            let published_at = DateTime::from_timestamp(post.created_utc as i64, 0).unwrap_or_else(Utc::now);
            if published_at < cutoff {
                continue;
            }

            let link = post
                .url
                .clone()
                .unwrap_or_else(|| format!("https://www.reddit.com{}", post.permalink));

            items.push(FetchedItem {
                guid: format!("reddit:{}", post.name),
                title: post.title,
                link: Some(link),
                author: post.author,
                published_at: Some(published_at),
                raw_content: post.selftext,
                clean_content: None,
            });
        }

        Ok(FetchOutcome {
            items,
            caching: caching.clone(),
        })
    }
}
