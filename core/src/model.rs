//! Domain types shared by all three pipelines.
//!
//! Entities are stored with TEXT primary keys (UUIDv4 strings); there is no
//! object-graph navigation between them at runtime, only ids resolved
//! through explicit joins at the scheduler boundary.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SourceType {
    Rss,
    Web,
    Email,
    Reddit,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Rss => "RSS",
            SourceType::Web => "WEB",
            SourceType::Email => "EMAIL",
            SourceType::Reddit => "REDDIT",
        }
    }
}

impl std::str::FromStr for SourceType {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "RSS" => Ok(SourceType::Rss),
            "WEB" => Ok(SourceType::Web),
            "EMAIL" => Ok(SourceType::Email),
            "REDDIT" => Ok(SourceType::Reddit),
            other => anyhow::bail!("unknown source type: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceStatus {
    Active,
    Paused,
    Error,
}

impl SourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceStatus::Active => "ACTIVE",
            SourceStatus::Paused => "PAUSED",
            SourceStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStatus {
    Idle,
    Queued,
    Fetching,
}

impl FetchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FetchStatus::Idle => "IDLE",
            FetchStatus::Queued => "QUEUED",
            FetchStatus::Fetching => "FETCHING",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemStatus {
    New,
    Pending,
    Processing,
    Done,
    Error,
}

impl ItemStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemStatus::New => "NEW",
            ItemStatus::Pending => "PENDING",
            ItemStatus::Processing => "PROCESSING",
            ItemStatus::Done => "DONE",
            ItemStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BriefingFrequency {
    Daily,
    Weekly,
}

impl BriefingFrequency {
    pub fn as_str(&self) -> &'static str {
        match self {
            BriefingFrequency::Daily => "DAILY",
            BriefingFrequency::Weekly => "WEEKLY",
        }
    }
}

impl std::str::FromStr for BriefingFrequency {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DAILY" => Ok(BriefingFrequency::Daily),
            "WEEKLY" => Ok(BriefingFrequency::Weekly),
            other => anyhow::bail!("unknown briefing frequency: {other}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BriefingStatus {
    Active,
    Paused,
    Queued,
    Processing,
    Error,
}

impl BriefingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BriefingStatus::Active => "ACTIVE",
            BriefingStatus::Paused => "PAUSED",
            BriefingStatus::Queued => "QUEUED",
            BriefingStatus::Processing => "PROCESSING",
            BriefingStatus::Error => "ERROR",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Source {
    pub id: String,
    pub briefing_id: String,
    #[sqlx(rename = "type")]
    pub source_type: String,
    pub url: String,
    pub name: String,
    pub extraction_prompt: Option<String>,
    pub refresh_interval_minutes: i64,
    pub status: String,
    pub fetch_status: String,
    pub last_fetched_at: Option<DateTime<Utc>>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub error_message: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub fetch_started_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Item {
    pub id: String,
    pub source_id: String,
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_content: Option<String>,
    pub clean_content: Option<String>,
    pub web_content: Option<String>,
    pub summary: Option<String>,
    pub tags_json: Option<String>,
    pub score: Option<i64>,
    pub score_reasoning: Option<String>,
    pub status: String,
    pub error_message: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
    pub saved: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// Display-content precedence: webContent (non-blank) > cleanContent > rawContent.
    pub fn effective_display_content(&self) -> Option<&str> {
        if let Some(w) = self.web_content.as_deref() {
            if !w.trim().is_empty() {
                return Some(w);
            }
        }
        self.clean_content
            .as_deref()
            .or(self.raw_content.as_deref())
    }

    /// Enrichment input precedence: cleanContent ?? rawContent.
    pub fn effective_enrich_content(&self) -> Option<&str> {
        self.clean_content
            .as_deref()
            .or(self.raw_content.as_deref())
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Briefing {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub briefing_criteria: String,
    pub frequency: String,
    pub day_of_week: Option<String>,
    pub local_time: String,
    pub timezone: String,
    pub status: String,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub email_delivery_enabled: bool,
    pub position: i64,
    pub queued_at: Option<DateTime<Utc>>,
    pub processing_started_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow)]
pub struct Report {
    pub id: String,
    pub briefing_id: String,
    pub generated_at: DateTime<Utc>,
    pub local_date: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct ReportItem {
    pub id: String,
    pub report_id: String,
    pub item_id: String,
    pub score: i64,
    pub position: i64,
}

/// A single entry produced by a type-specific fetcher, not yet persisted.
#[derive(Debug, Clone)]
pub struct FetchedItem {
    pub guid: String,
    pub title: String,
    pub link: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub raw_content: Option<String>,
    pub clean_content: Option<String>,
}

/// Result of enrichment, produced by the Enricher for a single item.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub summary: String,
    pub topics: Vec<String>,
    pub entities: Entities,
    pub sentiment: Sentiment,
    pub score: i64,
    pub score_reasoning: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Entities {
    pub people: Vec<String>,
    pub companies: Vec<String>,
    pub technologies: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedWebItem {
    pub title: String,
    pub content: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractedEmailItem {
    pub title: String,
    pub summary: String,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedReportEmail {
    pub subject: String,
    pub summary: String,
}

/// Token accounting a provider call reports back, so the tracking decorator
/// can persist real `usage_log` counts instead of zeros.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: i64,
    #[serde(default)]
    pub completion_tokens: i64,
    #[serde(default)]
    pub total_tokens: i64,
}

/// Pairs an `Enricher` call's result with the token usage it cost, without
/// making every result type carry its own usage field.
#[derive(Debug, Clone)]
pub struct WithUsage<T> {
    pub value: T,
    pub usage: TokenUsage,
}
