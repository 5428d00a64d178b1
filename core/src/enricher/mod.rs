//! The abstract language-model boundary. The core never talks to a provider
//! directly; it calls through this trait, whose structured-output contracts
//! are field-exact and additional-properties-forbidden.

pub mod remote;
pub mod tracking;

use async_trait::async_trait;

use crate::context::Context;
use crate::model::{
    EnrichmentResult, ExtractedEmailItem, ExtractedWebItem, GeneratedReportEmail, WithUsage,
};

pub use tracking::TrackingEnricher;

#[async_trait]
pub trait Enricher: Send + Sync {
    async fn enrich_and_score(
        &self,
        ctx: &Context,
        title: &str,
        content: &str,
        web_content: Option<&str>,
        criteria: &str,
    ) -> anyhow::Result<WithUsage<EnrichmentResult>>;

    async fn extract_from_web(
        &self,
        ctx: &Context,
        markdown: &str,
        prompt: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedWebItem>>>;

    async fn extract_from_email(
        &self,
        ctx: &Context,
        subject: &str,
        markdown: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedEmailItem>>>;

    async fn generate_report_email(
        &self,
        ctx: &Context,
        briefing_title: &str,
        briefing_description: Option<&str>,
        formatted_items: &str,
    ) -> anyhow::Result<WithUsage<GeneratedReportEmail>>;
}

/// Used when no `[llm]` section is configured. Every call fails with an
/// `EnrichmentFailure`-shaped error, so items land in `ERROR` with a clear
/// message instead of the worker panicking on a missing collaborator.
pub struct NoopEnricher;

#[async_trait]
impl Enricher for NoopEnricher {
    async fn enrich_and_score(
        &self,
        _ctx: &Context,
        _title: &str,
        _content: &str,
        _web_content: Option<&str>,
        _criteria: &str,
    ) -> anyhow::Result<WithUsage<EnrichmentResult>> {
        anyhow::bail!("no enricher configured")
    }

    async fn extract_from_web(
        &self,
        _ctx: &Context,
        _markdown: &str,
        _prompt: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedWebItem>>> {
        anyhow::bail!("no enricher configured")
    }

    async fn extract_from_email(
        &self,
        _ctx: &Context,
        _subject: &str,
        _markdown: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedEmailItem>>> {
        anyhow::bail!("no enricher configured")
    }

    async fn generate_report_email(
        &self,
        _ctx: &Context,
        _briefing_title: &str,
        _briefing_description: Option<&str>,
        _formatted_items: &str,
    ) -> anyhow::Result<WithUsage<GeneratedReportEmail>> {
        anyhow::bail!("no enricher configured")
    }
}
