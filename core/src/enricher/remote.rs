//! HTTP-backed provider: a chat-completion endpoint that is told to return
//! strict JSON matching one of the enricher's schemas. This is the "real"
//! half of the `Enricher = Tracking(Provider)` decorator.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

use super::Enricher;
use crate::context::Context;
use crate::model::{
    EnrichmentResult, ExtractedEmailItem, ExtractedWebItem, GeneratedReportEmail, TokenUsage,
    WithUsage,
};

pub struct RemoteEnricher {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    max_tokens: usize,
    temperature: f32,
    max_web_extraction_items: usize,
    max_email_extraction_items: usize,
}

impl RemoteEnricher {
    pub fn new(api_url: String, api_key: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url,
            api_key,
            model,
            max_tokens: 800,
            temperature: 0.3,
            max_web_extraction_items: 50,
            max_email_extraction_items: 5,
        }
    }

    pub fn with_defaults(mut self, timeout_secs: u64, max_tokens: usize, temperature: f32) -> Self {
        self.client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        self.max_tokens = max_tokens;
        self.temperature = temperature;
        self
    }

    pub fn with_extraction_caps(mut self, max_web: usize, max_email: usize) -> Self {
        self.max_web_extraction_items = max_web;
        self.max_email_extraction_items = max_email;
        self
    }

    async fn chat(&self, system: &str, user: &str) -> anyhow::Result<(String, TokenUsage)> {
        let body = json!({
            "model": self.model,
            "temperature": self.temperature,
            "max_tokens": self.max_tokens,
            "response_format": { "type": "json_object" },
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": user },
            ],
        });

        let resp = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: ChatCompletion = resp.json().await?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| anyhow::anyhow!("provider returned no choices"))?;

        Ok((content, parsed.usage.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    choices: Vec<ChatChoice>,
    usage: Option<TokenUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: String,
}

#[async_trait]
impl Enricher for RemoteEnricher {
    async fn enrich_and_score(
        &self,
        _ctx: &Context,
        title: &str,
        content: &str,
        web_content: Option<&str>,
        criteria: &str,
    ) -> anyhow::Result<WithUsage<EnrichmentResult>> {
        let system = "You summarize and score a single article for a personal news briefing. \
            Respond with strict JSON only: {\"summary\":string,\"topics\":[string],\
            \"entities\":{\"people\":[string],\"companies\":[string],\"technologies\":[string]},\
            \"sentiment\":\"positive\"|\"neutral\"|\"negative\",\"score\":int 0-100,\"scoreReasoning\":string}. \
            No additional properties.";
        let user = format!(
            "Briefing criteria: {criteria}\n\nTitle: {title}\n\nContent:\n{content}\n\nAdditional web content:\n{}",
            web_content.unwrap_or("")
        );

        let (raw, usage) = self.chat(system, &user).await?;
        let value: EnrichmentResult = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse enrichAndScore response: {e}"))?;
        Ok(WithUsage { value, usage })
    }

    async fn extract_from_web(
        &self,
        _ctx: &Context,
        markdown: &str,
        prompt: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedWebItem>>> {
        let system = format!(
            "Extract up to {} distinct article entries from the page markdown below, following \
            the extraction instructions given. Respond with a strict JSON array only, each entry \
            shaped {{\"title\":string,\"content\":string,\"link\":string|null}}. No additional properties.",
            self.max_web_extraction_items
        );
        let user = format!("Extraction instructions: {prompt}\n\nPage markdown:\n{markdown}");
        let (raw, usage) = self.chat(&system, &user).await?;
        let mut items: Vec<ExtractedWebItem> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse extractFromWeb response: {e}"))?;
        items.truncate(self.max_web_extraction_items);
        Ok(WithUsage { value: items, usage })
    }

    async fn extract_from_email(
        &self,
        _ctx: &Context,
        subject: &str,
        markdown: &str,
    ) -> anyhow::Result<WithUsage<Vec<ExtractedEmailItem>>> {
        let system = format!(
            "Extract up to {} distinct items worth tracking from this inbound email. Respond with a \
            strict JSON array only, each entry shaped {{\"title\":string,\"summary\":string,\"url\":string|null}}.",
            self.max_email_extraction_items
        );
        let user = format!("Subject: {subject}\n\nBody:\n{markdown}");
        let (raw, usage) = self.chat(&system, &user).await?;
        let mut items: Vec<ExtractedEmailItem> = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse extractFromEmail response: {e}"))?;
        items.truncate(self.max_email_extraction_items);
        Ok(WithUsage { value: items, usage })
    }

    async fn generate_report_email(
        &self,
        _ctx: &Context,
        briefing_title: &str,
        briefing_description: Option<&str>,
        formatted_items: &str,
    ) -> anyhow::Result<WithUsage<GeneratedReportEmail>> {
        let system = "Write a short subject line and summary for a news briefing email. Respond with \
            strict JSON only: {\"subject\":string,\"summary\":string}.";
        let user = format!(
            "Briefing: {briefing_title}\nDescription: {}\n\nItems:\n{formatted_items}",
            briefing_description.unwrap_or("")
        );
        let (raw, usage) = self.chat(system, &user).await?;
        let value: GeneratedReportEmail = serde_json::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("failed to parse generateReportEmail response: {e}"))?;
        Ok(WithUsage { value, usage })
    }
}
