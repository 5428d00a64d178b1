//! `ReportMailer`: outbound email delivery hook. The core never embeds an
//! SMTP client; delivery failures are logged and swallowed so they never
//! fail a brief run.

use async_trait::async_trait;

use crate::model::{Briefing, Report};

#[async_trait]
pub trait ReportMailer: Send + Sync {
    async fn deliver(&self, briefing: &Briefing, report: &Report) -> anyhow::Result<()>;
}

/// Default mailer used when no outbound mail transport is configured: logs
/// the delivery attempt and returns success so callers don't treat an
/// intentionally absent transport as a failure.
pub struct NoopMailer;

#[async_trait]
impl ReportMailer for NoopMailer {
    async fn deliver(&self, briefing: &Briefing, report: &Report) -> anyhow::Result<()> {
        tracing::debug!(briefing_id = %briefing.id, report_id = %report.id, "no mail transport configured, skipping delivery");
        Ok(())
    }
}
