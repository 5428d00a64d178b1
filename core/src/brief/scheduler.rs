//! Brief scheduler: finds ACTIVE briefings whose local scheduled time has
//! passed today, CASes them to QUEUED, and offers their ids to `BriefQ`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{NaiveTime, Timelike, Utc, Weekday};
use chrono_tz::Tz;
use common::BriefConfig;
use tokio::sync::Notify;

use crate::credit::CreditGate;
use crate::model::Briefing;
use crate::queue::BoundedQueue;
use crate::store::Store;

pub async fn run(store: Store, credit: CreditGate, queue: BoundedQueue, config: BriefConfig, shutdown: Arc<Notify>) {
    let mut ticker = tokio::time::interval(Duration::from_millis(config.scheduler_interval_ms));
    loop {
        tokio::select! {
            _ = shutdown.notified() => {
                tracing::info!("brief scheduler: shutdown received, stopping");
                return;
            }
            _ = ticker.tick() => {
                if let Err(e) = run_once(&store, &credit, &queue).await {
                    tracing::error!(error = %e, "brief scheduler cycle failed");
                }
            }
        }
    }
}

async fn run_once(store: &Store, credit: &CreditGate, queue: &BoundedQueue) -> anyhow::Result<()> {
    if queue.free_capacity() == 0 {
        tracing::debug!("brief scheduler: queue at capacity, skipping cycle");
        return Ok(());
    }

    let candidate_users = credit.users_with_balance().await?;
    let briefings = store.list_active_briefings().await?;

    for briefing in briefings {
        if !candidate_users.contains(&briefing.user_id) {
            continue;
        }
        if !is_due(&briefing)? {
            continue;
        }

        let cas_ok = store.cas_briefing_status(&briefing.id, "ACTIVE", "QUEUED").await?;
        if !cas_ok {
            continue;
        }

        if !queue.offer(briefing.id.clone()) {
            tracing::warn!(briefing_id = %briefing.id, "brief queue rejected offer after CAS, reverting and stopping cycle");
            store.revert_briefing_status(&briefing.id, "ACTIVE").await?;
            break;
        }

        if queue.free_capacity() == 0 {
            break;
        }
    }

    Ok(())
}

/// Whether `briefing`'s scheduled local time has passed "today" in its own
/// timezone and it has not already run since the start of that local day.
pub fn is_due(briefing: &Briefing) -> anyhow::Result<bool> {
    let tz: Tz = briefing
        .timezone
        .parse()
        .map_err(|_| anyhow::anyhow!("invalid IANA timezone: {}", briefing.timezone))?;
    let user_now = Utc::now().with_timezone(&tz);

    let local_time = NaiveTime::parse_from_str(&briefing.local_time, "%H:%M")
        .map_err(|e| anyhow::anyhow!("invalid localTime '{}': {e}", briefing.local_time))?;

    if user_now.time() < local_time {
        return Ok(false);
    }

    let start_of_today = user_now
        .with_hour(0)
        .and_then(|d| d.with_minute(0))
        .and_then(|d| d.with_second(0))
        .and_then(|d| d.with_nanosecond(0))
        .ok_or_else(|| anyhow::anyhow!("failed to compute start of local day"))?;

    if let Some(last_executed) = briefing.last_executed_at {
        let last_executed_local = last_executed.with_timezone(&tz);
        if last_executed_local >= start_of_today {
            return Ok(false);
        }
    }

    if briefing.frequency == "WEEKLY" {
        let expected_day = briefing
            .day_of_week
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("WEEKLY briefing missing dayOfWeek"))?;
        let expected = parse_weekday(expected_day)
            .ok_or_else(|| anyhow::anyhow!("invalid dayOfWeek: {expected_day}"))?;
        if user_now.weekday() != expected {
            return Ok(false);
        }
    }

    Ok(true)
}

/// Accepts both full ("Monday") and abbreviated ("Mon") English weekday
/// names, case-insensitively, since the spec does not pin down which form
/// callers store in `dayOfWeek`.
fn parse_weekday(s: &str) -> Option<Weekday> {
    let lowered = s.to_lowercase();
    let short = &lowered.as_str()[..lowered.len().min(3)];
    match short {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn base_briefing() -> Briefing {
        Briefing {
            id: "b1".into(),
            user_id: "u1".into(),
            title: "Daily".into(),
            briefing_criteria: "".into(),
            frequency: "DAILY".into(),
            day_of_week: None,
            local_time: "00:00".into(),
            timezone: "UTC".into(),
            status: "ACTIVE".into(),
            last_executed_at: None,
            email_delivery_enabled: false,
            position: 0,
            queued_at: None,
            processing_started_at: None,
            error_message: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn daily_due_when_time_passed_and_never_run() {
        let b = base_briefing();
        assert!(is_due(&b).unwrap());
    }

    #[test]
    fn daily_not_due_twice_same_local_day() {
        let mut b = base_briefing();
        b.last_executed_at = Some(Utc::now());
        assert!(!is_due(&b).unwrap());
    }

    #[test]
    fn weekly_not_due_on_wrong_day() {
        let mut b = base_briefing();
        b.frequency = "WEEKLY".into();
        b.local_time = "00:00".into();
        let wrong_day = Utc::now().with_timezone(&chrono_tz::UTC).weekday().pred();
        b.day_of_week = Some(wrong_day.to_string());
        assert!(!is_due(&b).unwrap());
    }
}
