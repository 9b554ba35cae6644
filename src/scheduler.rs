//! In-process cron trigger for `serve` mode.
//!
//! Fires `process` for the configured operator on each scheduled tick. Runs
//! never overlap within one ticker: the next fire time is computed only
//! after the previous run returns.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::automation::{Automation, AutomationAction, AutomationRequest};
use crate::error::ConfigError;

/// Parse a cron expression and compute the next fire time after `after`.
pub fn next_fire(schedule: &str, after: DateTime<Utc>) -> Result<Option<DateTime<Utc>>, ConfigError> {
    let parsed = cron::Schedule::from_str(schedule).map_err(|e| ConfigError::InvalidValue {
        key: "OUTREACH_SCHEDULE".into(),
        message: format!("invalid cron: {e}"),
    })?;
    Ok(parsed.after(&after).next())
}

/// Spawn the cron ticker background task.
pub fn spawn_cron_ticker(
    automation: Arc<Automation>,
    schedule: String,
) -> Result<tokio::task::JoinHandle<()>, ConfigError> {
    next_fire(&schedule, Utc::now())?;

    let request = AutomationRequest {
        operator: automation.operator_id().to_string(),
        skip_delay: false,
        action: AutomationAction::Process,
        recipient: None,
    };

    Ok(tokio::spawn(async move {
        info!(schedule = %schedule, "Automation scheduler started");
        loop {
            let next = match next_fire(&schedule, Utc::now()) {
                Ok(Some(next)) => next,
                Ok(None) => {
                    warn!(schedule = %schedule, "Schedule has no future fire times, stopping");
                    return;
                }
                Err(e) => {
                    warn!(error = %e, "Scheduler stopped");
                    return;
                }
            };

            let wait = (next - Utc::now()).to_std().unwrap_or_default();
            tokio::time::sleep(wait).await;

            let response = automation.run(&request).await;
            if !response.success {
                warn!(error = ?response.error, "Scheduled run failed");
            }
        }
    }))
}
