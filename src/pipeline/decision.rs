//! Per-thread reply decision.
//!
//! Checks run in a fixed order: paused status, then the self-authored guard,
//! then the delay. Overlapping batch runs are only safe while that order
//! holds, so the engine routes every thread through [`decide`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::pipeline::address::OwnedAddresses;
use crate::pipeline::delay::is_reply_due;
use crate::store::ThreadStatus;
use crate::transport::MailMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DecisionReason {
    SkipPaused,
    SkipSelfAuthored,
    SkipTooSoon,
    Proceed,
}

impl DecisionReason {
    pub fn label(&self) -> &'static str {
        match self {
            Self::SkipPaused => "skip-paused",
            Self::SkipSelfAuthored => "skip-self-authored",
            Self::SkipTooSoon => "skip-too-soon",
            Self::Proceed => "proceed",
        }
    }

    /// Whether the thread holds an unanswered counterparty message.
    pub fn awaits_reply(&self) -> bool {
        matches!(self, Self::SkipTooSoon | Self::Proceed)
    }
}

/// In-memory outcome of evaluating one thread. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplyDecision {
    pub should_reply: bool,
    pub reason: DecisionReason,
}

impl ReplyDecision {
    fn skip(reason: DecisionReason) -> Self {
        Self {
            should_reply: false,
            reason,
        }
    }

    fn proceed() -> Self {
        Self {
            should_reply: true,
            reason: DecisionReason::Proceed,
        }
    }
}

/// Decide whether `last` (the newest message of a thread) needs a reply now.
pub fn decide(
    status: ThreadStatus,
    last: &MailMessage,
    owned: &OwnedAddresses,
    force_no_delay: bool,
    now: DateTime<Utc>,
) -> ReplyDecision {
    if status == ThreadStatus::Paused {
        return ReplyDecision::skip(DecisionReason::SkipPaused);
    }

    if owned.contains(&last.from) {
        return ReplyDecision::skip(DecisionReason::SkipSelfAuthored);
    }

    if !force_no_delay && !is_reply_due(&last.id, last.received_at, now) {
        return ReplyDecision::skip(DecisionReason::SkipTooSoon);
    }

    ReplyDecision::proceed()
}
