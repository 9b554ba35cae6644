//! Thread processing loop.
//!
//! Threads are processed one at a time. A failure inside one thread is
//! logged and the loop moves on; counters already bumped for that thread
//! stay bumped.
//!
//! Per-thread order (overlapping runs rely on it, there is no lock):
//! 1. fetch, skip if empty
//! 2. status, skip if paused
//! 3. last sender, skip if it is the operator
//! 4. delay, count as pending if not yet due
//! 5. extract, generate, send, then clear the unread flag

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::PipelineError;
use crate::llm::provider::LlmProvider;
use crate::pipeline::address::{OwnedAddresses, parse_address};
use crate::pipeline::decision::{DecisionReason, decide};
use crate::pipeline::extractor::DealExtractor;
use crate::pipeline::generator::{ReplyGenerator, ReplyOutcome};
use crate::pipeline::prompts::NegotiationPolicy;
use crate::pipeline::transcript::{build_transcript, clean_body};
use crate::store::{DealStore, ThreadStatusStore};
use crate::transport::rfc822::reply_references;
use crate::transport::{
    LabelChange, MailMessage, MailThread, MailTransport, OutboundEmail, ThreadRef,
    build_raw_email, reply_subject,
};

/// Aggregate counters for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchResult {
    /// Threads fetched with at least one message.
    pub threads_checked: u32,
    /// Threads whose last message is an unanswered counterparty message.
    pub processed: u32,
    /// Replies sent.
    pub replied: u32,
    /// Threads waiting out their reply delay.
    pub pending: u32,
}

/// Transcript bounds for reply generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplySettings {
    pub transcript_messages: usize,
    pub body_char_budget: usize,
}

impl Default for ReplySettings {
    fn default() -> Self {
        Self {
            transcript_messages: 5,
            body_char_budget: 500,
        }
    }
}

/// The reply automation engine.
pub struct ReplyEngine {
    transport: Arc<dyn MailTransport>,
    statuses: Arc<dyn ThreadStatusStore>,
    generator: ReplyGenerator,
    extractor: DealExtractor,
    owned: OwnedAddresses,
    settings: ReplySettings,
}

impl ReplyEngine {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        statuses: Arc<dyn ThreadStatusStore>,
        deals: Arc<dyn DealStore>,
        llm: Arc<dyn LlmProvider>,
        owned: OwnedAddresses,
        policy: NegotiationPolicy,
    ) -> Self {
        Self {
            transport,
            statuses,
            generator: ReplyGenerator::new(Arc::clone(&llm), policy),
            extractor: DealExtractor::new(llm, deals),
            owned,
            settings: ReplySettings::default(),
        }
    }

    pub fn with_settings(mut self, settings: ReplySettings) -> Self {
        self.settings = settings;
        self
    }

    /// Process every thread matching `label_query`, up to `max_threads`.
    pub async fn process_all(
        &self,
        label_query: &str,
        max_threads: u32,
        force_no_delay: bool,
    ) -> Result<BatchResult, PipelineError> {
        self.process_all_at(label_query, max_threads, force_no_delay, Utc::now())
            .await
    }

    /// [`process_all`](Self::process_all) against an explicit clock.
    ///
    /// Only discovery failure is an error; per-thread failures are logged.
    pub async fn process_all_at(
        &self,
        label_query: &str,
        max_threads: u32,
        force_no_delay: bool,
        now: DateTime<Utc>,
    ) -> Result<BatchResult, PipelineError> {
        let threads = self
            .transport
            .list_threads(label_query, max_threads)
            .await
            .map_err(|e| PipelineError::Discovery(e.to_string()))?;

        info!(
            query = label_query,
            count = threads.len(),
            force_no_delay,
            "Processing thread batch"
        );

        let mut result = BatchResult::default();
        for thread in &threads {
            if let Err(e) = self
                .process_thread(thread, force_no_delay, now, &mut result)
                .await
            {
                error!(thread_id = %thread.id, error = %e, "Thread processing failed");
            }
        }

        info!(
            threads_checked = result.threads_checked,
            processed = result.processed,
            replied = result.replied,
            pending = result.pending,
            "Batch processing complete"
        );
        Ok(result)
    }

    async fn process_thread(
        &self,
        thread_ref: &ThreadRef,
        force_no_delay: bool,
        now: DateTime<Utc>,
        result: &mut BatchResult,
    ) -> Result<(), PipelineError> {
        let thread = self.transport.get_thread(&thread_ref.id).await?;
        let Some(last) = thread.last_message() else {
            debug!(thread_id = %thread.id, "Thread has no messages, skipping");
            return Ok(());
        };
        result.threads_checked += 1;

        let status = self.statuses.get_status(&thread.id).await?;
        let decision = decide(status, last, &self.owned, force_no_delay, now);

        match decision.reason {
            DecisionReason::SkipPaused | DecisionReason::SkipSelfAuthored => {
                debug!(
                    thread_id = %thread.id,
                    reason = decision.reason.label(),
                    "Skipping thread"
                );
                return Ok(());
            }
            DecisionReason::SkipTooSoon => {
                result.processed += 1;
                result.pending += 1;
                debug!(
                    thread_id = %thread.id,
                    message_id = %last.id,
                    "Reply not yet due"
                );
                return Ok(());
            }
            DecisionReason::Proceed => {
                result.processed += 1;
            }
        }

        let counterparty =
            parse_address(&last.from).ok_or_else(|| PipelineError::InvalidThread {
                thread_id: thread.id.clone(),
                reason: format!("unparseable sender '{}'", last.from),
            })?;

        let transcript = build_transcript(
            &thread.messages,
            &self.owned,
            self.settings.transcript_messages,
            self.settings.body_char_budget,
        );

        self.extractor
            .extract_best_effort(&clean_body(&last.body), &counterparty)
            .await;

        match self.generator.generate(&transcript).await? {
            ReplyOutcome::Terminate => {
                self.transport
                    .modify_message(&last.id, &LabelChange::mark_read())
                    .await?;
                info!(
                    thread_id = %thread.id,
                    sender = %counterparty,
                    "Counterparty disengaged, thread acknowledged without reply"
                );
            }
            ReplyOutcome::Reply(body) => {
                let sent = self.send_reply(&thread, last, &counterparty, &body).await?;
                result.replied += 1;
                info!(
                    thread_id = %thread.id,
                    message_id = %sent,
                    sender = %counterparty,
                    "Reply sent"
                );

                if let Err(e) = self
                    .transport
                    .modify_message(&last.id, &LabelChange::mark_read())
                    .await
                {
                    warn!(
                        thread_id = %thread.id,
                        message_id = %last.id,
                        error = %e,
                        "Reply sent but unread flag not cleared"
                    );
                }
            }
        }

        Ok(())
    }

    /// Send `body` into `thread` as a reply to `trigger`. Returns the new
    /// message ID.
    async fn send_reply(
        &self,
        thread: &MailThread,
        trigger: &MailMessage,
        to: &str,
        body: &str,
    ) -> Result<String, PipelineError> {
        let from = self
            .owned
            .primary()
            .ok_or_else(|| PipelineError::InvalidThread {
                thread_id: thread.id.clone(),
                reason: "no operator address to send from".into(),
            })?;

        let subject_source = if trigger.subject.trim().is_empty() {
            thread
                .messages
                .iter()
                .map(|m| m.subject.as_str())
                .find(|s| !s.trim().is_empty())
                .unwrap_or_default()
        } else {
            trigger.subject.as_str()
        };
        let subject = reply_subject(subject_source);
        let references = reply_references(trigger);

        let raw = build_raw_email(&OutboundEmail::reply(
            trigger,
            Some(self.generator.policy().persona_name.as_str()),
            from,
            to,
            &subject,
            body,
            references.as_deref(),
        ))?;

        let sent = self.transport.send_message(Some(&thread.id), &raw).await?;
        Ok(sent.message_id)
    }
}
