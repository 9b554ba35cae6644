//! Cold outreach and tracking-label management.
//!
//! Outreach messages carry the tracking label; the reply engine discovers
//! threads by that label.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::label_search_term;
use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::address::{OwnedAddresses, parse_address};
use crate::pipeline::prompts::{NegotiationPolicy, outreach_system_prompt, outreach_user_prompt};
use crate::transport::{
    Label, LabelChange, MailTransport, OutboundEmail, SentMessage, build_raw_email,
};

/// Subject used when the model does not supply one.
pub const DEFAULT_OUTREACH_SUBJECT: &str = "Collaboration opportunity";

const OUTREACH_MAX_TOKENS: u32 = 500;

const OUTREACH_TEMPERATURE: f32 = 0.8;

/// Threads examined per reset call.
const RESET_MAX_THREADS: u32 = 500;

/// Result of clearing the tracking label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabelReset {
    pub threads_reset: u32,
    pub messages_updated: u32,
}

/// Split a `Subject: ...` first line off a model draft.
pub fn extract_subject(content: &str) -> (String, &str) {
    let content = content.trim();
    if let Some(rest) = content
        .get(..8)
        .filter(|p| p.eq_ignore_ascii_case("subject:"))
        .map(|_| &content[8..])
        && let Some(pos) = rest.find('\n')
    {
        let subject = rest[..pos].trim();
        let body = rest[pos + 1..].trim_start();
        if !subject.is_empty() {
            return (subject.to_string(), body);
        }
        return (DEFAULT_OUTREACH_SUBJECT.to_string(), body);
    }
    (DEFAULT_OUTREACH_SUBJECT.to_string(), content)
}

/// Sends first-contact messages and manages the tracking label.
pub struct ColdOutreachSender {
    transport: Arc<dyn MailTransport>,
    llm: Arc<dyn LlmProvider>,
    policy: NegotiationPolicy,
    owned: OwnedAddresses,
    tracking_label: String,
}

impl ColdOutreachSender {
    pub fn new(
        transport: Arc<dyn MailTransport>,
        llm: Arc<dyn LlmProvider>,
        policy: NegotiationPolicy,
        owned: OwnedAddresses,
        tracking_label: impl Into<String>,
    ) -> Self {
        Self {
            transport,
            llm,
            policy,
            owned,
            tracking_label: tracking_label.into(),
        }
    }

    /// Existing tracking label, if any. Names compare case-insensitively.
    pub async fn find_label(&self) -> Result<Option<Label>, PipelineError> {
        let labels = self.transport.list_labels().await?;
        Ok(labels
            .into_iter()
            .find(|l| l.name.eq_ignore_ascii_case(&self.tracking_label)))
    }

    /// Get-or-create the tracking label.
    pub async fn ensure_label(&self) -> Result<Label, PipelineError> {
        if let Some(label) = self.find_label().await? {
            debug!(label_id = %label.id, name = %label.name, "Reusing tracking label");
            return Ok(label);
        }
        let label = self.transport.create_label(&self.tracking_label).await?;
        info!(label_id = %label.id, name = %label.name, "Created tracking label");
        Ok(label)
    }

    /// Generate and send a first-contact message to `recipient`, then tag it
    /// with the tracking label.
    pub async fn send_cold_outreach(&self, recipient: &str) -> Result<SentMessage, PipelineError> {
        let to = parse_address(recipient)
            .ok_or_else(|| PipelineError::InvalidRecipient(recipient.to_string()))?;
        let from = self.owned.primary().ok_or_else(|| {
            PipelineError::InvalidRecipient("no operator address to send from".into())
        })?;

        let label = self.ensure_label().await?;

        let request = CompletionRequest::new(vec![
            ChatMessage::system(outreach_system_prompt(&self.policy)),
            ChatMessage::user(outreach_user_prompt(&to)),
        ])
        .with_temperature(OUTREACH_TEMPERATURE)
        .with_max_tokens(OUTREACH_MAX_TOKENS);
        let response = self.llm.complete(request).await?;

        let (subject, body) = extract_subject(&response.content);
        if body.trim().is_empty() {
            return Err(PipelineError::Generation("outreach draft has no body".into()));
        }

        let raw = build_raw_email(&OutboundEmail {
            from_name: Some(self.policy.persona_name.as_str()),
            from_address: from,
            to: &to,
            subject: &subject,
            body,
            in_reply_to: None,
            references: None,
        })?;

        let sent = self.transport.send_message(None, &raw).await?;
        self.apply_tracking_label(&sent, &label).await?;

        info!(
            recipient = %to,
            message_id = %sent.message_id,
            thread_id = %sent.thread_id,
            "Cold outreach sent"
        );
        Ok(sent)
    }

    /// Tag a sent message with the tracking label, retrying once. A second
    /// failure leaves the thread invisible to discovery until re-tagged.
    async fn apply_tracking_label(
        &self,
        sent: &SentMessage,
        label: &Label,
    ) -> Result<(), PipelineError> {
        let change = LabelChange::add_label(&label.id);
        let Err(first) = self.transport.modify_message(&sent.message_id, &change).await else {
            return Ok(());
        };
        warn!(
            message_id = %sent.message_id,
            error = %first,
            "Failed to apply tracking label, retrying"
        );

        if let Err(e) = self.transport.modify_message(&sent.message_id, &change).await {
            error!(
                thread_id = %sent.thread_id,
                message_id = %sent.message_id,
                label = %label.name,
                error = %e,
                "Outreach sent without tracking label; re-tag the thread manually"
            );
            return Err(PipelineError::Untracked {
                thread_id: sent.thread_id.clone(),
                message_id: sent.message_id.clone(),
                reason: e.to_string(),
            });
        }
        Ok(())
    }

    /// Remove the tracking label from every message of every thread that
    /// carries it. The label itself is kept.
    pub async fn reset_tracking_labels(&self) -> Result<LabelReset, PipelineError> {
        let Some(label) = self.find_label().await? else {
            info!(name = %self.tracking_label, "No tracking label, nothing to reset");
            return Ok(LabelReset::default());
        };

        let query = label_search_term(&self.tracking_label);
        let threads = self
            .transport
            .list_threads(&query, RESET_MAX_THREADS)
            .await
            .map_err(|e| PipelineError::Discovery(e.to_string()))?;

        let mut reset = LabelReset::default();
        let change = LabelChange::remove_label(&label.id);
        for thread_ref in &threads {
            let thread = match self.transport.get_thread(&thread_ref.id).await {
                Ok(thread) => thread,
                Err(e) => {
                    warn!(thread_id = %thread_ref.id, error = %e, "Failed to fetch thread for reset");
                    continue;
                }
            };

            let mut touched = false;
            for message in thread.messages.iter().filter(|m| m.has_label(&label.id)) {
                match self.transport.modify_message(&message.id, &change).await {
                    Ok(()) => {
                        reset.messages_updated += 1;
                        touched = true;
                    }
                    Err(e) => warn!(
                        thread_id = %thread.id,
                        message_id = %message.id,
                        error = %e,
                        "Failed to remove tracking label"
                    ),
                }
            }
            if touched {
                reset.threads_reset += 1;
            }
        }

        info!(
            threads_reset = reset.threads_reset,
            messages_updated = reset.messages_updated,
            "Tracking labels reset"
        );
        Ok(reset)
    }
}
