//! Negotiation reply generator.
//!
//! One completion per call. The model signals "drop this thread" by
//! answering with the sentinel; anything that looks like the sentinel is
//! treated as a terminate, never sent.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::PipelineError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::{NegotiationPolicy, negotiation_system_prompt, negotiation_user_prompt};

/// Max tokens for a reply draft.
const REPLY_MAX_TOKENS: u32 = 600;

/// Temperature for reply drafts (some variety, still on-policy).
const REPLY_TEMPERATURE: f32 = 0.7;

/// Result of a generation call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyOutcome {
    /// Send this body.
    Reply(String),
    /// Send nothing; acknowledge the trigger only.
    Terminate,
}

/// Classify raw model output against the sentinel.
///
/// Exact (trimmed, case-insensitive) match terminates. So does an embedded
/// sentinel: a line that is the sentinel, or the upper-case token standing
/// alone as a word inside longer text. The embedded case is logged.
pub fn classify_reply(text: &str, sentinel: &str) -> ReplyOutcome {
    let trimmed = text.trim();
    if trimmed.eq_ignore_ascii_case(sentinel) {
        return ReplyOutcome::Terminate;
    }

    let line_match = trimmed.lines().any(|line| {
        line.trim()
            .trim_matches(|c: char| c.is_ascii_punctuation())
            .eq_ignore_ascii_case(sentinel)
    });
    let upper = sentinel.to_ascii_uppercase();
    let word_match = trimmed
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| word == upper);

    if line_match || word_match {
        warn!(
            sentinel,
            preview = %trimmed.chars().take(120).collect::<String>(),
            "Sentinel embedded in reply text; sending nothing"
        );
        return ReplyOutcome::Terminate;
    }

    ReplyOutcome::Reply(trimmed.to_string())
}

/// Drafts negotiation replies from a transcript.
pub struct ReplyGenerator {
    llm: Arc<dyn LlmProvider>,
    policy: NegotiationPolicy,
}

impl ReplyGenerator {
    pub fn new(llm: Arc<dyn LlmProvider>, policy: NegotiationPolicy) -> Self {
        Self { llm, policy }
    }

    pub fn policy(&self) -> &NegotiationPolicy {
        &self.policy
    }

    /// Generate a reply (or a terminate) for `transcript`.
    pub async fn generate(&self, transcript: &str) -> Result<ReplyOutcome, PipelineError> {
        let request = CompletionRequest::new(vec![
            ChatMessage::system(negotiation_system_prompt(&self.policy)),
            ChatMessage::user(negotiation_user_prompt(transcript)),
        ])
        .with_temperature(REPLY_TEMPERATURE)
        .with_max_tokens(REPLY_MAX_TOKENS);

        let response = self.llm.complete(request).await?;
        debug!(
            model = self.llm.model_name(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            "Reply draft generated"
        );

        if response.content.trim().is_empty() {
            return Err(PipelineError::Generation("model returned an empty reply".into()));
        }

        Ok(classify_reply(&response.content, &self.policy.sentinel))
    }
}
