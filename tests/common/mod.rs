//! Shared fakes for integration tests: an in-memory mailbox, a scripted
//! completion service, and config/db helpers.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use outreach_engine::automation::Automation;
use outreach_engine::config::EngineConfig;
use outreach_engine::error::{LlmError, TransportError};
use outreach_engine::llm::provider::{
    CompletionRequest, CompletionResponse, FinishReason, LlmProvider,
};
use outreach_engine::pipeline::ReplyEngine;
use outreach_engine::store::LibSqlBackend;
use outreach_engine::transport::{
    Label, LabelChange, MailMessage, MailThread, MailTransport, RawEmail, SentMessage, ThreadRef,
    UNREAD_LABEL,
};

pub const OPERATOR: &str = "sam@brand.com";
pub const TRACKING_LABEL: &str = "creator-outreach";

// ── Mailbox fake ────────────────────────────────────────────────────

/// One `send_message` call.
#[derive(Debug, Clone)]
pub struct SentMail {
    pub thread_id: Option<String>,
    pub raw: Vec<u8>,
}

impl SentMail {
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.raw).to_string()
    }
}

#[derive(Default)]
struct MailboxState {
    /// Threads in discovery order.
    order: Vec<String>,
    threads: HashMap<String, MailThread>,
    labels: Vec<Label>,
    sent: Vec<SentMail>,
    modifications: Vec<(String, LabelChange)>,
    queries: Vec<String>,
    labels_created: u32,
    failing_threads: HashSet<String>,
    fail_mark_read: bool,
    fail_discovery: bool,
    label_add_failures: u32,
    next_id: u32,
}

/// In-memory mailbox. Sent messages are appended to their thread so a
/// second batch sees the operator's reply as the last message.
#[derive(Default)]
pub struct FakeTransport {
    state: Mutex<MailboxState>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_thread(&self, thread_id: &str, messages: Vec<MailMessage>) {
        let mut state = self.state.lock().unwrap();
        state.order.push(thread_id.to_string());
        state.threads.insert(
            thread_id.to_string(),
            MailThread {
                id: thread_id.to_string(),
                messages,
            },
        );
    }

    /// Append a message to an existing thread (a counterparty answering).
    pub fn push_message(&self, thread_id: &str, message: MailMessage) {
        let mut state = self.state.lock().unwrap();
        if let Some(thread) = state.threads.get_mut(thread_id) {
            thread.messages.push(message);
        }
    }

    pub fn add_label(&self, id: &str, name: &str) {
        self.state.lock().unwrap().labels.push(Label {
            id: id.to_string(),
            name: name.to_string(),
        });
    }

    pub fn fail_thread(&self, thread_id: &str) {
        self.state
            .lock()
            .unwrap()
            .failing_threads
            .insert(thread_id.to_string());
    }

    pub fn fail_mark_read(&self) {
        self.state.lock().unwrap().fail_mark_read = true;
    }

    /// Reject the next `times` label additions.
    pub fn fail_label_adds(&self, times: u32) {
        self.state.lock().unwrap().label_add_failures = times;
    }

    pub fn fail_discovery(&self) {
        self.state.lock().unwrap().fail_discovery = true;
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn modifications(&self) -> Vec<(String, LabelChange)> {
        self.state.lock().unwrap().modifications.clone()
    }

    pub fn mark_read_calls(&self) -> Vec<String> {
        self.modifications()
            .into_iter()
            .filter(|(_, change)| *change == LabelChange::mark_read())
            .map(|(id, _)| id)
            .collect()
    }

    pub fn labels_created(&self) -> u32 {
        self.state.lock().unwrap().labels_created
    }

    pub fn labels(&self) -> Vec<Label> {
        self.state.lock().unwrap().labels.clone()
    }

    pub fn queries(&self) -> Vec<String> {
        self.state.lock().unwrap().queries.clone()
    }

    pub fn thread(&self, thread_id: &str) -> Option<MailThread> {
        self.state.lock().unwrap().threads.get(thread_id).cloned()
    }

    fn failure(reason: &str) -> TransportError {
        TransportError::Status {
            provider: "fake".into(),
            status: 500,
            body: reason.into(),
        }
    }
}

#[async_trait]
impl MailTransport for FakeTransport {
    fn name(&self) -> &str {
        "fake"
    }

    async fn list_threads(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ThreadRef>, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.queries.push(query.to_string());
        if state.fail_discovery {
            return Err(Self::failure("discovery unavailable"));
        }
        Ok(state
            .order
            .iter()
            .take(max_results as usize)
            .map(|id| ThreadRef { id: id.clone() })
            .collect())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<MailThread, TransportError> {
        let state = self.state.lock().unwrap();
        if state.failing_threads.contains(thread_id) {
            return Err(Self::failure("thread fetch failed"));
        }
        state
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| TransportError::ThreadNotFound(thread_id.to_string()))
    }

    async fn send_message(
        &self,
        thread_id: Option<&str>,
        raw: &RawEmail,
    ) -> Result<SentMessage, TransportError> {
        let parsed = mail_parser::MessageParser::default()
            .parse(raw.as_bytes())
            .ok_or_else(|| TransportError::InvalidMessage("unparseable raw email".into()))?;

        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let message_id = format!("sent-{}", state.next_id);
        let requested_thread = thread_id.map(str::to_string);
        let thread_id = requested_thread
            .clone()
            .unwrap_or_else(|| format!("thread-{message_id}"));

        let message = MailMessage {
            id: message_id.clone(),
            thread_id: thread_id.clone(),
            from: parsed
                .from()
                .and_then(|addr| addr.first())
                .and_then(|a| a.address())
                .unwrap_or_default()
                .to_string(),
            to: parsed
                .to()
                .and_then(|addr| addr.first())
                .and_then(|a| a.address())
                .unwrap_or_default()
                .to_string(),
            subject: parsed.subject().unwrap_or_default().to_string(),
            rfc822_message_id: parsed.message_id().map(|id| format!("<{id}>")),
            references: None,
            received_at: Utc::now(),
            body: parsed
                .body_text(0)
                .map(|t| t.to_string())
                .unwrap_or_default(),
            label_ids: vec!["SENT".into()],
        };

        if !state.threads.contains_key(&thread_id) {
            state.order.push(thread_id.clone());
        }
        state
            .threads
            .entry(thread_id.clone())
            .or_insert_with(|| MailThread {
                id: thread_id.clone(),
                messages: Vec::new(),
            })
            .messages
            .push(message);
        state.sent.push(SentMail {
            thread_id: requested_thread,
            raw: raw.as_bytes().to_vec(),
        });

        Ok(SentMessage {
            message_id,
            thread_id,
        })
    }

    async fn modify_message(
        &self,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock().unwrap();
        state
            .modifications
            .push((message_id.to_string(), change.clone()));
        if state.fail_mark_read && change.remove.iter().any(|l| l == UNREAD_LABEL) {
            return Err(Self::failure("modify rejected"));
        }
        if !change.add.is_empty() && state.label_add_failures > 0 {
            state.label_add_failures -= 1;
            return Err(Self::failure("label rejected"));
        }

        let message = state
            .threads
            .values_mut()
            .flat_map(|t| t.messages.iter_mut())
            .find(|m| m.id == message_id)
            .ok_or_else(|| Self::failure("unknown message"))?;
        message.label_ids.retain(|l| !change.remove.contains(l));
        for label in &change.add {
            if !message.label_ids.contains(label) {
                message.label_ids.push(label.clone());
            }
        }
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, TransportError> {
        Ok(self.state.lock().unwrap().labels.clone())
    }

    async fn create_label(&self, name: &str) -> Result<Label, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.labels_created += 1;
        let label = Label {
            id: format!("Label_{}", state.labels.len() + 1),
            name: name.to_string(),
        };
        state.labels.push(label.clone());
        Ok(label)
    }
}

// ── Message builders ────────────────────────────────────────────────

/// An unread inbound message from `from`.
pub fn inbound(
    thread_id: &str,
    id: &str,
    from: &str,
    body: &str,
    received_at: DateTime<Utc>,
) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        from: from.to_string(),
        to: OPERATOR.to_string(),
        subject: "Re: Collaboration opportunity".to_string(),
        rfc822_message_id: Some(format!("<{id}@mail.test>")),
        references: None,
        received_at,
        body: body.to_string(),
        label_ids: vec!["INBOX".into(), UNREAD_LABEL.into()],
    }
}

/// A message the operator sent earlier.
pub fn outbound(thread_id: &str, id: &str, body: &str, received_at: DateTime<Utc>) -> MailMessage {
    MailMessage {
        id: id.to_string(),
        thread_id: thread_id.to_string(),
        from: format!("Alex <{OPERATOR}>"),
        to: "jane@x.com".to_string(),
        subject: "Collaboration opportunity".to_string(),
        rfc822_message_id: Some(format!("<{id}@mail.test>")),
        references: None,
        received_at,
        body: body.to_string(),
        label_ids: vec!["SENT".into()],
    }
}

pub fn minutes_ago(now: DateTime<Utc>, minutes: i64) -> DateTime<Utc> {
    now - Duration::minutes(minutes)
}

// ── Completion service fake ─────────────────────────────────────────

/// Which pipeline stage issued a completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Reply,
    Extraction,
    Outreach,
}

fn classify(request: &CompletionRequest) -> CallKind {
    if request.response_schema.is_some() {
        CallKind::Extraction
    } else if request.user_prompt().starts_with("Write the first outreach email") {
        CallKind::Outreach
    } else {
        CallKind::Reply
    }
}

/// Canned answers per stage. `None` makes that stage fail.
pub struct ScriptedLlm {
    reply: Mutex<Option<String>>,
    extraction: Mutex<Option<String>>,
    outreach: Mutex<Option<String>>,
    calls: Mutex<Vec<(CallKind, CompletionRequest)>>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reply: Mutex::new(Some(
                "Thanks Jane! Could you share a flat rate in USD?\n\nBest,\nAlex".into(),
            )),
            extraction: Mutex::new(Some(r#"{"phoneNumber": null, "rate": null}"#.into())),
            outreach: Mutex::new(Some(
                "Subject: Paid collab with our brand\n\nHi there,\n\nLoved your recent videos. \
                 What is your flat rate in USD, and the best number to reach you?\n\nCheers,\nAlex"
                    .into(),
            )),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn set_reply(&self, reply: Option<&str>) {
        *self.reply.lock().unwrap() = reply.map(str::to_string);
    }

    pub fn set_extraction(&self, extraction: Option<&str>) {
        *self.extraction.lock().unwrap() = extraction.map(str::to_string);
    }

    pub fn calls(&self, kind: CallKind) -> Vec<CompletionRequest> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, r)| r.clone())
            .collect()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl LlmProvider for ScriptedLlm {
    fn model_name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let kind = classify(&request);
        self.calls.lock().unwrap().push((kind, request));

        let slot = match kind {
            CallKind::Reply => &self.reply,
            CallKind::Extraction => &self.extraction,
            CallKind::Outreach => &self.outreach,
        };
        let content = slot
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| LlmError::RequestFailed {
                provider: "scripted".into(),
                reason: format!("{kind:?} unavailable"),
            })?;

        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }
}

// ── Wiring ──────────────────────────────────────────────────────────

/// Config from a fixed environment plus `overrides`.
pub fn test_config(overrides: &[(&str, &str)]) -> EngineConfig {
    let mut env: HashMap<String, String> = [
        ("ANTHROPIC_API_KEY", "sk-test"),
        ("GMAIL_ACCESS_TOKEN", "ya29.test"),
        ("OUTREACH_OPERATOR_ADDRESSES", "sam@brand.com, partnerships@brand.com"),
        ("OUTREACH_TRACKING_LABEL", TRACKING_LABEL),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();
    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }
    EngineConfig::from_lookup(|key| env.get(key).cloned()).expect("test config should load")
}

pub async fn memory_db() -> Arc<LibSqlBackend> {
    Arc::new(
        LibSqlBackend::new_memory()
            .await
            .expect("in-memory database should open"),
    )
}

/// Fakes plus an in-memory store, wired the way `main` wires production.
pub struct Harness {
    pub config: EngineConfig,
    pub transport: Arc<FakeTransport>,
    pub llm: Arc<ScriptedLlm>,
    pub db: Arc<LibSqlBackend>,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(test_config(&[])).await
    }

    pub async fn with_config(config: EngineConfig) -> Self {
        Self {
            config,
            transport: FakeTransport::new(),
            llm: ScriptedLlm::new(),
            db: memory_db().await,
        }
    }

    pub fn engine(&self) -> ReplyEngine {
        ReplyEngine::new(
            self.transport.clone(),
            self.db.clone(),
            self.db.clone(),
            self.llm.clone(),
            self.config.operator.addresses.clone(),
            self.config.operator.policy.clone(),
        )
        .with_settings(self.config.reply)
    }

    pub fn automation(&self) -> Automation {
        Automation::from_config(
            &self.config,
            self.transport.clone(),
            self.db.clone(),
            self.db.clone(),
            self.llm.clone(),
        )
    }
}
