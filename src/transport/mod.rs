//! Message transport client: the mail provider capability.
//!
//! The engine only talks to mail through `MailTransport`. The production
//! implementation is `GmailTransport`; tests use in-process fakes.

pub mod gmail;
pub mod rfc822;

pub use gmail::{GmailConfig, GmailTransport};
pub use rfc822::{OutboundEmail, build_raw_email, normalize_subject, reply_subject};

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// System label carried by unread messages.
pub const UNREAD_LABEL: &str = "UNREAD";

/// A thread handle returned by discovery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadRef {
    pub id: String,
}

/// A full thread. Messages are in arrival order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailThread {
    pub id: String,
    pub messages: Vec<MailMessage>,
}

impl MailThread {
    /// The most recent message, if any.
    pub fn last_message(&self) -> Option<&MailMessage> {
        self.messages.last()
    }
}

/// A single received or sent message. Immutable once received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailMessage {
    /// Transport-assigned ID.
    pub id: String,
    pub thread_id: String,
    /// Raw `From` header, e.g. `Jane <jane@x.com>`.
    pub from: String,
    pub to: String,
    pub subject: String,
    /// RFC 822 `Message-ID` header, used for reply threading.
    pub rfc822_message_id: Option<String>,
    /// RFC 822 `References` header.
    pub references: Option<String>,
    /// Transport receive time. The reference clock for reply delays.
    pub received_at: DateTime<Utc>,
    /// Plain-text body, or the provider snippet when there is none.
    pub body: String,
    #[serde(default)]
    pub label_ids: Vec<String>,
}

impl MailMessage {
    pub fn is_unread(&self) -> bool {
        self.label_ids.iter().any(|l| l == UNREAD_LABEL)
    }

    pub fn has_label(&self, label_id: &str) -> bool {
        self.label_ids.iter().any(|l| l == label_id)
    }
}

/// A mailbox label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub id: String,
    pub name: String,
}

/// Label/flag mutation for one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelChange {
    pub add: Vec<String>,
    pub remove: Vec<String>,
}

impl LabelChange {
    /// Clear the unread flag.
    pub fn mark_read() -> Self {
        Self {
            add: Vec::new(),
            remove: vec![UNREAD_LABEL.to_string()],
        }
    }

    pub fn add_label(label_id: impl Into<String>) -> Self {
        Self {
            add: vec![label_id.into()],
            remove: Vec::new(),
        }
    }

    pub fn remove_label(label_id: impl Into<String>) -> Self {
        Self {
            add: Vec::new(),
            remove: vec![label_id.into()],
        }
    }
}

/// Result of a send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SentMessage {
    pub message_id: String,
    pub thread_id: String,
}

/// A fully rendered RFC 822 document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEmail(Vec<u8>);

impl RawEmail {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Base64url without padding, the wire form the provider expects.
    pub fn to_base64url(&self) -> String {
        URL_SAFE_NO_PAD.encode(&self.0)
    }
}

/// Mail provider capability.
#[async_trait]
pub trait MailTransport: Send + Sync {
    /// Provider name, for logging.
    fn name(&self) -> &str;

    /// Discover threads matching a provider query.
    async fn list_threads(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ThreadRef>, TransportError>;

    /// Fetch a thread with all of its messages.
    async fn get_thread(&self, thread_id: &str) -> Result<MailThread, TransportError>;

    /// Send a message, into `thread_id` when given, else as a new thread.
    async fn send_message(
        &self,
        thread_id: Option<&str>,
        raw: &RawEmail,
    ) -> Result<SentMessage, TransportError>;

    /// Add/remove labels (including the unread flag) on one message.
    async fn modify_message(
        &self,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<(), TransportError>;

    async fn list_labels(&self) -> Result<Vec<Label>, TransportError>;

    async fn create_label(&self, name: &str) -> Result<Label, TransportError>;
}
