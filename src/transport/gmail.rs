//! Gmail API v1 transport.
//!
//! Threads, messages and labels all go through the REST API with a bearer
//! token. Every request carries the client-wide timeout; a timeout surfaces as
//! `TransportError::Timeout` and is never retried here.

use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use mail_parser::MessageParser;
use reqwest::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{
    Label, LabelChange, MailMessage, MailThread, MailTransport, RawEmail, SentMessage, ThreadRef,
};

pub const GMAIL_API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";

const PROVIDER: &str = "gmail";

/// Gmail transport configuration.
#[derive(Debug, Clone)]
pub struct GmailConfig {
    pub api_base: String,
    pub access_token: SecretString,
    pub timeout: Duration,
}

/// Gmail REST client.
pub struct GmailTransport {
    http: reqwest::Client,
    config: GmailConfig,
}

impl GmailTransport {
    pub fn new(config: GmailConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| TransportError::RequestFailed {
                provider: PROVIDER.into(),
                reason: format!("Failed to build HTTP client: {e}"),
            })?;
        Ok(Self { http, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// Make a Gmail API call and decode the JSON response.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<serde_json::Value>,
    ) -> Result<T, TransportError> {
        debug!("Gmail API: {} {}", method, path);

        let mut request = self
            .http
            .request(method, self.url(path))
            .bearer_auth(self.config.access_token.expose_secret())
            .query(query);
        if let Some(body) = body {
            request = request.json(&body);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest(e))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status {
                provider: PROVIDER.into(),
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| TransportError::InvalidResponse {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            })
    }

    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                provider: PROVIDER.into(),
                timeout: self.config.timeout,
            }
        } else {
            TransportError::RequestFailed {
                provider: PROVIDER.into(),
                reason: e.to_string(),
            }
        }
    }
}

#[async_trait]
impl MailTransport for GmailTransport {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn list_threads(
        &self,
        query: &str,
        max_results: u32,
    ) -> Result<Vec<ThreadRef>, TransportError> {
        let list: ThreadListResponse = self
            .call(
                Method::GET,
                "threads",
                &[
                    ("q", query.to_string()),
                    ("maxResults", max_results.to_string()),
                ],
                None,
            )
            .await?;
        Ok(list
            .threads
            .into_iter()
            .map(|t| ThreadRef { id: t.id })
            .collect())
    }

    async fn get_thread(&self, thread_id: &str) -> Result<MailThread, TransportError> {
        let thread: ApiThread = self
            .call(
                Method::GET,
                &format!("threads/{thread_id}"),
                &[("format", "full".to_string())],
                None,
            )
            .await?;
        Ok(thread.into_mail_thread())
    }

    async fn send_message(
        &self,
        thread_id: Option<&str>,
        raw: &RawEmail,
    ) -> Result<SentMessage, TransportError> {
        let mut payload = serde_json::json!({ "raw": raw.to_base64url() });
        if let Some(thread_id) = thread_id {
            payload["threadId"] = serde_json::Value::String(thread_id.to_string());
        }
        let sent: ApiSendResponse = self
            .call(Method::POST, "messages/send", &[], Some(payload))
            .await?;
        Ok(SentMessage {
            message_id: sent.id,
            thread_id: sent.thread_id,
        })
    }

    async fn modify_message(
        &self,
        message_id: &str,
        change: &LabelChange,
    ) -> Result<(), TransportError> {
        let payload = serde_json::json!({
            "addLabelIds": change.add,
            "removeLabelIds": change.remove,
        });
        let _: serde_json::Value = self
            .call(
                Method::POST,
                &format!("messages/{message_id}/modify"),
                &[],
                Some(payload),
            )
            .await?;
        Ok(())
    }

    async fn list_labels(&self) -> Result<Vec<Label>, TransportError> {
        let list: LabelListResponse = self.call(Method::GET, "labels", &[], None).await?;
        Ok(list.labels)
    }

    async fn create_label(&self, name: &str) -> Result<Label, TransportError> {
        let payload = serde_json::json!({
            "name": name,
            "labelListVisibility": "labelShow",
            "messageListVisibility": "show",
        });
        self.call(Method::POST, "labels", &[], Some(payload)).await
    }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ThreadListResponse {
    #[serde(default)]
    threads: Vec<ApiThreadRef>,
}

#[derive(Debug, Deserialize)]
struct ApiThreadRef {
    id: String,
}

#[derive(Debug, Deserialize)]
struct LabelListResponse {
    #[serde(default)]
    labels: Vec<Label>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiSendResponse {
    id: String,
    thread_id: String,
}

#[derive(Debug, Deserialize)]
struct ApiThread {
    id: String,
    #[serde(default)]
    messages: Vec<ApiMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiMessage {
    id: String,
    thread_id: String,
    #[serde(default)]
    label_ids: Vec<String>,
    #[serde(default)]
    snippet: String,
    /// Epoch milliseconds, as a decimal string.
    #[serde(default)]
    internal_date: Option<String>,
    #[serde(default)]
    payload: Option<ApiPart>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiPart {
    #[serde(default)]
    mime_type: String,
    #[serde(default)]
    headers: Vec<ApiHeader>,
    #[serde(default)]
    body: Option<ApiBody>,
    #[serde(default)]
    parts: Vec<ApiPart>,
}

#[derive(Debug, Deserialize)]
struct ApiHeader {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct ApiBody {
    #[serde(default)]
    data: Option<String>,
}

impl ApiThread {
    fn into_mail_thread(self) -> MailThread {
        MailThread {
            id: self.id,
            messages: self
                .messages
                .into_iter()
                .map(ApiMessage::into_mail_message)
                .collect(),
        }
    }
}

impl ApiMessage {
    fn into_mail_message(self) -> MailMessage {
        let payload = self.payload.unwrap_or_default();
        let header = |name: &str| payload.header(name).map(str::to_string);
        let body = payload
            .plain_text()
            .filter(|b| !b.trim().is_empty())
            .unwrap_or_else(|| self.snippet.clone());

        MailMessage {
            from: header("From").unwrap_or_default(),
            to: header("To").unwrap_or_default(),
            subject: header("Subject").unwrap_or_default(),
            rfc822_message_id: header("Message-ID"),
            references: header("References"),
            received_at: parse_internal_date(self.internal_date.as_deref()),
            body,
            id: self.id,
            thread_id: self.thread_id,
            label_ids: self.label_ids,
        }
    }
}

impl ApiPart {
    fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.as_str())
    }

    /// Part data as text, decoded with the charset its `Content-Type`
    /// declares.
    fn decoded_body(&self) -> Option<String> {
        let data = self.body.as_ref()?.data.as_deref()?;
        let bytes = base64url_decode(data)?;
        let content_type = self.header("Content-Type").unwrap_or(self.mime_type.as_str());
        decode_text_part(content_type, &bytes)
    }

    /// Walk the MIME tree for the first `text/plain` part.
    fn plain_text(&self) -> Option<String> {
        if self.mime_type.eq_ignore_ascii_case("text/plain") {
            return self.decoded_body();
        }
        self.parts.iter().find_map(ApiPart::plain_text)
    }
}

/// Decode Gmail's base64url payloads (padding optional).
fn base64url_decode(data: &str) -> Option<Vec<u8>> {
    URL_SAFE_NO_PAD.decode(data.trim_end_matches('=')).ok()
}

/// Gmail strips the transfer encoding but leaves the bytes in the part's
/// own charset. Re-wrap them as a single-part message so the MIME parser
/// applies that charset.
fn decode_text_part(content_type: &str, bytes: &[u8]) -> Option<String> {
    let mut raw = format!("Content-Type: {}\r\n\r\n", content_type.replace(['\r', '\n'], " "))
        .into_bytes();
    raw.extend_from_slice(bytes);
    let parsed = MessageParser::default().parse(raw.as_slice())?;
    parsed.body_text(0).map(|text| text.into_owned())
}

fn parse_internal_date(raw: Option<&str>) -> DateTime<Utc> {
    raw.and_then(|s| s.parse::<i64>().ok())
        .and_then(DateTime::from_timestamp_millis)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
