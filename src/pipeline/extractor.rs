//! Structured deal extraction.
//!
//! Best-effort: mines the newest counterparty message for a phone number
//! and a rate, and merges whatever it finds into the deal store. Nothing
//! here may fail a reply.

use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::{LlmError, PipelineError};
use crate::llm::extract_json_object;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::pipeline::prompts::{deal_schema, extraction_system_prompt, extraction_user_prompt};
use crate::store::{DealRecord, DealStore, DealUpdate};

const EXTRACT_MAX_TOKENS: u32 = 200;

const EXTRACT_TEMPERATURE: f32 = 0.0;

/// Longest message body sent for extraction, in characters.
const EXTRACT_BODY_CHARS: usize = 4000;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExtractionResponse {
    #[serde(default)]
    phone_number: Option<String>,
    #[serde(default)]
    rate: Option<String>,
}

/// Blank strings and a literal "null" count as absent.
fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case("null"))
}

/// Parse a model response into a deal update.
pub fn parse_extraction(raw: &str) -> Result<DealUpdate, LlmError> {
    let json = extract_json_object(raw);
    let parsed: ExtractionResponse = serde_json::from_str(&json)?;
    Ok(DealUpdate {
        phone_number: non_blank(parsed.phone_number),
        rate: non_blank(parsed.rate),
    })
}

/// Extracts deal data and merge-upserts it by counterparty email.
pub struct DealExtractor {
    llm: Arc<dyn LlmProvider>,
    deals: Arc<dyn DealStore>,
}

impl DealExtractor {
    pub fn new(llm: Arc<dyn LlmProvider>, deals: Arc<dyn DealStore>) -> Self {
        Self { llm, deals }
    }

    /// Extract from `body` and upsert for `counterparty_email`.
    ///
    /// Returns the stored record, or `None` when nothing was found.
    pub async fn extract(
        &self,
        body: &str,
        counterparty_email: &str,
    ) -> Result<Option<DealRecord>, PipelineError> {
        if body.trim().is_empty() {
            return Ok(None);
        }
        let body: String = body.chars().take(EXTRACT_BODY_CHARS).collect();

        let request = CompletionRequest::new(vec![
            ChatMessage::system(extraction_system_prompt()),
            ChatMessage::user(extraction_user_prompt(&body)),
        ])
        .with_temperature(EXTRACT_TEMPERATURE)
        .with_max_tokens(EXTRACT_MAX_TOKENS)
        .with_response_schema(deal_schema());

        let response = self.llm.complete(request).await?;
        let update = parse_extraction(&response.content)?;

        if update.is_empty() {
            debug!(email = counterparty_email, "No deal data in message");
            return Ok(None);
        }

        let record = self.deals.upsert_by_email(counterparty_email, &update).await?;
        info!(
            email = %record.email,
            phone = update.phone_number.is_some(),
            rate = update.rate.is_some(),
            "Deal data extracted"
        );
        Ok(Some(record))
    }

    /// Like [`extract`](Self::extract), but failures are logged and dropped.
    pub async fn extract_best_effort(&self, body: &str, counterparty_email: &str) {
        if let Err(e) = self.extract(body, counterparty_email).await {
            warn!(
                email = counterparty_email,
                error = %e,
                "Deal extraction failed, continuing"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{CompletionResponse, FinishReason};
    use crate::store::LibSqlBackend;
    use std::sync::Mutex;

    struct StubLlm {
        response: String,
        requests: Mutex<Vec<CompletionRequest>>,
    }

    impl StubLlm {
        fn new(response: &str) -> Arc<Self> {
            Arc::new(Self {
                response: response.into(),
                requests: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait::async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
            self.requests.lock().unwrap().push(request);
            Ok(CompletionResponse {
                content: self.response.clone(),
                input_tokens: 0,
                output_tokens: 0,
                finish_reason: FinishReason::Stop,
            })
        }
    }

    async fn store() -> Arc<LibSqlBackend> {
        Arc::new(LibSqlBackend::new_memory().await.unwrap())
    }

    // ── Parsing ─────────────────────────────────────────────────────

    #[test]
    fn parses_both_fields() {
        let update = parse_extraction(r#"{"phoneNumber": "+1 555 0100", "rate": "$500"}"#).unwrap();
        assert_eq!(update.phone_number.as_deref(), Some("+1 555 0100"));
        assert_eq!(update.rate.as_deref(), Some("$500"));
    }

    #[test]
    fn blank_and_null_strings_are_absent() {
        let update = parse_extraction(r#"{"phoneNumber": "  ", "rate": "null"}"#).unwrap();
        assert!(update.is_empty());
        let update = parse_extraction(r#"{"phoneNumber": null}"#).unwrap();
        assert!(update.is_empty());
    }

    #[test]
    fn parses_fenced_json() {
        let update = parse_extraction("Sure:\n```json\n{\"phoneNumber\": null, \"rate\": \"450 EUR\"}\n```").unwrap();
        assert_eq!(update.rate.as_deref(), Some("450 EUR"));
    }

    #[test]
    fn malformed_response_is_an_error() {
        assert!(parse_extraction("no idea, sorry").is_err());
    }

    // ── Extraction ──────────────────────────────────────────────────

    #[tokio::test]
    async fn extract_upserts_and_sends_schema() {
        let llm = StubLlm::new(r#"{"phoneNumber": "+1555", "rate": null}"#);
        let db = store().await;
        let extractor = DealExtractor::new(llm.clone(), db.clone());

        let record = extractor
            .extract("Call me at +1555", "Jane@X.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.email, "jane@x.com");
        assert_eq!(record.phone_number.as_deref(), Some("+1555"));

        let requests = llm.requests.lock().unwrap();
        assert!(requests[0].response_schema.is_some());
        assert!(requests[0].user_prompt().contains("Call me at +1555"));
    }

    #[tokio::test]
    async fn nothing_found_writes_nothing() {
        let db = store().await;
        let extractor = DealExtractor::new(StubLlm::new(r#"{"phoneNumber": null, "rate": null}"#), db.clone());
        assert!(extractor.extract("Sounds fun!", "jane@x.com").await.unwrap().is_none());
        assert!(db.get_by_email("jane@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_body_skips_llm() {
        let llm = StubLlm::new("{}");
        let extractor = DealExtractor::new(llm.clone(), store().await);
        assert!(extractor.extract("   ", "jane@x.com").await.unwrap().is_none());
        assert!(llm.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn best_effort_swallows_garbage() {
        let db = store().await;
        let extractor = DealExtractor::new(StubLlm::new("not json"), db.clone());
        extractor.extract_best_effort("My rate is $500", "jane@x.com").await;
        assert!(db.get_by_email("jane@x.com").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn later_extractions_merge() {
        let db = store().await;
        DealExtractor::new(StubLlm::new(r#"{"phoneNumber": "+1555", "rate": null}"#), db.clone())
            .extract("Call +1555", "jane@x.com")
            .await
            .unwrap();
        let record = DealExtractor::new(StubLlm::new(r#"{"phoneNumber": null, "rate": "500"}"#), db.clone())
            .extract("Rate is 500", "jane@x.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.phone_number.as_deref(), Some("+1555"));
        assert_eq!(record.rate.as_deref(), Some("500"));
    }
}
