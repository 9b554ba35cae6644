//! Batch entry point: action dispatch and the response envelope.
//!
//! CLI, HTTP and the scheduler all go through [`Automation::run`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::config::{EngineConfig, OperatorProfile};
use crate::error::{AutomationError, ConfigError};
use crate::llm::provider::LlmProvider;
use crate::pipeline::{BatchResult, ColdOutreachSender, LabelReset, ReplyEngine};
use crate::store::{DealStore, ThreadStatusStore};
use crate::transport::{MailTransport, SentMessage};

/// What a batch run should do.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum AutomationAction {
    /// Run the reply engine over tracked threads.
    #[default]
    Process,
    /// Send one cold-outreach message.
    SimulateOneOutreach,
    /// Strip the tracking label from every tracked thread.
    ResetTrackingLabels,
}

impl AutomationAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Process => "process",
            Self::SimulateOneOutreach => "simulate-one-outreach",
            Self::ResetTrackingLabels => "reset-tracking-labels",
        }
    }
}

/// A batch request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRequest {
    pub operator: String,
    #[serde(default)]
    pub skip_delay: bool,
    #[serde(default)]
    pub action: AutomationAction,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
}

/// Action-specific payload of a successful run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum AutomationOutcome {
    Batch(BatchResult),
    Outreach(SentMessage),
    Reset(LabelReset),
}

/// Response envelope: `{success, ...outcome}` or `{success: false, error}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AutomationResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: Option<AutomationOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Whether a failure was the caller's fault. Not serialized.
    #[serde(skip)]
    pub request_error: bool,
}

impl AutomationResponse {
    fn ok(outcome: AutomationOutcome) -> Self {
        Self {
            success: true,
            outcome: Some(outcome),
            error: None,
            request_error: false,
        }
    }

    pub fn failed(err: &AutomationError) -> Self {
        Self {
            success: false,
            outcome: None,
            error: Some(err.to_string()),
            request_error: err.is_request_error(),
        }
    }
}

/// Owns the collaborators for one operator.
pub struct Automation {
    operator: OperatorProfile,
    engine: ReplyEngine,
    outreach: ColdOutreachSender,
    max_threads: u32,
    simulation_recipient: Option<String>,
}

impl Automation {
    pub fn from_config(
        config: &EngineConfig,
        transport: Arc<dyn MailTransport>,
        statuses: Arc<dyn ThreadStatusStore>,
        deals: Arc<dyn DealStore>,
        llm: Arc<dyn LlmProvider>,
    ) -> Self {
        let operator = config.operator.clone();
        let engine = ReplyEngine::new(
            Arc::clone(&transport),
            statuses,
            deals,
            Arc::clone(&llm),
            operator.addresses.clone(),
            operator.policy.clone(),
        )
        .with_settings(config.reply);
        let outreach = ColdOutreachSender::new(
            transport,
            llm,
            operator.policy.clone(),
            operator.addresses.clone(),
            operator.tracking_label.clone(),
        );

        Self {
            operator,
            engine,
            outreach,
            max_threads: config.max_threads,
            simulation_recipient: config.simulation_recipient.clone(),
        }
    }

    pub fn operator_id(&self) -> &str {
        &self.operator.id
    }

    /// Run a request. Never fails; errors land in the envelope.
    pub async fn run(&self, request: &AutomationRequest) -> AutomationResponse {
        let span = info_span!(
            "automation_run",
            run_id = %Uuid::new_v4(),
            action = request.action.as_str(),
        );

        async {
            match self.dispatch(request).await {
                Ok(outcome) => {
                    info!("Automation run succeeded");
                    AutomationResponse::ok(outcome)
                }
                Err(e) => {
                    error!(error = %e, "Automation run failed");
                    AutomationResponse::failed(&e)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Validate and execute a request.
    pub async fn dispatch(
        &self,
        request: &AutomationRequest,
    ) -> Result<AutomationOutcome, AutomationError> {
        if !self.operator.matches(&request.operator) {
            return Err(ConfigError::UnknownOperator(request.operator.clone()).into());
        }

        match request.action {
            AutomationAction::Process => {
                let result = self
                    .engine
                    .process_all(&self.operator.label_query, self.max_threads, request.skip_delay)
                    .await?;
                Ok(AutomationOutcome::Batch(result))
            }
            AutomationAction::SimulateOneOutreach => {
                let recipient = request
                    .recipient
                    .as_deref()
                    .or(self.simulation_recipient.as_deref())
                    .filter(|r| !r.trim().is_empty())
                    .ok_or(AutomationError::MissingRecipient)?;
                let sent = self.outreach.send_cold_outreach(recipient).await?;
                Ok(AutomationOutcome::Outreach(sent))
            }
            AutomationAction::ResetTrackingLabels => {
                let reset = self.outreach.reset_tracking_labels().await?;
                Ok(AutomationOutcome::Reset(reset))
            }
        }
    }
}
