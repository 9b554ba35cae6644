//! Configuration types.
//!
//! Everything is read once from the environment by [`EngineConfig::from_env`].

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use secrecy::SecretString;

use crate::error::ConfigError;
use crate::llm::{LlmBackend, LlmConfig};
use crate::pipeline::{NegotiationPolicy, OwnedAddresses, ReplySettings};
use crate::transport::GmailConfig;
use crate::transport::gmail::GMAIL_API_BASE;

const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
const DEFAULT_TRACKING_LABEL: &str = "creator-outreach";
const DEFAULT_DB_PATH: &str = "./data/outreach.db";

/// The operator an automation run acts for.
#[derive(Debug, Clone)]
pub struct OperatorProfile {
    pub id: String,
    pub addresses: OwnedAddresses,
    pub policy: NegotiationPolicy,
    pub tracking_label: String,
    /// Discovery query for the reply engine.
    pub label_query: String,
}

impl OperatorProfile {
    /// Whether `id` names this operator. IDs compare case-insensitively.
    pub fn matches(&self, id: &str) -> bool {
        self.id.eq_ignore_ascii_case(id.trim())
    }
}

/// Full engine configuration.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub llm: LlmConfig,
    pub gmail: GmailConfig,
    pub operator: OperatorProfile,
    pub max_threads: u32,
    pub reply: ReplySettings,
    pub db_path: PathBuf,
    /// Cron expression for `serve` mode.
    pub schedule: Option<String>,
    pub port: u16,
    pub simulation_recipient: Option<String>,
    pub log_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Load from process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        // ── Completion service ──────────────────────────────────────
        let backend = match get("OUTREACH_LLM_BACKEND").as_deref() {
            None => LlmBackend::Anthropic,
            Some(b) if b.eq_ignore_ascii_case("anthropic") => LlmBackend::Anthropic,
            Some(b) if b.eq_ignore_ascii_case("openai") => LlmBackend::OpenAi,
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    key: "OUTREACH_LLM_BACKEND".into(),
                    message: format!("expected 'anthropic' or 'openai', got '{other}'"),
                });
            }
        };
        let key_var = match backend {
            LlmBackend::Anthropic => "ANTHROPIC_API_KEY",
            LlmBackend::OpenAi => "OPENAI_API_KEY",
        };
        let api_key = get(key_var).ok_or_else(|| ConfigError::MissingRequired {
            key: key_var.into(),
            hint: format!("export {key_var}=... to enable reply generation"),
        })?;
        let llm = LlmConfig {
            backend,
            api_key: SecretString::from(api_key),
            model: get("OUTREACH_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            timeout: Duration::from_secs(parse_or(&get, "OUTREACH_LLM_TIMEOUT_SECS", 60u64)?),
        };

        // ── Mail transport ──────────────────────────────────────────
        let access_token = get("GMAIL_ACCESS_TOKEN").ok_or_else(|| ConfigError::MissingRequired {
            key: "GMAIL_ACCESS_TOKEN".into(),
            hint: "an OAuth bearer token with gmail.modify scope".into(),
        })?;
        let gmail = GmailConfig {
            api_base: get("GMAIL_API_BASE").unwrap_or_else(|| GMAIL_API_BASE.to_string()),
            access_token: SecretString::from(access_token),
            timeout: Duration::from_secs(parse_or(&get, "GMAIL_TIMEOUT_SECS", 30u64)?),
        };

        // ── Operator ────────────────────────────────────────────────
        let raw_addresses = get("OUTREACH_OPERATOR_ADDRESSES").ok_or_else(|| {
            ConfigError::MissingRequired {
                key: "OUTREACH_OPERATOR_ADDRESSES".into(),
                hint: "comma-separated addresses the operator sends from".into(),
            }
        })?;
        let addresses = OwnedAddresses::new(
            raw_addresses
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty()),
        );
        let Some(primary) = addresses.primary().map(str::to_string) else {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_OPERATOR_ADDRESSES".into(),
                message: "no valid email address".into(),
            });
        };

        let mut policy = NegotiationPolicy::new(
            get("OUTREACH_PERSONA_NAME").unwrap_or_else(|| "Alex".to_string()),
            get("OUTREACH_COMPANY").unwrap_or_else(|| "our brand".to_string()),
            get("OUTREACH_CURRENCY")
                .map(|c| c.to_ascii_uppercase())
                .unwrap_or_else(|| "USD".to_string()),
        );
        if let (Some(a), Some(b)) = (get("OUTREACH_SIGN_OFF_1"), get("OUTREACH_SIGN_OFF_2")) {
            policy = policy.with_sign_offs(a, b);
        }

        let tracking_label =
            get("OUTREACH_TRACKING_LABEL").unwrap_or_else(|| DEFAULT_TRACKING_LABEL.to_string());
        let label_query = get("OUTREACH_LABEL_QUERY")
            .unwrap_or_else(|| default_label_query(&tracking_label));

        let operator = OperatorProfile {
            id: get("OUTREACH_OPERATOR_ID").unwrap_or(primary),
            addresses,
            policy,
            tracking_label,
            label_query,
        };

        // ── Batch limits ────────────────────────────────────────────
        let max_threads: u32 = parse_or(&get, "OUTREACH_MAX_THREADS", 20)?;
        let reply = ReplySettings {
            transcript_messages: parse_or(&get, "OUTREACH_TRANSCRIPT_MESSAGES", 5usize)?,
            body_char_budget: parse_or(&get, "OUTREACH_BODY_CHAR_BUDGET", 500usize)?,
        };
        if max_threads == 0 || reply.transcript_messages == 0 || reply.body_char_budget == 0 {
            return Err(ConfigError::InvalidValue {
                key: "OUTREACH_MAX_THREADS/OUTREACH_TRANSCRIPT_MESSAGES/OUTREACH_BODY_CHAR_BUDGET".into(),
                message: "must be greater than zero".into(),
            });
        }

        // ── Serve mode ──────────────────────────────────────────────
        let schedule = get("OUTREACH_SCHEDULE");
        if let Some(expr) = &schedule {
            cron::Schedule::from_str(expr).map_err(|e| ConfigError::InvalidValue {
                key: "OUTREACH_SCHEDULE".into(),
                message: format!("invalid cron: {e}"),
            })?;
        }

        Ok(Self {
            llm,
            gmail,
            operator,
            max_threads,
            reply,
            db_path: PathBuf::from(
                get("OUTREACH_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.to_string()),
            ),
            schedule,
            port: parse_or(&get, "OUTREACH_PORT", 8080u16)?,
            simulation_recipient: get("OUTREACH_SIMULATION_RECIPIENT"),
            log_dir: get("OUTREACH_LOG_DIR").map(PathBuf::from),
        })
    }
}

/// Discovery query: tracked threads with something unread.
pub fn default_label_query(tracking_label: &str) -> String {
    format!("{} is:unread", label_search_term(tracking_label))
}

/// Search operator for a label. Gmail addresses labels in queries by name
/// with spaces and slashes replaced by hyphens.
pub fn label_search_term(label: &str) -> String {
    let name = label
        .split(|c: char| c.is_whitespace() || c == '/')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    format!("label:{name}")
}

fn parse_or<T, G>(get: &G, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("'{raw}': {e}"),
        }),
    }
}
