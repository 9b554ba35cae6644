//! Store traits for thread status and deal records.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::DatabaseError;

/// Automation status of a thread, owned by the dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreadStatus {
    #[default]
    Active,
    Paused,
}

impl ThreadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
        }
    }
}

impl fmt::Display for ThreadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            other => Err(format!("unknown thread status '{other}'")),
        }
    }
}

/// Structured deal outcome per counterparty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealRecord {
    pub email: String,
    pub phone_number: Option<String>,
    pub rate: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Partial deal data. `None` fields never overwrite stored values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DealUpdate {
    pub phone_number: Option<String>,
    pub rate: Option<String>,
}

impl DealUpdate {
    pub fn is_empty(&self) -> bool {
        self.phone_number.is_none() && self.rate.is_none()
    }
}

/// Canonical key form of an email address.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Read-only view of thread status.
#[async_trait]
pub trait ThreadStatusStore: Send + Sync {
    /// Status for a thread; `Active` when no record exists.
    async fn get_status(&self, thread_id: &str) -> Result<ThreadStatus, DatabaseError>;
}

/// Deal records keyed by counterparty email.
#[async_trait]
pub trait DealStore: Send + Sync {
    /// Merge-upsert: only non-`None` fields of `update` are written.
    async fn upsert_by_email(
        &self,
        email: &str,
        update: &DealUpdate,
    ) -> Result<DealRecord, DatabaseError>;

    async fn get_by_email(&self, email: &str) -> Result<Option<DealRecord>, DatabaseError>;
}
