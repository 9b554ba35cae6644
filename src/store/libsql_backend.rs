//! libSQL backend for thread status and deal records.
//!
//! Supports local file and in-memory databases.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{Connection, Database as LibSqlDatabase, params};
use tracing::{debug, info};

use crate::error::DatabaseError;
use crate::store::migrations;
use crate::store::traits::{
    DealRecord, DealStore, DealUpdate, ThreadStatus, ThreadStatusStore, normalize_email,
};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    DatabaseError::Pool(format!("Failed to create database directory: {e}"))
                })?;
            }
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let backend = Self::from_database(db)?;
        backend.init_schema().await?;
        Ok(backend)
    }

    fn from_database(db: LibSqlDatabase) -> Result<Self, DatabaseError> {
        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;
        Ok(Self {
            db: Arc::new(db),
            conn,
        })
    }

    async fn init_schema(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(&self.conn).await
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Set a thread's automation status. The engine never calls this; it
    /// exists for the dashboard side and for seeding tests.
    pub async fn set_status(
        &self,
        thread_id: &str,
        status: ThreadStatus,
    ) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO thread_status (thread_id, status, updated_at)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(thread_id) DO UPDATE SET
                    status = excluded.status,
                    updated_at = excluded.updated_at",
                params![thread_id, status.as_str(), now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_status: {e}")))?;
        debug!(thread_id, status = %status, "Thread status updated");
        Ok(())
    }

    /// All deal records, most recently updated first.
    pub async fn list_deals(&self) -> Result<Vec<DealRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT email, phone_number, rate, created_at, updated_at
                 FROM deal_records ORDER BY updated_at DESC",
                (),
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_deals: {e}")))?;

        let mut deals = Vec::new();
        while let Some(row) = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("list_deals: {e}")))?
        {
            deals.push(
                row_to_deal(&row).map_err(|e| DatabaseError::Query(format!("list_deals: {e}")))?,
            );
        }
        Ok(deals)
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

fn row_to_deal(row: &libsql::Row) -> Result<DealRecord, libsql::Error> {
    let created_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;

    Ok(DealRecord {
        email: row.get(0)?,
        phone_number: row.get(1).ok(),
        rate: row.get(2).ok(),
        created_at: parse_datetime(&created_str),
        updated_at: parse_datetime(&updated_str),
    })
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

// ── Trait implementations ───────────────────────────────────────────

#[async_trait]
impl ThreadStatusStore for LibSqlBackend {
    async fn get_status(&self, thread_id: &str) -> Result<ThreadStatus, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT status FROM thread_status WHERE thread_id = ?1",
                params![thread_id],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_status: {e}")))?;

        let row = rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_status: {e}")))?;

        match row {
            Some(row) => {
                let status: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_status: {e}")))?;
                status
                    .parse()
                    .map_err(|e: String| DatabaseError::Query(format!("get_status: {e}")))
            }
            None => Ok(ThreadStatus::Active),
        }
    }
}

#[async_trait]
impl DealStore for LibSqlBackend {
    async fn upsert_by_email(
        &self,
        email: &str,
        update: &DealUpdate,
    ) -> Result<DealRecord, DatabaseError> {
        let email = normalize_email(email);
        let now = Utc::now().to_rfc3339();

        self.conn()
            .execute(
                "INSERT INTO deal_records (email, phone_number, rate, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)
                 ON CONFLICT(email) DO UPDATE SET
                    phone_number = COALESCE(excluded.phone_number, deal_records.phone_number),
                    rate = COALESCE(excluded.rate, deal_records.rate),
                    updated_at = excluded.updated_at",
                params![
                    email.as_str(),
                    opt_text(update.phone_number.as_deref()),
                    opt_text(update.rate.as_deref()),
                    now
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_by_email: {e}")))?;

        debug!(
            email = %email,
            phone = update.phone_number.is_some(),
            rate = update.rate.is_some(),
            "Deal record upserted"
        );

        self.get_by_email(&email).await?.ok_or_else(|| {
            DatabaseError::Query(format!("upsert_by_email: record for {email} vanished"))
        })
    }

    async fn get_by_email(&self, email: &str) -> Result<Option<DealRecord>, DatabaseError> {
        let email = normalize_email(email);
        let mut rows = self
            .conn()
            .query(
                "SELECT email, phone_number, rate, created_at, updated_at
                 FROM deal_records WHERE email = ?1",
                params![email],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_by_email: {e}")))?;

        match rows
            .next()
            .await
            .map_err(|e| DatabaseError::Query(format!("get_by_email: {e}")))?
        {
            Some(row) => Ok(Some(
                row_to_deal(&row).map_err(|e| DatabaseError::Query(format!("get_by_email: {e}")))?,
            )),
            None => Ok(None),
        }
    }
}
