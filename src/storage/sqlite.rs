//! SQLite store satisfying all engine store ports.
//!
//! One handle serves the cost ledger, account registry, anomaly store, and
//! recommendation store. The connection sits behind a mutex so the handle is
//! shareable across concurrent per-account invocations; both dedup keys are
//! enforced by UNIQUE constraints, so check-then-create races resolve at the
//! store rather than in application code.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Duration, NaiveDate, Utc};
use rusqlite::{Connection, params};

use crate::core::models::{
    AccountStatus, Anomaly, AnomalyStatus, CloudAccount, CostLineItem, DateRange, EncryptedBlob,
    Priority, Recommendation, RecommendationKind, RecommendationStatus, ServiceDailyTotal,
    Severity,
};
use crate::core::ports::{AccountStore, AnomalyStore, CostLedger, RecommendationStore};
use crate::core::provider::CloudProvider;
use crate::error::{CapeError, Result};
use crate::storage::schema::run_migrations;

/// Database access layer.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Create or open a database at the given path.
    ///
    /// # Errors
    /// Returns a persistence error if the parent directory cannot be created,
    /// the database cannot be opened, or schema migrations fail.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut conn = Connection::open(path)
            .map_err(|e| CapeError::persistence(format!("open database: {e}")))?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")
            .map_err(|e| CapeError::persistence(format!("set pragmas: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open an in-memory database (for testing).
    ///
    /// # Errors
    /// Returns a persistence error if the database cannot be opened or
    /// migrations fail.
    pub fn open_in_memory() -> Result<Self> {
        let mut conn = Connection::open_in_memory()
            .map_err(|e| CapeError::persistence(format!("open in-memory db: {e}")))?;

        run_migrations(&mut conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Register a new cloud account. Registration plumbing, not part of the
    /// engine's ports.
    ///
    /// # Errors
    /// Returns a persistence error if the account id already exists.
    pub fn register_account(&self, account: &CloudAccount) -> Result<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO cloud_accounts \
                (id, tenant_id, provider, status, last_synced_at, \
                 credential_ciphertext, credential_iv, credential_auth_tag) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                account.id,
                account.tenant_id,
                account.provider,
                account.status.as_str(),
                account.last_synced_at.map(|t| t.to_rfc3339()),
                account.credentials.ciphertext,
                account.credentials.iv,
                account.credentials.auth_tag,
            ],
        )
        .map_err(|e| CapeError::persistence(format!("register account: {e}")))?;
        Ok(())
    }

    /// Transition a recommendation's status. Surface for external actors
    /// (apply/dismiss flows), not part of the engine's ports.
    ///
    /// # Errors
    /// Returns a persistence error if the row does not exist.
    pub fn set_recommendation_status(&self, id: i64, status: RecommendationStatus) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE recommendations \
                 SET status = ?1, updated_at = datetime('now') WHERE id = ?2",
                params![status.as_str(), id],
            )
            .map_err(|e| CapeError::persistence(format!("set recommendation status: {e}")))?;
        if changed == 0 {
            return Err(CapeError::persistence(format!(
                "recommendation {id} not found"
            )));
        }
        Ok(())
    }

    /// Count all ledger rows. Test and diagnostics helper.
    ///
    /// # Errors
    /// Returns a persistence error if the query fails.
    pub fn ledger_count(&self) -> Result<i64> {
        let conn = self.lock()?;
        conn.query_row("SELECT COUNT(*) FROM cost_line_items", [], |row| row.get(0))
            .map_err(|e| CapeError::persistence(format!("count ledger: {e}")))
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| CapeError::persistence("connection mutex poisoned"))
    }
}

// =============================================================================
// Cost Ledger
// =============================================================================

impl CostLedger for SqliteStore {
    fn insert_batch(&self, records: &[CostLineItem]) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn
            .transaction()
            .map_err(|e| CapeError::persistence(format!("begin insert batch: {e}")))?;

        let mut inserted = 0usize;
        {
            let mut stmt = tx
                .prepare_cached(
                    "INSERT INTO cost_line_items \
                        (natural_key, tenant_id, account_id, date, provider, service, \
                         usage_type, amount, currency, resource_id, tags, metadata) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12) \
                     ON CONFLICT (natural_key) DO NOTHING",
                )
                .map_err(|e| CapeError::persistence(format!("prepare insert: {e}")))?;

            for record in records {
                let tags = serde_json::to_string(&record.tags)?;
                let metadata = serde_json::to_string(&record.metadata)?;
                let changed = stmt
                    .execute(params![
                        record.natural_key(),
                        record.tenant_id,
                        record.account_id,
                        record.date.to_string(),
                        record.provider.name(),
                        record.service,
                        record.usage_type,
                        record.amount,
                        record.currency,
                        record.resource_id,
                        tags,
                        metadata,
                    ])
                    .map_err(|e| CapeError::persistence(format!("insert line item: {e}")))?;
                inserted += changed;
            }
        }

        tx.commit()
            .map_err(|e| CapeError::persistence(format!("commit insert batch: {e}")))?;
        Ok(inserted)
    }

    fn sum_by_service(
        &self,
        tenant_id: &str,
        account_id: &str,
        date: NaiveDate,
    ) -> Result<Vec<ServiceDailyTotal>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT service, provider, SUM(amount) FROM cost_line_items \
                 WHERE tenant_id = ?1 AND account_id = ?2 AND date = ?3 \
                 GROUP BY service, provider \
                 ORDER BY service",
            )
            .map_err(|e| CapeError::persistence(format!("prepare sum_by_service: {e}")))?;

        let rows = stmt
            .query_map(
                params![tenant_id, account_id, date.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, f64>(2)?,
                    ))
                },
            )
            .map_err(|e| CapeError::persistence(format!("query sum_by_service: {e}")))?;

        let mut totals = Vec::new();
        for row in rows {
            let (service, provider, total) =
                row.map_err(|e| CapeError::persistence(format!("read service total: {e}")))?;
            totals.push(ServiceDailyTotal {
                service,
                provider: CloudProvider::parse(&provider)?,
                total,
            });
        }
        Ok(totals)
    }

    fn find_in_range(
        &self,
        tenant_id: &str,
        account_id: &str,
        range: DateRange,
    ) -> Result<Vec<CostLineItem>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT tenant_id, account_id, date, provider, service, usage_type, \
                        amount, currency, resource_id, tags, metadata \
                 FROM cost_line_items \
                 WHERE tenant_id = ?1 AND account_id = ?2 AND date >= ?3 AND date <= ?4 \
                 ORDER BY date, id",
            )
            .map_err(|e| CapeError::persistence(format!("prepare find_in_range: {e}")))?;

        let rows = stmt
            .query_map(
                params![
                    tenant_id,
                    account_id,
                    range.start.to_string(),
                    range.end.to_string()
                ],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, f64>(6)?,
                        row.get::<_, String>(7)?,
                        row.get::<_, Option<String>>(8)?,
                        row.get::<_, String>(9)?,
                        row.get::<_, String>(10)?,
                    ))
                },
            )
            .map_err(|e| CapeError::persistence(format!("query find_in_range: {e}")))?;

        let mut items = Vec::new();
        for row in rows {
            let (
                tenant_id,
                account_id,
                date,
                provider,
                service,
                usage_type,
                amount,
                currency,
                resource_id,
                tags,
                metadata,
            ) = row.map_err(|e| CapeError::persistence(format!("read line item: {e}")))?;

            items.push(CostLineItem {
                tenant_id,
                account_id,
                date: parse_date(&date)?,
                provider: CloudProvider::parse(&provider)?,
                service,
                usage_type,
                amount,
                currency,
                resource_id,
                tags: serde_json::from_str(&tags)?,
                metadata: serde_json::from_str(&metadata)?,
            });
        }
        Ok(items)
    }

    fn prune(&self, retention_days: i64) -> Result<usize> {
        if retention_days <= 0 {
            return Err(CapeError::ConfigInvalid {
                key: "retention.ledger-retention-days".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        let cutoff = (Utc::now().date_naive() - Duration::days(retention_days)).to_string();

        let conn = self.lock()?;
        conn.execute("DELETE FROM cost_line_items WHERE date < ?1", [cutoff])
            .map_err(|e| CapeError::persistence(format!("prune ledger: {e}")))
    }
}

// =============================================================================
// Account Store
// =============================================================================

impl AccountStore for SqliteStore {
    fn find_account(&self, account_id: &str) -> Result<Option<CloudAccount>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, tenant_id, provider, status, last_synced_at, \
                        credential_ciphertext, credential_iv, credential_auth_tag \
                 FROM cloud_accounts WHERE id = ?1",
            )
            .map_err(|e| CapeError::persistence(format!("prepare find_account: {e}")))?;

        let mut rows = stmt
            .query_map([account_id], account_row)
            .map_err(|e| CapeError::persistence(format!("query find_account: {e}")))?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let raw = row.map_err(|e| CapeError::persistence(format!("read account: {e}")))?;
                Ok(Some(raw.into_account()?))
            }
        }
    }

    fn active_accounts(&self, tenant_id: &str) -> Result<Vec<CloudAccount>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, tenant_id, provider, status, last_synced_at, \
                        credential_ciphertext, credential_iv, credential_auth_tag \
                 FROM cloud_accounts WHERE tenant_id = ?1 AND status = 'active' \
                 ORDER BY id",
            )
            .map_err(|e| CapeError::persistence(format!("prepare active_accounts: {e}")))?;

        let rows = stmt
            .query_map([tenant_id], account_row)
            .map_err(|e| CapeError::persistence(format!("query active_accounts: {e}")))?;

        let mut accounts = Vec::new();
        for row in rows {
            let raw = row.map_err(|e| CapeError::persistence(format!("read account: {e}")))?;
            accounts.push(raw.into_account()?);
        }
        Ok(accounts)
    }

    fn update_last_sync(&self, account_id: &str, at: DateTime<Utc>) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE cloud_accounts SET last_synced_at = ?1 WHERE id = ?2",
                params![at.to_rfc3339(), account_id],
            )
            .map_err(|e| CapeError::persistence(format!("update last sync: {e}")))?;
        if changed == 0 {
            return Err(CapeError::AccountNotFound {
                account_id: account_id.to_string(),
            });
        }
        Ok(())
    }
}

// =============================================================================
// Anomaly Store
// =============================================================================

impl AnomalyStore for SqliteStore {
    fn find_anomaly(
        &self,
        tenant_id: &str,
        service: &str,
        date: NaiveDate,
        provider: CloudProvider,
    ) -> Result<Option<Anomaly>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, tenant_id, date, service, provider, resource_id, \
                        expected_cost, actual_cost, deviation_pct, severity, status, detected_at \
                 FROM anomalies \
                 WHERE tenant_id = ?1 AND service = ?2 AND date = ?3 AND provider = ?4",
            )
            .map_err(|e| CapeError::persistence(format!("prepare find_anomaly: {e}")))?;

        let mut rows = stmt
            .query_map(
                params![tenant_id, service, date.to_string(), provider.name()],
                anomaly_row,
            )
            .map_err(|e| CapeError::persistence(format!("query find_anomaly: {e}")))?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let raw = row.map_err(|e| CapeError::persistence(format!("read anomaly: {e}")))?;
                Ok(Some(raw.into_anomaly()?))
            }
        }
    }

    fn insert_anomaly(&self, anomaly: &Anomaly) -> Result<Option<i64>> {
        let conn = self.lock()?;
        // OR IGNORE: a concurrent analysis of the same (account, date) pair
        // may have taken the dedup key between check and create.
        let changed = conn
            .execute(
                "INSERT OR IGNORE INTO anomalies \
                    (tenant_id, date, service, provider, resource_id, \
                     expected_cost, actual_cost, deviation_pct, severity, status, detected_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    anomaly.tenant_id,
                    anomaly.date.to_string(),
                    anomaly.service,
                    anomaly.provider.name(),
                    anomaly.resource_id,
                    anomaly.expected_cost,
                    anomaly.actual_cost,
                    anomaly.deviation_pct,
                    anomaly.severity.as_str(),
                    anomaly.status.as_str(),
                    anomaly.detected_at.to_rfc3339(),
                ],
            )
            .map_err(|e| CapeError::persistence(format!("insert anomaly: {e}")))?;

        if changed == 0 {
            Ok(None)
        } else {
            Ok(Some(conn.last_insert_rowid()))
        }
    }
}

// =============================================================================
// Recommendation Store
// =============================================================================

impl RecommendationStore for SqliteStore {
    fn find_open(
        &self,
        tenant_id: &str,
        resource_id: &str,
        kind: RecommendationKind,
    ) -> Result<Option<Recommendation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, tenant_id, kind, priority, provider, service, resource_id, \
                        estimated_monthly_savings, savings_period, status, description, metadata \
                 FROM recommendations \
                 WHERE tenant_id = ?1 AND resource_id = ?2 AND kind = ?3 AND status = 'open'",
            )
            .map_err(|e| CapeError::persistence(format!("prepare find_open: {e}")))?;

        let mut rows = stmt
            .query_map(params![tenant_id, resource_id, kind.as_str()], recommendation_row)
            .map_err(|e| CapeError::persistence(format!("query find_open: {e}")))?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let raw =
                    row.map_err(|e| CapeError::persistence(format!("read recommendation: {e}")))?;
                Ok(Some(raw.into_recommendation()?))
            }
        }
    }

    fn find_latest(
        &self,
        tenant_id: &str,
        resource_id: &str,
        kind: RecommendationKind,
    ) -> Result<Option<Recommendation>> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare_cached(
                "SELECT id, tenant_id, kind, priority, provider, service, resource_id, \
                        estimated_monthly_savings, savings_period, status, description, metadata \
                 FROM recommendations \
                 WHERE tenant_id = ?1 AND resource_id = ?2 AND kind = ?3 \
                 ORDER BY id DESC LIMIT 1",
            )
            .map_err(|e| CapeError::persistence(format!("prepare find_latest: {e}")))?;

        let mut rows = stmt
            .query_map(params![tenant_id, resource_id, kind.as_str()], recommendation_row)
            .map_err(|e| CapeError::persistence(format!("query find_latest: {e}")))?;

        match rows.next() {
            None => Ok(None),
            Some(row) => {
                let raw =
                    row.map_err(|e| CapeError::persistence(format!("read recommendation: {e}")))?;
                Ok(Some(raw.into_recommendation()?))
            }
        }
    }

    fn insert(&self, recommendation: &Recommendation) -> Result<i64> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO recommendations \
                (tenant_id, kind, priority, provider, service, resource_id, \
                 estimated_monthly_savings, savings_period, status, description, metadata) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                recommendation.tenant_id,
                recommendation.kind.as_str(),
                recommendation.priority.as_str(),
                recommendation.provider.name(),
                recommendation.service,
                recommendation.resource_id,
                recommendation.estimated_monthly_savings,
                recommendation.savings_period,
                recommendation.status.as_str(),
                recommendation.description,
                serde_json::to_string(&recommendation.metadata)?,
            ],
        )
        .map_err(|e| CapeError::persistence(format!("insert recommendation: {e}")))?;

        Ok(conn.last_insert_rowid())
    }

    fn update_in_place(
        &self,
        id: i64,
        savings: f64,
        priority: Priority,
        description: &str,
    ) -> Result<()> {
        let conn = self.lock()?;
        let changed = conn
            .execute(
                "UPDATE recommendations \
                 SET estimated_monthly_savings = ?1, priority = ?2, description = ?3, \
                     updated_at = datetime('now') \
                 WHERE id = ?4 AND status = 'open'",
                params![savings, priority.as_str(), description, id],
            )
            .map_err(|e| CapeError::persistence(format!("update recommendation: {e}")))?;
        if changed == 0 {
            return Err(CapeError::persistence(format!(
                "recommendation {id} is not open"
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Row mapping
// =============================================================================

fn parse_date(s: &str) -> Result<NaiveDate> {
    s.parse()
        .map_err(|e| CapeError::persistence(format!("malformed date {s}: {e}")))
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| CapeError::persistence(format!("malformed timestamp {s}: {e}")))
}

struct AccountRow {
    id: String,
    tenant_id: String,
    provider: String,
    status: String,
    last_synced_at: Option<String>,
    ciphertext: String,
    iv: String,
    auth_tag: String,
}

fn account_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AccountRow> {
    Ok(AccountRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        provider: row.get(2)?,
        status: row.get(3)?,
        last_synced_at: row.get(4)?,
        ciphertext: row.get(5)?,
        iv: row.get(6)?,
        auth_tag: row.get(7)?,
    })
}

impl AccountRow {
    fn into_account(self) -> Result<CloudAccount> {
        let last_synced_at = self
            .last_synced_at
            .as_deref()
            .map(parse_timestamp)
            .transpose()?;
        Ok(CloudAccount {
            id: self.id,
            tenant_id: self.tenant_id,
            provider: self.provider,
            status: AccountStatus::parse(&self.status),
            last_synced_at,
            credentials: EncryptedBlob {
                ciphertext: self.ciphertext,
                iv: self.iv,
                auth_tag: self.auth_tag,
            },
        })
    }
}

struct AnomalyRow {
    id: i64,
    tenant_id: String,
    date: String,
    service: String,
    provider: String,
    resource_id: Option<String>,
    expected_cost: f64,
    actual_cost: f64,
    deviation_pct: f64,
    severity: String,
    status: String,
    detected_at: String,
}

fn anomaly_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AnomalyRow> {
    Ok(AnomalyRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        date: row.get(2)?,
        service: row.get(3)?,
        provider: row.get(4)?,
        resource_id: row.get(5)?,
        expected_cost: row.get(6)?,
        actual_cost: row.get(7)?,
        deviation_pct: row.get(8)?,
        severity: row.get(9)?,
        status: row.get(10)?,
        detected_at: row.get(11)?,
    })
}

impl AnomalyRow {
    fn into_anomaly(self) -> Result<Anomaly> {
        Ok(Anomaly {
            id: Some(self.id),
            tenant_id: self.tenant_id,
            date: parse_date(&self.date)?,
            service: self.service,
            provider: CloudProvider::parse(&self.provider)?,
            resource_id: self.resource_id,
            expected_cost: self.expected_cost,
            actual_cost: self.actual_cost,
            deviation_pct: self.deviation_pct,
            severity: Severity::parse(&self.severity),
            status: AnomalyStatus::parse(&self.status),
            detected_at: parse_timestamp(&self.detected_at)?,
        })
    }
}

struct RecommendationRow {
    id: i64,
    tenant_id: String,
    kind: String,
    priority: String,
    provider: String,
    service: String,
    resource_id: String,
    estimated_monthly_savings: f64,
    savings_period: String,
    status: String,
    description: String,
    metadata: String,
}

fn recommendation_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RecommendationRow> {
    Ok(RecommendationRow {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        kind: row.get(2)?,
        priority: row.get(3)?,
        provider: row.get(4)?,
        service: row.get(5)?,
        resource_id: row.get(6)?,
        estimated_monthly_savings: row.get(7)?,
        savings_period: row.get(8)?,
        status: row.get(9)?,
        description: row.get(10)?,
        metadata: row.get(11)?,
    })
}

impl RecommendationRow {
    fn into_recommendation(self) -> Result<Recommendation> {
        Ok(Recommendation {
            id: Some(self.id),
            tenant_id: self.tenant_id,
            kind: RecommendationKind::parse(&self.kind)?,
            priority: Priority::parse(&self.priority),
            provider: CloudProvider::parse(&self.provider)?,
            service: self.service,
            resource_id: self.resource_id,
            estimated_monthly_savings: self.estimated_monthly_savings,
            savings_period: self.savings_period,
            status: RecommendationStatus::parse(&self.status),
            description: self.description,
            metadata: serde_json::from_str(&self.metadata)?,
        })
    }
}
