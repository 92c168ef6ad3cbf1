//! Audit records and the sink that persists them.

use crate::config::SqlLogConfig;
use crate::error::{CrudError, CrudResult};
use crate::ident::check_table;
use crate::log::log_sql;
use crate::value::FieldValue;
use chrono::{NaiveDateTime, Utc};
use deadpool_postgres::Pool;
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Kind of operation an [`AuditRecord`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    Create,
    Read,
    Update,
    Delete,
}

impl LogType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Read => "read",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for LogType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One audited operation. Built only after the operation it describes has committed.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditRecord {
    pub table_name: String,
    /// Rows as they were before the operation (or the read filter, for reads).
    pub log_records: serde_json::Value,
    /// Values the operation wrote.
    pub new_log_records: serde_json::Value,
    pub log_by: String,
    pub log_type: LogType,
    pub log_at: NaiveDateTime,
}

impl AuditRecord {
    pub fn new(
        table_name: impl Into<String>,
        log_type: LogType,
        log_by: impl Into<String>,
        log_records: serde_json::Value,
        new_log_records: serde_json::Value,
    ) -> Self {
        Self {
            table_name: table_name.into(),
            log_records,
            new_log_records,
            log_by: log_by.into(),
            log_type,
            log_at: Utc::now().naive_utc(),
        }
    }
}

/// Append-only destination for audit records.
///
/// Implementations must be safe to share across concurrent requests.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: &AuditRecord) -> impl Future<Output = CrudResult<()>> + Send;
}

impl<S: AuditSink> AuditSink for Arc<S> {
    fn record(&self, record: &AuditRecord) -> impl Future<Output = CrudResult<()>> + Send {
        S::record(self, record)
    }
}

/// Persists audit records into a table with columns
/// `(id, table_name, log_records, new_log_records, log_by, log_type, log_at)`.
#[derive(Debug, Clone)]
pub struct PgAuditLog {
    pool: Pool,
    table: String,
    sql_log: SqlLogConfig,
}

impl PgAuditLog {
    pub fn new(pool: Pool, table: impl Into<String>) -> Self {
        Self {
            pool,
            table: table.into(),
            sql_log: SqlLogConfig::default(),
        }
    }

    pub fn sql_log(mut self, config: SqlLogConfig) -> Self {
        self.sql_log = config;
        self
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub(crate) fn insert_sql(&self) -> CrudResult<String> {
        let table = check_table(&self.table)?;
        Ok(format!(
            "INSERT INTO {table} (table_name, log_records, new_log_records, log_by, log_type, log_at) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        ))
    }
}

impl AuditSink for PgAuditLog {
    async fn record(&self, record: &AuditRecord) -> CrudResult<()> {
        let sql = self.insert_sql()?;
        let params = [
            FieldValue::Text(record.table_name.clone()),
            FieldValue::Json(record.log_records.clone()),
            FieldValue::Json(record.new_log_records.clone()),
            FieldValue::Text(record.log_by.clone()),
            FieldValue::Text(record.log_type.as_str().to_string()),
            FieldValue::Timestamp(record.log_at),
        ];
        let params_ref: Vec<&(dyn ToSql + Sync)> =
            params.iter().map(|v| v as &(dyn ToSql + Sync)).collect();

        let client = self
            .pool
            .get()
            .await
            .map_err(|e| CrudError::Audit(e.to_string()))?;
        log_sql(&self.sql_log, "audit", &self.table, &sql, params.len());
        client
            .execute(sql.as_str(), &params_ref)
            .await
            .map_err(|e| CrudError::Audit(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_type_renders_lowercase() {
        assert_eq!(LogType::Delete.to_string(), "delete");
        assert_eq!(serde_json::to_string(&LogType::Create).unwrap(), "\"create\"");
    }

    #[test]
    fn record_serializes_with_schema_names() {
        let rec = AuditRecord::new(
            "users",
            LogType::Update,
            "u1",
            serde_json::json!([{"id": 1, "name": "a"}]),
            serde_json::json!([{"name": "b"}]),
        );
        let json = serde_json::to_value(&rec).unwrap();
        assert_eq!(json["tableName"], "users");
        assert_eq!(json["logType"], "update");
        assert_eq!(json["logBy"], "u1");
        assert_eq!(json["newLogRecords"][0]["name"], "b");
        assert!(json.get("logAt").is_some());
    }

    #[tokio::test]
    async fn insert_statement_uses_audit_table() {
        let mut cfg = deadpool_postgres::Config::new();
        cfg.url = Some("postgres://localhost/audit_test".to_string());
        let pool = cfg.create_pool(None, tokio_postgres::NoTls).unwrap();
        let sink = PgAuditLog::new(pool.clone(), "audit_log");
        assert_eq!(
            sink.insert_sql().unwrap(),
            "INSERT INTO audit_log (table_name, log_records, new_log_records, log_by, log_type, log_at) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        );
        assert!(PgAuditLog::new(pool, "bad name").insert_sql().is_err());
    }
}
