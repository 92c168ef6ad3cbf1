//! `tracing` output for executed SQL.
//!
//! Every statement is emitted under the `pgcrud.sql` target **before** it is executed, at the
//! level configured in [`SqlLogConfig`]. Audit write failures go to `pgcrud.audit`.

use crate::config::SqlLogConfig;
use tracing::Level;

/// Truncate a SQL string to at most `max_bytes`, respecting UTF-8 char boundaries.
pub(crate) fn truncate_sql_bytes(sql: &str, max_bytes: usize) -> &str {
    if sql.len() <= max_bytes {
        return sql;
    }
    let mut end = max_bytes;
    while end > 0 && !sql.is_char_boundary(end) {
        end -= 1;
    }
    &sql[..end]
}

fn truncate_sql(config: &SqlLogConfig, sql: &str) -> String {
    match config.max_sql_length {
        Some(max) if sql.len() > max => format!("{}...", truncate_sql_bytes(sql, max)),
        _ => sql.to_string(),
    }
}

/// Dispatch a tracing event at a runtime-determined level.
macro_rules! emit_at_level {
    ($level:expr, $($field:tt)*) => {
        match $level {
            Level::ERROR => tracing::error!($($field)*),
            Level::WARN  => tracing::warn!($($field)*),
            Level::INFO  => tracing::info!($($field)*),
            Level::DEBUG => tracing::debug!($($field)*),
            Level::TRACE => tracing::trace!($($field)*),
        }
    };
}

/// Emit a statement about to run.
pub(crate) fn log_sql(
    config: &SqlLogConfig,
    op: &'static str,
    table: &str,
    sql: &str,
    param_count: usize,
) {
    if !config.enabled {
        return;
    }
    let sql = truncate_sql(config, sql);
    emit_at_level!(
        config.level,
        target: "pgcrud.sql",
        op,
        table,
        param_count,
        sql = %sql,
    );
}

/// Emit a failed statement.
pub(crate) fn log_failure(
    config: &SqlLogConfig,
    op: &'static str,
    table: &str,
    err: &dyn std::fmt::Display,
) {
    if !config.enabled {
        return;
    }
    tracing::warn!(target: "pgcrud.sql", op, table, error = %err, "statement failed");
}

/// Emit an audit snapshot or write that failed.
pub(crate) fn log_audit_failure(table: &str, log_type: &str, err: &dyn std::fmt::Display) {
    tracing::warn!(target: "pgcrud.audit", table, log_type, error = %err, "audit failed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_sql_bytes("SELECT 1", 100), "SELECT 1");
        assert_eq!(truncate_sql_bytes("SELECT 1", 6), "SELECT");
        // 'é' is two bytes; cutting inside it backs off.
        assert_eq!(truncate_sql_bytes("é", 1), "");
    }

    #[test]
    fn truncation_marks_the_cut() {
        let config = SqlLogConfig::default().max_sql_length(6);
        assert_eq!(truncate_sql(&config, "SELECT * FROM t"), "SELECT...");
        let config = SqlLogConfig::default().no_truncate();
        assert_eq!(truncate_sql(&config, "SELECT * FROM t"), "SELECT * FROM t");
    }
}
