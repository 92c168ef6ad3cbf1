//! Statement execution against the application pool.
//!
//! Every statement goes through [`Executor`], which logs it, runs it and maps driver errors onto
//! [`CrudError`]. Connections are checked out per call and returned to the pool when the
//! [`Object`] is dropped, on every exit path.

use crate::builder::{BuiltQuery, CreateQueryResponse, Filter, ID_COLUMN, compute_snapshot_query};
use crate::client::GenericClient;
use crate::config::SqlLogConfig;
use crate::error::{CrudError, CrudResult};
use crate::log::{log_failure, log_sql};
use crate::row::{Record, decode_rows};
use crate::stream::RecordStream;
use crate::value::FieldValue;
use deadpool_postgres::{Object, Pool};
use tokio_postgres::Row;
use tokio_postgres::types::ToSql;

pub(crate) struct Executor<'a> {
    pool: &'a Pool,
    table: &'a str,
    sql_log: &'a SqlLogConfig,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(pool: &'a Pool, table: &'a str, sql_log: &'a SqlLogConfig) -> Self {
        Self {
            pool,
            table,
            sql_log,
        }
    }

    /// Check out a connection for the current call.
    pub(crate) async fn connect(&self) -> CrudResult<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| self.fail("connect", CrudError::from(e)))
    }

    fn fail(&self, op: &'static str, err: CrudError) -> CrudError {
        log_failure(self.sql_log, op, self.table, &err);
        err
    }

    fn fail_db(&self, op: &'static str, e: tokio_postgres::Error) -> CrudError {
        self.fail(op, CrudError::from_db_error(e))
    }

    pub(crate) async fn execute<C: GenericClient>(
        &self,
        client: &C,
        op: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> CrudResult<u64> {
        log_sql(self.sql_log, op, self.table, sql, params.len());
        client
            .execute(sql, params)
            .await
            .map_err(|e| self.fail(op, e))
    }

    pub(crate) async fn query<C: GenericClient>(
        &self,
        client: &C,
        op: &'static str,
        sql: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> CrudResult<Vec<Row>> {
        log_sql(self.sql_log, op, self.table, sql, params.len());
        client
            .query(sql, params)
            .await
            .map_err(|e| self.fail(op, e))
    }

    pub(crate) async fn execute_built<C: GenericClient>(
        &self,
        client: &C,
        op: &'static str,
        query: &BuiltQuery,
    ) -> CrudResult<u64> {
        self.execute(client, op, &query.sql, &query.params_ref()).await
    }

    /// Rows matching `filter` as they are now, for the audit before-snapshot.
    pub(crate) async fn snapshot<C: GenericClient>(
        &self,
        client: &C,
        filter: Filter<'_>,
    ) -> CrudResult<Vec<Record>> {
        let query = compute_snapshot_query(self.table, filter)?;
        let rows = self
            .query(client, "snapshot", &query.sql, &query.params_ref())
            .await?;
        decode_rows(&rows)
    }

    /// Insert every row of `create` in one transaction and collect the generated ids.
    pub(crate) async fn insert_returning_ids(
        &self,
        client: &mut Object,
        create: &CreateQueryResponse,
    ) -> CrudResult<Vec<String>> {
        let sql = create.returning(ID_COLUMN);
        let tx = client
            .transaction()
            .await
            .map_err(|e| self.fail_db("create", e))?;

        let mut ids = Vec::with_capacity(create.field_values.len());
        for row in &create.field_values {
            let params: Vec<&(dyn ToSql + Sync)> =
                row.iter().map(|v| v as &(dyn ToSql + Sync)).collect();
            let rows = self.query(&tx, "create", &sql, &params).await?;
            for record in decode_rows(&rows)? {
                if let Some(id) = record.get(ID_COLUMN) {
                    ids.push(id_string(id));
                }
            }
        }

        tx.commit().await.map_err(|e| self.fail_db("create", e))?;
        Ok(ids)
    }

    /// Run one UPDATE per record in a single transaction; returns the total rows affected.
    pub(crate) async fn update_each(
        &self,
        client: &mut Object,
        queries: &[BuiltQuery],
    ) -> CrudResult<u64> {
        let tx = client
            .transaction()
            .await
            .map_err(|e| self.fail_db("update", e))?;

        let mut affected = 0;
        for query in queries {
            affected += self.execute_built(&tx, "update", query).await?;
        }

        tx.commit().await.map_err(|e| self.fail_db("update", e))?;
        Ok(affected)
    }

    /// Start a streaming SELECT. The returned stream keeps `client` checked out.
    pub(crate) async fn stream(
        &self,
        client: Object,
        query: &BuiltQuery,
    ) -> CrudResult<RecordStream> {
        log_sql(self.sql_log, "read", self.table, &query.sql, query.params.len());
        let rows = client
            .query_raw(query.sql.as_str(), query.params.iter())
            .await
            .map_err(|e| self.fail_db("read", e))?;
        Ok(RecordStream::new(client, rows))
    }
}

/// Render a returned id as text.
pub(crate) fn id_string(id: &FieldValue) -> String {
    match id {
        FieldValue::Text(s) => s.clone(),
        other => other.to_json().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_render_without_quotes() {
        assert_eq!(id_string(&FieldValue::I64(42)), "42");
        assert_eq!(id_string(&FieldValue::from("9b2c")), "9b2c");
    }
}
