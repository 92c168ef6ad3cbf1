//! The request object and its operations.
//!
//! A [`Crud`] is built once per request from [`CrudParams`] and [`CrudOptions`]; construction
//! applies every default and the request is read-only afterwards. Each public operation returns a
//! [`CrudResponse`] whose `code` classifies the outcome.
//!
//! ```ignore
//! // `pool` is any `deadpool_postgres::Pool` owned by the caller.
//! let fields = vec!["name".to_string(), "age".to_string()];
//!
//! let params = CrudParams::new(pool, "people")
//!     .action_params(vec![action_record! { "name" => "a", "age" => 1 }]);
//! let res = Crud::new(params, CrudOptions::new().log_create()).save(&fields).await;
//! assert!(res.is_success());
//! ```

use crate::audit::{AuditRecord, AuditSink, LogType, PgAuditLog};
use crate::builder::{
    BuiltQuery, Filter, ID_COLUMN, SelectOptions, compute_create_batch_query, compute_delete_all,
    compute_delete_by_ids, compute_delete_by_params, compute_select_all, compute_select_by_ids,
    compute_select_by_params, compute_update_by_ids, compute_update_by_params,
    compute_update_records,
};
use crate::client::GenericClient;
use crate::config::{
    CrudOptions, DEFAULT_ACCESS_TABLE, DEFAULT_AUDIT_TABLE, DEFAULT_MAX_QUERY_LIMIT,
    DEFAULT_ROLE_TABLE, DEFAULT_USER_TABLE,
};
use crate::error::{CrudError, CrudResult};
use crate::executor::{Executor, id_string};
use crate::fingerprint::fingerprint;
use crate::log::log_audit_failure;
use crate::params::{ProjectParams, QueryParams, SortParams, UserInfo};
use crate::response::{CreateResult, CrudResponse, ResponseValue};
use crate::row::Record;
use crate::stream::{Delivery, FieldSinks, RecordStream, SignalSender, pump};
use crate::value::{ActionRecord, FieldValue};
use deadpool_postgres::Pool;
use serde_json::{Map, Value};

/// Caller-supplied request parameters.
#[derive(Debug, Clone)]
pub struct CrudParams {
    pub app_db: Pool,
    pub table_name: String,
    pub user_info: UserInfo,
    pub action_params: Vec<ActionRecord>,
    pub record_ids: Vec<String>,
    pub query_params: QueryParams,
    pub sort_params: SortParams,
    pub project_params: ProjectParams,
    /// Uniqueness checks carried with the request; the engine stores them but never runs them.
    pub exist_params: Vec<QueryParams>,
    /// Rows to skip; negative values become `0`.
    pub skip: i64,
    /// Maximum rows to return; `0` (or negative) means no LIMIT clause.
    pub limit: i64,
    pub token: String,
    pub task_name: String,
}

impl CrudParams {
    pub fn new(app_db: Pool, table_name: impl Into<String>) -> Self {
        Self {
            app_db,
            table_name: table_name.into(),
            user_info: UserInfo::default(),
            action_params: Vec::new(),
            record_ids: Vec::new(),
            query_params: QueryParams::new(),
            sort_params: SortParams::new(),
            project_params: ProjectParams::new(),
            exist_params: Vec::new(),
            skip: 0,
            limit: 0,
            token: String::new(),
            task_name: String::new(),
        }
    }

    pub fn user_info(mut self, user_info: UserInfo) -> Self {
        self.user_info = user_info;
        self
    }

    pub fn action_params(mut self, records: Vec<ActionRecord>) -> Self {
        self.action_params = records;
        self
    }

    pub fn record_ids<I, T>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.record_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    /// Add an equality predicate (`Null` ⇒ `IS NULL`, arrays ⇒ `= ANY`).
    pub fn query_param(mut self, column: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        self.query_params.insert(column.into(), value.into());
        self
    }

    pub fn sort_params(mut self, sort: SortParams) -> Self {
        self.sort_params = sort;
        self
    }

    pub fn project_params(mut self, project: ProjectParams) -> Self {
        self.project_params = project;
        self
    }

    pub fn exist_params(mut self, exist: Vec<QueryParams>) -> Self {
        self.exist_params = exist;
        self
    }

    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = skip;
        self
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = token.into();
        self
    }

    pub fn task_name(mut self, task_name: impl Into<String>) -> Self {
        self.task_name = task_name.into();
        self
    }
}

/// Request state after defaulting.
#[derive(Debug, Clone)]
struct Request {
    app_db: Pool,
    audit_db: Pool,
    access_db: Pool,
    table_name: String,
    user_info: UserInfo,
    action_params: Vec<ActionRecord>,
    record_ids: Vec<String>,
    query_params: QueryParams,
    sort_params: SortParams,
    project_params: ProjectParams,
    exist_params: Vec<QueryParams>,
    skip: u64,
    limit: u64,
    token: String,
    task_name: String,
    options: CrudOptions,
    fingerprint: String,
}

/// A CRUD request bound to a table, plus the sink its audit records go to.
#[derive(Debug, Clone)]
pub struct Crud<S = PgAuditLog> {
    req: Request,
    audit: S,
}

fn or_default(value: &mut String, default: &str) {
    if value.is_empty() {
        *value = default.to_string();
    }
}

impl Crud<PgAuditLog> {
    /// Build a request, applying defaults:
    ///
    /// - empty table names become `audits`, `accesskeys`, `roles` and `users`
    /// - `audit_db` / `access_db` fall back to `app_db`
    /// - a negative `skip` becomes `0`
    /// - `max_query_limit == 0` becomes 10000 and `limit` is clamped to it
    pub fn new(params: CrudParams, mut options: CrudOptions) -> Self {
        or_default(&mut options.audit_table, DEFAULT_AUDIT_TABLE);
        or_default(&mut options.access_table, DEFAULT_ACCESS_TABLE);
        or_default(&mut options.role_table, DEFAULT_ROLE_TABLE);
        or_default(&mut options.user_table, DEFAULT_USER_TABLE);
        if options.max_query_limit == 0 {
            options.max_query_limit = DEFAULT_MAX_QUERY_LIMIT;
        }

        let audit_db = options
            .audit_db
            .get_or_insert_with(|| params.app_db.clone())
            .clone();
        let access_db = options
            .access_db
            .get_or_insert_with(|| params.app_db.clone())
            .clone();

        let skip = u64::try_from(params.skip).unwrap_or(0);
        let limit = u64::try_from(params.limit)
            .unwrap_or(0)
            .min(options.max_query_limit);

        let fingerprint = fingerprint(
            &params.table_name,
            &params.query_params,
            &params.sort_params,
            &params.project_params,
            &params.record_ids,
        );
        let audit = PgAuditLog::new(audit_db.clone(), options.audit_table.clone())
            .sql_log(options.sql_log.clone());

        Self {
            req: Request {
                app_db: params.app_db,
                audit_db,
                access_db,
                table_name: params.table_name,
                user_info: params.user_info,
                action_params: params.action_params,
                record_ids: params.record_ids,
                query_params: params.query_params,
                sort_params: params.sort_params,
                project_params: params.project_params,
                exist_params: params.exist_params,
                skip,
                limit,
                token: params.token,
                task_name: params.task_name,
                options,
                fingerprint,
            },
            audit,
        }
    }
}

impl<S> Crud<S> {
    /// Replace the audit sink.
    pub fn with_audit_sink<T: AuditSink>(self, sink: T) -> Crud<T> {
        Crud {
            req: self.req,
            audit: sink,
        }
    }

    pub fn audit_sink(&self) -> &S {
        &self.audit
    }

    pub fn table_name(&self) -> &str {
        &self.req.table_name
    }

    pub fn user_info(&self) -> &UserInfo {
        &self.req.user_info
    }

    pub fn action_params(&self) -> &[ActionRecord] {
        &self.req.action_params
    }

    pub fn record_ids(&self) -> &[String] {
        &self.req.record_ids
    }

    pub fn query_params(&self) -> &QueryParams {
        &self.req.query_params
    }

    pub fn sort_params(&self) -> &SortParams {
        &self.req.sort_params
    }

    pub fn project_params(&self) -> &ProjectParams {
        &self.req.project_params
    }

    pub fn exist_params(&self) -> &[QueryParams] {
        &self.req.exist_params
    }

    pub fn skip(&self) -> u64 {
        self.req.skip
    }

    pub fn limit(&self) -> u64 {
        self.req.limit
    }

    pub fn token(&self) -> &str {
        &self.req.token
    }

    pub fn task_name(&self) -> &str {
        &self.req.task_name
    }

    /// Options with every default filled in.
    pub fn options(&self) -> &CrudOptions {
        &self.req.options
    }

    /// Stable key for this request's table, filters, sort, projection and ids.
    pub fn fingerprint(&self) -> &str {
        &self.req.fingerprint
    }

    pub fn app_db(&self) -> &Pool {
        &self.req.app_db
    }

    pub fn audit_db(&self) -> &Pool {
        &self.req.audit_db
    }

    pub fn access_db(&self) -> &Pool {
        &self.req.access_db
    }

    fn executor(&self) -> Executor<'_> {
        Executor::new(
            &self.req.app_db,
            &self.req.table_name,
            &self.req.options.sql_log,
        )
    }

    fn audits(&self, log_type: LogType) -> bool {
        let o = &self.req.options;
        o.log_all
            || match log_type {
                LogType::Create => o.log_create,
                LogType::Read => o.log_read,
                LogType::Update => o.log_update,
                LogType::Delete => o.log_delete,
            }
    }

    fn select_options(&self, paged: bool) -> SelectOptions<'_> {
        SelectOptions {
            sort: Some(&self.req.sort_params),
            project: Some(&self.req.project_params),
            skip: if paged { self.req.skip } else { 0 },
            limit: if paged { self.req.limit } else { 0 },
        }
    }

    /// The one record an update by ids / predicate takes its SET values from.
    fn single_record(&self) -> CrudResult<&ActionRecord> {
        match self.req.action_params.as_slice() {
            [] => Err(CrudError::params(
                "action params are required for the update operation",
            )),
            [record] => Ok(record),
            records => Err(CrudError::params(format!(
                "update by record ids or query params takes exactly one action record, got {}",
                records.len()
            ))),
        }
    }

    fn action_json(&self) -> Value {
        Value::Array(
            self.req
                .action_params
                .iter()
                .map(|r| {
                    Value::Object(r.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
                })
                .collect(),
        )
    }

    fn filter_json(&self) -> Value {
        let mut filter = Map::new();
        filter.insert(
            "recordIds".to_string(),
            Value::from(self.req.record_ids.clone()),
        );
        filter.insert(
            "queryParams".to_string(),
            Value::Object(
                self.req
                    .query_params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        );
        Value::Object(filter)
    }
}

fn records_json(records: &[Record]) -> Value {
    Value::Array(records.iter().map(Record::to_json).collect())
}

impl<S: AuditSink> Crud<S> {
    // ==================== Save ====================

    /// Create or update, depending on the request:
    ///
    /// 1. `record_ids` set: update those rows from the single action record
    /// 2. `query_params` set: update matching rows from the single action record
    /// 3. every action record carries an `id`: update each record's row
    /// 4. otherwise: insert every action record
    pub async fn save(&self, table_fields: &[String]) -> CrudResponse {
        let result = if !self.req.record_ids.is_empty() {
            self.update_by_ids(table_fields).await
        } else if !self.req.query_params.is_empty() {
            self.update_by_params(table_fields).await
        } else if !self.req.action_params.is_empty()
            && self
                .req
                .action_params
                .iter()
                .all(|r| r.get(ID_COLUMN).is_some_and(|id| !id.is_null()))
        {
            self.update_records(table_fields).await
        } else {
            self.create(table_fields).await
        };
        result.unwrap_or_else(CrudResponse::from)
    }

    async fn create(&self, table_fields: &[String]) -> CrudResult<CrudResponse> {
        let create = compute_create_batch_query(
            &self.req.table_name,
            table_fields,
            &self.req.action_params,
        )?;
        let exec = self.executor();
        let mut client = exec.connect().await?;
        let record_ids = exec.insert_returning_ids(&mut client, &create).await?;
        drop(client);

        let response = CrudResponse::success(ResponseValue::Create(CreateResult {
            table_name: self.req.table_name.clone(),
            record_count: self.req.action_params.len(),
            record_ids,
        }));
        Ok(self
            .audited(LogType::Create, Value::Null, self.action_json(), response)
            .await)
    }

    async fn update_by_ids(&self, table_fields: &[String]) -> CrudResult<CrudResponse> {
        let record = self.single_record()?;
        let query = compute_update_by_ids(
            &self.req.table_name,
            table_fields,
            record,
            &self.req.record_ids,
        )?;
        self.mutate(
            LogType::Update,
            Filter::Ids(&self.req.record_ids),
            &query,
            self.action_json(),
        )
        .await
    }

    async fn update_by_params(&self, table_fields: &[String]) -> CrudResult<CrudResponse> {
        let record = self.single_record()?;
        let query = compute_update_by_params(
            &self.req.table_name,
            table_fields,
            record,
            &self.req.query_params,
        )?;
        self.mutate(
            LogType::Update,
            Filter::Params(&self.req.query_params),
            &query,
            self.action_json(),
        )
        .await
    }

    async fn update_records(&self, table_fields: &[String]) -> CrudResult<CrudResponse> {
        let queries =
            compute_update_records(&self.req.table_name, table_fields, &self.req.action_params)?;
        let ids: Vec<String> = self
            .req
            .action_params
            .iter()
            .filter_map(|r| r.get(ID_COLUMN))
            .map(id_string)
            .collect();

        let exec = self.executor();
        let mut client = exec.connect().await?;
        let before = self
            .before_snapshot(&exec, &**client, Filter::Ids(&ids), LogType::Update)
            .await;
        let affected = exec.update_each(&mut client, &queries).await?;
        drop(client);

        let response = CrudResponse::success(ResponseValue::Update(affected));
        Ok(self
            .audited(LogType::Update, before, self.action_json(), response)
            .await)
    }

    // ==================== Delete ====================

    /// Delete the rows named by `record_ids`.
    pub async fn delete_by_id(&self) -> CrudResponse {
        let result = async {
            let query = compute_delete_by_ids(&self.req.table_name, &self.req.record_ids)?;
            self.mutate(
                LogType::Delete,
                Filter::Ids(&self.req.record_ids),
                &query,
                Value::Null,
            )
            .await
        }
        .await;
        result.unwrap_or_else(CrudResponse::from)
    }

    /// Delete the rows matching `query_params`.
    pub async fn delete_by_param(&self) -> CrudResponse {
        let result = async {
            let query = compute_delete_by_params(&self.req.table_name, &self.req.query_params)?;
            self.mutate(
                LogType::Delete,
                Filter::Params(&self.req.query_params),
                &query,
                Value::Null,
            )
            .await
        }
        .await;
        result.unwrap_or_else(CrudResponse::from)
    }

    /// Delete every row of the table. Refused when record ids or query params are set.
    pub async fn delete_all(&self) -> CrudResponse {
        let result = async {
            if !self.req.record_ids.is_empty() || !self.req.query_params.is_empty() {
                return Err(CrudError::params(
                    "delete all does not take record ids or query params; \
                     use delete_by_id or delete_by_param",
                ));
            }
            let query = compute_delete_all(&self.req.table_name)?;
            self.mutate(LogType::Delete, Filter::All, &query, Value::Null)
                .await
        }
        .await;
        result.unwrap_or_else(CrudResponse::from)
    }

    /// Run one UPDATE / DELETE, snapshotting `filter` first when the operation is audited.
    async fn mutate(
        &self,
        log_type: LogType,
        filter: Filter<'_>,
        query: &BuiltQuery,
        after: Value,
    ) -> CrudResult<CrudResponse> {
        let exec = self.executor();
        let client = exec.connect().await?;
        let before = self
            .before_snapshot(&exec, &**client, filter, log_type)
            .await;
        let affected = exec
            .execute_built(&**client, log_type.as_str(), query)
            .await?;
        drop(client);

        let value = match log_type {
            LogType::Delete => ResponseValue::Delete(affected),
            _ => ResponseValue::Update(affected),
        };
        Ok(self
            .audited(log_type, before, after, CrudResponse::success(value))
            .await)
    }

    // ==================== Read ====================

    /// Stream the rows named by `record_ids`.
    pub async fn stream_by_id(&self, table_fields: &[String]) -> CrudResult<RecordStream> {
        let query = compute_select_by_ids(
            &self.req.table_name,
            table_fields,
            &self.req.record_ids,
            self.select_options(false),
        )?;
        self.open_stream(&query).await
    }

    /// Stream the rows matching `query_params`, honoring skip / limit.
    pub async fn stream_by_param(&self, table_fields: &[String]) -> CrudResult<RecordStream> {
        let query = compute_select_by_params(
            &self.req.table_name,
            table_fields,
            &self.req.query_params,
            self.select_options(true),
        )?;
        self.open_stream(&query).await
    }

    /// Stream every row, honoring skip / limit.
    pub async fn stream_all(&self, table_fields: &[String]) -> CrudResult<RecordStream> {
        let query = compute_select_all(
            &self.req.table_name,
            table_fields,
            self.select_options(true),
        )?;
        self.open_stream(&query).await
    }

    async fn open_stream(&self, query: &BuiltQuery) -> CrudResult<RecordStream> {
        let exec = self.executor();
        let client = exec.connect().await?;
        exec.stream(client, query).await
    }

    /// Deliver the rows named by `record_ids` through `signal` / `sinks`.
    ///
    /// Returns `notFound` when no row matches.
    ///
    /// ```ignore
    /// let (tx, mut rx) = pgcrud::signal_channel();
    /// let sinks = FieldSinks::new();
    /// let drain = async {
    ///     while rx.recv().await >= 0 {
    ///         println!("{:?}", sinks.values());
    ///     }
    /// };
    /// let (res, ()) = tokio::join!(crud.get_by_id(&fields, tx, &sinks), drain);
    /// ```
    ///
    /// # Deadlocks
    ///
    /// The streamer waits for the receiver before every row, so `crud.get_by_id(..).await`
    /// followed by a drain loop never completes. The same holds for [`get_by_param`] and
    /// [`get_all`].
    ///
    /// [`get_by_param`]: Crud::get_by_param
    /// [`get_all`]: Crud::get_all
    pub async fn get_by_id(
        &self,
        table_fields: &[String],
        signal: SignalSender,
        sinks: &FieldSinks,
    ) -> CrudResponse {
        let result = async {
            let rows = self.stream_by_id(table_fields).await?;
            let delivery = pump(rows, signal, sinks, table_fields).await?;
            if delivery.rows == 0 && !delivery.cancelled {
                return Err(CrudError::not_found(format!(
                    "no {} record matches the given ids",
                    self.req.table_name
                )));
            }
            Ok(delivery)
        }
        .await;
        self.finish_read(result).await
    }

    /// Deliver the rows matching `query_params` through `signal` / `sinks`.
    ///
    /// Must be polled together with the receiver's drain loop; see [`Crud::get_by_id`].
    pub async fn get_by_param(
        &self,
        table_fields: &[String],
        signal: SignalSender,
        sinks: &FieldSinks,
    ) -> CrudResponse {
        let result = async {
            let rows = self.stream_by_param(table_fields).await?;
            pump(rows, signal, sinks, table_fields).await
        }
        .await;
        self.finish_read(result).await
    }

    /// Deliver every row (subject to skip / limit) through `signal` / `sinks`.
    ///
    /// Must be polled together with the receiver's drain loop; see [`Crud::get_by_id`].
    pub async fn get_all(
        &self,
        table_fields: &[String],
        signal: SignalSender,
        sinks: &FieldSinks,
    ) -> CrudResponse {
        let result = async {
            let rows = self.stream_all(table_fields).await?;
            pump(rows, signal, sinks, table_fields).await
        }
        .await;
        self.finish_read(result).await
    }

    async fn finish_read(&self, result: CrudResult<Delivery>) -> CrudResponse {
        let delivery = match result {
            Ok(delivery) => delivery,
            Err(err) => return CrudResponse::from(err),
        };
        let response = CrudResponse::success(ResponseValue::Read(delivery.rows));
        if delivery.cancelled {
            tracing::debug!(
                target: "pgcrud.sql",
                table = %self.req.table_name,
                rows = delivery.rows,
                "read cancelled by receiver"
            );
            return response;
        }
        self.audited(LogType::Read, self.filter_json(), Value::Null, response)
            .await
    }

    // ==================== Audit ====================

    async fn before_snapshot<C: GenericClient>(
        &self,
        exec: &Executor<'_>,
        client: &C,
        filter: Filter<'_>,
        log_type: LogType,
    ) -> Value {
        if !self.audits(log_type) {
            return Value::Null;
        }
        match exec.snapshot(client, filter).await {
            Ok(records) => records_json(&records),
            Err(err) => {
                log_audit_failure(&self.req.table_name, log_type.as_str(), &err);
                Value::Null
            }
        }
    }

    /// Emit the audit record for a committed operation, when that operation type is audited.
    async fn audited(
        &self,
        log_type: LogType,
        before: Value,
        after: Value,
        response: CrudResponse,
    ) -> CrudResponse {
        if !self.audits(log_type) {
            return response;
        }
        let record = AuditRecord::new(
            self.req.table_name.clone(),
            log_type,
            self.req.user_info.actor(),
            before,
            after,
        );
        match self.audit.record(&record).await {
            Ok(()) => response,
            Err(err) => {
                log_audit_failure(&self.req.table_name, log_type.as_str(), &err);
                response.with_message(format!(
                    "{log_type} succeeded, but the audit record could not be written: {err}"
                ))
            }
        }
    }
}

impl<S> std::fmt::Display for Crud<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Crud(table: {})", self.req.table_name)
    }
}

#[cfg(test)]
mod tests;
