use super::*;
use crate::action_record;
use crate::error::ResultCode;
use crate::stream::signal_channel;
use std::sync::{Arc, Mutex};

/// Nothing listens on port 1, so any attempt to connect fails fast.
const UNREACHABLE: &str = "postgres://pgcrud@127.0.0.1:1/pgcrud";

fn pool() -> Pool {
    let mut cfg = deadpool_postgres::Config::new();
    cfg.url = Some(UNREACHABLE.to_string());
    cfg.create_pool(None, tokio_postgres::NoTls).unwrap()
}

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[derive(Default)]
struct Recorder {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditSink for Recorder {
    async fn record(&self, record: &AuditRecord) -> CrudResult<()> {
        self.records.lock().unwrap().push(record.clone());
        Ok(())
    }
}

struct Failing;

impl AuditSink for Failing {
    async fn record(&self, _record: &AuditRecord) -> CrudResult<()> {
        Err(CrudError::Audit("audit table is gone".into()))
    }
}

#[tokio::test]
async fn new_applies_defaults() {
    let app_db = pool();
    let crud = Crud::new(
        CrudParams::new(app_db.clone(), "users").skip(-5).limit(20),
        CrudOptions::default(),
    );

    let opts = crud.options();
    assert_eq!(opts.audit_table, "audits");
    assert_eq!(opts.access_table, "accesskeys");
    assert_eq!(opts.role_table, "roles");
    assert_eq!(opts.user_table, "users");
    assert_eq!(opts.max_query_limit, 10_000);
    assert_eq!(crud.skip(), 0);
    assert_eq!(crud.limit(), 20);
    assert_eq!(crud.audit_sink().table(), "audits");
    assert_eq!(crud.audit_db().status().max_size, app_db.status().max_size);
    assert!(opts.audit_db.is_some() && opts.access_db.is_some());
    assert_eq!(crud.to_string(), "Crud(table: users)");
}

#[tokio::test]
async fn exist_params_are_carried_but_not_fingerprinted() {
    let mut exist = QueryParams::new();
    exist.insert("email".into(), FieldValue::from("a@x.io"));
    let with = Crud::new(
        CrudParams::new(pool(), "users").exist_params(vec![exist.clone()]),
        CrudOptions::default(),
    );
    let without = Crud::new(CrudParams::new(pool(), "users"), CrudOptions::default());

    assert_eq!(with.exist_params(), &[exist][..]);
    assert!(without.exist_params().is_empty());
    assert_eq!(with.fingerprint(), without.fingerprint());
}

#[tokio::test]
async fn limit_is_clamped_to_max_query_limit() {
    let crud = Crud::new(
        CrudParams::new(pool(), "users").limit(500),
        CrudOptions::new().max_query_limit(100).audit_table("audit_log"),
    );
    assert_eq!(crud.limit(), 100);
    assert_eq!(crud.options().audit_table, "audit_log");

    let crud = Crud::new(
        CrudParams::new(pool(), "users").limit(20_000),
        CrudOptions::default(),
    );
    assert_eq!(crud.limit(), 10_000);
}

#[tokio::test]
async fn fingerprint_is_computed_at_construction() {
    let a = Crud::new(
        CrudParams::new(pool(), "t")
            .query_param("status", "draft")
            .record_ids(["2", "1"]),
        CrudOptions::default(),
    );
    let b = Crud::new(
        CrudParams::new(pool(), "t")
            .query_param("status", "draft")
            .record_ids(["1", "2"]),
        CrudOptions::default(),
    );
    assert_eq!(a.fingerprint(), b.fingerprint());
    assert!(a.fingerprint().starts_with("t{"));
}

#[tokio::test]
async fn save_without_table_is_params_error() {
    let crud = Crud::new(
        CrudParams::new(pool(), "").action_params(vec![action_record! { "name" => "a" }]),
        CrudOptions::default(),
    );
    let res = crud.save(&fields(&["name"])).await;
    assert_eq!(res.code, ResultCode::ParamsError);
    assert_eq!(res.value, ResponseValue::None);
}

#[tokio::test]
async fn save_with_missing_field_is_params_error() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people").action_params(vec![
            action_record! { "name" => "a", "age" => 1_i32 },
            action_record! { "name" => "b" },
        ]),
        CrudOptions::default(),
    );
    let res = crud.save(&fields(&["name", "age"])).await;
    assert_eq!(res.code, ResultCode::ParamsError);
    assert!(res.message.contains("Record #1"), "{}", res.message);
}

#[tokio::test]
async fn update_by_ids_takes_exactly_one_record() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people")
            .record_ids(["1", "2"])
            .action_params(vec![
                action_record! { "name" => "a" },
                action_record! { "name" => "b" },
            ]),
        CrudOptions::default(),
    );
    let res = crud.save(&fields(&["name"])).await;
    assert_eq!(res.code, ResultCode::ParamsError);
}

#[tokio::test]
async fn delete_all_refuses_filters() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people").record_ids(["1"]),
        CrudOptions::default(),
    );
    let res = crud.delete_all().await;
    assert_eq!(res.code, ResultCode::ParamsError);

    let crud = Crud::new(
        CrudParams::new(pool(), "people").query_param("status", "draft"),
        CrudOptions::default(),
    );
    assert_eq!(crud.delete_all().await.code, ResultCode::ParamsError);
}

#[tokio::test]
async fn delete_by_id_without_ids_is_params_error() {
    let crud = Crud::new(CrudParams::new(pool(), "people"), CrudOptions::default());
    assert_eq!(crud.delete_by_id().await.code, ResultCode::ParamsError);
    assert_eq!(crud.delete_by_param().await.code, ResultCode::ParamsError);
}

#[tokio::test]
async fn unreachable_database_is_connection_error() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people").action_params(vec![action_record! { "name" => "a" }]),
        CrudOptions::default(),
    );
    let res = crud.save(&fields(&["name"])).await;
    assert_eq!(res.code, ResultCode::ConnectionError);
}

#[tokio::test]
async fn failed_read_still_closes_the_channel() {
    let crud = Crud::new(CrudParams::new(pool(), "people"), CrudOptions::default());
    let (tx, mut rx) = signal_channel();
    let sinks = FieldSinks::new();
    let f = fields(&["id", "name"]);

    let (res, idx) = tokio::join!(crud.get_by_id(&f, tx, &sinks), rx.recv());
    assert_eq!(res.code, ResultCode::ParamsError);
    assert!(idx < 0);
}

#[tokio::test]
async fn audit_is_gated_by_log_flags() {
    let sink = Arc::new(Recorder::default());
    let crud = Crud::new(
        CrudParams::new(pool(), "people").user_info(UserInfo::new("u1")),
        CrudOptions::new().log_delete(),
    )
    .with_audit_sink(Arc::clone(&sink));

    let res = crud
        .audited(
            LogType::Update,
            Value::Null,
            Value::Null,
            CrudResponse::success(ResponseValue::Update(1)),
        )
        .await;
    assert!(res.is_success());
    assert!(sink.records.lock().unwrap().is_empty());

    let before = serde_json::json!([{"id": 1, "name": "a"}]);
    let res = crud
        .audited(
            LogType::Delete,
            before.clone(),
            Value::Null,
            CrudResponse::success(ResponseValue::Delete(1)),
        )
        .await;
    assert!(res.is_success());
    assert!(res.message.is_empty());

    let records = sink.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].table_name, "people");
    assert_eq!(records[0].log_type, LogType::Delete);
    assert_eq!(records[0].log_by, "u1");
    assert_eq!(records[0].log_records, before);
}

#[tokio::test]
async fn audit_failure_keeps_success() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people"),
        CrudOptions::new().log_all(),
    )
    .with_audit_sink(Failing);

    let res = crud
        .audited(
            LogType::Create,
            Value::Null,
            crud.action_json(),
            CrudResponse::success(ResponseValue::Delete(2)),
        )
        .await;
    assert_eq!(res.code, ResultCode::Success);
    assert_eq!(res.count(), Some(2));
    assert!(res.message.contains("audit"), "{}", res.message);
}

#[tokio::test]
async fn read_audit_records_the_filter() {
    let crud = Crud::new(
        CrudParams::new(pool(), "people")
            .record_ids(["7"])
            .query_param("status", "draft"),
        CrudOptions::default(),
    );
    let filter = crud.filter_json();
    assert_eq!(filter["recordIds"][0], "7");
    assert_eq!(filter["queryParams"]["status"], "draft");
}
