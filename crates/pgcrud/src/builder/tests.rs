use super::*;
use crate::action_record;
use crate::params::{ProjectParams, SortParams};

fn fields(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn placeholders_in(sql: &str) -> Vec<usize> {
    let mut found = Vec::new();
    let bytes = sql.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'$' {
            let digits: String = sql[i + 1..]
                .chars()
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if let Ok(n) = digits.parse() {
                found.push(n);
            }
            i += digits.len();
        }
        i += 1;
    }
    found
}

fn assert_contiguous(query: &BuiltQuery) {
    let found = placeholders_in(&query.sql);
    let expected: Vec<usize> = (1..=query.params.len()).collect();
    assert_eq!(found, expected, "{}", query.sql);
}

#[test]
fn test_create_batch_query() {
    let records = vec![
        action_record! { "x" => 1_i64, "y" => "a", "z" => true },
        action_record! { "x" => 2_i64, "y" => "b", "z" => false },
        action_record! { "x" => 3_i64, "y" => "c", "z" => true },
    ];
    let res = compute_create_batch_query("t", &fields(&["x", "y", "z"]), &records).unwrap();
    assert_eq!(res.sql, "INSERT INTO t( x, y, z ) VALUES( $1, $2, $3 )");
    assert_eq!(res.field_names, fields(&["x", "y", "z"]));
    assert_eq!(res.field_values.len(), 3);
    assert!(res.field_values.iter().all(|row| row.len() == 3));
    assert_eq!(res.field_values[1][1], FieldValue::from("b"));
    assert_eq!(res.row_params(2).map(|p| p.len()), Some(3));
    assert!(res.row_params(3).is_none());
}

#[test]
fn test_create_batch_projects_in_field_order() {
    let records = vec![action_record! { "age" => 1_i32, "name" => "a" }];
    let res = compute_create_batch_query("users", &fields(&["name", "age"]), &records).unwrap();
    assert_eq!(
        res.field_values[0],
        vec![FieldValue::from("a"), FieldValue::I32(1)]
    );
    assert_eq!(
        res.returning("id"),
        "INSERT INTO users( name, age ) VALUES( $1, $2 ) RETURNING id"
    );
}

#[test]
fn test_create_copy_matches_batch() {
    let records = vec![action_record! { "name" => "a" }];
    let f = fields(&["name"]);
    assert_eq!(
        compute_create_copy_query("t", &f, &records).unwrap(),
        compute_create_batch_query("t", &f, &records).unwrap()
    );
}

#[test]
fn test_create_requires_table_fields_and_records() {
    let records = vec![action_record! { "name" => "a" }];
    let f = fields(&["name"]);

    let err = compute_create_batch_query("", &f, &records).unwrap_err();
    assert!(err.is_params());
    assert!(compute_create_batch_query("t", &[], &records).unwrap_err().is_params());
    assert!(compute_create_batch_query("t", &f, &[]).unwrap_err().is_params());
    assert!(compute_create_query("", &f, &records).unwrap_err().is_params());
}

#[test]
fn test_create_missing_field_reports_record() {
    let records = vec![
        action_record! { "name" => "a", "age" => 1_i32 },
        action_record! { "name" => "b", "age" => None::<i32> },
    ];
    let err = compute_create_batch_query("t", &fields(&["name", "age"]), &records).unwrap_err();
    assert!(err.is_params());
    assert_eq!(err.to_string(), "Record #1: required field 'age' is missing");
}

#[test]
fn test_create_literal_query() {
    let records = vec![
        action_record! { "name" => "O'Brien", "age" => 30_i64, "tags" => vec!["a", "b"] },
        action_record! { "name" => "b", "age" => 2_i64, "tags" => Vec::<String>::new() },
    ];
    let stmts =
        compute_create_query("people", &fields(&["name", "age", "tags"]), &records).unwrap();
    assert_eq!(
        stmts,
        vec![
            "INSERT INTO people(name, age, tags) VALUES('O''Brien', 30, ARRAY['a', 'b'])",
            "INSERT INTO people(name, age, tags) VALUES('b', 2, '{}')",
        ]
    );
}

#[test]
fn test_create_rejects_bad_identifiers() {
    let records = vec![action_record! { "name" => "a" }];
    assert!(
        compute_create_batch_query("t; DROP TABLE t", &fields(&["name"]), &records)
            .unwrap_err()
            .is_params()
    );
    assert!(
        compute_create_batch_query("t", &fields(&["name) --"]), &records)
            .unwrap_err()
            .is_params()
    );
}

#[test]
fn test_update_by_params() {
    let record = action_record! { "status" => "final" };
    let mut query = QueryParams::new();
    query.insert("status".into(), "draft".into());

    let q = compute_update_by_params("t", &fields(&["status"]), &record, &query).unwrap();
    assert_eq!(q.sql, "UPDATE t SET status=$1 WHERE status=$2");
    assert_eq!(q.params, vec![FieldValue::from("final"), FieldValue::from("draft")]);
    assert_contiguous(&q);
}

#[test]
fn test_update_by_ids() {
    let record = action_record! { "name" => "n", "age" => 4_i32 };
    let ids = fields(&["7", "9"]);
    let q = compute_update_by_ids("users", &fields(&["name", "age"]), &record, &ids).unwrap();
    assert_eq!(q.sql, "UPDATE users SET name=$1, age=$2 WHERE id IN ($3, $4)");
    assert_eq!(q.params.len(), 4);
    assert_contiguous(&q);
}

#[test]
fn test_update_by_ids_requires_ids() {
    let record = action_record! { "name" => "n" };
    assert!(
        compute_update_by_ids("users", &fields(&["name"]), &record, &[])
            .unwrap_err()
            .is_params()
    );
    assert!(
        compute_update_by_params("users", &fields(&["name"]), &record, &QueryParams::new())
            .unwrap_err()
            .is_params()
    );
}

#[test]
fn test_update_records_keyed_on_id() {
    let records = vec![
        action_record! { "id" => 1_i64, "name" => "a" },
        action_record! { "id" => 2_i64, "name" => "b" },
    ];
    let qs = compute_update_records("users", &fields(&["id", "name"]), &records).unwrap();
    assert_eq!(qs.len(), 2);
    assert_eq!(qs[0].sql, "UPDATE users SET name=$1 WHERE id=$2");
    assert_eq!(qs[1].params, vec![FieldValue::from("b"), FieldValue::I64(2)]);
}

#[test]
fn test_update_records_require_id() {
    let records = vec![action_record! { "name" => "a" }];
    let err = compute_update_records("users", &fields(&["name"]), &records).unwrap_err();
    assert!(err.is_params());
}

#[test]
fn test_predicate_null_and_array_shapes() {
    let mut query = QueryParams::new();
    query.insert("deleted_at".into(), FieldValue::Null);
    query.insert("kind".into(), vec!["a", "b"].into());
    query.insert("owner".into(), "u1".into());

    let q = compute_delete_by_params("docs", &query).unwrap();
    assert_eq!(
        q.sql,
        "DELETE FROM docs WHERE deleted_at IS NULL AND kind = ANY($1) AND owner=$2"
    );
    assert_contiguous(&q);
}

#[test]
fn test_delete_variants() {
    let ids = fields(&["a", "b", "c"]);
    let q = compute_delete_by_ids("t", &ids).unwrap();
    assert_eq!(q.sql, "DELETE FROM t WHERE id IN ($1, $2, $3)");
    assert_contiguous(&q);

    assert_eq!(compute_delete_all("t").unwrap().sql, "DELETE FROM t");
    assert!(compute_delete_by_ids("t", &[]).unwrap_err().is_params());
    assert!(compute_delete_by_params("t", &QueryParams::new()).unwrap_err().is_params());
}

#[test]
fn test_select_all_with_sort_and_paging() {
    let sort = SortParams::new().desc("created_at").asc("name");
    let q = compute_select_all(
        "users",
        &fields(&["id", "name", "created_at"]),
        SelectOptions {
            sort: Some(&sort),
            project: None,
            skip: 20,
            limit: 10,
        },
    )
    .unwrap();
    assert_eq!(
        q.sql,
        "SELECT id, name, created_at FROM users ORDER BY created_at DESC, name ASC LIMIT 10 OFFSET 20"
    );
    assert!(q.params.is_empty());
}

#[test]
fn test_select_projection() {
    let f = fields(&["id", "name", "secret"]);

    let include = ProjectParams::new().include("name").include("id");
    let q = compute_select_all("users", &f, SelectOptions {
        project: Some(&include),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(q.sql, "SELECT name, id FROM users");

    let exclude = ProjectParams::new().exclude("secret");
    let q = compute_select_all("users", &f, SelectOptions {
        project: Some(&exclude),
        ..Default::default()
    })
    .unwrap();
    assert_eq!(q.sql, "SELECT id, name FROM users");
}

#[test]
fn test_select_by_ids_and_params() {
    let f = fields(&["id", "name"]);
    let q = compute_select_by_ids("users", &f, &fields(&["1", "2"]), SelectOptions::default())
        .unwrap();
    assert_eq!(q.sql, "SELECT id, name FROM users WHERE id IN ($1, $2)");

    let mut query = QueryParams::new();
    query.insert("name".into(), "a".into());
    let q = compute_select_by_params("users", &f, &query, SelectOptions {
        limit: 5,
        ..Default::default()
    })
    .unwrap();
    assert_eq!(q.sql, "SELECT id, name FROM users WHERE name=$1 LIMIT 5");
    assert_contiguous(&q);
}

#[test]
fn test_snapshot_query() {
    let ids = fields(&["1"]);
    let q = compute_snapshot_query("users", Filter::Ids(&ids)).unwrap();
    assert_eq!(q.sql, "SELECT * FROM users WHERE id IN ($1)");
    assert_eq!(q.params_ref().len(), 1);
}

#[test]
fn test_where_clause_offset() {
    let mut clause = WhereClause::with_offset(2);
    clause.and_eq("a", &FieldValue::I32(1)).unwrap();
    clause.and_in("b", vec![FieldValue::I32(2)]).unwrap();
    assert_eq!(clause.build_clause(), "a=$3 AND b IN ($4)");
    assert_eq!(clause.param_count(), 4);

    let mut empty = WhereClause::new();
    empty.and_in("id", Vec::new()).unwrap();
    assert_eq!(empty.build_clause(), "1=0");
}

#[test]
fn test_filter_ids_binds_text_after_offset() {
    let ids = fields(&["5", "6"]);
    let mut clause = WhereClause::with_offset(1);
    Filter::Ids(&ids).apply(&mut clause).unwrap();
    assert_eq!(clause.build_clause(), "id IN ($2, $3)");
    assert_eq!(clause.param_count(), 3);

    let mut clause = WhereClause::new();
    assert!(Filter::Ids(&[]).apply(&mut clause).unwrap_err().is_params());
    Filter::All.apply(&mut clause).unwrap();
    assert_eq!(clause.build_clause(), "");
}
