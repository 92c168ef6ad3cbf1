use crate::coerce::{bind_value, literal_value, project_record};
use crate::error::{CrudError, CrudResult};
use crate::ident::{check_columns, check_table};
use crate::value::{ActionRecord, FieldValue};
use serde::Serialize;
use tokio_postgres::types::ToSql;

/// A parameterized INSERT with its row-major value matrix.
///
/// `sql` has exactly `field_names.len()` placeholders; every row of `field_values` has the same
/// length and is projected in `field_names` order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateQueryResponse {
    #[serde(rename = "createQuery")]
    pub sql: String,
    pub field_names: Vec<String>,
    pub field_values: Vec<Vec<FieldValue>>,
}

impl CreateQueryResponse {
    /// Bind references for row `index` of the value matrix.
    pub fn row_params(&self, index: usize) -> Option<Vec<&(dyn ToSql + Sync)>> {
        self.field_values
            .get(index)
            .map(|row| row.iter().map(|v| v as &(dyn ToSql + Sync)).collect())
    }

    /// The INSERT statement with a `RETURNING` clause appended.
    pub fn returning(&self, column: &str) -> String {
        format!("{} RETURNING {column}", self.sql)
    }
}

fn check_create(table: &str, fields: &[String], records: &[ActionRecord]) -> CrudResult<()> {
    check_table(table)?;
    check_columns(fields)?;
    if records.is_empty() {
        return Err(CrudError::params(
            "action params are required for the create operation",
        ));
    }
    Ok(())
}

/// Build one `INSERT INTO t(c1, c2) VALUES(v1, v2)` statement per record with literal values.
pub fn compute_create_query(
    table: &str,
    fields: &[String],
    records: &[ActionRecord],
) -> CrudResult<Vec<String>> {
    check_create(table, fields, records)?;
    let head = format!("INSERT INTO {table}({})", fields.join(", "));

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let values = project_record(index, record, fields)?
                .into_iter()
                .map(|(column, value)| literal_value(column, value))
                .collect::<CrudResult<Vec<_>>>()?;
            Ok(format!("{head} VALUES({})", values.join(", ")))
        })
        .collect()
}

/// Build `INSERT INTO t( c1, c2 ) VALUES( $1, $2 )` plus one bind row per record.
pub fn compute_create_batch_query(
    table: &str,
    fields: &[String],
    records: &[ActionRecord],
) -> CrudResult<CreateQueryResponse> {
    check_create(table, fields, records)?;
    let placeholders: Vec<String> = (1..=fields.len()).map(|i| format!("${i}")).collect();
    let sql = format!(
        "INSERT INTO {table}( {} ) VALUES( {} )",
        fields.join(", "),
        placeholders.join(", ")
    );

    let field_values = records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            project_record(index, record, fields)?
                .into_iter()
                .map(|(column, value)| bind_value(column, value))
                .collect::<CrudResult<Vec<_>>>()
        })
        .collect::<CrudResult<Vec<_>>>()?;

    Ok(CreateQueryResponse {
        sql,
        field_names: fields.to_vec(),
        field_values,
    })
}

/// Same shape as [`compute_create_batch_query`]; used by bulk load paths.
pub fn compute_create_copy_query(
    table: &str,
    fields: &[String],
    records: &[ActionRecord],
) -> CrudResult<CreateQueryResponse> {
    compute_create_batch_query(table, fields, records)
}
