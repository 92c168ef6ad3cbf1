use super::{BuiltQuery, Filter, ID_COLUMN, WhereClause};
use crate::coerce::{bind_value, project_record};
use crate::error::{CrudError, CrudResult};
use crate::ident::{check_columns, check_table};
use crate::value::{ActionRecord, FieldValue};

/// `UPDATE t SET c1=$1, ...` with the values of `record`, placeholders starting at `$1`.
fn set_clause(
    table: &str,
    fields: &[String],
    record_index: usize,
    record: &ActionRecord,
) -> CrudResult<(String, Vec<FieldValue>)> {
    check_table(table)?;
    check_columns(fields)?;

    let mut assignments = Vec::with_capacity(fields.len());
    let mut params = Vec::with_capacity(fields.len());
    for (column, value) in project_record(record_index, record, fields)? {
        params.push(bind_value(column, value)?);
        assignments.push(format!("{column}=${}", params.len()));
    }
    Ok((
        format!("UPDATE {table} SET {}", assignments.join(", ")),
        params,
    ))
}

fn filtered_update(
    table: &str,
    fields: &[String],
    record: &ActionRecord,
    filter: Filter<'_>,
) -> CrudResult<BuiltQuery> {
    let (mut sql, mut params) = set_clause(table, fields, 0, record)?;
    let mut clause = WhereClause::with_offset(params.len());
    filter.apply(&mut clause)?;
    clause.write_to(&mut sql);
    params.extend(clause.into_params());
    Ok(BuiltQuery { sql, params })
}

/// `UPDATE t SET c1=$1, ..., cN=$N WHERE id IN ($N+1, ..., $N+M)`
pub fn compute_update_by_ids(
    table: &str,
    fields: &[String],
    record: &ActionRecord,
    ids: &[String],
) -> CrudResult<BuiltQuery> {
    filtered_update(table, fields, record, Filter::Ids(ids))
}

/// `UPDATE t SET c1=$1, ..., cN=$N WHERE p1=$N+1 AND ...`
pub fn compute_update_by_params(
    table: &str,
    fields: &[String],
    record: &ActionRecord,
    query: &crate::params::QueryParams,
) -> CrudResult<BuiltQuery> {
    filtered_update(table, fields, record, Filter::Params(query))
}

/// One `UPDATE t SET ... WHERE id=$n` per record, keyed on the record's own `id`.
///
/// `id` is never assigned, even when it is listed in `fields`.
pub fn compute_update_records(
    table: &str,
    fields: &[String],
    records: &[ActionRecord],
) -> CrudResult<Vec<BuiltQuery>> {
    if records.is_empty() {
        return Err(CrudError::params(
            "action params are required for the update operation",
        ));
    }
    let set_fields: Vec<String> = fields
        .iter()
        .filter(|f| f.as_str() != ID_COLUMN)
        .cloned()
        .collect();

    records
        .iter()
        .enumerate()
        .map(|(index, record)| {
            let id = match record.get(ID_COLUMN) {
                Some(id) if !id.is_null() => id,
                _ => {
                    return Err(CrudError::RequiredField {
                        record: index,
                        column: ID_COLUMN.to_string(),
                    });
                }
            };
            let (mut sql, mut params) = set_clause(table, &set_fields, index, record)?;
            let mut clause = WhereClause::with_offset(params.len());
            clause.and_eq(ID_COLUMN, id)?;
            clause.write_to(&mut sql);
            params.extend(clause.into_params());
            Ok(BuiltQuery { sql, params })
        })
        .collect()
}
