use super::{BuiltQuery, Filter, WhereClause};
use crate::error::CrudResult;
use crate::ident::check_table;
use crate::params::QueryParams;

fn filtered_delete(table: &str, filter: Filter<'_>) -> CrudResult<BuiltQuery> {
    check_table(table)?;
    let mut sql = format!("DELETE FROM {table}");
    let mut clause = WhereClause::new();
    filter.apply(&mut clause)?;
    clause.write_to(&mut sql);
    Ok(BuiltQuery {
        sql,
        params: clause.into_params(),
    })
}

/// `DELETE FROM t WHERE id IN ($1, ...)`
pub fn compute_delete_by_ids(table: &str, ids: &[String]) -> CrudResult<BuiltQuery> {
    filtered_delete(table, Filter::Ids(ids))
}

/// `DELETE FROM t WHERE p1=$1 AND ...`
pub fn compute_delete_by_params(table: &str, query: &QueryParams) -> CrudResult<BuiltQuery> {
    filtered_delete(table, Filter::Params(query))
}

/// `DELETE FROM t`
///
/// Callers must make sure no filter was requested; see `Crud::delete_all`.
pub fn compute_delete_all(table: &str) -> CrudResult<BuiltQuery> {
    filtered_delete(table, Filter::All)
}
