use super::{BuiltQuery, Filter, WhereClause};
use crate::error::{CrudError, CrudResult};
use crate::ident::{check_columns, check_ident, check_table};
use crate::params::{ProjectParams, Projection, QueryParams, SortParams};

/// Sort, projection and paging applied to a SELECT.
///
/// `limit == 0` omits the LIMIT clause, `skip == 0` omits OFFSET.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelectOptions<'a> {
    pub sort: Option<&'a SortParams>,
    pub project: Option<&'a ProjectParams>,
    pub skip: u64,
    pub limit: u64,
}

fn projection(fields: &[String], project: Option<&ProjectParams>) -> CrudResult<Vec<String>> {
    let Some(project) = project.filter(|p| !p.is_empty()) else {
        return Ok(fields.to_vec());
    };
    for (column, _) in project.iter() {
        check_ident("column", column)?;
    }

    let included: Vec<String> = project
        .iter()
        .filter(|(_, p)| **p == Projection::Include)
        .map(|(c, _)| c.to_string())
        .collect();
    let columns = if included.is_empty() {
        fields
            .iter()
            .filter(|f| project.get(f) != Some(&Projection::Exclude))
            .cloned()
            .collect()
    } else {
        included
    };

    if columns.is_empty() {
        return Err(CrudError::params("projection excludes every column"));
    }
    Ok(columns)
}

fn build_select(
    table: &str,
    fields: &[String],
    filter: Filter<'_>,
    options: SelectOptions<'_>,
) -> CrudResult<BuiltQuery> {
    check_table(table)?;
    check_columns(fields)?;

    let columns = projection(fields, options.project)?;
    let mut sql = format!("SELECT {} FROM {table}", columns.join(", "));

    let mut clause = WhereClause::new();
    filter.apply(&mut clause)?;
    clause.write_to(&mut sql);

    if let Some(sort) = options.sort.filter(|s| !s.is_empty()) {
        let mut order = Vec::with_capacity(sort.len());
        for (column, dir) in sort.iter() {
            check_ident("column", column)?;
            order.push(format!("{column} {}", dir.as_sql()));
        }
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }
    if options.limit > 0 {
        sql.push_str(&format!(" LIMIT {}", options.limit));
    }
    if options.skip > 0 {
        sql.push_str(&format!(" OFFSET {}", options.skip));
    }

    Ok(BuiltQuery {
        sql,
        params: clause.into_params(),
    })
}

/// `SELECT <projection> FROM t WHERE id IN (...) [ORDER BY ...] [LIMIT n] [OFFSET m]`
pub fn compute_select_by_ids(
    table: &str,
    fields: &[String],
    ids: &[String],
    options: SelectOptions<'_>,
) -> CrudResult<BuiltQuery> {
    build_select(table, fields, Filter::Ids(ids), options)
}

/// `SELECT <projection> FROM t WHERE p1=$1 AND ... [ORDER BY ...] [LIMIT n] [OFFSET m]`
pub fn compute_select_by_params(
    table: &str,
    fields: &[String],
    query: &QueryParams,
    options: SelectOptions<'_>,
) -> CrudResult<BuiltQuery> {
    build_select(table, fields, Filter::Params(query), options)
}

/// `SELECT <projection> FROM t [ORDER BY ...] [LIMIT n] [OFFSET m]`
pub fn compute_select_all(
    table: &str,
    fields: &[String],
    options: SelectOptions<'_>,
) -> CrudResult<BuiltQuery> {
    build_select(table, fields, Filter::All, options)
}

/// `SELECT * FROM t WHERE <filter>`, used to capture rows before they are mutated.
pub fn compute_snapshot_query(table: &str, filter: Filter<'_>) -> CrudResult<BuiltQuery> {
    check_table(table)?;
    let mut sql = format!("SELECT * FROM {table}");
    let mut clause = WhereClause::new();
    filter.apply(&mut clause)?;
    clause.write_to(&mut sql);
    Ok(BuiltQuery {
        sql,
        params: clause.into_params(),
    })
}
