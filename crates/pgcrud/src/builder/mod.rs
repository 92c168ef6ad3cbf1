//! Query synthesis.
//!
//! Every builder is a pure function from request shape to SQL text plus bind parameters:
//!
//! - INSERT: [`compute_create_query`] (values inlined as literals),
//!   [`compute_create_batch_query`] / [`compute_create_copy_query`] (placeholders + value matrix)
//! - UPDATE: by ids, by predicate, or one statement per record keyed on its `id`
//! - DELETE: by ids, by predicate, or all rows
//! - SELECT: by ids, by predicate, or all rows with sort / projection / limit / offset
//!
//! Placeholders are numbered from `$1` and stay contiguous across SET and WHERE within a
//! statement. Table and column names are checked with [`crate::ident`] before they are emitted.

mod create;
mod delete;
mod select;
mod update;
mod where_clause;

#[cfg(test)]
mod tests;

pub use create::{
    CreateQueryResponse, compute_create_batch_query, compute_create_copy_query,
    compute_create_query,
};
pub use delete::{compute_delete_all, compute_delete_by_ids, compute_delete_by_params};
pub use select::{
    SelectOptions, compute_select_all, compute_select_by_ids, compute_select_by_params,
    compute_snapshot_query,
};
pub use update::{compute_update_by_ids, compute_update_by_params, compute_update_records};
pub use where_clause::WhereClause;

use crate::error::{CrudError, CrudResult};
use crate::params::QueryParams;
use crate::value::FieldValue;
use tokio_postgres::types::ToSql;

/// Name of the primary-key column used by id-based operations.
pub const ID_COLUMN: &str = "id";

/// A SQL statement together with its positional bind parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<FieldValue>,
}

impl BuiltQuery {
    /// Get parameters as references compatible with tokio-postgres.
    pub fn params_ref(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|v| v as &(dyn ToSql + Sync)).collect()
    }
}

/// Row filter shared by UPDATE, DELETE and SELECT.
#[derive(Debug, Clone, Copy)]
pub enum Filter<'a> {
    /// `id IN (...)`
    Ids(&'a [String]),
    /// AND-conjoined predicates.
    Params(&'a QueryParams),
    /// No WHERE clause.
    All,
}

impl Filter<'_> {
    pub(crate) fn apply(&self, clause: &mut WhereClause) -> CrudResult<()> {
        match self {
            Self::Ids(ids) => {
                if ids.is_empty() {
                    return Err(CrudError::params("record ids are required"));
                }
                clause.and_in(
                    ID_COLUMN,
                    ids.iter().map(|id| FieldValue::Text(id.clone())).collect(),
                )?;
                Ok(())
            }
            Self::Params(query) => {
                if query.is_empty() {
                    return Err(CrudError::params("query params are required"));
                }
                for (column, value) in query.iter() {
                    clause.and_eq(column, value)?;
                }
                Ok(())
            }
            Self::All => Ok(()),
        }
    }
}
