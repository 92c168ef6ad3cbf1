//! Shared WHERE clause builder for SELECT, UPDATE, DELETE.

use crate::coerce::bind_value;
use crate::error::CrudResult;
use crate::ident::check_ident;
use crate::value::FieldValue;

/// Reusable WHERE clause builder.
///
/// Placeholders continue after `offset`, so an UPDATE whose SET clause used `$1..$N` starts its
/// predicates at `$N+1`.
#[derive(Debug, Default)]
pub struct WhereClause {
    /// WHERE conditions (without leading AND)
    conditions: Vec<String>,
    /// Parameter values
    params: Vec<FieldValue>,
    /// Current parameter counter (starts from offset)
    param_count: usize,
}

impl WhereClause {
    /// Create a new WhereClause with param numbering starting at 1.
    pub fn new() -> Self {
        Self::with_offset(0)
    }

    /// Create a new WhereClause with param numbering starting after `offset`.
    ///
    /// For example, `with_offset(2)` means the first param will be `$3`.
    pub fn with_offset(offset: usize) -> Self {
        Self {
            conditions: Vec::new(),
            params: Vec::new(),
            param_count: offset,
        }
    }

    /// Get current parameter count.
    pub fn param_count(&self) -> usize {
        self.param_count
    }

    /// Check if any conditions have been added.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    fn next_placeholder(&mut self, value: FieldValue) -> String {
        self.param_count += 1;
        self.params.push(value);
        format!("${}", self.param_count)
    }

    /// Add AND equality condition.
    ///
    /// `Null` renders as `IS NULL`, arrays as `= ANY($n)`.
    pub fn and_eq(&mut self, col: &str, val: &FieldValue) -> CrudResult<&mut Self> {
        check_ident("column", col)?;
        let condition = match val {
            FieldValue::Null => format!("{col} IS NULL"),
            FieldValue::Array(_) => {
                let placeholder = self.next_placeholder(val.clone());
                format!("{col} = ANY({placeholder})")
            }
            _ => {
                let placeholder = self.next_placeholder(bind_value(col, val)?);
                format!("{col}={placeholder}")
            }
        };
        self.conditions.push(condition);
        Ok(self)
    }

    /// Add AND IN condition. An empty list matches nothing.
    pub fn and_in(&mut self, col: &str, values: Vec<FieldValue>) -> CrudResult<&mut Self> {
        check_ident("column", col)?;
        if values.is_empty() {
            self.conditions.push("1=0".to_string());
            return Ok(self);
        }
        let placeholders: Vec<String> = values
            .into_iter()
            .map(|v| self.next_placeholder(v))
            .collect();
        self.conditions
            .push(format!("{col} IN ({})", placeholders.join(", ")));
        Ok(self)
    }

    /// Build the WHERE clause string (without "WHERE" prefix).
    pub fn build_clause(&self) -> String {
        self.conditions.join(" AND ")
    }

    /// Append ` WHERE ...` to `sql` when there are conditions.
    pub fn write_to(&self, sql: &mut String) {
        if !self.conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.build_clause());
        }
    }

    /// Take the accumulated parameters.
    pub fn into_params(self) -> Vec<FieldValue> {
        self.params
    }
}
