//! Request parameter types: predicates, sort and projection, actor info.

use crate::value::FieldValue;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;

/// Column → predicate value, AND-conjoined in key order.
pub type QueryParams = BTreeMap<String, FieldValue>;

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Whether a column is part of a projection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Projection {
    Include,
    Exclude,
}

/// An insertion-ordered column → `V` mapping.
///
/// Column order is significant (sort precedence, projection order), so this serializes as a
/// JSON object whose keys keep insertion order. Setting a column twice replaces the earlier
/// entry in place.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderedParams<V> {
    entries: Vec<(String, V)>,
}

impl<V> Default for OrderedParams<V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
        }
    }
}

impl<V> OrderedParams<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `column` to `value`, keeping its original position when already present.
    pub fn set(&mut self, column: impl Into<String>, value: V) -> &mut Self {
        let column = column.into();
        match self.entries.iter_mut().find(|(c, _)| *c == column) {
            Some(entry) => entry.1 = value,
            None => self.entries.push((column, value)),
        }
        self
    }

    pub fn get(&self, column: &str) -> Option<&V> {
        self.entries.iter().find(|(c, _)| c == column).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.entries.iter().map(|(c, v)| (c.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<C: Into<String>, V> FromIterator<(C, V)> for OrderedParams<V> {
    fn from_iter<I: IntoIterator<Item = (C, V)>>(iter: I) -> Self {
        let mut params = Self::new();
        for (column, value) in iter {
            params.set(column, value);
        }
        params
    }
}

impl<V: Serialize> Serialize for OrderedParams<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (column, value) in &self.entries {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// Ordered column → direction mapping.
pub type SortParams = OrderedParams<SortOrder>;

/// Ordered column → include/exclude mapping.
pub type ProjectParams = OrderedParams<Projection>;

impl SortParams {
    pub fn asc(mut self, column: impl Into<String>) -> Self {
        self.set(column, SortOrder::Asc);
        self
    }

    pub fn desc(mut self, column: impl Into<String>) -> Self {
        self.set(column, SortOrder::Desc);
        self
    }
}

impl ProjectParams {
    pub fn include(mut self, column: impl Into<String>) -> Self {
        self.set(column, Projection::Include);
        self
    }

    pub fn exclude(mut self, column: impl Into<String>) -> Self {
        self.set(column, Projection::Exclude);
        self
    }
}

/// The actor performing a request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub user_id: String,
    pub login_name: String,
    pub first_name: String,
    pub last_name: String,
    pub language: String,
    #[serde(skip_serializing)]
    pub token: String,
}

impl UserInfo {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            ..Self::default()
        }
    }

    /// Value recorded as `log_by` in audit records.
    pub fn actor(&self) -> &str {
        if self.user_id.is_empty() {
            &self.login_name
        } else {
            &self.user_id
        }
    }
}
