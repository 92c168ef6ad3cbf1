//! Row decoding.
//!
//! Rows come back untyped: every column is decoded into a [`FieldValue`] according to its
//! PostgreSQL type.

use crate::error::{CrudError, CrudResult};
use crate::value::{ArrayValue, FieldValue};
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::ser::{Serialize, SerializeMap, Serializer};
use std::sync::Arc;
use tokio_postgres::Row;
use tokio_postgres::types::{FromSql, Type};

/// A decoded row: column names (shared across a result set) plus values in column order.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    columns: Arc<[String]>,
    values: Vec<FieldValue>,
}

impl Record {
    pub fn new(columns: Arc<[String]>, values: Vec<FieldValue>) -> Self {
        Self { columns, values }
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .map(|i| &self.values[i])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The row as a JSON object, used for audit snapshots.
    pub fn to_json(&self) -> serde_json::Value {
        self.columns
            .iter()
            .zip(&self.values)
            .map(|(c, v)| (c.clone(), v.to_json()))
            .collect::<serde_json::Map<_, _>>()
            .into()
    }
}

impl Serialize for Record {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len()))?;
        for (c, v) in self.columns.iter().zip(&self.values) {
            map.serialize_entry(c, v)?;
        }
        map.end()
    }
}

/// Column names of a row, shared by every [`Record`] decoded from the same statement.
pub(crate) fn column_names(row: &Row) -> Arc<[String]> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

fn get<'a, T: FromSql<'a>>(row: &'a Row, idx: usize, column: &str) -> CrudResult<Option<T>> {
    row.try_get::<_, Option<T>>(idx)
        .map_err(|e| CrudError::decode(column, e.to_string()))
}

fn decode_column(row: &Row, idx: usize) -> CrudResult<FieldValue> {
    let column = &row.columns()[idx];
    let name = column.name();
    let value = match *column.type_() {
        Type::BOOL => get::<bool>(row, idx, name)?.map(FieldValue::Bool),
        Type::CHAR => get::<i8>(row, idx, name)?.map(FieldValue::I8),
        Type::INT2 => get::<i16>(row, idx, name)?.map(FieldValue::I16),
        Type::INT4 => get::<i32>(row, idx, name)?.map(FieldValue::I32),
        Type::INT8 => get::<i64>(row, idx, name)?.map(FieldValue::I64),
        Type::OID => get::<u32>(row, idx, name)?.map(FieldValue::U32),
        Type::FLOAT4 => get::<f32>(row, idx, name)?.map(FieldValue::F32),
        Type::FLOAT8 => get::<f64>(row, idx, name)?.map(FieldValue::F64),
        Type::NUMERIC => get::<Decimal>(row, idx, name)?.map(FieldValue::Decimal),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            get::<String>(row, idx, name)?.map(FieldValue::Text)
        }
        Type::UUID => get::<uuid::Uuid>(row, idx, name)?.map(FieldValue::from),
        Type::JSON | Type::JSONB => get::<serde_json::Value>(row, idx, name)?.map(FieldValue::Json),
        Type::TIMESTAMP => get::<NaiveDateTime>(row, idx, name)?.map(FieldValue::Timestamp),
        Type::TIMESTAMPTZ => {
            get::<DateTime<Utc>>(row, idx, name)?.map(|ts| FieldValue::Timestamp(ts.naive_utc()))
        }
        Type::DATE => get::<NaiveDate>(row, idx, name)?
            .map(|d| FieldValue::Timestamp(d.and_time(chrono::NaiveTime::MIN))),
        Type::TIME => get::<NaiveTime>(row, idx, name)?.map(|t| FieldValue::Text(t.to_string())),
        Type::BYTEA => get::<Vec<u8>>(row, idx, name)?.map(FieldValue::Opaque),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::BPCHAR_ARRAY => {
            get::<Vec<String>>(row, idx, name)?.map(|v| FieldValue::Array(ArrayValue::Text(v)))
        }
        Type::INT8_ARRAY => {
            get::<Vec<i64>>(row, idx, name)?.map(|v| FieldValue::Array(ArrayValue::Int(v)))
        }
        Type::INT4_ARRAY => get::<Vec<i32>>(row, idx, name)?.map(FieldValue::from),
        Type::INT2_ARRAY => get::<Vec<i16>>(row, idx, name)?.map(|v| {
            FieldValue::Array(ArrayValue::Int(v.into_iter().map(i64::from).collect()))
        }),
        Type::FLOAT4_ARRAY => get::<Vec<f32>>(row, idx, name)?.map(FieldValue::from),
        Type::FLOAT8_ARRAY => get::<Vec<f64>>(row, idx, name)?.map(FieldValue::from),
        ref other => {
            return Err(CrudError::decode(
                name,
                format!("unsupported column type {other}"),
            ));
        }
    };
    Ok(value.unwrap_or(FieldValue::Null))
}

/// Decode every column of `row`.
pub fn decode_row(row: &Row, columns: Arc<[String]>) -> CrudResult<Record> {
    let values = (0..row.len())
        .map(|idx| decode_column(row, idx))
        .collect::<CrudResult<Vec<_>>>()?;
    Ok(Record::new(columns, values))
}

/// Decode a full result set, sharing one column list.
pub(crate) fn decode_rows(rows: &[Row]) -> CrudResult<Vec<Record>> {
    let Some(first) = rows.first() else {
        return Ok(Vec::new());
    };
    let columns = column_names(first);
    rows.iter()
        .map(|row| decode_row(row, Arc::clone(&columns)))
        .collect()
}
