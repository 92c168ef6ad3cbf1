//! Field values carried by action records, predicates and decoded rows.
//!
//! [`FieldValue`] is a closed sum over every value shape the engine understands. Callers build
//! it through the `From` conversions (or [`FieldValue::encode`] for arbitrary serializable data)
//! and the coercer turns it into either a bind parameter or a SQL literal.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Serialize, Serializer};
use std::collections::BTreeMap;
use std::error::Error;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type};

/// Format used for timestamp literals and audit snapshots.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.6f";

/// One row's worth of column → value assignments.
pub type ActionRecord = BTreeMap<String, FieldValue>;

type BindResult = Result<IsNull, Box<dyn Error + Sync + Send>>;

/// A homogeneous array of primitives.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayValue {
    Text(Vec<String>),
    Int(Vec<i64>),
    Float32(Vec<f32>),
    Float64(Vec<f64>),
    /// An array of empty structs; only its length carries information.
    Unit(usize),
}

/// A single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    Isize(isize),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    Usize(usize),
    F32(f32),
    F64(f64),
    /// Exact `numeric` value.
    Decimal(Decimal),
    Timestamp(NaiveDateTime),
    Text(String),
    Json(serde_json::Value),
    Array(ArrayValue),
    /// Pre-encoded JSON bytes that still have to be validated.
    Opaque(Vec<u8>),
}

impl FieldValue {
    /// Encode any serializable value as JSON (the fall-through shape).
    pub fn encode<T: Serialize + ?Sized>(value: &T) -> serde_json::Result<Self> {
        serde_json::to_value(value).map(Self::Json)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::I8(_) => "i8",
            Self::I16(_) => "i16",
            Self::I32(_) => "i32",
            Self::I64(_) => "i64",
            Self::Isize(_) => "isize",
            Self::U8(_) => "u8",
            Self::U16(_) => "u16",
            Self::U32(_) => "u32",
            Self::U64(_) => "u64",
            Self::Usize(_) => "usize",
            Self::F32(_) => "f32",
            Self::F64(_) => "f64",
            Self::Decimal(_) => "decimal",
            Self::Timestamp(_) => "timestamp",
            Self::Text(_) => "text",
            Self::Json(_) => "json",
            Self::Array(_) => "array",
            Self::Opaque(_) => "opaque",
        }
    }

    /// Integer view of the value, when it is any integer width that fits in `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::I8(v) => Some(v.into()),
            Self::I16(v) => Some(v.into()),
            Self::I32(v) => Some(v.into()),
            Self::I64(v) => Some(v),
            Self::Isize(v) => i64::try_from(v).ok(),
            Self::U8(v) => Some(v.into()),
            Self::U16(v) => Some(v.into()),
            Self::U32(v) => Some(v.into()),
            Self::U64(v) => i64::try_from(v).ok(),
            Self::Usize(v) => i64::try_from(v).ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// JSON view of the value (audit snapshots, fingerprints).
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::I8(v) => (*v).into(),
            Self::I16(v) => (*v).into(),
            Self::I32(v) => (*v).into(),
            Self::I64(v) => (*v).into(),
            Self::Isize(v) => (*v).into(),
            Self::U8(v) => (*v).into(),
            Self::U16(v) => (*v).into(),
            Self::U32(v) => (*v).into(),
            Self::U64(v) => (*v).into(),
            Self::Usize(v) => (*v).into(),
            Self::F32(v) => f64::from(*v).into(),
            Self::F64(v) => (*v).into(),
            Self::Decimal(d) => d
                .to_string()
                .parse::<serde_json::Number>()
                .map_or_else(|_| Value::String(d.to_string()), Value::Number),
            Self::Timestamp(ts) => Value::String(ts.format(TIMESTAMP_FORMAT).to_string()),
            Self::Text(s) => Value::String(s.clone()),
            Self::Json(v) => v.clone(),
            Self::Array(a) => a.to_json(),
            Self::Opaque(bytes) => serde_json::from_slice(bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned())),
        }
    }
}

impl ArrayValue {
    pub fn len(&self) -> usize {
        match self {
            Self::Text(v) => v.len(),
            Self::Int(v) => v.len(),
            Self::Float32(v) => v.len(),
            Self::Float64(v) => v.len(),
            Self::Unit(n) => *n,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Text(v) => v.iter().cloned().map(Value::String).collect(),
            Self::Int(v) => v.iter().copied().map(Value::from).collect(),
            Self::Float32(v) => v.iter().map(|f| Value::from(f64::from(*f))).collect(),
            Self::Float64(v) => v.iter().copied().map(Value::from).collect(),
            Self::Unit(n) => Value::Array(vec![Value::Object(Default::default()); *n]),
        }
    }
}

impl Serialize for FieldValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// ==================== Conversions ====================

macro_rules! impl_from_scalar {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    Self::$variant(v)
                }
            }
        )*
    };
}

impl_from_scalar!(
    bool => Bool,
    i8 => I8,
    i16 => I16,
    i32 => I32,
    i64 => I64,
    isize => Isize,
    u8 => U8,
    u16 => U16,
    u32 => U32,
    u64 => U64,
    usize => Usize,
    f32 => F32,
    f64 => F64,
    Decimal => Decimal,
    NaiveDateTime => Timestamp,
    String => Text,
    serde_json::Value => Json,
    ArrayValue => Array,
);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        Self::Timestamp(v.naive_utc())
    }
}

impl From<uuid::Uuid> for FieldValue {
    fn from(v: uuid::Uuid) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<Vec<String>> for FieldValue {
    fn from(v: Vec<String>) -> Self {
        Self::Array(ArrayValue::Text(v))
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(v: Vec<&str>) -> Self {
        Self::Array(ArrayValue::Text(v.into_iter().map(str::to_string).collect()))
    }
}

impl From<Vec<i64>> for FieldValue {
    fn from(v: Vec<i64>) -> Self {
        Self::Array(ArrayValue::Int(v))
    }
}

impl From<Vec<i32>> for FieldValue {
    fn from(v: Vec<i32>) -> Self {
        Self::Array(ArrayValue::Int(v.into_iter().map(i64::from).collect()))
    }
}

impl From<Vec<f32>> for FieldValue {
    fn from(v: Vec<f32>) -> Self {
        Self::Array(ArrayValue::Float32(v))
    }
}

impl From<Vec<f64>> for FieldValue {
    fn from(v: Vec<f64>) -> Self {
        Self::Array(ArrayValue::Float64(v))
    }
}

impl From<Vec<()>> for FieldValue {
    fn from(v: Vec<()>) -> Self {
        Self::Array(ArrayValue::Unit(v.len()))
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

/// Build an [`ActionRecord`] from `column => value` pairs.
///
/// ```ignore
/// let rec = pgcrud::action_record! { "name" => "alice", "age" => 30 };
/// ```
#[macro_export]
macro_rules! action_record {
    ($($col:expr => $val:expr),* $(,)?) => {{
        let mut rec = $crate::ActionRecord::new();
        $(
            rec.insert(::std::string::String::from($col), $crate::FieldValue::from($val));
        )*
        rec
    }};
}

// ==================== Binding ====================

fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn mismatch(value: &str, ty: &Type) -> Box<dyn Error + Sync + Send> {
    format!("cannot bind {value} value to column of type {ty}").into()
}

fn bind_int(v: i64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::INT2 => i16::try_from(v)?.to_sql(ty, out),
        Type::INT4 => i32::try_from(v)?.to_sql(ty, out),
        Type::INT8 => v.to_sql(ty, out),
        Type::OID => u32::try_from(v)?.to_sql(ty, out),
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => (v as f64).to_sql(ty, out),
        Type::NUMERIC => Decimal::from(v).to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from(v).to_sql(ty, out),
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(mismatch("integer", ty)),
    }
}

fn bind_float(v: f64, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::FLOAT4 => (v as f32).to_sql(ty, out),
        Type::FLOAT8 => v.to_sql(ty, out),
        Type::NUMERIC => Decimal::try_from(v)?.to_sql(ty, out),
        Type::JSON | Type::JSONB => serde_json::Value::from(v).to_sql(ty, out),
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(mismatch("float", ty)),
    }
}

fn bind_decimal(d: Decimal, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::NUMERIC => d.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 | Type::OID if d.fract().is_zero() => {
            let v = d.to_i64().ok_or_else(|| mismatch("decimal", ty))?;
            bind_int(v, ty, out)
        }
        Type::FLOAT4 | Type::FLOAT8 => {
            let v = d.to_f64().ok_or_else(|| mismatch("decimal", ty))?;
            bind_float(v, ty, out)
        }
        Type::JSON | Type::JSONB => FieldValue::Decimal(d).to_json().to_sql(ty, out),
        _ if is_text_type(ty) => d.to_string().to_sql(ty, out),
        _ => Err(mismatch("decimal", ty)),
    }
}

fn bind_text(s: &str, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::UUID => uuid::Uuid::parse_str(s)?.to_sql(ty, out),
        Type::INT2 | Type::INT4 | Type::INT8 => bind_int(s.trim().parse::<i64>()?, ty, out),
        Type::FLOAT4 | Type::FLOAT8 => bind_float(s.trim().parse::<f64>()?, ty, out),
        Type::BOOL => s.trim().parse::<bool>()?.to_sql(ty, out),
        Type::JSON | Type::JSONB => {
            let value = serde_json::from_str(s)
                .unwrap_or_else(|_| serde_json::Value::String(s.to_string()));
            value.to_sql(ty, out)
        }
        Type::TIMESTAMP => NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?.to_sql(ty, out),
        Type::TIMESTAMPTZ => s.parse::<DateTime<Utc>>()?.to_sql(ty, out),
        Type::NUMERIC => s.trim().parse::<Decimal>()?.to_sql(ty, out),
        Type::DATE => NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")?.to_sql(ty, out),
        Type::TIME => NaiveTime::parse_from_str(s.trim(), "%H:%M:%S%.f")?.to_sql(ty, out),
        // Text-like columns and enum labels share the raw UTF-8 wire form.
        _ if is_text_type(ty) || matches!(ty.kind(), Kind::Enum(_)) => {
            out.extend_from_slice(s.as_bytes());
            Ok(IsNull::No)
        }
        _ => Err(mismatch("text", ty)),
    }
}

fn bind_json(v: &serde_json::Value, ty: &Type, out: &mut BytesMut) -> BindResult {
    match *ty {
        Type::JSON | Type::JSONB => v.to_sql(ty, out),
        _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
        _ => Err(mismatch("json", ty)),
    }
}

impl ArrayValue {
    fn bind(&self, ty: &Type, out: &mut BytesMut) -> BindResult {
        if matches!(*ty, Type::JSON | Type::JSONB) {
            return self.to_json().to_sql(ty, out);
        }
        let Kind::Array(member) = ty.kind() else {
            return Err(mismatch("array", ty));
        };
        match (self, member) {
            (Self::Text(v), _) => v.to_sql(ty, out),
            (Self::Int(v), &Type::INT8) => v.to_sql(ty, out),
            (Self::Int(v), &Type::INT4) => v
                .iter()
                .map(|i| i32::try_from(*i))
                .collect::<Result<Vec<_>, _>>()?
                .to_sql(ty, out),
            (Self::Int(v), &Type::INT2) => v
                .iter()
                .map(|i| i16::try_from(*i))
                .collect::<Result<Vec<_>, _>>()?
                .to_sql(ty, out),
            (Self::Int(v), &Type::FLOAT8) => v
                .iter()
                .map(|i| *i as f64)
                .collect::<Vec<_>>()
                .to_sql(ty, out),
            (Self::Float32(v), &Type::FLOAT4) => v.to_sql(ty, out),
            (Self::Float32(v), &Type::FLOAT8) => v
                .iter()
                .map(|f| f64::from(*f))
                .collect::<Vec<_>>()
                .to_sql(ty, out),
            (Self::Float64(v), &Type::FLOAT8) => v.to_sql(ty, out),
            (Self::Float64(v), &Type::FLOAT4) => v
                .iter()
                .map(|f| *f as f32)
                .collect::<Vec<_>>()
                .to_sql(ty, out),
            (Self::Unit(n), &Type::JSON | &Type::JSONB) => {
                vec![serde_json::Value::Object(Default::default()); *n].to_sql(ty, out)
            }
            _ => Err(mismatch("array", ty)),
        }
    }
}

impl ToSql for FieldValue {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> BindResult {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) => match *ty {
                Type::BOOL => v.to_sql(ty, out),
                Type::JSON | Type::JSONB => serde_json::Value::Bool(*v).to_sql(ty, out),
                _ if is_text_type(ty) => v.to_string().to_sql(ty, out),
                _ => Err(mismatch("bool", ty)),
            },
            Self::U64(v) => bind_int(i64::try_from(*v)?, ty, out),
            Self::Usize(v) => bind_int(i64::try_from(*v)?, ty, out),
            Self::Isize(v) => bind_int(i64::try_from(*v)?, ty, out),
            Self::F32(v) => bind_float(f64::from(*v), ty, out),
            Self::F64(v) => bind_float(*v, ty, out),
            Self::Decimal(d) => bind_decimal(*d, ty, out),
            Self::Timestamp(ts) => match *ty {
                Type::TIMESTAMPTZ => ts.and_utc().to_sql(ty, out),
                Type::DATE => ts.date().to_sql(ty, out),
                Type::TIMESTAMP => ts.to_sql(ty, out),
                _ if is_text_type(ty) => ts.format(TIMESTAMP_FORMAT).to_string().to_sql(ty, out),
                _ => Err(mismatch("timestamp", ty)),
            },
            Self::Text(s) => bind_text(s, ty, out),
            Self::Json(v) => bind_json(v, ty, out),
            Self::Array(a) => a.bind(ty, out),
            Self::Opaque(bytes) => match *ty {
                Type::BYTEA => bytes.as_slice().to_sql(ty, out),
                _ => bind_json(&serde_json::from_slice(bytes)?, ty, out),
            },
            other => match other.as_i64() {
                Some(v) => bind_int(v, ty, out),
                None => Err(mismatch(other.kind(), ty)),
            },
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    tokio_postgres::types::to_sql_checked!();
}
