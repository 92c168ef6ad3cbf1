//! Value coercion: field value → bind parameter or SQL literal.
//!
//! [`coerce`] follows a fixed dispatch order (first match wins):
//!
//! | value | result |
//! |---|---|
//! | `Null` | `RequiredField` error |
//! | `Timestamp` | literal `'YYYY-MM-DD HH:MM:SS.ffffff'` |
//! | `Text` that parses as JSON | normalized JSON literal |
//! | other `Text` | quoted string literal |
//! | bool, signed/unsigned ints, floats, decimals | native bind |
//! | primitive arrays | native bind as array |
//! | `Json` / `Opaque` | JSON-encoded literal (`UnsupportedType` when not encodable) |
//!
//! The parameterized builders use [`bind_value`] instead, which binds every shape natively so that
//! no quoted text ever reaches their SQL. [`literal_value`] renders every shape as a literal for
//! the INSERT-literal builder. Both escape nothing beyond doubling single quotes.
//!
//! None of these functions perform I/O or log.

use crate::error::{CrudError, CrudResult};
use crate::value::{ArrayValue, FieldValue, TIMESTAMP_FORMAT};

/// Result of coercing a single field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Coerced {
    /// Bind positionally.
    Bind(FieldValue),
    /// Already-quoted SQL fragment.
    Literal(String),
}

impl Coerced {
    pub fn is_literal(&self) -> bool {
        matches!(self, Self::Literal(_))
    }
}

/// Quote a string as a SQL literal, doubling embedded single quotes.
pub fn quote_literal(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for ch in s.chars() {
        if ch == '\'' {
            out.push('\'');
        }
        out.push(ch);
    }
    out.push('\'');
    out
}

/// Parse `s` as a JSON document. Only objects and arrays count; bare scalars stay text.
fn json_document(s: &str) -> Option<serde_json::Value> {
    let trimmed = s.trim_start();
    if !(trimmed.starts_with('{') || trimmed.starts_with('[')) {
        return None;
    }
    serde_json::from_str(s).ok()
}

fn opaque_json(column: &str, bytes: &[u8]) -> CrudResult<serde_json::Value> {
    serde_json::from_slice(bytes).map_err(|e| CrudError::unsupported(column, e.to_string()))
}

fn required(column: &str, value: &FieldValue) -> CrudResult<()> {
    if value.is_null() {
        return Err(CrudError::RequiredField {
            record: 0,
            column: column.to_string(),
        });
    }
    Ok(())
}

/// Coerce a field value using the dispatch table above.
pub fn coerce(column: &str, value: &FieldValue) -> CrudResult<Coerced> {
    required(column, value)?;
    let coerced = match value {
        FieldValue::Timestamp(ts) => {
            Coerced::Literal(quote_literal(&ts.format(TIMESTAMP_FORMAT).to_string()))
        }
        FieldValue::Text(s) => match json_document(s) {
            Some(json) => Coerced::Literal(quote_literal(&json.to_string())),
            None => Coerced::Literal(quote_literal(s)),
        },
        FieldValue::Json(v) => Coerced::Literal(quote_literal(&v.to_string())),
        FieldValue::Opaque(bytes) => {
            Coerced::Literal(quote_literal(&opaque_json(column, bytes)?.to_string()))
        }
        other => Coerced::Bind(other.clone()),
    };
    Ok(coerced)
}

/// Coerce a field value into a bind parameter (used by every parameterized builder).
pub fn bind_value(column: &str, value: &FieldValue) -> CrudResult<FieldValue> {
    required(column, value)?;
    Ok(match value {
        FieldValue::Text(s) => json_document(s).map_or_else(|| value.clone(), FieldValue::Json),
        FieldValue::Opaque(bytes) => FieldValue::Json(opaque_json(column, bytes)?),
        FieldValue::F32(f) if !f.is_finite() => {
            return Err(CrudError::unsupported(column, "non-finite float"));
        }
        FieldValue::F64(f) if !f.is_finite() => {
            return Err(CrudError::unsupported(column, "non-finite float"));
        }
        other => other.clone(),
    })
}

fn array_literal(array: &ArrayValue) -> String {
    let items: Vec<String> = match array {
        ArrayValue::Text(v) => v.iter().map(|s| quote_literal(s)).collect(),
        ArrayValue::Int(v) => v.iter().map(|i| i.to_string()).collect(),
        ArrayValue::Float32(v) => v.iter().map(|f| f.to_string()).collect(),
        ArrayValue::Float64(v) => v.iter().map(|f| f.to_string()).collect(),
        ArrayValue::Unit(_) => return quote_literal(&array.to_json().to_string()),
    };
    if items.is_empty() {
        // An untyped empty ARRAY[] is rejected by Postgres.
        return "'{}'".to_string();
    }
    format!("ARRAY[{}]", items.join(", "))
}

/// Render a field value as a SQL literal (used by the INSERT-literal builder).
pub fn literal_value(column: &str, value: &FieldValue) -> CrudResult<String> {
    Ok(match coerce(column, value)? {
        Coerced::Literal(lit) => lit,
        Coerced::Bind(bound) => match bound {
            FieldValue::Bool(true) => "TRUE".to_string(),
            FieldValue::Bool(false) => "FALSE".to_string(),
            FieldValue::F32(f) if !f.is_finite() => {
                return Err(CrudError::unsupported(column, "non-finite float"));
            }
            FieldValue::F64(f) if !f.is_finite() => {
                return Err(CrudError::unsupported(column, "non-finite float"));
            }
            FieldValue::F32(f) => f.to_string(),
            FieldValue::F64(f) => f.to_string(),
            FieldValue::Decimal(d) => d.to_string(),
            FieldValue::Array(ref a) => array_literal(a),
            ref other => match other.as_i64() {
                Some(i) => i.to_string(),
                None => match other {
                    FieldValue::U64(v) => v.to_string(),
                    FieldValue::Usize(v) => v.to_string(),
                    _ => return Err(CrudError::unsupported(column, other.kind())),
                },
            },
        },
    })
}

/// Project `record` onto `fields`, failing on the first missing column.
pub(crate) fn project_record<'a>(
    record_index: usize,
    record: &'a crate::value::ActionRecord,
    fields: &[String],
) -> CrudResult<Vec<(&'a str, &'a FieldValue)>> {
    fields
        .iter()
        .map(|field| match record.get_key_value(field.as_str()) {
            Some((name, value)) if !value.is_null() => Ok((name.as_str(), value)),
            _ => Err(CrudError::RequiredField {
                record: record_index,
                column: field.clone(),
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn null_is_required_field_error() {
        let err = coerce("name", &FieldValue::Null).unwrap_err();
        assert!(err.is_params());
    }

    #[test]
    fn timestamp_becomes_fixed_format_literal() {
        let ts = NaiveDate::from_ymd_opt(2020, 12, 8)
            .unwrap()
            .and_hms_micro_opt(9, 5, 1, 42)
            .unwrap();
        assert_eq!(
            coerce("at", &FieldValue::Timestamp(ts)).unwrap(),
            Coerced::Literal("'2020-12-08 09:05:01.000042'".into())
        );
    }

    #[test]
    fn json_text_is_normalized() {
        let coerced = coerce("doc", &FieldValue::from(r#"{ "a" : 1,  "b": [1, 2] }"#)).unwrap();
        assert_eq!(coerced, Coerced::Literal(r#"'{"a":1,"b":[1,2]}'"#.into()));
    }

    #[test]
    fn plain_text_is_quoted() {
        assert_eq!(
            coerce("name", &FieldValue::from("abc")).unwrap(),
            Coerced::Literal("'abc'".into())
        );
        // bare JSON scalars stay plain strings
        assert_eq!(
            coerce("name", &FieldValue::from("42")).unwrap(),
            Coerced::Literal("'42'".into())
        );
    }

    #[test]
    fn decimals_render_exactly() {
        let d: rust_decimal::Decimal = "1.50".parse().unwrap();
        assert_eq!(literal_value("price", &FieldValue::Decimal(d)).unwrap(), "1.50");
        // numeric-looking text keeps its spelling
        assert_eq!(
            coerce("price", &FieldValue::from(" 1.50")).unwrap(),
            Coerced::Literal("' 1.50'".into())
        );
    }

    #[test]
    fn apostrophes_are_doubled() {
        assert_eq!(quote_literal("O'Brien"), "'O''Brien'");
    }

    #[test]
    fn primitives_bind_natively() {
        for v in [
            FieldValue::Bool(true),
            FieldValue::I8(1),
            FieldValue::U64(9),
            FieldValue::F32(1.5),
            FieldValue::from(vec!["a", "b"]),
            FieldValue::from(vec![1_i64, 2]),
        ] {
            assert!(!coerce("c", &v).unwrap().is_literal(), "{v:?}");
        }
    }

    #[test]
    fn structured_values_fall_through_to_json_literal() {
        #[derive(serde::Serialize)]
        struct Meta {
            tags: Vec<&'static str>,
        }
        let v = FieldValue::encode(&Meta { tags: vec!["x"] }).unwrap();
        assert_eq!(
            coerce("meta", &v).unwrap(),
            Coerced::Literal(r#"'{"tags":["x"]}'"#.into())
        );
    }

    #[test]
    fn invalid_opaque_bytes_are_unsupported() {
        let err = coerce("blob", &FieldValue::Opaque(b"{nope".to_vec())).unwrap_err();
        assert_eq!(err.code(), crate::error::ResultCode::UnsupportedType);
    }

    #[test]
    fn bind_value_turns_json_text_into_json() {
        assert_eq!(
            bind_value("doc", &FieldValue::from(r#"{"k":"v"}"#)).unwrap(),
            FieldValue::Json(serde_json::json!({"k": "v"}))
        );
        assert_eq!(
            bind_value("name", &FieldValue::from("it's")).unwrap(),
            FieldValue::from("it's")
        );
    }

    #[test]
    fn literal_value_renders_every_shape() {
        assert_eq!(literal_value("b", &true.into()).unwrap(), "TRUE");
        assert_eq!(literal_value("i", &FieldValue::I16(-3)).unwrap(), "-3");
        assert_eq!(literal_value("u", &FieldValue::U64(u64::MAX)).unwrap(), u64::MAX.to_string());
        assert_eq!(literal_value("f", &FieldValue::F64(2.5)).unwrap(), "2.5");
        assert_eq!(
            literal_value("tags", &FieldValue::from(vec!["a", "b'c"])).unwrap(),
            "ARRAY['a', 'b''c']"
        );
        assert_eq!(
            literal_value("nums", &FieldValue::from(Vec::<i64>::new())).unwrap(),
            "'{}'"
        );
        assert!(literal_value("f", &FieldValue::F64(f64::NAN)).is_err());
    }

    #[test]
    fn project_record_reports_record_and_column() {
        let rec = crate::action_record! { "name" => "a" };
        let fields = vec!["name".to_string(), "age".to_string()];
        match project_record(3, &rec, &fields).unwrap_err() {
            CrudError::RequiredField { record, column } => {
                assert_eq!(record, 3);
                assert_eq!(column, "age");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
