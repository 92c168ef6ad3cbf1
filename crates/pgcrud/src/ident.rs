//! SQL identifier checks.
//!
//! Table and column names are spliced into SQL text (Postgres cannot bind identifiers), so every
//! name is checked before a builder emits it:
//!
//! - Unquoted segments must match `[A-Za-z_][A-Za-z0-9_$]*`
//! - Quoted segments (`"CamelCase"`) may contain anything except NUL; `""` escapes a quote
//! - Segments are joined by `.` (`schema.table`, `public."UserTable"`)

use crate::error::{CrudError, CrudResult};

fn invalid(what: &str, name: &str, reason: impl std::fmt::Display) -> CrudError {
    CrudError::params(format!("invalid {what} '{name}': {reason}"))
}

/// Check a (possibly dotted / quoted) identifier and return it unchanged.
pub fn check_ident<'a>(what: &str, name: &'a str) -> CrudResult<&'a str> {
    if name.is_empty() {
        return Err(CrudError::params(format!("{what} is required")));
    }
    if name.contains('\0') {
        return Err(invalid(what, name, "contains NUL"));
    }

    let mut chars = name.chars().peekable();
    loop {
        if chars.peek() == Some(&'"') {
            chars.next();
            let mut len = 0;
            loop {
                match chars.next() {
                    Some('"') if chars.peek() == Some(&'"') => {
                        chars.next();
                        len += 1;
                    }
                    Some('"') => break,
                    Some(_) => len += 1,
                    None => return Err(invalid(what, name, "unclosed quote")),
                }
            }
            if len == 0 {
                return Err(invalid(what, name, "empty quoted segment"));
            }
        } else {
            let mut len = 0;
            while let Some(&c) = chars.peek() {
                if c == '.' {
                    break;
                }
                let ok = if len == 0 {
                    c == '_' || c.is_ascii_alphabetic()
                } else {
                    c == '_' || c == '$' || c.is_ascii_alphanumeric()
                };
                if !ok {
                    return Err(invalid(what, name, format_args!("unexpected '{c}'")));
                }
                len += 1;
                chars.next();
            }
            if len == 0 {
                return Err(invalid(what, name, "empty segment"));
            }
        }

        match chars.next() {
            None => return Ok(name),
            Some('.') if chars.peek().is_some() => continue,
            Some('.') => return Err(invalid(what, name, "trailing '.'")),
            Some(c) => return Err(invalid(what, name, format_args!("unexpected '{c}'"))),
        }
    }
}

/// Check a table name.
pub fn check_table(name: &str) -> CrudResult<&str> {
    check_ident("table name", name)
}

/// Check every column name in `fields`; an empty list is a params error.
pub fn check_columns(fields: &[String]) -> CrudResult<()> {
    if fields.is_empty() {
        return Err(CrudError::params("table fields are required"));
    }
    for field in fields {
        check_ident("column", field)?;
    }
    Ok(())
}
