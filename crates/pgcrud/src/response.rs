//! Operation results.

use crate::error::{CrudError, ResultCode};
use serde::Serialize;

/// Value returned by a successful create.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateResult {
    pub table_name: String,
    pub record_count: usize,
    pub record_ids: Vec<String>,
}

/// Operation-specific payload of a [`CrudResponse`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum ResponseValue {
    Create(CreateResult),
    /// Rows affected by an update.
    Update(u64),
    /// Rows affected by a delete.
    Delete(u64),
    /// Rows delivered by a read.
    Read(u64),
    None,
}

/// Outcome of every public [`Crud`](crate::crud::Crud) operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrudResponse {
    pub code: ResultCode,
    pub message: String,
    pub value: ResponseValue,
}

impl CrudResponse {
    pub fn success(value: ResponseValue) -> Self {
        Self {
            code: ResultCode::Success,
            message: String::new(),
            value,
        }
    }

    pub fn from_error(err: &CrudError) -> Self {
        Self {
            code: err.code(),
            message: err.to_string(),
            value: ResponseValue::None,
        }
    }

    /// Attach a note to a successful response without changing its code.
    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    pub fn is_success(&self) -> bool {
        self.code == ResultCode::Success
    }

    /// Affected or delivered row count, if the value carries one.
    pub fn count(&self) -> Option<u64> {
        match &self.value {
            ResponseValue::Create(c) => Some(c.record_count as u64),
            ResponseValue::Update(n) | ResponseValue::Delete(n) | ResponseValue::Read(n) => {
                Some(*n)
            }
            ResponseValue::None => None,
        }
    }

    pub fn created(&self) -> Option<&CreateResult> {
        match &self.value {
            ResponseValue::Create(c) => Some(c),
            _ => None,
        }
    }
}

impl From<CrudError> for CrudResponse {
    fn from(err: CrudError) -> Self {
        Self::from_error(&err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_maps_to_code_and_message() {
        let resp = CrudResponse::from(CrudError::params("table name is required"));
        assert_eq!(resp.code, ResultCode::ParamsError);
        assert_eq!(resp.message, "Params error: table name is required");
        assert_eq!(resp.value, ResponseValue::None);
        assert!(!resp.is_success());
        assert_eq!(resp.count(), None);
    }

    #[test]
    fn create_result_serializes_camel_case() {
        let resp = CrudResponse::success(ResponseValue::Create(CreateResult {
            table_name: "users".into(),
            record_count: 2,
            record_ids: vec!["1".into(), "2".into()],
        }));
        assert_eq!(resp.count(), Some(2));
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["code"], "success");
        assert_eq!(json["value"]["recordCount"], 2);
        assert_eq!(json["value"]["recordIds"][1], "2");
    }

    #[test]
    fn audit_note_keeps_success() {
        let resp = CrudResponse::success(ResponseValue::Delete(3)).with_message("audit failed");
        assert!(resp.is_success());
        assert_eq!(resp.count(), Some(3));
    }
}
