//! Request fingerprints.
//!
//! A fingerprint is `table` followed by the JSON encodings of the query params, sort params,
//! projection params and record ids. Query params are a sorted map; record ids are a set and are
//! sorted and de-duplicated; sort and projection keep their (significant) insertion order. Equal
//! requests therefore produce byte-identical keys.

use crate::params::{ProjectParams, QueryParams, SortParams};

/// Compute the fingerprint of a request.
pub fn fingerprint(
    table: &str,
    query: &QueryParams,
    sort: &SortParams,
    project: &ProjectParams,
    ids: &[String],
) -> String {
    let mut ids: Vec<&str> = ids.iter().map(String::as_str).collect();
    ids.sort_unstable();
    ids.dedup();

    let mut key = String::from(table);
    for part in [
        serde_json::to_string(query),
        serde_json::to_string(sort),
        serde_json::to_string(project),
        serde_json::to_string(&ids),
    ] {
        // FieldValue, maps and string lists always encode.
        key.push_str(&part.unwrap_or_default());
    }
    key
}
