//! Field-metadata normalization.
//!
//! Drivers report column descriptors as loosely typed maps, and some result
//! shapes (write acknowledgments) carry none at all. This is the one place
//! those descriptors are read; nothing past it sees a `RawField`.

use crate::db::{FieldMeta, RawField};
use serde_json::Value as JsonValue;

/// Projects raw descriptors to `{name, columnType}`, one entry per descriptor.
///
/// Absent descriptors give an empty list. A missing or malformed `name`
/// becomes `""` and a missing or out-of-range `columnType` becomes `0`.
pub fn normalize_fields(raw: Option<&[RawField]>) -> Vec<FieldMeta> {
    raw.unwrap_or_default().iter().map(project_field).collect()
}

fn project_field(field: &RawField) -> FieldMeta {
    let name = field
        .get("name")
        .and_then(JsonValue::as_str)
        .unwrap_or_default()
        .to_string();
    let column_type = field
        .get("columnType")
        .and_then(JsonValue::as_u64)
        .and_then(|code| u8::try_from(code).ok())
        .unwrap_or_default();

    FieldMeta { name, column_type }
}
