//! Legacy dump input.
//!
//! A dump is a JSON document naming the schema version it was written
//! under and listing its rows in load order:
//!
//! ```json
//! {"version": "0.0.1", "rows": [{"kind": "tickets.site", "fields": {"id": 1}}]}
//! ```

use std::collections::BTreeMap;
use std::io::Read;

use serde::Deserialize;

use crate::row::{Fields, Row, Value};
use crate::version::SchemaVersion;

/// Error reading a dump.
#[derive(Debug, thiserror::Error)]
pub enum DumpError {
    #[error("malformed dump: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid dump version {0:?}")]
    InvalidVersion(String),
    #[error("row {index} ({kind}): field {field} is not a scalar or a list of scalars")]
    UnsupportedValue {
        index: usize,
        kind: String,
        field: String,
    },
}

#[derive(Deserialize)]
struct RawDump {
    version: String,
    #[serde(default)]
    rows: Vec<RawRow>,
}

#[derive(Deserialize)]
struct RawRow {
    kind: String,
    #[serde(default)]
    fields: serde_json::Map<String, serde_json::Value>,
}

/// A parsed dump.
#[derive(Debug, Clone, PartialEq)]
pub struct Dump {
    pub version: SchemaVersion,
    pub rows: Vec<Row>,
}

impl Dump {
    pub fn new(version: SchemaVersion, rows: Vec<Row>) -> Self {
        Self { version, rows }
    }

    pub fn from_json_str(s: &str) -> Result<Self, DumpError> {
        Self::from_raw(serde_json::from_str(s)?)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, DumpError> {
        Self::from_raw(serde_json::from_reader(reader)?)
    }

    fn from_raw(raw: RawDump) -> Result<Self, DumpError> {
        let version =
            SchemaVersion::parse(&raw.version).map_err(|_| DumpError::InvalidVersion(raw.version))?;
        let rows = raw
            .rows
            .into_iter()
            .enumerate()
            .map(|(index, raw)| {
                let mut fields = Fields::new();
                for (name, value) in raw.fields {
                    let value = Value::from_json(value).ok_or_else(|| DumpError::UnsupportedValue {
                        index,
                        kind: raw.kind.clone(),
                        field: name.clone(),
                    })?;
                    fields.insert(name, value);
                }
                Ok(Row {
                    kind: raw.kind,
                    fields,
                })
            })
            .collect::<Result<Vec<_>, DumpError>>()?;
        Ok(Self { version, rows })
    }

    /// Number of rows per kind.
    pub fn kind_counts(&self) -> BTreeMap<&str, usize> {
        let mut counts = BTreeMap::new();
        for row in &self.rows {
            *counts.entry(row.kind.as_str()).or_insert(0) += 1;
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DUMP: &str = r#"{
        "version": "0.0.1",
        "rows": [
            {"kind": "products.productcat", "fields": {"id": 1, "name": ["Tools", "Werkzeuge"], "description": ""}},
            {"kind": "products.product", "fields": {"id": 7, "ref": "noi", "name": ["Noi"], "description": [""], "cat_id": 1}},
            {"kind": "products.product", "fields": {"id": 8, "ref": null, "name": ["Lino"], "description": [""], "cat_id": null}}
        ]
    }"#;

    #[test]
    fn parses_rows_in_order() {
        let dump = Dump::from_json_str(DUMP).unwrap();
        assert_eq!(dump.version, SchemaVersion::from_components(&[0, 0, 1]));
        assert_eq!(dump.rows.len(), 3);
        assert_eq!(dump.rows[0].kind, "products.productcat");
        assert_eq!(
            dump.rows[0].get("name"),
            Some(&Value::List(vec!["Tools".into(), "Werkzeuge".into()]))
        );
        assert_eq!(dump.rows[2].get("cat_id"), Some(&Value::Null));
    }

    #[test]
    fn counts_kinds() {
        let dump = Dump::from_json_str(DUMP).unwrap();
        let counts = dump.kind_counts();
        assert_eq!(counts["products.product"], 2);
        assert_eq!(counts["products.productcat"], 1);
    }

    #[test]
    fn rejects_bad_version() {
        let err = Dump::from_json_str(r#"{"version": "v1", "rows": []}"#).unwrap_err();
        assert!(matches!(err, DumpError::InvalidVersion(v) if v == "v1"));
    }

    #[test]
    fn rejects_object_values() {
        let err = Dump::from_json_str(
            r#"{"version": "1.0.1", "rows": [{"kind": "a.b", "fields": {"x": {"y": 1}}}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DumpError::UnsupportedValue { index: 0, ref field, .. } if field == "x"));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(matches!(
            Dump::from_json_str("{\"version\": ").unwrap_err(),
            DumpError::Json(_)
        ));
    }
}
