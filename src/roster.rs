#![allow(dead_code)]
//! Roster rows: resolving logical columns against a sheet's headers and
//! turning string rows into [`RawRecord`]s.

use serde::Serialize;
use tracing::debug;

use crate::config::ColumnMapping;
use crate::error::ValidationError;
use crate::sheet_parser::RawSheet;

/// One row of the source export. Position-level: several rows may describe
/// the same person.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    pub row_id: String,
    pub name: String,
    pub manager_ref: Option<String>,
    pub title: Option<String>,
    pub department: Option<String>,
    pub location: Option<String>,
    /// Every cell of the source row, aligned with [`RosterSchema::headers`].
    pub cells: Vec<String>,
}

impl RawRecord {
    /// Record with only the keyed fields set, without source cells.
    pub fn new(row_id: &str, name: &str, manager_ref: Option<&str>) -> Self {
        Self {
            row_id: row_id.to_string(),
            name: name.to_string(),
            manager_ref: manager_ref.map(str::to_string),
            ..Self::default()
        }
    }
}

/// Column positions of the logical roster fields within a sheet.
#[derive(Debug, Clone, Serialize)]
pub struct RosterSchema {
    pub headers: Vec<String>,
    pub id: usize,
    pub name: usize,
    pub manager: Option<usize>,
    pub title: Option<usize>,
    pub department: Option<usize>,
    pub location: Option<usize>,
}

impl RosterSchema {
    /// Match the mapping's candidate headers against `headers`.
    ///
    /// `id` and `name` are required; a roster without a manager column is
    /// valid and yields a forest of roots.
    pub fn resolve(headers: &[String], mapping: &ColumnMapping) -> Result<Self, ValidationError> {
        let required = |column: &'static str, candidates: &[String]| {
            find_column(headers, candidates).ok_or_else(|| ValidationError::MissingColumn {
                column,
                candidates: candidates.to_vec(),
                available: headers.to_vec(),
            })
        };

        let schema = Self {
            headers: headers.to_vec(),
            id: required("id", &mapping.id)?,
            name: required("name", &mapping.name)?,
            manager: find_column(headers, &mapping.manager),
            title: find_column(headers, &mapping.title),
            department: find_column(headers, &mapping.department),
            location: find_column(headers, &mapping.location),
        };
        debug!(
            "Resolved roster columns: id={} name={} manager={:?} title={:?} department={:?} location={:?}",
            schema.id, schema.name, schema.manager, schema.title, schema.department, schema.location
        );
        Ok(schema)
    }

    /// Convert one sheet row. Missing trailing cells read as empty.
    pub fn record(&self, row: &[String]) -> RawRecord {
        let cell = |idx: usize| row.get(idx).map(|v| v.trim()).unwrap_or("");
        let optional = |idx: Option<usize>| {
            idx.map(cell)
                .filter(|v| !v.is_empty())
                .map(str::to_string)
        };

        let mut cells = row.to_vec();
        cells.resize(self.headers.len().max(row.len()), String::new());

        RawRecord {
            row_id: cell(self.id).to_string(),
            name: row.get(self.name).cloned().unwrap_or_default(),
            manager_ref: optional(self.manager),
            title: optional(self.title),
            department: optional(self.department),
            location: optional(self.location),
            cells,
        }
    }
}

fn find_column(headers: &[String], candidates: &[String]) -> Option<usize> {
    candidates.iter().find_map(|candidate| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(candidate.trim()))
    })
}

/// Resolve the schema of `sheet` and convert all of its rows.
pub fn records_from_sheet(
    sheet: &RawSheet,
    mapping: &ColumnMapping,
) -> Result<(RosterSchema, Vec<RawRecord>), ValidationError> {
    let schema = RosterSchema::resolve(&sheet.headers, mapping)?;
    let records = sheet.rows.iter().map(|row| schema.record(row)).collect();
    Ok((schema, records))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sheet_parser::SourceType;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_resolve_default_headers() {
        let headers = strings(&[
            "Unique Identifier",
            "Name",
            "Reports To",
            "Line Detail 1",
            "Line Detail 2",
            "Organization Name",
        ]);
        let schema = RosterSchema::resolve(&headers, &ColumnMapping::default()).unwrap();
        assert_eq!(schema.id, 0);
        assert_eq!(schema.name, 1);
        assert_eq!(schema.manager, Some(2));
        assert_eq!(schema.title, Some(3));
        assert_eq!(schema.location, Some(4));
        assert_eq!(schema.department, Some(5));
    }

    #[test]
    fn test_resolve_is_case_insensitive_and_uses_aliases() {
        let headers = strings(&["employee id", "FULL NAME", "Manager"]);
        let schema = RosterSchema::resolve(&headers, &ColumnMapping::default()).unwrap();
        assert_eq!(schema.id, 0);
        assert_eq!(schema.name, 1);
        assert_eq!(schema.manager, Some(2));
        assert_eq!(schema.title, None);
    }

    #[test]
    fn test_missing_name_column() {
        let headers = strings(&["Unique Identifier", "Reports To"]);
        let err = RosterSchema::resolve(&headers, &ColumnMapping::default()).unwrap_err();
        match err {
            ValidationError::MissingColumn { column, available, .. } => {
                assert_eq!(column, "name");
                assert_eq!(available, headers);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_record_conversion() {
        let sheet = RawSheet {
            name: "Org Chart".to_string(),
            headers: strings(&["Unique Identifier", "Name", "Reports To", "Line Detail 1", "Extra"]),
            rows: vec![
                strings(&[" P2_Ben ", " Ben ", "X_Ana", "Analyst, HR", "x"]),
                strings(&["P1_Ana", "Ana"]),
            ],
            source_type: SourceType::Csv,
        };
        let (schema, records) = records_from_sheet(&sheet, &ColumnMapping::default()).unwrap();
        assert_eq!(schema.headers.len(), 5);

        assert_eq!(records[0].row_id, "P2_Ben");
        assert_eq!(records[0].name, " Ben ");
        assert_eq!(records[0].manager_ref.as_deref(), Some("X_Ana"));
        assert_eq!(records[0].title.as_deref(), Some("Analyst, HR"));
        assert_eq!(records[0].department, None);

        assert_eq!(records[1].manager_ref, None);
        assert_eq!(records[1].title, None);
        assert_eq!(records[1].cells.len(), 5);
    }
}
