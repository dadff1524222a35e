//! Canonical tabular export: the source columns, one row per person, with the
//! id and manager columns rewritten to canonical person ids.

use anyhow::{Context, Result};

use crate::canonical::CanonicalPerson;
use crate::roster::RosterSchema;

/// Header used when the source had no manager column.
const MANAGER_HEADER: &str = "Reports To";

/// Write `people` as CSV using the source header layout.
pub fn canonical_csv(schema: &RosterSchema, people: &[CanonicalPerson]) -> Result<Vec<u8>> {
    let mut headers = schema.headers.clone();
    let manager_col = match schema.manager {
        Some(idx) => idx,
        None => {
            headers.push(MANAGER_HEADER.to_string());
            headers.len() - 1
        }
    };

    let mut writer = csv::WriterBuilder::new().from_writer(Vec::new());
    writer
        .write_record(&headers)
        .context("Failed to write CSV header")?;

    for person in people {
        let mut row = person.cells.clone();
        row.truncate(schema.headers.len());
        row.resize(headers.len(), String::new());
        row[schema.id] = person.person_id.clone();
        row[schema.name] = person.name.clone();
        row[manager_col] = person.manager_id.clone().unwrap_or_default();
        writer
            .write_record(&row)
            .with_context(|| format!("Failed to write row for {}", person.person_id))?;
    }

    writer.into_inner().context("Failed to flush CSV output")
}
