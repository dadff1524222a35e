//! Roster file parsing for CSV and spreadsheet workbooks (.xlsx/.xlsm/.xlsb/.xls/.ods).

use anyhow::{Context, Result};
use calamine::{open_workbook_auto_from_rs, Data, Reader};
use std::io::Cursor;

/// Where a sheet came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Csv,
    Workbook,
}

/// A header row plus string cells, before any roster semantics are applied.
#[derive(Debug, Clone)]
pub struct RawSheet {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub source_type: SourceType,
}

/// Dispatch file parsing by extension.
pub fn parse_file(filename: &str, data: &[u8]) -> Result<Vec<RawSheet>> {
    let ext = filename
        .rsplit('.')
        .next()
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "csv" => parse_csv(filename, data),
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => parse_workbook(data),
        _ => anyhow::bail!(
            "Unsupported file type: .{}. Supported: .csv, .xlsx, .xlsm, .xlsb, .xls, .ods",
            ext
        ),
    }
}

/// Pick the sheet to build from.
///
/// An explicitly `requested` sheet must exist. A profile's `preferred` sheet
/// is used when present, otherwise the first sheet with data.
pub fn select_sheet(
    mut sheets: Vec<RawSheet>,
    requested: Option<&str>,
    preferred: Option<&str>,
) -> Result<RawSheet> {
    if sheets.is_empty() {
        anyhow::bail!("No sheets with data found");
    }

    if let Some(wanted) = requested {
        let idx = sheet_position(&sheets, wanted).with_context(|| {
            let names: Vec<&str> = sheets.iter().map(|s| s.name.as_str()).collect();
            format!("Sheet '{}' not found. Available: {:?}", wanted, names)
        })?;
        return Ok(sheets.swap_remove(idx));
    }

    if let Some(wanted) = preferred {
        match sheet_position(&sheets, wanted) {
            Some(idx) => return Ok(sheets.swap_remove(idx)),
            None if sheets.len() > 1 => {
                tracing::warn!(
                    "Preferred sheet '{}' not found, using first sheet '{}'",
                    wanted,
                    sheets[0].name
                );
            }
            None => {}
        }
    }

    Ok(sheets.swap_remove(0))
}

fn sheet_position(sheets: &[RawSheet], wanted: &str) -> Option<usize> {
    sheets
        .iter()
        .position(|s| s.name.trim().eq_ignore_ascii_case(wanted.trim()))
}

fn parse_csv(filename: &str, data: &[u8]) -> Result<Vec<RawSheet>> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .has_headers(true)
        .from_reader(data);

    let headers: Vec<String> = reader
        .headers()
        .context("Failed to read CSV headers")?
        .iter()
        .map(normalize_header)
        .collect();

    if headers.iter().all(|h| h.is_empty()) {
        anyhow::bail!("CSV file has no headers");
    }

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.context("Failed to read CSV record")?;
        let row: Vec<String> = record.iter().map(|f| f.to_string()).collect();
        if row.iter().all(|v| v.trim().is_empty()) {
            continue;
        }
        rows.push(row);
    }

    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim_end_matches(".csv")
        .to_string();

    Ok(vec![RawSheet {
        name,
        headers,
        rows,
        source_type: SourceType::Csv,
    }])
}

/// Parse every worksheet of a workbook; the format is sniffed from the bytes.
fn parse_workbook(data: &[u8]) -> Result<Vec<RawSheet>> {
    let mut workbook =
        open_workbook_auto_from_rs(Cursor::new(data)).context("Failed to open workbook")?;

    let mut sheets = Vec::new();
    for name in workbook.sheet_names() {
        let range = match workbook.worksheet_range(&name) {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!("Skipping sheet '{}': {}", name, e);
                continue;
            }
        };

        if let Some(sheet) = range_to_raw_sheet(&name, &range) {
            sheets.push(sheet);
        }
    }

    if sheets.is_empty() {
        anyhow::bail!("No sheets with data found in workbook");
    }

    Ok(sheets)
}

/// The first non-empty row is the header. Header-only sheets are kept so the
/// caller can report them as empty rosters instead of "no sheet".
fn range_to_raw_sheet(name: &str, range: &calamine::Range<Data>) -> Option<RawSheet> {
    let mut row_iter = range
        .rows()
        .map(|row| row.iter().map(cell_to_string).collect::<Vec<String>>())
        .filter(|values| !values.iter().all(|v| v.trim().is_empty()));

    let headers: Vec<String> = row_iter.next()?.iter().map(|h| normalize_header(h)).collect();
    let rows: Vec<Vec<String>> = row_iter.collect();

    Some(RawSheet {
        name: name.to_string(),
        headers,
        rows,
        source_type: SourceType::Workbook,
    })
}

/// Trim and collapse internal whitespace ("Reports  To " -> "Reports To").
fn normalize_header(header: &str) -> String {
    header.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn cell_to_string(cell: &Data) -> String {
    match cell {
        Data::Empty => String::new(),
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => {
            // Numeric ids come back as floats; avoid a trailing ".0"
            if f.fract() == 0.0 && f.abs() < i64::MAX as f64 {
                format!("{}", *f as i64)
            } else {
                format!("{}", f)
            }
        }
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt.as_f64().to_string(),
        Data::DateTimeIso(s) => s.clone(),
        Data::DurationIso(s) => s.clone(),
        Data::Error(e) => format!("#ERR:{:?}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sheet(name: &str) -> RawSheet {
        RawSheet {
            name: name.to_string(),
            headers: vec!["Name".to_string()],
            rows: vec![vec!["Ana".to_string()]],
            source_type: SourceType::Workbook,
        }
    }

    #[test]
    fn test_parse_csv_roster() {
        let csv_data = b"Unique Identifier,Name,Reports To\nP1_Ana,Ana,\nP2_Ben,Ben,X_Ana\n";
        let sheets = parse_file("exports/roster.csv", csv_data).unwrap();
        assert_eq!(sheets.len(), 1);
        assert_eq!(sheets[0].name, "roster");
        assert_eq!(sheets[0].headers, vec!["Unique Identifier", "Name", "Reports To"]);
        assert_eq!(sheets[0].rows.len(), 2);
        assert_eq!(sheets[0].rows[1], vec!["P2_Ben", "Ben", "X_Ana"]);
        assert_eq!(sheets[0].source_type, SourceType::Csv);
    }

    #[test]
    fn test_parse_csv_skips_blank_rows_and_normalizes_headers() {
        let csv_data = b" Reports   To ,Name\n,,\nX_Ana,Ben\n";
        let sheets = parse_file("r.CSV", csv_data).unwrap();
        assert_eq!(sheets[0].headers, vec!["Reports To", "Name"]);
        assert_eq!(sheets[0].rows, vec![vec!["X_Ana", "Ben"]]);
    }

    #[test]
    fn test_parse_csv_flexible_rows() {
        let csv_data = b"a,b,c\n1,2,3\n4,5\n";
        let sheets = parse_file("flex.csv", csv_data).unwrap();
        assert_eq!(sheets[0].rows[1], vec!["4", "5"]);
    }

    #[test]
    fn test_unsupported_extension() {
        assert!(parse_file("roster.txt", b"data").is_err());
    }

    #[test]
    fn test_corrupt_workbook_is_error() {
        assert!(parse_file("roster.xlsx", b"not a zip").is_err());
    }

    #[test]
    fn test_select_requested_sheet() {
        let picked = select_sheet(vec![sheet("Summary"), sheet("Org Chart")], Some("org chart"), None)
            .unwrap();
        assert_eq!(picked.name, "Org Chart");
        assert!(select_sheet(vec![sheet("Summary")], Some("Org Chart"), None).is_err());
    }

    #[test]
    fn test_select_preferred_sheet_falls_back_to_first() {
        let picked =
            select_sheet(vec![sheet("Summary"), sheet("Org Chart")], None, Some("Org Chart")).unwrap();
        assert_eq!(picked.name, "Org Chart");

        let picked = select_sheet(vec![sheet("Sheet1"), sheet("Sheet2")], None, Some("Org Chart"))
            .unwrap();
        assert_eq!(picked.name, "Sheet1");
    }

    #[test]
    fn test_cell_to_string_numeric_ids() {
        assert_eq!(cell_to_string(&Data::Float(12345.0)), "12345");
        assert_eq!(cell_to_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_string(&Data::Int(7)), "7");
        assert_eq!(cell_to_string(&Data::Empty), "");
    }
}
