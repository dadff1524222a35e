//! Roster build pipeline: file bytes -> sheet -> records -> canonical people -> forest.

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::info;
use uuid::Uuid;

use crate::canonical::{CanonicalPerson, CanonicalReport, Canonicalizer};
use crate::config::RosterConfig;
use crate::forest::{Forest, ForestReport, ForestStats};
use crate::roster::{records_from_sheet, RosterSchema};
use crate::sheet_parser::{self, RawSheet, SourceType};

/// One processed roster upload.
#[derive(Debug, Clone)]
pub struct RosterBuild {
    pub id: String,
    pub source_file: String,
    pub sheet_name: String,
    pub source_type: SourceType,
    pub config_name: String,
    pub content_hash: String,
    pub schema: RosterSchema,
    pub people: Vec<CanonicalPerson>,
    pub report: CanonicalReport,
    pub forest: Forest,
}

/// Serializable overview of a build.
#[derive(Debug, Clone, Serialize)]
pub struct RosterSummary {
    pub id: String,
    pub source_file: String,
    pub sheet_name: String,
    pub source_type: SourceType,
    pub config_name: String,
    pub content_hash: String,
    pub stats: ForestStats,
    pub roots: Vec<String>,
    pub canonical_report: CanonicalReport,
    pub forest_report: ForestReport,
}

impl RosterBuild {
    pub fn summary(&self) -> RosterSummary {
        RosterSummary {
            id: self.id.clone(),
            source_file: self.source_file.clone(),
            sheet_name: self.sheet_name.clone(),
            source_type: self.source_type,
            config_name: self.config_name.clone(),
            content_hash: self.content_hash.clone(),
            stats: self.forest.stats(),
            roots: self.forest.roots().to_vec(),
            canonical_report: self.report.clone(),
            forest_report: self.forest.report().clone(),
        }
    }
}

/// Parse an uploaded file and build from the selected sheet.
///
/// `sheet` overrides the profile's preferred sheet and must exist.
pub fn build_from_file(
    filename: &str,
    data: &[u8],
    sheet: Option<&str>,
    config: &RosterConfig,
) -> Result<RosterBuild> {
    info!(
        "Building roster from {} ({} bytes) with config: {}",
        filename,
        data.len(),
        config.name
    );

    let sheets = sheet_parser::parse_file(filename, data)
        .with_context(|| format!("Failed to parse {}", filename))?;
    let selected = sheet_parser::select_sheet(sheets, sheet, config.sheet.as_deref())?;

    let mut build = build_from_sheet(filename, &selected, config)?;
    build.content_hash = sha256_hex(data);
    Ok(build)
}

/// Build from an already parsed sheet.
pub fn build_from_sheet(
    source_file: &str,
    sheet: &RawSheet,
    config: &RosterConfig,
) -> Result<RosterBuild> {
    let (schema, records) = records_from_sheet(sheet, &config.columns)?;
    info!("Sheet '{}': {} data row(s)", sheet.name, records.len());

    let canonicalizer = Canonicalizer::new(&config.filter, &config.manager_ref)?;
    let canonical = canonicalizer.canonicalize(&records)?;
    let forest = Forest::build(&canonical.people);

    Ok(RosterBuild {
        id: format!("org_{}", Uuid::new_v4().simple()),
        source_file: source_file.to_string(),
        sheet_name: sheet.name.clone(),
        source_type: sheet.source_type,
        config_name: config.name.clone(),
        content_hash: String::new(),
        schema,
        people: canonical.people,
        report: canonical.report,
        forest,
    })
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
