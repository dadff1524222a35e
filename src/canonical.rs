#![allow(dead_code)]
//! Canonicalization: one record per person, with manager references rewritten
//! to canonical person ids.
//!
//! Steps, in order:
//! 1. drop placeholder / system rows ([`RowFilter`])
//! 2. trim names; the trimmed name is the identity key
//! 3. the first row id seen for a name becomes that person's id
//! 4. keep the first row per name
//! 5. resolve encoded manager references through the name index
//! 6. null out self references
//!
//! Identity is exact (case-sensitive) name equality. Two different people
//! sharing a name are merged; nothing here tries to tell them apart.

use std::collections::HashMap;

use regex::Regex;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::{FilterRules, ManagerRefFormat};
use crate::error::ValidationError;
use crate::roster::RawRecord;

/// One unique person after deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CanonicalPerson {
    pub person_id: String,
    pub name: String,
    pub manager_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub department: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    /// Source cells of the first row for this person, for tabular export.
    #[serde(skip)]
    pub cells: Vec<String>,
}

/// Why a row was excluded before canonicalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FilterReason {
    Placeholder { marker: String },
    DigitRun { min_digits: usize },
    Pattern { pattern: String },
    MissingId,
    MissingName,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilteredRow {
    /// Position in the input, 0-based.
    pub row: usize,
    pub row_id: String,
    pub reason: FilterReason,
}

/// A later row for a name that already has a canonical person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DuplicateRow {
    pub row_id: String,
    pub name: String,
    pub canonical_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// The reference has no separator, so no name can be recovered.
    Unparseable,
    /// The recovered name is not a known person.
    UnknownManager,
}

/// A row whose id already belongs to a different canonical person. The row
/// is dropped so person ids stay unique.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdConflict {
    pub row_id: String,
    pub name: String,
    /// Name of the person that claimed the id first.
    pub claimed_by: String,
}

/// A manager reference that could not be resolved; the person became a root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnresolvedReference {
    pub person_id: String,
    pub manager_ref: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed_name: Option<String>,
    pub reason: UnresolvedReason,
}

/// Recoverable anomalies seen while canonicalizing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CanonicalReport {
    pub input_rows: usize,
    pub filtered: Vec<FilteredRow>,
    pub duplicates: Vec<DuplicateRow>,
    pub id_conflicts: Vec<IdConflict>,
    pub unresolved: Vec<UnresolvedReference>,
    /// Person ids whose manager resolved to themselves.
    pub self_references: Vec<String>,
}

/// Output of [`Canonicalizer::canonicalize`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Canonicalized {
    pub people: Vec<CanonicalPerson>,
    pub report: CanonicalReport,
}

/// Row-id exclusion rules compiled from [`FilterRules`].
#[derive(Debug, Clone)]
pub struct RowFilter {
    markers: Vec<String>,
    min_digit_run: usize,
    digit_run: Option<Regex>,
    patterns: Vec<Regex>,
}

impl RowFilter {
    /// Compile the rules. Invalid extra patterns are skipped with a warning.
    pub fn new(rules: &FilterRules) -> Result<Self, ValidationError> {
        let digit_run = if rules.min_digit_run > 0 {
            let regex = Regex::new(&format!(r"\d{{{},}}", rules.min_digit_run))
                .map_err(|e| ValidationError::InvalidRule(e.to_string()))?;
            Some(regex)
        } else {
            None
        };

        let mut patterns = Vec::new();
        for pattern in &rules.exclude_patterns {
            match Regex::new(pattern) {
                Ok(regex) => patterns.push(regex),
                Err(e) => warn!("Skipping invalid exclude pattern '{}': {}", pattern, e),
            }
        }

        Ok(Self {
            markers: rules
                .placeholder_markers
                .iter()
                .map(|m| m.to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
            min_digit_run: rules.min_digit_run,
            digit_run,
            patterns,
        })
    }

    /// Reason the row id is excluded, if any.
    pub fn check(&self, row_id: &str) -> Option<FilterReason> {
        let lowered = row_id.to_lowercase();
        if let Some(marker) = self.markers.iter().find(|m| lowered.contains(m.as_str())) {
            return Some(FilterReason::Placeholder {
                marker: marker.clone(),
            });
        }

        if self.digit_run.as_ref().is_some_and(|r| r.is_match(row_id)) {
            return Some(FilterReason::DigitRun {
                min_digits: self.min_digit_run,
            });
        }

        self.patterns
            .iter()
            .find(|r| r.is_match(row_id))
            .map(|r| FilterReason::Pattern {
                pattern: r.as_str().to_string(),
            })
    }
}

/// Recover the manager's name from an encoded reference.
///
/// `"P12_Jane_Doe"` becomes `"Jane Doe"`: everything after the first
/// separator, with remaining separators read as spaces. `None` when the
/// reference has no separator.
pub fn parse_manager_ref(reference: &str, separator: char) -> Option<String> {
    reference
        .split_once(separator)
        .map(|(_, name)| name.replace(separator, " "))
}

/// Canonicalizer configured for one data source.
#[derive(Debug, Clone)]
pub struct Canonicalizer {
    filter: RowFilter,
    separator: char,
}

impl Canonicalizer {
    pub fn new(rules: &FilterRules, format: &ManagerRefFormat) -> Result<Self, ValidationError> {
        Ok(Self {
            filter: RowFilter::new(rules)?,
            separator: format.separator,
        })
    }

    /// Deduplicate `records` into canonical people.
    ///
    /// Fails only when the input is structurally unusable: no rows at all, or
    /// no row with an identifier. Every other anomaly is recorded in the
    /// report and the affected row is dropped or made a root.
    pub fn canonicalize(&self, records: &[RawRecord]) -> Result<Canonicalized, ValidationError> {
        if records.is_empty() {
            return Err(ValidationError::EmptyInput);
        }
        if records.iter().all(|r| r.row_id.trim().is_empty()) {
            return Err(ValidationError::NoUsableIdentifiers {
                rows: records.len(),
            });
        }

        let mut report = CanonicalReport {
            input_rows: records.len(),
            ..CanonicalReport::default()
        };

        let kept = self.filter_rows(records, &mut report);

        // name -> canonical id, first row wins
        let mut canonical_ids: HashMap<&str, &str> = HashMap::new();
        // canonical id -> owning name
        let mut owners: HashMap<&str, &str> = HashMap::new();
        let mut unique: Vec<(&RawRecord, &str)> = Vec::new();
        for (record, name) in kept {
            let row_id = record.row_id.trim();
            match canonical_ids.get(name) {
                Some(canonical_id) => {
                    debug!("Duplicate row '{}' for '{}' -> {}", record.row_id, name, canonical_id);
                    report.duplicates.push(DuplicateRow {
                        row_id: row_id.to_string(),
                        name: name.to_string(),
                        canonical_id: canonical_id.to_string(),
                    });
                }
                None => {
                    if let Some(owner) = owners.get(row_id) {
                        warn!("Row id '{}' of '{}' already belongs to '{}', row dropped", row_id, name, owner);
                        report.id_conflicts.push(IdConflict {
                            row_id: row_id.to_string(),
                            name: name.to_string(),
                            claimed_by: owner.to_string(),
                        });
                        continue;
                    }
                    owners.insert(row_id, name);
                    canonical_ids.insert(name, row_id);
                    unique.push((record, name));
                }
            }
        }

        let people: Vec<CanonicalPerson> = unique
            .into_iter()
            .map(|(record, name)| {
                let person_id = canonical_ids[name].to_string();
                let manager_id =
                    self.resolve_manager(record, &person_id, &canonical_ids, &mut report);
                CanonicalPerson {
                    person_id,
                    name: name.to_string(),
                    manager_id,
                    title: record.title.clone(),
                    department: record.department.clone(),
                    location: record.location.clone(),
                    cells: record.cells.clone(),
                }
            })
            .collect();

        info!(
            "Canonicalized {} rows into {} people ({} filtered, {} duplicates, {} id conflicts, {} unresolved managers, {} self references)",
            report.input_rows,
            people.len(),
            report.filtered.len(),
            report.duplicates.len(),
            report.id_conflicts.len(),
            report.unresolved.len(),
            report.self_references.len()
        );
        if !report.unresolved.is_empty() {
            warn!(
                "{} people have unresolved managers and become roots",
                report.unresolved.len()
            );
        }

        Ok(Canonicalized { people, report })
    }

    /// Apply the row filter and blank checks, returning kept rows with their
    /// trimmed names.
    fn filter_rows<'a>(
        &self,
        records: &'a [RawRecord],
        report: &mut CanonicalReport,
    ) -> Vec<(&'a RawRecord, &'a str)> {
        let mut kept = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let row_id = record.row_id.trim();
            let name = record.name.trim();
            let reason = if row_id.is_empty() {
                Some(FilterReason::MissingId)
            } else {
                self.filter.check(row_id).or_else(|| {
                    name.is_empty().then_some(FilterReason::MissingName)
                })
            };

            match reason {
                Some(reason) => {
                    debug!("Filtered row {} '{}': {:?}", row, row_id, reason);
                    report.filtered.push(FilteredRow {
                        row,
                        row_id: row_id.to_string(),
                        reason,
                    });
                }
                None => kept.push((record, name)),
            }
        }
        kept
    }

    fn resolve_manager(
        &self,
        record: &RawRecord,
        person_id: &str,
        canonical_ids: &HashMap<&str, &str>,
        report: &mut CanonicalReport,
    ) -> Option<String> {
        let reference = record.manager_ref.as_deref().map(str::trim)?;
        if reference.is_empty() {
            return None;
        }

        let unresolved = |parsed_name: Option<String>, reason| UnresolvedReference {
            person_id: person_id.to_string(),
            manager_ref: reference.to_string(),
            parsed_name,
            reason,
        };

        let Some(manager_name) = parse_manager_ref(reference, self.separator) else {
            report
                .unresolved
                .push(unresolved(None, UnresolvedReason::Unparseable));
            return None;
        };

        let Some(manager_id) = canonical_ids.get(manager_name.as_str()) else {
            debug!("Manager '{}' of {} is not a known person", manager_name, person_id);
            report
                .unresolved
                .push(unresolved(Some(manager_name), UnresolvedReason::UnknownManager));
            return None;
        };

        if *manager_id == person_id {
            report.self_references.push(person_id.to_string());
            return None;
        }

        Some(manager_id.to_string())
    }
}

/// Canonicalize with the default rules (`unfilled` marker, 6-digit runs, `_`).
pub fn canonicalize(records: &[RawRecord]) -> Result<Canonicalized, ValidationError> {
    Canonicalizer::new(&FilterRules::default(), &ManagerRefFormat::default())?
        .canonicalize(records)
}
