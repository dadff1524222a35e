//! Structural failures of a roster input.
//!
//! Only these abort a build. Row-level anomalies (placeholder rows, unknown
//! managers, self references, cycles) are recovered from and reported instead.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The sheet has a header row but no data rows at all.
    #[error("roster is empty: no data rows to process")]
    EmptyInput,

    /// A required logical column could not be matched to any header.
    #[error("required column '{column}' not found (looked for {candidates:?}, available headers: {available:?})")]
    MissingColumn {
        column: &'static str,
        candidates: Vec<String>,
        available: Vec<String>,
    },

    /// Every row has an empty identifier, so nothing can be keyed.
    #[error("no usable identifiers: all {rows} row(s) have an empty id")]
    NoUsableIdentifiers { rows: usize },

    /// A configured row-exclusion rule cannot be applied.
    #[error("invalid filter rule: {0}")]
    InvalidRule(String),
}
