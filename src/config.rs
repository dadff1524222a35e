//! Roster profile configuration.
//!
//! Each data source gets a JSON profile in the `configs/` directory describing
//! its column headers, row-exclusion heuristics, manager-reference encoding and
//! chart presentation. Profiles are loaded once at startup and never mutated.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Configuration for one roster data source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RosterConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub columns: ColumnMapping,
    /// Preferred worksheet for workbook uploads (e.g. "Org Chart").
    #[serde(default)]
    pub sheet: Option<String>,
    #[serde(default)]
    pub filter: FilterRules,
    #[serde(default)]
    pub manager_ref: ManagerRefFormat,
    #[serde(default)]
    pub chart: ChartConfig,
}

/// Candidate header names for each logical column.
///
/// Matching is case-insensitive on trimmed headers; the first candidate
/// present in the sheet wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnMapping {
    #[serde(default = "default_id_columns")]
    pub id: Vec<String>,
    #[serde(default = "default_name_columns")]
    pub name: Vec<String>,
    #[serde(default = "default_manager_columns")]
    pub manager: Vec<String>,
    #[serde(default = "default_title_columns")]
    pub title: Vec<String>,
    #[serde(default = "default_department_columns")]
    pub department: Vec<String>,
    #[serde(default = "default_location_columns")]
    pub location: Vec<String>,
}

impl Default for ColumnMapping {
    fn default() -> Self {
        Self {
            id: default_id_columns(),
            name: default_name_columns(),
            manager: default_manager_columns(),
            title: default_title_columns(),
            department: default_department_columns(),
            location: default_location_columns(),
        }
    }
}

/// Heuristics that exclude placeholder and system rows before canonicalization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterRules {
    /// Case-insensitive substrings of the row id marking unfilled requisitions.
    #[serde(default = "default_placeholder_markers")]
    pub placeholder_markers: Vec<String>,
    /// A row id containing this many consecutive digits is treated as a
    /// system/test row. `0` disables the rule.
    #[serde(default = "default_min_digit_run")]
    pub min_digit_run: usize,
    /// Extra regexes matched against the row id.
    #[serde(default)]
    pub exclude_patterns: Vec<String>,
}

impl Default for FilterRules {
    fn default() -> Self {
        Self {
            placeholder_markers: default_placeholder_markers(),
            min_digit_run: default_min_digit_run(),
            exclude_patterns: Vec::new(),
        }
    }
}

/// Encoding of the manager-reference column: `<prefix><sep><Manager><sep><Name>`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerRefFormat {
    #[serde(default = "default_separator")]
    pub separator: char,
}

impl Default for ManagerRefFormat {
    fn default() -> Self {
        Self {
            separator: default_separator(),
        }
    }
}

/// Presentation settings for the interactive chart view.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChartConfig {
    #[serde(default = "default_short_title_max")]
    pub short_title_max: usize,
    /// Label of the wrapper node used when the forest has several roots.
    #[serde(default = "default_virtual_root_name")]
    pub virtual_root_name: String,
    /// Keyword groups applied to the direct reports of a single root.
    /// Evaluated in order; the first group with a matching keyword wins.
    #[serde(default)]
    pub group_rules: Vec<GroupRule>,
    /// Group receiving reports that match no rule.
    #[serde(default)]
    pub fallback_group: Option<GroupRule>,
    /// Group left expanded when the chart first opens.
    #[serde(default)]
    pub expanded_group: Option<String>,
}

impl Default for ChartConfig {
    fn default() -> Self {
        Self {
            short_title_max: default_short_title_max(),
            virtual_root_name: default_virtual_root_name(),
            group_rules: Vec::new(),
            fallback_group: None,
            expanded_group: None,
        }
    }
}

/// A synthesized chart section collecting reports by title keyword.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupRule {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub description: String,
    /// Lowercase substrings matched against the report's title.
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub compact: bool,
}

fn default_id_columns() -> Vec<String> {
    to_strings(&["Unique Identifier", "ID", "Employee ID"])
}

fn default_name_columns() -> Vec<String> {
    to_strings(&["Name", "Full Name", "Employee Name"])
}

fn default_manager_columns() -> Vec<String> {
    to_strings(&["Reports To", "Manager", "Manager ID"])
}

fn default_title_columns() -> Vec<String> {
    to_strings(&["Line Detail 1", "Title", "Job Title"])
}

fn default_department_columns() -> Vec<String> {
    to_strings(&["Organization Name", "Department"])
}

fn default_location_columns() -> Vec<String> {
    to_strings(&["Line Detail 2", "Location"])
}

fn default_placeholder_markers() -> Vec<String> {
    to_strings(&["unfilled"])
}

fn default_min_digit_run() -> usize {
    6
}

fn default_separator() -> char {
    '_'
}

fn default_short_title_max() -> usize {
    40
}

fn default_virtual_root_name() -> String {
    "Organization".to_string()
}

fn to_strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| v.to_string()).collect()
}

/// Read-only store of all loaded profiles.
#[derive(Debug)]
pub struct ConfigStore {
    configs: HashMap<String, RosterConfig>,
    default_config: String,
}

impl ConfigStore {
    /// Load all `*.json` profiles from the specified directory.
    pub fn load_from_dir(dir: &Path) -> Result<Self> {
        if !dir.exists() {
            anyhow::bail!("Config directory does not exist: {:?}", dir);
        }

        let mut configs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().map(|e| e == "json").unwrap_or(false) {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config: {:?}", path))?;
                let config: RosterConfig = serde_json::from_str(&content)
                    .with_context(|| format!("Failed to parse config: {:?}", path))?;
                info!("Loaded config: {} from {:?}", config.name, path);
                configs.push(config);
            }
        }

        if configs.is_empty() {
            anyhow::bail!("No configs found in {:?}", dir);
        }

        Self::from_configs(configs)
    }

    /// Load from `dir`, falling back to the built-in profile when the
    /// directory is absent.
    pub fn load_or_default(dir: &Path) -> Result<Self> {
        if dir.exists() {
            Self::load_from_dir(dir)
        } else {
            warn!("Config directory {:?} not found, using built-in default profile", dir);
            Self::from_configs(vec![create_default_config()])
        }
    }

    pub fn from_configs(configs: Vec<RosterConfig>) -> Result<Self> {
        if configs.is_empty() {
            anyhow::bail!("No configs provided");
        }

        let mut names: Vec<String> = configs.iter().map(|c| c.name.clone()).collect();
        names.sort();
        let default_config = if names.iter().any(|n| n == "default") {
            "default".to_string()
        } else {
            names[0].clone()
        };

        let configs = configs.into_iter().map(|c| (c.name.clone(), c)).collect();
        Ok(Self {
            configs,
            default_config,
        })
    }

    pub fn get(&self, name: &str) -> Option<&RosterConfig> {
        self.configs.get(name)
    }

    /// Resolve an optional profile name, defaulting when `None`.
    pub fn resolve(&self, name: Option<&str>) -> Option<&RosterConfig> {
        self.get(name.unwrap_or(&self.default_config))
    }

    pub fn default_name(&self) -> &str {
        &self.default_config
    }

    /// All profile names, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }
}

/// Built-in profile matching the HR roster export layout.
pub fn create_default_config() -> RosterConfig {
    RosterConfig {
        name: "default".to_string(),
        description: "HR roster export (Unique Identifier / Name / Reports To)".to_string(),
        columns: ColumnMapping::default(),
        sheet: None,
        filter: FilterRules::default(),
        manager_ref: ManagerRefFormat::default(),
        chart: ChartConfig::default(),
    }
}
