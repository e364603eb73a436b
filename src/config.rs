//! Pipeline configuration.
//!
//! Loaded once from an optional TOML file, then environment overrides, then
//! command-line overrides, and validated before any stage runs. Every stage
//! receives the resulting [`Settings`] by reference.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const COMPREHENSIVE_PREFIX: &str = "COMPREHENSIVE_";
pub const LOG_FILE_NAME: &str = "consolidation.log";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub input_directory: PathBuf,
    /// Empty means every immediate subfolder of `input_directory`.
    pub source_folders: Vec<String>,
    pub file_pattern: String,
    /// Resolved against `input_directory` when relative.
    pub output_dir: PathBuf,
    /// trace, debug, info, warn (or warning), error (or critical).
    pub log_level: String,
    /// Defaults to `logs` under the output directory.
    pub log_dir: Option<PathBuf>,
    pub tournament: TournamentSettings,
    pub integration: IntegrationSettings,
    pub verification: VerificationSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            input_directory: PathBuf::from("."),
            source_folders: Vec::new(),
            file_pattern: "*.md".to_string(),
            output_dir: PathBuf::from("output"),
            log_level: "info".to_string(),
            log_dir: None,
            tournament: TournamentSettings::default(),
            integration: IntegrationSettings::default(),
            verification: VerificationSettings::default(),
        }
    }
}

/// Scoring weights. Each sub-score is scaled by `weight / 10`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TournamentSettings {
    pub completeness_weight: f64,
    pub recency_weight: f64,
    pub structure_weight: f64,
    pub citations_weight: f64,
    pub arguments_weight: f64,
}

impl Default for TournamentSettings {
    fn default() -> Self {
        Self {
            completeness_weight: 10.0,
            recency_weight: 10.0,
            structure_weight: 10.0,
            citations_weight: 10.0,
            arguments_weight: 10.0,
        }
    }
}

impl TournamentSettings {
    pub fn total_weight(&self) -> f64 {
        self.completeness_weight
            + self.recency_weight
            + self.structure_weight
            + self.citations_weight
            + self.arguments_weight
    }

    fn weights(&self) -> [(&'static str, f64); 5] {
        [
            ("completeness_weight", self.completeness_weight),
            ("recency_weight", self.recency_weight),
            ("structure_weight", self.structure_weight),
            ("citations_weight", self.citations_weight),
            ("arguments_weight", self.arguments_weight),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct IntegrationSettings {
    pub add_evolution_metadata: bool,
    pub preserve_source_attribution: bool,
    pub integrate_citations: bool,
    pub skip_citation_enhancement: bool,
    pub similarity_threshold: f64,
    pub min_added_lines: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            add_evolution_metadata: true,
            preserve_source_attribution: true,
            integrate_citations: true,
            skip_citation_enhancement: false,
            similarity_threshold: 0.8,
            min_added_lines: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationSettings {
    pub check_markdown_formatting: bool,
    pub check_section_numbering: bool,
    pub check_no_duplication: bool,
    pub check_document_navigability: bool,
    pub max_consecutive_blank_lines: usize,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            check_markdown_formatting: true,
            check_section_numbering: true,
            check_no_duplication: true,
            check_document_navigability: true,
            max_consecutive_blank_lines: 2,
        }
    }
}

impl Settings {
    /// Reads `config_path` when given, applies process environment overrides
    /// and validates the result.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let mut settings = match config_path {
            Some(path) => Self::from_toml_file(path)?,
            None => Self::default(),
        };

        settings.apply_env_overrides(|name| std::env::var(name).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("failed to parse config {}", path.display()))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let settings: Self = toml::from_str(raw)?;
        Ok(settings)
    }

    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("INPUT_DIRECTORY").filter(|value| !value.is_empty()) {
            self.input_directory = PathBuf::from(value);
        }
        if let Some(value) = lookup("OUTPUT_DIR").filter(|value| !value.is_empty()) {
            self.output_dir = PathBuf::from(value);
        }
        if let Some(value) = lookup("LOG_LEVEL").filter(|value| !value.is_empty()) {
            self.log_level = value;
        }
        if let Some(value) = lookup("LOG_DIR").filter(|value| !value.is_empty()) {
            self.log_dir = Some(PathBuf::from(value));
        }

        let tournament = &mut self.tournament;
        for (name, slot) in [
            ("TOURNAMENT_COMPLETENESS_WEIGHT", &mut tournament.completeness_weight),
            ("TOURNAMENT_RECENCY_WEIGHT", &mut tournament.recency_weight),
            ("TOURNAMENT_STRUCTURE_WEIGHT", &mut tournament.structure_weight),
            ("TOURNAMENT_CITATIONS_WEIGHT", &mut tournament.citations_weight),
            ("TOURNAMENT_ARGUMENTS_WEIGHT", &mut tournament.arguments_weight),
        ] {
            if let Some(value) = lookup(name) {
                *slot = value.trim().parse::<f64>().map_err(|_| invalid(name, &value))?;
            }
        }

        let integration = &mut self.integration;
        for (name, slot) in [
            ("INTEGRATION_ADD_EVOLUTION_METADATA", &mut integration.add_evolution_metadata),
            (
                "INTEGRATION_PRESERVE_SOURCE_ATTRIBUTION",
                &mut integration.preserve_source_attribution,
            ),
            ("INTEGRATION_INTEGRATE_CITATIONS", &mut integration.integrate_citations),
            (
                "INTEGRATION_SKIP_CITATION_ENHANCEMENT",
                &mut integration.skip_citation_enhancement,
            ),
        ] {
            if let Some(value) = lookup(name) {
                *slot = parse_bool(name, &value)?;
            }
        }

        let verification = &mut self.verification;
        for (name, slot) in [
            (
                "VERIFICATION_CHECK_MARKDOWN_FORMATTING",
                &mut verification.check_markdown_formatting,
            ),
            (
                "VERIFICATION_CHECK_SECTION_NUMBERING",
                &mut verification.check_section_numbering,
            ),
            ("VERIFICATION_CHECK_NO_DUPLICATION", &mut verification.check_no_duplication),
            (
                "VERIFICATION_CHECK_DOCUMENT_NAVIGABILITY",
                &mut verification.check_document_navigability,
            ),
        ] {
            if let Some(value) = lookup(name) {
                *slot = parse_bool(name, &value)?;
            }
        }

        let name = "VERIFICATION_MAX_CONSECUTIVE_BLANK_LINES";
        if let Some(value) = lookup(name) {
            verification.max_consecutive_blank_lines =
                value.trim().parse::<usize>().map_err(|_| invalid(name, &value))?;
        }

        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.log_filter()?;

        for (field, value) in self.tournament.weights() {
            if !(0.0..=10.0).contains(&value) {
                return Err(ConfigError::WeightOutOfRange { field, value });
            }
        }

        let threshold = self.integration.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(ConfigError::SimilarityThreshold(threshold));
        }
        if self.integration.min_added_lines < 1 {
            return Err(ConfigError::MinAddedLines(self.integration.min_added_lines));
        }
        if self.verification.max_consecutive_blank_lines < 1 {
            return Err(ConfigError::BlankLineLimit(
                self.verification.max_consecutive_blank_lines,
            ));
        }

        Ok(())
    }

    /// The tracing filter directive for `log_level`.
    pub fn log_filter(&self) -> Result<&'static str, ConfigError> {
        match self.log_level.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok("trace"),
            "debug" => Ok("debug"),
            "info" => Ok("info"),
            "warn" | "warning" => Ok("warn"),
            "error" | "critical" => Ok("error"),
            _ => Err(ConfigError::LogLevel(self.log_level.clone())),
        }
    }

    pub fn log_directory(&self) -> PathBuf {
        self.log_dir
            .clone()
            .unwrap_or_else(|| self.output_directory().join("logs"))
    }

    pub fn output_directory(&self) -> PathBuf {
        if self.output_dir.is_absolute() {
            self.output_dir.clone()
        } else {
            self.input_directory.join(&self.output_dir)
        }
    }

    pub fn output_path_for(&self, filename: &str) -> PathBuf {
        self.output_directory()
            .join(format!("{COMPREHENSIVE_PREFIX}{filename}"))
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(invalid(name, value)),
    }
}

fn invalid(name: &str, value: &str) -> ConfigError {
    ConfigError::InvalidOverride {
        name: name.to_string(),
        value: value.to_string(),
    }
}
