use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsolidationError {
    #[error("no versions to evaluate for {0}")]
    InsufficientInput(String),

    #[error("no multi-version documents found under {0}")]
    NoMultiVersionFamilies(PathBuf),

    #[error("no tournament results to process")]
    NoTournamentResults,

    #[error("no improvements to integrate")]
    NoImprovements,

    #[error("no integration results to verify")]
    NoIntegrationResults,

    #[error("champion document unavailable: {path}: {reason}")]
    ChampionUnavailable { path: PathBuf, reason: String },
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{field} must be between 0 and 10, got {value}")]
    WeightOutOfRange { field: &'static str, value: f64 },

    #[error("similarity_threshold must be between 0 and 1, got {0}")]
    SimilarityThreshold(f64),

    #[error("min_added_lines must be at least 1, got {0}")]
    MinAddedLines(usize),

    #[error("max_consecutive_blank_lines must be at least 1, got {0}")]
    BlankLineLimit(usize),

    #[error("unknown log level {0:?}")]
    LogLevel(String),

    #[error("invalid value for {name}: {value:?}")]
    InvalidOverride { name: String, value: String },
}
