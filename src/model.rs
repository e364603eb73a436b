use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One copy of a document family as found in a single source folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentVersion {
    pub path: PathBuf,
    pub folder: String,
    #[serde(skip)]
    pub content: String,
    pub line_count: usize,
    pub modified: DateTime<Utc>,
    pub content_hash: String,
}

/// folder -> version, ordered by folder name.
pub type VersionMap = BTreeMap<String, DocumentVersion>;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub completeness: f64,
    pub recency: f64,
    pub structure: f64,
    pub citations: f64,
    pub arguments: f64,
}

impl ScoreBreakdown {
    pub fn total(&self) -> f64 {
        self.completeness + self.recency + self.structure + self.citations + self.arguments
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerUp {
    pub folder: String,
    pub score: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TournamentResult {
    pub filename: String,
    pub champion_folder: String,
    pub champion_path: PathBuf,
    pub champion_score: f64,
    pub champion_breakdown: ScoreBreakdown,
    pub all_scores: BTreeMap<String, ScoreBreakdown>,
    pub version_paths: BTreeMap<String, PathBuf>,
    pub version_count: usize,
    pub runners_up: Vec<RunnerUp>,
}

/// A headed Markdown section. `content` includes the header line; line
/// numbers are zero-based and inclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub level: usize,
    pub title: String,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImprovementValue {
    Low,
    Medium,
    High,
}

impl fmt::Display for ImprovementValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Where an improvement came from and how much it is worth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImprovementSource {
    pub folder: String,
    pub path: PathBuf,
    pub value: ImprovementValue,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionPayload {
    pub title: String,
    pub level: usize,
    pub content: String,
    pub line_start: usize,
    pub line_end: usize,
}

impl SectionPayload {
    pub fn header_line(&self) -> &str {
        self.content.split('\n').next().unwrap_or_default()
    }

    pub fn body_lines(&self) -> impl Iterator<Item = &str> {
        self.content.split('\n').skip(1)
    }
}

impl From<&Section> for SectionPayload {
    fn from(section: &Section) -> Self {
        Self {
            title: section.title.clone(),
            level: section.level,
            content: section.content.clone(),
            line_start: section.line_start,
            line_end: section.line_end,
        }
    }
}

/// Legal citation categories. Detection is lexical and best-effort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CitationCategory {
    CasePrecedent,
    Statute,
    Regulation,
    AgencyCode,
    FormReference,
    JudicialOpinion,
}

impl CitationCategory {
    pub const ALL: [Self; 6] = [
        Self::CasePrecedent,
        Self::Statute,
        Self::Regulation,
        Self::AgencyCode,
        Self::FormReference,
        Self::JudicialOpinion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CasePrecedent => "case_precedent",
            Self::Statute => "statute",
            Self::Regulation => "regulation",
            Self::AgencyCode => "agency_code",
            Self::FormReference => "form_reference",
            Self::JudicialOpinion => "judicial_opinion",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CitationDelta {
    pub champion_count: usize,
    pub other_count: usize,
    pub difference: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CitationCounts {
    pub case_precedent: usize,
    pub statute: usize,
    pub regulation: usize,
    pub agency_code: usize,
    pub form_reference: usize,
    pub judicial_opinion: usize,
}

impl CitationCounts {
    pub fn get(&self, category: CitationCategory) -> usize {
        match category {
            CitationCategory::CasePrecedent => self.case_precedent,
            CitationCategory::Statute => self.statute,
            CitationCategory::Regulation => self.regulation,
            CitationCategory::AgencyCode => self.agency_code,
            CitationCategory::FormReference => self.form_reference,
            CitationCategory::JudicialOpinion => self.judicial_opinion,
        }
    }

    pub fn set(&mut self, category: CitationCategory, count: usize) {
        let slot = match category {
            CitationCategory::CasePrecedent => &mut self.case_precedent,
            CitationCategory::Statute => &mut self.statute,
            CitationCategory::Regulation => &mut self.regulation,
            CitationCategory::AgencyCode => &mut self.agency_code,
            CitationCategory::FormReference => &mut self.form_reference,
            CitationCategory::JudicialOpinion => &mut self.judicial_opinion,
        };
        *slot = count;
    }

    pub fn total(&self) -> usize {
        CitationCategory::ALL
            .iter()
            .map(|category| self.get(*category))
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UniqueImprovement {
    NewSection {
        source: ImprovementSource,
        section: SectionPayload,
    },
    EnhancedSection {
        source: ImprovementSource,
        section: SectionPayload,
        similarity: f64,
        added_line_count: usize,
        additions_preview: Vec<String>,
    },
    CitationEnhancement {
        source: ImprovementSource,
        citations: BTreeMap<CitationCategory, CitationDelta>,
    },
}

impl UniqueImprovement {
    pub fn source(&self) -> &ImprovementSource {
        match self {
            Self::NewSection { source, .. }
            | Self::EnhancedSection { source, .. }
            | Self::CitationEnhancement { source, .. } => source,
        }
    }

    pub fn section(&self) -> Option<&SectionPayload> {
        match self {
            Self::NewSection { section, .. } | Self::EnhancedSection { section, .. } => {
                Some(section)
            }
            Self::CitationEnhancement { .. } => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::NewSection { .. } => "new_section",
            Self::EnhancedSection { .. } => "enhanced_section",
            Self::CitationEnhancement { .. } => "citation_enhancement",
        }
    }
}

/// Extraction output for one document family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentImprovements {
    pub filename: String,
    pub champion_folder: String,
    pub champion_path: PathBuf,
    pub champion_score: f64,
    pub improvements: Vec<UniqueImprovement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegrationResult {
    pub filename: String,
    pub champion_folder: String,
    pub champion_path: PathBuf,
    pub original_line_count: usize,
    pub integrated_line_count: usize,
    pub added_lines: usize,
    pub improvements_integrated: usize,
    pub source_folders: BTreeSet<String>,
    #[serde(skip)]
    pub integrated_content: String,
    pub created_at: DateTime<Utc>,
}

impl IntegrationResult {
    pub fn growth_percentage(&self) -> f64 {
        if self.original_line_count == 0 {
            return 0.0;
        }
        self.added_lines as f64 / self.original_line_count as f64 * 100.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueCategory {
    Formatting,
    Numbering,
    Duplication,
    Navigation,
}

impl IssueCategory {
    pub fn label(self) -> &'static str {
        match self {
            Self::Formatting => "Formatting",
            Self::Numbering => "Numbering",
            Self::Duplication => "Duplication",
            Self::Navigation => "Navigation",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationIssue {
    pub category: IssueCategory,
    pub severity: Severity,
    pub message: String,
    /// One-based.
    pub line_number: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationResult {
    pub filename: String,
    pub path: PathBuf,
    pub line_count: usize,
    pub issues: Vec<VerificationIssue>,
    pub passed: bool,
    pub verified_at: DateTime<Utc>,
}

impl VerificationResult {
    pub fn issue_count(&self) -> usize {
        self.issues.len()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TournamentManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub input_directory: String,
    pub source_folders: Vec<String>,
    pub families: Vec<TournamentResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImprovementManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub documents_analyzed: usize,
    pub total_improvements: usize,
    pub documents: Vec<DocumentImprovements>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntegrationManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub output_directory: String,
    pub documents: Vec<IntegrationResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationManifest {
    pub manifest_version: u32,
    pub generated_at: String,
    pub passed: usize,
    pub failed: usize,
    pub results: Vec<VerificationResult>,
}
