use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::citations::scoring_marker_count;
use crate::commands::RunContext;
use crate::config::{Settings, TournamentSettings};
use crate::error::ConsolidationError;
use crate::markdown::MarkdownParser;
use crate::model::{RunnerUp, ScoreBreakdown, TournamentManifest, TournamentResult, VersionMap};
use crate::storage::DocumentStore;
use crate::util::{now_utc_string, round2, write_json_pretty};

#[cfg(test)]
mod tests;

pub const MANIFEST_NAME: &str = "tournament_results.json";

const ARGUMENT_KEYWORDS: [&str; 10] = [
    "therefore",
    "however",
    "moreover",
    "furthermore",
    "consequently",
    "accordingly",
    "argument",
    "demonstrates",
    "establishes",
    "pursuant to",
];

const SECTION_CAP: f64 = 10.0;
const SUBSECTION_CAP: f64 = 20.0;

/// Cohort-wide maxima and bounds that every sub-score normalizes against.
#[derive(Debug, Clone, Copy)]
struct CohortStats {
    max_lines: usize,
    oldest_ms: i64,
    newest_ms: i64,
    max_citations: usize,
    max_argument_density: f64,
}

#[derive(Debug, Clone)]
pub struct Scorer {
    weights: TournamentSettings,
    parser: MarkdownParser,
    list_marker: Regex,
}

impl Scorer {
    pub fn new(weights: &TournamentSettings) -> Result<Self> {
        Ok(Self {
            weights: weights.clone(),
            parser: MarkdownParser::new()?,
            list_marker: Regex::new(r"(?m)^\s*(?:[-*+]|\d+\.)\s")
                .context("failed to compile list marker regex")?,
        })
    }

    /// Scores every version against its cohort.
    pub fn score_versions(&self, versions: &VersionMap) -> BTreeMap<String, ScoreBreakdown> {
        let Some(stats) = cohort_stats(versions) else {
            return BTreeMap::new();
        };

        versions
            .iter()
            .map(|(folder, version)| {
                let breakdown = ScoreBreakdown {
                    completeness: self.weighted(
                        self.completeness(&version.content, version.line_count, &stats),
                        self.weights.completeness_weight,
                    ),
                    recency: self.weighted(
                        recency(version.modified.timestamp_millis(), &stats),
                        self.weights.recency_weight,
                    ),
                    structure: self.weighted(
                        self.structure(&version.content),
                        self.weights.structure_weight,
                    ),
                    citations: self.weighted(
                        citations(&version.content, &stats),
                        self.weights.citations_weight,
                    ),
                    arguments: self.weighted(
                        arguments(&version.content, version.line_count, &stats),
                        self.weights.arguments_weight,
                    ),
                };

                debug!(
                    folder = %folder,
                    completeness = breakdown.completeness,
                    recency = breakdown.recency,
                    structure = breakdown.structure,
                    citations = breakdown.citations,
                    arguments = breakdown.arguments,
                    total = breakdown.total(),
                    "version scored"
                );

                (folder.clone(), breakdown)
            })
            .collect()
    }

    fn weighted(&self, raw: f64, weight: f64) -> f64 {
        round2(raw * weight / 10.0)
    }

    fn completeness(&self, content: &str, lines: usize, stats: &CohortStats) -> f64 {
        let sections = self.parser.count_headers_at_level(content, 2) as f64;
        let subsections = self.parser.count_headers_at_level(content, 3) as f64;

        let line_score = if stats.max_lines > 0 {
            lines as f64 / stats.max_lines as f64 * 5.0
        } else {
            0.0
        };
        let section_score = (sections / SECTION_CAP).min(1.0) * 3.0;
        let subsection_score = (subsections / SUBSECTION_CAP).min(1.0) * 2.0;

        line_score + section_score + subsection_score
    }

    fn structure(&self, content: &str) -> f64 {
        let has_title = content
            .lines()
            .find(|line| !line.trim().is_empty())
            .and_then(|line| self.parser.parse_header(line))
            .map(|(level, _)| level == 1)
            .unwrap_or(false);
        let has_headers = self
            .parser
            .headers(content)
            .iter()
            .any(|header| header.level >= 2);
        let has_lists = self.list_marker.is_match(content);
        let has_code_blocks = content.contains("```");

        [has_title, has_headers, has_lists, has_code_blocks]
            .iter()
            .filter(|present| **present)
            .count() as f64
            * 2.5
    }
}

fn cohort_stats(versions: &VersionMap) -> Option<CohortStats> {
    let max_lines = versions.values().map(|version| version.line_count).max()?;
    let oldest_ms = versions
        .values()
        .map(|version| version.modified.timestamp_millis())
        .min()?;
    let newest_ms = versions
        .values()
        .map(|version| version.modified.timestamp_millis())
        .max()?;
    let max_citations = versions
        .values()
        .map(|version| scoring_marker_count(&version.content))
        .max()?;
    let max_argument_density = versions
        .values()
        .map(|version| argument_density(&version.content, version.line_count))
        .fold(0.0_f64, f64::max);

    Some(CohortStats {
        max_lines,
        oldest_ms,
        newest_ms,
        max_citations,
        max_argument_density,
    })
}

fn recency(modified_ms: i64, stats: &CohortStats) -> f64 {
    if stats.newest_ms == stats.oldest_ms {
        return 5.0;
    }
    (modified_ms - stats.oldest_ms) as f64 / (stats.newest_ms - stats.oldest_ms) as f64 * 10.0
}

fn citations(content: &str, stats: &CohortStats) -> f64 {
    let max = stats.max_citations.max(1) as f64;
    (scoring_marker_count(content) as f64 / max).min(1.0) * 10.0
}

fn argument_keyword_count(content: &str) -> usize {
    let lowered = content.to_lowercase();
    ARGUMENT_KEYWORDS
        .iter()
        .map(|keyword| lowered.matches(keyword).count())
        .sum()
}

/// Keywords per hundred lines.
fn argument_density(content: &str, lines: usize) -> f64 {
    argument_keyword_count(content) as f64 / lines.max(1) as f64 * 100.0
}

fn arguments(content: &str, lines: usize, stats: &CohortStats) -> f64 {
    let max = if stats.max_argument_density > 0.0 {
        stats.max_argument_density
    } else {
        1.0
    };
    (argument_density(content, lines) / max).min(1.0) * 10.0
}

/// Scores one family and picks its champion. Ties on total go to the
/// lexicographically smallest folder name.
pub fn run_tournament(
    filename: &str,
    versions: &VersionMap,
    scorer: &Scorer,
) -> Result<TournamentResult, ConsolidationError> {
    if versions.is_empty() {
        return Err(ConsolidationError::InsufficientInput(filename.to_string()));
    }

    let scores = scorer.score_versions(versions);

    let mut champion: Option<(&String, &ScoreBreakdown)> = None;
    for (folder, breakdown) in &scores {
        match champion {
            Some((_, best)) if breakdown.total() <= best.total() => {}
            _ => champion = Some((folder, breakdown)),
        }
    }
    let Some((champion_folder, champion_breakdown)) = champion else {
        return Err(ConsolidationError::InsufficientInput(filename.to_string()));
    };

    let mut runners_up = scores
        .iter()
        .filter(|(folder, _)| *folder != champion_folder)
        .map(|(folder, breakdown)| RunnerUp {
            folder: folder.clone(),
            score: breakdown.total(),
        })
        .collect::<Vec<RunnerUp>>();
    runners_up.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.folder.cmp(&b.folder)));

    let version_paths = versions
        .iter()
        .map(|(folder, version)| (folder.clone(), version.path.clone()))
        .collect::<BTreeMap<_, _>>();
    let champion_path = version_paths
        .get(champion_folder)
        .cloned()
        .unwrap_or_default();

    info!(
        filename = %filename,
        champion = %champion_folder,
        champion_score = champion_breakdown.total(),
        versions = versions.len(),
        "tournament complete"
    );

    Ok(TournamentResult {
        filename: filename.to_string(),
        champion_folder: champion_folder.clone(),
        champion_path,
        champion_score: champion_breakdown.total(),
        champion_breakdown: *champion_breakdown,
        all_scores: scores.clone(),
        version_paths,
        version_count: versions.len(),
        runners_up,
    })
}

/// The folders to scan: the configured list, or every subfolder of the
/// input directory except the output folder.
pub fn resolve_source_folders(settings: &Settings, store: &dyn DocumentStore) -> Result<Vec<String>> {
    if !settings.source_folders.is_empty() {
        return Ok(settings.source_folders.clone());
    }

    let output_directory = settings.output_directory();
    let folders = store
        .list_folders(&settings.input_directory)
        .with_context(|| {
            format!(
                "failed to list source folders in {}",
                settings.input_directory.display()
            )
        })?
        .into_iter()
        .filter(|folder| settings.input_directory.join(folder) != output_directory)
        .collect();

    Ok(folders)
}

/// Groups documents by file name across folders, keeping only families
/// present in at least two folders.
pub fn group_document_versions(
    settings: &Settings,
    store: &dyn DocumentStore,
) -> Result<BTreeMap<String, VersionMap>> {
    let folders = resolve_source_folders(settings, store)?;
    info!(source_folders = folders.len(), "starting version discovery");

    let mut groups: BTreeMap<String, VersionMap> = BTreeMap::new();
    for folder in &folders {
        let folder_path = settings.input_directory.join(folder);
        let documents = match store.find_documents(&folder_path, &settings.file_pattern) {
            Ok(documents) => documents,
            Err(err) => {
                warn!(folder = %folder, error = %err, "skipping unreadable source folder");
                continue;
            }
        };

        info!(folder = %folder, documents = documents.len(), "folder scanned");
        for mut document in documents {
            let Some(filename) = document
                .path
                .file_name()
                .and_then(|name| name.to_str())
                .map(ToOwned::to_owned)
            else {
                continue;
            };
            document.folder = folder.clone();
            groups.entry(filename).or_default().insert(folder.clone(), document);
        }
    }

    groups.retain(|_, versions| versions.len() > 1);

    info!(
        multi_version_documents = groups.len(),
        total_files = groups.values().map(|versions| versions.len()).sum::<usize>(),
        "version discovery complete"
    );

    if groups.is_empty() {
        return Err(ConsolidationError::NoMultiVersionFamilies(settings.input_directory.clone()).into());
    }

    Ok(groups)
}

pub fn run_tournaments(
    groups: &BTreeMap<String, VersionMap>,
    settings: &Settings,
) -> Result<Vec<TournamentResult>> {
    if groups.is_empty() {
        return Err(ConsolidationError::NoMultiVersionFamilies(settings.input_directory.clone()).into());
    }

    let scorer = Scorer::new(&settings.tournament)?;
    info!(document_families = groups.len(), "starting tournament execution");

    let mut results = Vec::with_capacity(groups.len());
    for (filename, versions) in groups {
        match run_tournament(filename, versions, &scorer) {
            Ok(result) => results.push(result),
            Err(err) => warn!(filename = %filename, error = %err, "tournament skipped"),
        }
    }

    info!(champions_identified = results.len(), "tournament execution complete");
    Ok(results)
}

/// Discovery plus tournaments.
pub fn execute(settings: &Settings, store: &dyn DocumentStore) -> Result<Vec<TournamentResult>> {
    info!(
        input_directory = %settings.input_directory.display(),
        file_pattern = %settings.file_pattern,
        "starting tournament-based consolidation"
    );

    let groups = group_document_versions(settings, store)?;
    run_tournaments(&groups, settings)
}

pub fn build_manifest(settings: &Settings, families: Vec<TournamentResult>) -> TournamentManifest {
    TournamentManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        input_directory: settings.input_directory.display().to_string(),
        source_folders: settings.source_folders.clone(),
        families,
    }
}

pub fn write_manifest(path: &Path, manifest: &TournamentManifest) -> Result<()> {
    write_json_pretty(path, manifest)?;
    info!(path = %path.display(), families = manifest.families.len(), "wrote tournament manifest");
    Ok(())
}

pub fn run(context: RunContext) -> Result<()> {
    let results = execute(&context.settings, &context.store)?;

    let manifest = build_manifest(&context.settings, results);
    write_manifest(&context.manifest_path(MANIFEST_NAME), &manifest)?;

    for family in &manifest.families {
        info!(
            filename = %family.filename,
            champion = %family.champion_folder,
            score = family.champion_score,
            runners_up = family.runners_up.len(),
            "champion selected"
        );
    }

    Ok(())
}
