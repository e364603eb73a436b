use std::collections::HashMap;
use std::path::Path;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::citations::CitationScanner;
use crate::commands::{RunContext, tournament};
use crate::config::{IntegrationSettings, Settings};
use crate::error::ConsolidationError;
use crate::markdown::MarkdownParser;
use crate::model::{
    DocumentImprovements, ImprovementManifest, ImprovementSource, ImprovementValue, Section,
    SectionPayload, TournamentManifest, TournamentResult, UniqueImprovement,
};
use crate::similarity::{introduced_lines, ratio};
use crate::storage::DocumentStore;
use crate::util::{now_utc_string, read_json, round2, write_json_pretty};


pub const MANIFEST_NAME: &str = "improvements.json";

const PREVIEW_LINES: usize = 5;
const HIGH_VALUE_ADDITIONS: usize = 10;

#[derive(Debug, Clone)]
pub struct Extractor {
    similarity_threshold: f64,
    min_added_lines: usize,
    parser: MarkdownParser,
    scanner: CitationScanner,
}

impl Extractor {
    pub fn new(settings: &IntegrationSettings) -> Result<Self> {
        Ok(Self {
            similarity_threshold: settings.similarity_threshold,
            min_added_lines: settings.min_added_lines,
            parser: MarkdownParser::new()?,
            scanner: CitationScanner::new()?,
        })
    }

    /// Sections of `other` that the champion lacks or that `other` expands
    /// substantially. Titles compare case-insensitively.
    pub fn find_unique_sections(
        &self,
        champion: &str,
        other: &str,
        folder: &str,
        path: &Path,
    ) -> Vec<UniqueImprovement> {
        let champion_sections = self
            .parser
            .parse_sections(champion)
            .into_iter()
            .map(|section| (section.title.to_lowercase(), section))
            .collect::<HashMap<String, Section>>();

        let mut improvements = Vec::new();
        for section in self.parser.parse_sections(other) {
            let Some(existing) = champion_sections.get(&section.title.to_lowercase()) else {
                debug!(title = %section.title, folder = %folder, "found new section");
                improvements.push(UniqueImprovement::NewSection {
                    source: source(
                        folder,
                        path,
                        ImprovementValue::High,
                        "Section not present in champion version".to_string(),
                    ),
                    section: SectionPayload::from(&section),
                });
                continue;
            };

            let similarity = ratio(&existing.content, &section.content);
            if similarity >= self.similarity_threshold {
                continue;
            }

            let added = introduced_lines(&existing.content, &section.content);
            if added.len() < self.min_added_lines {
                continue;
            }

            let value = if added.len() < HIGH_VALUE_ADDITIONS {
                ImprovementValue::Medium
            } else {
                ImprovementValue::High
            };
            debug!(
                title = %section.title,
                folder = %folder,
                additions = added.len(),
                similarity,
                "found enhanced section"
            );

            improvements.push(UniqueImprovement::EnhancedSection {
                source: source(
                    folder,
                    path,
                    value,
                    format!("Section has {} additional lines not in champion", added.len()),
                ),
                similarity: round2(similarity),
                added_line_count: added.len(),
                additions_preview: added
                    .iter()
                    .take(PREVIEW_LINES)
                    .map(|line| line.to_string())
                    .collect(),
                section: SectionPayload::from(&section),
            });
        }

        improvements
    }

    /// One aggregate improvement when `other` cites more in any category.
    pub fn compare_citations(
        &self,
        champion: &str,
        other: &str,
        folder: &str,
        path: &Path,
    ) -> Option<UniqueImprovement> {
        let citations = self.scanner.compare(champion, other);
        if citations.is_empty() {
            return None;
        }

        let categories = citations
            .keys()
            .map(|category| category.as_str())
            .collect::<Vec<_>>()
            .join(", ");
        debug!(folder = %folder, categories = %categories, "found citation improvements");

        Some(UniqueImprovement::CitationEnhancement {
            source: source(
                folder,
                path,
                ImprovementValue::High,
                format!("Additional citations: {categories}"),
            ),
            citations,
        })
    }

    /// Improvements from every non-champion version of one family. `None`
    /// when nothing beats the champion.
    pub fn extract_for_document(
        &self,
        result: &TournamentResult,
        store: &dyn DocumentStore,
    ) -> Result<Option<DocumentImprovements>> {
        let champion = store.read_document(&result.champion_path).map_err(|err| {
            ConsolidationError::ChampionUnavailable {
                path: result.champion_path.clone(),
                reason: format!("{err:#}"),
            }
        })?;

        debug!(
            filename = %result.filename,
            champion_citations = self.scanner.count(&champion).total(),
            "champion loaded"
        );

        let mut improvements = Vec::new();
        for (folder, path) in &result.version_paths {
            if *folder == result.champion_folder {
                continue;
            }

            let other = match store.read_document(path) {
                Ok(content) => content,
                Err(err) => {
                    warn!(
                        filename = %result.filename,
                        folder = %folder,
                        error = %err,
                        "skipping unreadable version"
                    );
                    continue;
                }
            };

            improvements.extend(self.find_unique_sections(&champion, &other, folder, path));
            improvements.extend(self.compare_citations(&champion, &other, folder, path));
        }

        if improvements.is_empty() {
            debug!(filename = %result.filename, "champion already comprehensive");
            return Ok(None);
        }

        info!(
            filename = %result.filename,
            champion = %result.champion_folder,
            improvements = improvements.len(),
            "improvements extracted"
        );

        Ok(Some(DocumentImprovements {
            filename: result.filename.clone(),
            champion_folder: result.champion_folder.clone(),
            champion_path: result.champion_path.clone(),
            champion_score: result.champion_score,
            improvements,
        }))
    }
}

fn source(folder: &str, path: &Path, value: ImprovementValue, reason: String) -> ImprovementSource {
    ImprovementSource {
        folder: folder.to_string(),
        path: path.to_path_buf(),
        value,
        reason,
    }
}

pub fn run_extraction(
    results: &[TournamentResult],
    settings: &Settings,
    store: &dyn DocumentStore,
) -> Result<Vec<DocumentImprovements>> {
    if results.is_empty() {
        return Err(ConsolidationError::NoTournamentResults.into());
    }

    let extractor = Extractor::new(&settings.integration)?;
    info!(documents = results.len(), "starting unique content extraction");

    let mut documents = Vec::new();
    for result in results {
        match extractor.extract_for_document(result, store) {
            Ok(Some(document)) => documents.push(document),
            Ok(None) => {}
            Err(err) => {
                warn!(filename = %result.filename, error = %err, "extraction skipped");
            }
        }
    }

    info!(
        documents_analyzed = results.len(),
        documents_with_improvements = documents.len(),
        total_improvements = total_improvements(&documents),
        "unique content extraction complete"
    );

    Ok(documents)
}

fn total_improvements(documents: &[DocumentImprovements]) -> usize {
    documents
        .iter()
        .map(|document| document.improvements.len())
        .sum()
}

pub fn build_manifest(
    documents_analyzed: usize,
    documents: Vec<DocumentImprovements>,
) -> ImprovementManifest {
    ImprovementManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        documents_analyzed,
        total_improvements: total_improvements(&documents),
        documents,
    }
}

/// Reads the tournament manifest, or reruns the tournaments when it is
/// missing or a refresh was requested.
pub fn load_or_refresh_tournaments(context: &RunContext) -> Result<TournamentManifest> {
    let path = context.manifest_path(tournament::MANIFEST_NAME);
    if context.refresh || !path.exists() {
        let results = tournament::execute(&context.settings, &context.store)?;
        let manifest = tournament::build_manifest(&context.settings, results);
        tournament::write_manifest(&path, &manifest)?;
        return Ok(manifest);
    }

    let manifest: TournamentManifest = read_json(&path)?;
    info!(
        path = %path.display(),
        families = manifest.families.len(),
        "loaded existing tournament manifest"
    );
    Ok(manifest)
}

pub fn execute(context: &RunContext) -> Result<ImprovementManifest> {
    let tournaments = load_or_refresh_tournaments(context)?;
    let documents = run_extraction(&tournaments.families, &context.settings, &context.store)?;
    Ok(build_manifest(tournaments.families.len(), documents))
}

pub fn write_manifest(path: &Path, manifest: &ImprovementManifest) -> Result<()> {
    write_json_pretty(path, manifest)?;
    info!(
        path = %path.display(),
        documents = manifest.documents.len(),
        total_improvements = manifest.total_improvements,
        "wrote improvements manifest"
    );
    Ok(())
}

pub fn run(context: RunContext) -> Result<()> {
    let manifest = execute(&context)?;
    write_manifest(&context.manifest_path(MANIFEST_NAME), &manifest)
}
