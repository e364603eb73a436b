use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, info, warn};

use crate::citations::CitationScanner;
use crate::commands::{RunContext, extract, report};
use crate::config::{IntegrationSettings, Settings};
use crate::error::ConsolidationError;
use crate::markdown::MarkdownParser;
use crate::model::{
    DocumentImprovements, ImprovementManifest, IntegrationManifest, IntegrationResult,
    SectionPayload, UniqueImprovement,
};
use crate::storage::DocumentStore;
use crate::util::{line_count, now_utc_string, read_json, utc_date_string, write_json_pretty};

#[cfg(test)]
mod tests;

pub const MANIFEST_NAME: &str = "integration_results.json";
pub const REPORT_NAME: &str = "INTEGRATION_REPORT.md";

const EVOLUTION_HEADER: &str = "## Document Evolution";
const EVOLUTION_LABEL: &str = "**Document Evolution";
const CITATIONS_HEADER: &str = "## Additional Legal Citations";

/// Text being merged plus how many improvements each source contributed.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Merge {
    pub text: String,
    pub per_source: BTreeMap<String, usize>,
}

impl Merge {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            per_source: BTreeMap::new(),
        }
    }

    pub fn integrated(&self) -> usize {
        self.per_source.values().sum()
    }

    fn record(mut self, folder: &str, text: String) -> Self {
        self.text = text;
        *self.per_source.entry(folder.to_string()).or_default() += 1;
        self
    }
}

fn is_rule(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= 3 && trimmed.chars().all(|c| c == '-')
}

fn is_evolution_header(line: &str) -> bool {
    line.starts_with(EVOLUTION_HEADER) || line.starts_with(EVOLUTION_LABEL)
}

pub fn is_footer_marker(line: &str) -> bool {
    is_rule(line) || is_evolution_header(line)
}

/// Index of the last footer marker, or the end of the document. An
/// evolution header directly under a rule is entered at the rule.
pub fn footer_insertion_point(lines: &[&str]) -> usize {
    let Some(index) = lines.iter().rposition(|line| is_footer_marker(line)) else {
        return lines.len();
    };

    if is_evolution_header(lines[index]) {
        let previous = lines[..index]
            .iter()
            .rposition(|line| !line.trim().is_empty());
        if let Some(rule) = previous.filter(|position| is_rule(lines[*position])) {
            return rule;
        }
    }

    index
}

/// Splices `block` in before line `at` (clamped to the end).
pub fn insert_block(text: &str, at: usize, block: &[String]) -> String {
    let mut lines = text.split('\n').collect::<Vec<&str>>();
    let at = at.min(lines.len());
    lines.splice(at..at, block.iter().map(String::as_str));
    lines.join("\n")
}

#[derive(Debug, Clone)]
pub struct Integrator {
    settings: IntegrationSettings,
    parser: MarkdownParser,
    scanner: CitationScanner,
}

impl Integrator {
    pub fn new(settings: &IntegrationSettings) -> Result<Self> {
        Ok(Self {
            settings: settings.clone(),
            parser: MarkdownParser::new()?,
            scanner: CitationScanner::new()?,
        })
    }

    fn attribution(&self, folder: &str) -> Option<String> {
        self.settings
            .preserve_source_attribution
            .then(|| format!("*[Integrated from {folder}]*"))
    }

    /// Line of the first header after the level-2 header titled `title`,
    /// or the end of the document when that section is last.
    pub fn section_insertion_point(&self, lines: &[&str], title: &str) -> Option<usize> {
        let wanted = title.to_lowercase();
        let start = lines.iter().position(|line| {
            matches!(
                self.parser.parse_header(line),
                Some((2, found)) if found.to_lowercase() == wanted
            )
        })?;

        let end = lines[start + 1..]
            .iter()
            .position(|line| self.parser.parse_header(line).is_some())
            .map(|offset| start + 1 + offset)
            .unwrap_or(lines.len());
        Some(end)
    }

    pub fn format_block(&self, section: &SectionPayload, folder: &str) -> Vec<String> {
        let mut block = vec![String::new(), section.header_line().to_string()];
        block.extend(self.attribution(folder));
        block.push(String::new());
        block.extend(section.body_lines().map(ToOwned::to_owned));
        block.push(String::new());
        block
    }

    pub fn citation_block(&self, citations: &[String], folder: &str) -> Vec<String> {
        let mut block = vec![String::new(), CITATIONS_HEADER.to_string()];
        block.extend(self.attribution(folder));
        block.push(String::new());
        block.extend(citations.iter().map(|citation| format!("- {citation}")));
        block.push(String::new());
        block
    }

    fn apply_section(&self, merge: Merge, improvement: &UniqueImprovement) -> Merge {
        let Some(section) = improvement.section() else {
            return merge;
        };
        let folder = &improvement.source().folder;

        let lines = merge.text.split('\n').collect::<Vec<&str>>();
        let point = match improvement {
            UniqueImprovement::EnhancedSection { .. } => self
                .section_insertion_point(&lines, &section.title)
                .unwrap_or_else(|| footer_insertion_point(&lines)),
            _ => footer_insertion_point(&lines),
        };
        let text = insert_block(&merge.text, point, &self.format_block(section, folder));

        debug!(
            title = %section.title,
            folder = %folder,
            kind = improvement.kind(),
            line = point,
            "improvement integrated"
        );
        merge.record(folder, text)
    }

    fn apply_citations(
        &self,
        merge: Merge,
        improvement: &UniqueImprovement,
        store: &dyn DocumentStore,
    ) -> Merge {
        let UniqueImprovement::CitationEnhancement { source, citations } = improvement else {
            return merge;
        };
        if !self.settings.integrate_citations || self.settings.skip_citation_enhancement {
            debug!(folder = %source.folder, "citation integration disabled");
            return merge;
        }

        let content = match store.read_document(&source.path) {
            Ok(content) => content,
            Err(err) => {
                warn!(
                    folder = %source.folder,
                    path = %source.path.display(),
                    error = %err,
                    "failed to integrate citations"
                );
                return merge;
            }
        };

        let sentences = citations
            .iter()
            .flat_map(|(category, delta)| {
                self.scanner
                    .extract_sentences(&content, *category, delta.difference)
            })
            .collect::<Vec<String>>();
        if sentences.is_empty() {
            debug!(folder = %source.folder, "no citation sentences to integrate");
            return merge;
        }

        let lines = merge.text.split('\n').collect::<Vec<&str>>();
        let point = footer_insertion_point(&lines);
        let text = insert_block(
            &merge.text,
            point,
            &self.citation_block(&sentences, &source.folder),
        );

        debug!(
            folder = %source.folder,
            citations = sentences.len(),
            line = point,
            "citations integrated"
        );
        merge.record(&source.folder, text)
    }

    /// Folds every improvement into `champion`: enhanced sections first,
    /// then new sections, then citation blocks. Original lines are never
    /// removed.
    pub fn merge(
        &self,
        champion: &str,
        improvements: &[UniqueImprovement],
        store: &dyn DocumentStore,
    ) -> Merge {
        let mut ordered = improvements.iter().collect::<Vec<&UniqueImprovement>>();
        ordered.sort_by_key(|improvement| {
            !matches!(improvement, UniqueImprovement::EnhancedSection { .. })
        });

        let (citations, sections): (Vec<&UniqueImprovement>, Vec<&UniqueImprovement>) = ordered
            .into_iter()
            .partition(|improvement| {
                matches!(improvement, UniqueImprovement::CitationEnhancement { .. })
            });

        let merged = sections
            .into_iter()
            .fold(Merge::new(champion), |merge, improvement| {
                self.apply_section(merge, improvement)
            });
        citations.into_iter().fold(merged, |merge, improvement| {
            self.apply_citations(merge, improvement, store)
        })
    }

    pub fn integrate_document(
        &self,
        document: &DocumentImprovements,
        store: &dyn DocumentStore,
    ) -> Result<Option<IntegrationResult>> {
        let champion = store.read_document(&document.champion_path).map_err(|err| {
            ConsolidationError::ChampionUnavailable {
                path: document.champion_path.clone(),
                reason: format!("{err:#}"),
            }
        })?;
        let original_line_count = line_count(&champion);

        let merge = self.merge(&champion, &document.improvements, store);
        if merge.integrated() == 0 {
            info!(filename = %document.filename, "no improvements integrated");
            return Ok(None);
        }

        let created_at = Utc::now();
        let mut integrated_content = merge.text.clone();
        if self.settings.add_evolution_metadata {
            let footer = evolution_footer(
                original_line_count,
                line_count(&merge.text),
                &merge.per_source,
                &utc_date_string(created_at),
            );
            integrated_content.push_str(&footer.join("\n"));
        }

        let integrated_line_count = line_count(&integrated_content);
        let result = IntegrationResult {
            filename: document.filename.clone(),
            champion_folder: document.champion_folder.clone(),
            champion_path: document.champion_path.clone(),
            original_line_count,
            integrated_line_count,
            added_lines: integrated_line_count.saturating_sub(original_line_count),
            improvements_integrated: merge.integrated(),
            source_folders: merge.per_source.keys().cloned().collect::<BTreeSet<_>>(),
            integrated_content,
            created_at,
        };

        info!(
            filename = %result.filename,
            original_lines = result.original_line_count,
            integrated_lines = result.integrated_line_count,
            added_lines = result.added_lines,
            growth = %format!("{:.1}%", result.growth_percentage()),
            "document integration complete"
        );

        Ok(Some(result))
    }
}

/// Lines appended after the merged text. Counts describe the text before
/// the footer is added.
pub fn evolution_footer(
    original_lines: usize,
    integrated_lines: usize,
    per_source: &BTreeMap<String, usize>,
    date: &str,
) -> Vec<String> {
    let added = integrated_lines.saturating_sub(original_lines);
    let integrated: usize = per_source.values().sum();

    let mut footer = vec![
        String::new(),
        "---".to_string(),
        String::new(),
        EVOLUTION_HEADER.to_string(),
        String::new(),
        format!("**Original Champion Lines**: {original_lines}"),
        format!("**Integrated Lines**: {integrated_lines} (+{added} lines)"),
        format!("**Improvements Integrated**: {integrated}"),
        String::new(),
        "**Sources**:".to_string(),
    ];
    footer.extend(
        per_source
            .iter()
            .map(|(folder, count)| format!("- {folder}: {count} improvements")),
    );
    footer.extend([
        String::new(),
        format!("**Last Updated**: {date}"),
        "**Status**: COMPREHENSIVE MASTER DOCUMENT".to_string(),
        String::new(),
    ]);
    footer
}

pub fn save(
    result: &IntegrationResult,
    settings: &Settings,
    store: &dyn DocumentStore,
) -> Result<PathBuf> {
    let path = settings.output_path_for(&result.filename);
    store.write_document(&path, &result.integrated_content)?;
    info!(path = %path.display(), lines = result.integrated_line_count, "integrated document saved");
    Ok(path)
}

pub fn run_integration(
    documents: &[DocumentImprovements],
    settings: &Settings,
    store: &dyn DocumentStore,
) -> Result<Vec<IntegrationResult>> {
    if documents.is_empty() {
        return Err(ConsolidationError::NoImprovements.into());
    }

    let integrator = Integrator::new(&settings.integration)?;
    store.create_directory(&settings.output_directory())?;
    info!(documents = documents.len(), "starting content integration");

    let mut results = Vec::new();
    for document in documents {
        let result = match integrator.integrate_document(document, store) {
            Ok(Some(result)) => result,
            Ok(None) => continue,
            Err(err) => {
                warn!(filename = %document.filename, error = %err, "integration skipped");
                continue;
            }
        };

        if let Err(err) = save(&result, settings, store) {
            warn!(filename = %result.filename, error = %err, "failed to save integrated document");
            continue;
        }
        results.push(result);
    }

    info!(
        documents_integrated = results.len(),
        total_lines_added = results.iter().map(|result| result.added_lines).sum::<usize>(),
        "content integration complete"
    );

    Ok(results)
}

pub fn build_manifest(settings: &Settings, documents: Vec<IntegrationResult>) -> IntegrationManifest {
    IntegrationManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        output_directory: settings.output_directory().display().to_string(),
        documents,
    }
}

pub fn write_manifest(path: &Path, manifest: &IntegrationManifest) -> Result<()> {
    write_json_pretty(path, manifest)?;
    info!(path = %path.display(), documents = manifest.documents.len(), "wrote integration manifest");
    Ok(())
}

/// Reads the improvements manifest, or reruns extraction when it is missing
/// or a refresh was requested.
pub fn load_or_refresh_improvements(context: &RunContext) -> Result<ImprovementManifest> {
    let path = context.manifest_path(extract::MANIFEST_NAME);
    if context.refresh || !path.exists() {
        let manifest = extract::execute(context)?;
        extract::write_manifest(&path, &manifest)?;
        return Ok(manifest);
    }

    let manifest: ImprovementManifest = read_json(&path)?;
    info!(
        path = %path.display(),
        documents = manifest.documents.len(),
        "loaded existing improvements manifest"
    );
    Ok(manifest)
}

pub fn write_integration_report(
    settings: &Settings,
    results: &[IntegrationResult],
    families: usize,
    store: &dyn DocumentStore,
) -> Result<()> {
    let summary = report::integration_report(results, families, &settings.tournament, Utc::now());
    report::write_report(&settings.output_directory().join(REPORT_NAME), &summary, store)
}

/// Integration over the loaded or recomputed improvements, with its report.
pub fn execute(context: &RunContext) -> Result<IntegrationManifest> {
    let improvements = load_or_refresh_improvements(context)?;
    let results = run_integration(&improvements.documents, &context.settings, &context.store)?;
    write_integration_report(
        &context.settings,
        &results,
        improvements.documents_analyzed,
        &context.store,
    )?;
    Ok(build_manifest(&context.settings, results))
}

pub fn run(context: RunContext) -> Result<()> {
    let manifest = execute(&context)?;
    write_manifest(&context.manifest_path(MANIFEST_NAME), &manifest)
}
