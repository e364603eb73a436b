use std::path::Path;

use anyhow::Result;
use tracing::info;

use crate::commands::{RunContext, extract, integrate, tournament, verify};
use crate::config::Settings;
use crate::storage::DocumentStore;

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineSummary {
    pub families: usize,
    pub documents_with_improvements: usize,
    pub documents_integrated: usize,
    pub passed: usize,
    pub failed: usize,
}

/// All four stages back to back, handing results over in memory. Every
/// stage still writes its manifest and report. When no champion can be
/// improved the run ends after extraction.
pub fn execute(
    settings: &Settings,
    store: &dyn DocumentStore,
    manifest_dir: &Path,
) -> Result<PipelineSummary> {
    let mut summary = PipelineSummary::default();

    let tournaments = tournament::execute(settings, store)?;
    summary.families = tournaments.len();
    let tournament_manifest = tournament::build_manifest(settings, tournaments);
    tournament::write_manifest(
        &manifest_dir.join(tournament::MANIFEST_NAME),
        &tournament_manifest,
    )?;

    let documents = extract::run_extraction(&tournament_manifest.families, settings, store)?;
    summary.documents_with_improvements = documents.len();
    let improvement_manifest = extract::build_manifest(summary.families, documents);
    extract::write_manifest(
        &manifest_dir.join(extract::MANIFEST_NAME),
        &improvement_manifest,
    )?;

    if improvement_manifest.documents.is_empty() {
        info!(families = summary.families, "all champions already comprehensive");
        return Ok(summary);
    }

    let integrated = integrate::run_integration(&improvement_manifest.documents, settings, store)?;
    summary.documents_integrated = integrated.len();
    integrate::write_integration_report(settings, &integrated, summary.families, store)?;

    if integrated.is_empty() {
        let manifest = integrate::build_manifest(settings, integrated);
        integrate::write_manifest(&manifest_dir.join(integrate::MANIFEST_NAME), &manifest)?;
        info!("no documents integrated, skipping verification");
        return Ok(summary);
    }

    let verified = verify::run_verification(&integrated, settings, store)?;
    verify::write_verification_report(settings, &verified, store)?;

    let integration_manifest = integrate::build_manifest(settings, integrated);
    integrate::write_manifest(
        &manifest_dir.join(integrate::MANIFEST_NAME),
        &integration_manifest,
    )?;

    let verification_manifest = verify::build_manifest(verified);
    summary.passed = verification_manifest.passed;
    summary.failed = verification_manifest.failed;
    verify::write_manifest(
        &manifest_dir.join(verify::MANIFEST_NAME),
        &verification_manifest,
    )?;

    Ok(summary)
}

pub fn run(context: RunContext) -> Result<()> {
    let summary = execute(&context.settings, &context.store, &context.manifest_dir)?;

    info!(
        families = summary.families,
        documents_with_improvements = summary.documents_with_improvements,
        documents_integrated = summary.documents_integrated,
        passed = summary.passed,
        failed = summary.failed,
        output_directory = %context.settings.output_directory().display(),
        "consolidation complete"
    );

    Ok(())
}
