use std::collections::HashSet;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use regex::Regex;
use tracing::{info, warn};

use crate::commands::{RunContext, integrate, report};
use crate::config::{Settings, VerificationSettings};
use crate::error::ConsolidationError;
use crate::markdown::MarkdownParser;
use crate::model::{
    IntegrationManifest, IntegrationResult, IssueCategory, Severity, VerificationIssue,
    VerificationManifest, VerificationResult,
};
use crate::storage::DocumentStore;
use crate::util::{line_count, now_utc_string, read_json, write_json_pretty};


pub const MANIFEST_NAME: &str = "verification_results.json";
pub const REPORT_NAME: &str = "VERIFICATION_REPORT.md";

const EVOLUTION_HEADER: &str = "## Document Evolution";
const MALFORMED_PREVIEW_CHARS: usize = 50;

fn issue(
    category: IssueCategory,
    severity: Severity,
    message: String,
    line_number: Option<usize>,
) -> VerificationIssue {
    VerificationIssue {
        category,
        severity,
        message,
        line_number,
    }
}

#[derive(Debug, Clone)]
pub struct Verifier {
    settings: VerificationSettings,
    expect_evolution: bool,
    parser: MarkdownParser,
    well_formed_header: Regex,
}

impl Verifier {
    pub fn new(settings: &Settings) -> Result<Self> {
        Ok(Self {
            settings: settings.verification.clone(),
            expect_evolution: settings.integration.add_evolution_metadata,
            parser: MarkdownParser::new()?,
            well_formed_header: Regex::new(r"^#{1,6}\s+.+$")
                .context("failed to compile header format regex")?,
        })
    }

    pub fn check_formatting(&self, text: &str) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();
        let mut blank_run = 0usize;

        for (index, line) in text.split('\n').enumerate() {
            let line_number = index + 1;

            if line.starts_with('#') && !self.well_formed_header.is_match(line) {
                let preview = line.chars().take(MALFORMED_PREVIEW_CHARS).collect::<String>();
                issues.push(issue(
                    IssueCategory::Formatting,
                    Severity::Medium,
                    format!("Malformed header: {preview}"),
                    Some(line_number),
                ));
            }

            if line.trim().is_empty() {
                blank_run += 1;
                if blank_run == self.settings.max_consecutive_blank_lines + 1 {
                    issues.push(issue(
                        IssueCategory::Formatting,
                        Severity::Low,
                        format!("Excessive blank lines ({blank_run} consecutive)"),
                        Some(line_number),
                    ));
                }
            } else {
                blank_run = 0;
            }
        }

        if self.expect_evolution
            && !text
                .split('\n')
                .any(|line| line.starts_with(EVOLUTION_HEADER))
        {
            issues.push(issue(
                IssueCategory::Formatting,
                Severity::Medium,
                "Missing Document Evolution metadata section".to_string(),
                None,
            ));
        }

        issues
    }

    /// Flags any header more than one level deeper than the one before it.
    pub fn check_numbering(&self, text: &str) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();
        let mut previous = 1usize;

        for header in self.parser.headers(text) {
            if header.level > previous + 1 {
                issues.push(issue(
                    IssueCategory::Numbering,
                    Severity::Low,
                    format!("Section level jump from {previous} to {}", header.level),
                    Some(header.index + 1),
                ));
            }
            previous = header.level;
        }

        issues
    }

    pub fn check_duplication(&self, text: &str) -> Vec<VerificationIssue> {
        let mut seen = HashSet::new();

        self.parser
            .headers(text)
            .into_iter()
            .filter(|header| header.level == 2)
            .filter(|header| !seen.insert(header.title.to_lowercase()))
            .map(|header| {
                issue(
                    IssueCategory::Duplication,
                    Severity::High,
                    format!("Duplicate section title: {}", header.title),
                    Some(header.index + 1),
                )
            })
            .collect()
    }

    pub fn check_navigability(&self, text: &str) -> Vec<VerificationIssue> {
        if self.parser.count_headers_at_level(text, 2) > 0 {
            return Vec::new();
        }
        vec![issue(
            IssueCategory::Navigation,
            Severity::Medium,
            "Document may not be navigable (no clear sections)".to_string(),
            None,
        )]
    }

    /// Issues from every enabled check, in check order.
    pub fn verify_text(&self, text: &str) -> Vec<VerificationIssue> {
        let mut issues = Vec::new();
        if self.settings.check_markdown_formatting {
            issues.extend(self.check_formatting(text));
        }
        if self.settings.check_section_numbering {
            issues.extend(self.check_numbering(text));
        }
        if self.settings.check_no_duplication {
            issues.extend(self.check_duplication(text));
        }
        if self.settings.check_document_navigability {
            issues.extend(self.check_navigability(text));
        }
        issues
    }

    pub fn verify_document(&self, path: &Path, store: &dyn DocumentStore) -> Result<VerificationResult> {
        let text = store.read_document(path)?;
        let issues = self.verify_text(&text);
        let filename = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(ToOwned::to_owned)
            .with_context(|| format!("invalid document name: {}", path.display()))?;

        let result = VerificationResult {
            filename,
            path: path.to_path_buf(),
            line_count: line_count(&text),
            passed: issues.is_empty(),
            issues,
            verified_at: Utc::now(),
        };

        if result.passed {
            info!(filename = %result.filename, "verification passed");
        } else {
            warn!(
                filename = %result.filename,
                issues = result.issue_count(),
                "verification found issues"
            );
        }

        Ok(result)
    }
}

/// Verifies the written output of each integration result. Missing or
/// unreadable outputs are skipped.
pub fn run_verification(
    results: &[IntegrationResult],
    settings: &Settings,
    store: &dyn DocumentStore,
) -> Result<Vec<VerificationResult>> {
    if results.is_empty() {
        return Err(ConsolidationError::NoIntegrationResults.into());
    }

    let verifier = Verifier::new(settings)?;
    info!(documents = results.len(), "starting quality verification");

    let mut verified = Vec::with_capacity(results.len());
    for result in results {
        let path = settings.output_path_for(&result.filename);
        if !store.document_exists(&path) {
            warn!(path = %path.display(), "integrated document not found");
            continue;
        }

        match verifier.verify_document(&path, store) {
            Ok(outcome) => verified.push(outcome),
            Err(err) => warn!(path = %path.display(), error = %err, "verification skipped"),
        }
    }

    let passed = verified.iter().filter(|result| result.passed).count();
    info!(
        verified = verified.len(),
        passed,
        failed = verified.len() - passed,
        "quality verification complete"
    );

    Ok(verified)
}

pub fn build_manifest(results: Vec<VerificationResult>) -> VerificationManifest {
    let passed = results.iter().filter(|result| result.passed).count();
    VerificationManifest {
        manifest_version: 1,
        generated_at: now_utc_string(),
        passed,
        failed: results.len() - passed,
        results,
    }
}

pub fn write_manifest(path: &Path, manifest: &VerificationManifest) -> Result<()> {
    write_json_pretty(path, manifest)?;
    info!(
        path = %path.display(),
        passed = manifest.passed,
        failed = manifest.failed,
        "wrote verification manifest"
    );
    Ok(())
}

pub fn write_verification_report(
    settings: &Settings,
    results: &[VerificationResult],
    store: &dyn DocumentStore,
) -> Result<()> {
    let summary = report::verification_report(results, Utc::now());
    report::write_report(&settings.output_directory().join(REPORT_NAME), &summary, store)
}

/// Reads the integration manifest, or reruns integration when it is missing
/// or a refresh was requested.
pub fn load_or_refresh_integration(context: &RunContext) -> Result<IntegrationManifest> {
    let path = context.manifest_path(integrate::MANIFEST_NAME);
    if context.refresh || !path.exists() {
        let manifest = integrate::execute(context)?;
        integrate::write_manifest(&path, &manifest)?;
        return Ok(manifest);
    }

    let manifest: IntegrationManifest = read_json(&path)?;
    info!(
        path = %path.display(),
        documents = manifest.documents.len(),
        "loaded existing integration manifest"
    );
    Ok(manifest)
}

pub fn run(context: RunContext) -> Result<()> {
    let integration = load_or_refresh_integration(&context)?;

    let results = run_verification(&integration.documents, &context.settings, &context.store)?;
    write_verification_report(&context.settings, &results, &context.store)?;

    let manifest = build_manifest(results);
    write_manifest(&context.manifest_path(MANIFEST_NAME), &manifest)
}
