//! Markdown run reports written next to the integrated documents.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::info;

use crate::config::TournamentSettings;
use crate::model::{IntegrationResult, IssueCategory, VerificationIssue, VerificationResult};
use crate::storage::DocumentStore;

const ISSUES_PER_CATEGORY: usize = 5;
const RULE: &str = "\n---\n";

fn timestamp(generated: DateTime<Utc>) -> String {
    generated.format("%Y-%m-%d %H:%M:%S").to_string()
}

pub fn integration_report(
    results: &[IntegrationResult],
    families: usize,
    weights: &TournamentSettings,
    generated: DateTime<Utc>,
) -> String {
    let total_original: usize = results.iter().map(|result| result.original_line_count).sum();
    let total_added: usize = results.iter().map(|result| result.added_lines).sum();

    let mut lines = vec![
        "# Document Consolidation Report".to_string(),
        format!("\n**Completion Date**: {}", timestamp(generated)),
        "**Status**: COMPLETE".to_string(),
        RULE.to_string(),
        "## Executive Summary".to_string(),
        format!("\nConsolidated **{families} document families** using tournament ranking."),
        "\n**Integration Results**:".to_string(),
        format!("- Documents with improvements: {}", results.len()),
        format!(
            "- Documents already comprehensive: {}",
            families.saturating_sub(results.len())
        ),
        format!("- Total lines added: {total_added}"),
    ];
    if total_original > 0 {
        lines.push(format!(
            "- Average growth: {:.1}%",
            total_added as f64 / total_original as f64 * 100.0
        ));
    }

    lines.extend([
        RULE.to_string(),
        "## Tournament Methodology".to_string(),
        format!(
            "\n### Evaluation Criteria (0-{} points total)",
            weights.total_weight()
        ),
        format!(
            "1. **Completeness** (weight {}): Document length, section count, subsection depth",
            weights.completeness_weight
        ),
        format!(
            "2. **Recency** (weight {}): Modification timestamps",
            weights.recency_weight
        ),
        format!(
            "3. **Structure** (weight {}): Markdown hierarchy, headers, lists, code blocks",
            weights.structure_weight
        ),
        format!(
            "4. **Citations** (weight {}): Legal citations, case law references",
            weights.citations_weight
        ),
        format!(
            "5. **Arguments** (weight {}): Legal reasoning density",
            weights.arguments_weight
        ),
        RULE.to_string(),
        "## Integration Results by Document".to_string(),
    ]);

    let mut ordered = results.iter().collect::<Vec<&IntegrationResult>>();
    ordered.sort_by(|a, b| {
        b.added_lines
            .cmp(&a.added_lines)
            .then_with(|| a.filename.cmp(&b.filename))
    });
    for result in ordered {
        lines.extend([
            format!("\n### {}", result.filename),
            format!("- **Champion**: {}", result.champion_folder),
            format!("- **Original Lines**: {}", result.original_line_count),
            format!("- **Integrated Lines**: {}", result.integrated_line_count),
            format!(
                "- **Added Lines**: +{} (+{:.1}%)",
                result.added_lines,
                result.growth_percentage()
            ),
            format!("- **Improvements Integrated**: {}", result.improvements_integrated),
            format!(
                "- **Source Folders**: {}",
                result
                    .source_folders
                    .iter()
                    .map(String::as_str)
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ]);
    }

    lines.push(RULE.to_string());
    lines.push("\n**Status**: COMPREHENSIVE MASTER DOCUMENTS READY FOR USE".to_string());
    lines.join("\n")
}

fn issue_line(issue: &VerificationIssue) -> String {
    match issue.line_number {
        Some(line) => format!("- {} (Line {line})", issue.message),
        None => format!("- {}", issue.message),
    }
}

pub fn verification_report(results: &[VerificationResult], generated: DateTime<Utc>) -> String {
    let passed = results.iter().filter(|result| result.passed).count();
    let total = results.len();

    let mut lines = vec![
        "# Document Verification Report".to_string(),
        format!("\n**Date**: {}", timestamp(generated)),
        RULE.to_string(),
        "## Summary".to_string(),
        format!("\n- **Documents Verified**: {total}"),
        format!("- **Passed**: {passed}"),
        format!("- **Failed**: {}", total - passed),
        RULE.to_string(),
    ];

    let failed = results
        .iter()
        .filter(|result| !result.passed)
        .collect::<Vec<&VerificationResult>>();

    if failed.is_empty() {
        lines.push("## All Documents Passed Verification".to_string());
    } else {
        lines.push("## Documents with Issues".to_string());
        for result in failed {
            lines.push(format!("\n### {}", result.filename));
            lines.push(format!("- **Issues**: {}", result.issue_count()));

            let mut grouped: BTreeMap<IssueCategory, Vec<&VerificationIssue>> = BTreeMap::new();
            for issue in &result.issues {
                grouped.entry(issue.category).or_default().push(issue);
            }

            for (category, issues) in grouped {
                lines.push(format!("\n**{} Issues ({})**:", category.label(), issues.len()));
                lines.extend(issues.iter().take(ISSUES_PER_CATEGORY).map(|issue| issue_line(issue)));
                if issues.len() > ISSUES_PER_CATEGORY {
                    lines.push(format!(
                        "- ... and {} more",
                        issues.len() - ISSUES_PER_CATEGORY
                    ));
                }
            }
        }
    }

    lines.push(RULE.to_string());
    let status = if passed == total { "PASSED" } else { "ISSUES FOUND" };
    lines.push(format!("\n**Overall Status**: {status}"));
    lines.join("\n")
}

pub fn write_report(path: &Path, content: &str, store: &dyn DocumentStore) -> Result<()> {
    store.write_document(path, content)?;
    info!(path = %path.display(), "report written");
    Ok(())
}
