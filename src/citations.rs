//! Lexical legal-citation detection. Best-effort pattern matching over a
//! fixed set of citation shapes, not legal analysis.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use regex::Regex;

use crate::model::{CitationCategory, CitationCounts, CitationDelta};

/// Substrings counted by the tournament citation score.
pub const SCORING_MARKERS: [&str; 8] = [
    "Matter of ",
    "v.",
    "U.S.C.",
    "C.F.R.",
    "INA §",
    "Form I-",
    "8 CFR",
    "8 USC",
];

pub fn scoring_marker_count(text: &str) -> usize {
    SCORING_MARKERS
        .iter()
        .map(|marker| text.matches(marker).count())
        .sum()
}

#[derive(Debug, Clone)]
struct CategoryPatterns {
    category: CitationCategory,
    mention: Regex,
    sentence: Regex,
}

#[derive(Debug, Clone)]
pub struct CitationScanner {
    patterns: Vec<CategoryPatterns>,
}

impl CitationScanner {
    pub fn new() -> Result<Self> {
        let specs = [
            (
                CitationCategory::CasePrecedent,
                r"Matter of [A-Z]",
                r"Matter of [A-Z][^.]*\.",
            ),
            (
                CitationCategory::Statute,
                r"\d+\s+U\.?S\.?C\.?",
                r"\d+\s+U\.?S\.?C\.?\s*§?\s*\d+[^.]*\.",
            ),
            (
                CitationCategory::Regulation,
                r"\d+\s+C\.?F\.?R\.?",
                r"\d+\s+C\.?F\.?R\.?\s*§?\s*\d+[^.]*\.",
            ),
            (
                CitationCategory::AgencyCode,
                r"INA\s*§\s*\d+",
                r"INA\s*§\s*\d+[^.]*\.",
            ),
            (
                CitationCategory::FormReference,
                r"Form I-\d+",
                r"Form I-\d+[^.]*\.",
            ),
            (
                CitationCategory::JudicialOpinion,
                r"\d+\s+F\.\d+d\s+\d+",
                r"\d+\s+F\.\d+d\s+\d+[^.]*\.",
            ),
        ];

        let mut patterns = Vec::with_capacity(specs.len());
        for (category, mention, sentence) in specs {
            patterns.push(CategoryPatterns {
                category,
                mention: Regex::new(mention).with_context(|| {
                    format!("failed to compile {} citation regex", category.as_str())
                })?,
                sentence: Regex::new(sentence).with_context(|| {
                    format!("failed to compile {} sentence regex", category.as_str())
                })?,
            });
        }

        Ok(Self { patterns })
    }

    pub fn count(&self, text: &str) -> CitationCounts {
        let mut counts = CitationCounts::default();
        for pattern in &self.patterns {
            counts.set(pattern.category, pattern.mention.find_iter(text).count());
        }
        counts
    }

    /// Categories where `other` cites strictly more often than `champion`.
    pub fn compare(&self, champion: &str, other: &str) -> BTreeMap<CitationCategory, CitationDelta> {
        let champion_counts = self.count(champion);
        let other_counts = self.count(other);

        CitationCategory::ALL
            .iter()
            .filter_map(|category| {
                let champion_count = champion_counts.get(*category);
                let other_count = other_counts.get(*category);
                (other_count > champion_count).then(|| {
                    (
                        *category,
                        CitationDelta {
                            champion_count,
                            other_count,
                            difference: other_count - champion_count,
                        },
                    )
                })
            })
            .collect()
    }

    /// Up to `limit` citation sentences of `category`, in document order.
    pub fn extract_sentences(
        &self,
        text: &str,
        category: CitationCategory,
        limit: usize,
    ) -> Vec<String> {
        self.patterns
            .iter()
            .find(|pattern| pattern.category == category)
            .map(|pattern| {
                pattern
                    .sentence
                    .find_iter(text)
                    .take(limit)
                    .map(|found| found.as_str().trim().to_string())
                    .collect()
            })
            .unwrap_or_default()
    }
}
