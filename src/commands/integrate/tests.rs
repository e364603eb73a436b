use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::*;
use crate::commands::extract::Extractor;
use crate::model::{CitationCategory, CitationDelta, ImprovementSource, ImprovementValue};
use crate::storage::memory::MemoryStore;

fn integrator() -> Integrator {
    Integrator::new(&IntegrationSettings::default()).expect("integrator should build")
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(0, 0).expect("valid timestamp")
}

fn source(folder: &str) -> ImprovementSource {
    ImprovementSource {
        folder: folder.to_string(),
        path: PathBuf::from(format!("/in/{folder}/brief.md")),
        value: ImprovementValue::High,
        reason: "test".to_string(),
    }
}

fn payload(title: &str, content: &str) -> SectionPayload {
    SectionPayload {
        title: title.to_string(),
        level: 2,
        content: content.to_string(),
        line_start: 0,
        line_end: content.split('\n').count() - 1,
    }
}

fn new_section(folder: &str, title: &str, content: &str) -> UniqueImprovement {
    UniqueImprovement::NewSection {
        source: source(folder),
        section: payload(title, content),
    }
}

fn enhanced_section(folder: &str, title: &str, content: &str) -> UniqueImprovement {
    UniqueImprovement::EnhancedSection {
        source: source(folder),
        section: payload(title, content),
        similarity: 0.4,
        added_line_count: 3,
        additions_preview: Vec::new(),
    }
}

fn citation_enhancement(folder: &str, difference: usize) -> UniqueImprovement {
    UniqueImprovement::CitationEnhancement {
        source: source(folder),
        citations: BTreeMap::from([(
            CitationCategory::FormReference,
            CitationDelta {
                champion_count: 0,
                other_count: difference,
                difference,
            },
        )]),
    }
}

fn document(improvements: Vec<UniqueImprovement>) -> DocumentImprovements {
    DocumentImprovements {
        filename: "brief.md".to_string(),
        champion_folder: "a".to_string(),
        champion_path: PathBuf::from("/in/a/brief.md"),
        champion_score: 30.0,
        improvements,
    }
}

fn position(text: &str, needle: &str) -> usize {
    text.find(needle)
        .unwrap_or_else(|| panic!("{needle:?} missing from {text:?}"))
}

#[test]
fn extracted_new_section_lands_in_merged_text() {
    let champion = "# D\n## S\nbasic\n";
    let other = "# D\n## S\nbasic\n## New\nextra\n";
    let extractor = Extractor::new(&IntegrationSettings::default()).expect("extractor");
    let improvements =
        extractor.find_unique_sections(champion, other, "b", &PathBuf::from("/in/b/brief.md"));

    let merge = integrator().merge(champion, &improvements, &MemoryStore::new());

    assert_eq!(merge.integrated(), 1);
    assert!(merge.text.contains("## S"));
    assert!(merge.text.contains("## New"));
    assert!(merge.text.contains("*[Integrated from b]*"));
    assert!(position(&merge.text, "## S") < position(&merge.text, "## New"));
}

#[test]
fn new_section_goes_before_footer_rule() {
    let champion = "# D\n## A\nbody\n\n---\nfooter note";
    let merge = integrator().merge(
        champion,
        &[new_section("b", "Added", "## Added\nfresh")],
        &MemoryStore::new(),
    );

    assert!(position(&merge.text, "## Added") < position(&merge.text, "---"));
    assert!(merge.text.ends_with("---\nfooter note"));
}

#[test]
fn enhanced_section_is_appended_after_its_match() {
    let champion = "# D\n## Facts\noriginal facts\n### Detail\nd\n## Law\nlaw";
    let merge = integrator().merge(
        champion,
        &[enhanced_section("b", "FACTS", "## Facts\nmore facts")],
        &MemoryStore::new(),
    );

    let added = position(&merge.text, "more facts");
    assert!(position(&merge.text, "original facts") < added);
    assert!(added < position(&merge.text, "### Detail"));
}

#[test]
fn unmatched_enhanced_section_falls_back_to_footer_point() {
    let champion = "# D\n## Other\nx\n---\nend";
    let merge = integrator().merge(
        champion,
        &[enhanced_section("b", "Missing", "## Missing\ny")],
        &MemoryStore::new(),
    );
    assert!(position(&merge.text, "## Missing") < position(&merge.text, "---"));
}

#[test]
fn enhanced_sections_apply_before_new_sections() {
    let champion = "# D\n## Facts\nx";
    let merge = integrator().merge(
        champion,
        &[
            new_section("c", "Fresh", "## Fresh\nnew"),
            enhanced_section("b", "Facts", "## Facts\nextended"),
        ],
        &MemoryStore::new(),
    );

    assert_eq!(merge.integrated(), 2);
    assert!(position(&merge.text, "extended") < position(&merge.text, "## Fresh"));
}

#[test]
fn original_lines_survive_merging() {
    let champion = "# Brief\n\n## Facts\nThe applicant filed.\n## Law\nSee INA § 208.\n\n---\nPrepared by counsel";
    let merge = integrator().merge(
        champion,
        &[
            enhanced_section("b", "Facts", "## Facts\nline a\nline b\nline c"),
            new_section("c", "Relief", "## Relief\nAsylum."),
        ],
        &MemoryStore::new(),
    );

    for line in champion.lines() {
        assert!(merge.text.contains(line), "lost line {line:?}");
    }
}

#[test]
fn block_layout_respects_attribution_toggle() {
    let section = payload("New", "## New\nextra");

    assert_eq!(
        integrator().format_block(&section, "b"),
        vec!["", "## New", "*[Integrated from b]*", "", "extra", ""]
    );

    let quiet = Integrator::new(&IntegrationSettings {
        preserve_source_attribution: false,
        ..IntegrationSettings::default()
    })
    .expect("integrator");
    assert_eq!(
        quiet.format_block(&section, "b"),
        vec!["", "## New", "", "extra", ""]
    );
}

#[test]
fn block_keeps_original_header_level() {
    let section = SectionPayload {
        level: 3,
        ..payload("Deep", "### Deep\nbody")
    };
    assert_eq!(integrator().format_block(&section, "b")[1], "### Deep");
}

#[test]
fn citation_sentences_are_added_up_to_the_delta() {
    let store = MemoryStore::new();
    store.insert(
        "/in/b/brief.md",
        "File Form I-130 with the petition. Then Form I-485 follows. Form I-765 is optional.",
        epoch(),
    );

    let champion = "# D\n## A\nx\n---\nend";
    let merge = integrator().merge(champion, &[citation_enhancement("b", 2)], &store);

    assert_eq!(merge.integrated(), 1);
    assert!(merge.text.contains(CITATIONS_HEADER));
    assert!(merge.text.contains("- Form I-130 with the petition."));
    assert!(merge.text.contains("- Form I-485 follows."));
    assert!(!merge.text.contains("I-765"));
    assert!(position(&merge.text, CITATIONS_HEADER) < position(&merge.text, "---"));
}

#[test]
fn citation_pass_respects_skip_flag_and_unreadable_sources() {
    let skipping = Integrator::new(&IntegrationSettings {
        skip_citation_enhancement: true,
        ..IntegrationSettings::default()
    })
    .expect("integrator");
    let store = MemoryStore::new();
    store.insert("/in/b/brief.md", "File Form I-130 now.", epoch());

    let merge = skipping.merge("# D", &[citation_enhancement("b", 1)], &store);
    assert_eq!(merge.integrated(), 0);
    assert_eq!(merge.text, "# D");

    let merge = integrator().merge("# D", &[citation_enhancement("b", 1)], &MemoryStore::new());
    assert_eq!(merge.integrated(), 0);
}

#[test]
fn footer_point_prefers_rule_above_evolution_header() {
    let lines = vec!["# D", "body", "", "---", "", "## Document Evolution", "stats"];
    assert_eq!(footer_insertion_point(&lines), 3);

    let lines = vec!["# D", "**Document Evolution**: none"];
    assert_eq!(footer_insertion_point(&lines), 1);

    let lines = vec!["# D", "body"];
    assert_eq!(footer_insertion_point(&lines), 2);
}

#[test]
fn insert_block_clamps_to_end() {
    let block = vec!["x".to_string()];
    assert_eq!(insert_block("a\nb", 1, &block), "a\nx\nb");
    assert_eq!(insert_block("a\nb", 99, &block), "a\nb\nx");
}

#[test]
fn evolution_footer_tallies_sources() {
    let per_source = BTreeMap::from([("b".to_string(), 2), ("c".to_string(), 1)]);
    let footer = evolution_footer(10, 25, &per_source, "2026-01-02");

    assert!(footer.contains(&"## Document Evolution".to_string()));
    assert!(footer.contains(&"**Original Champion Lines**: 10".to_string()));
    assert!(footer.contains(&"**Integrated Lines**: 25 (+15 lines)".to_string()));
    assert!(footer.contains(&"**Improvements Integrated**: 3".to_string()));
    assert!(footer.contains(&"- b: 2 improvements".to_string()));
    assert!(footer.contains(&"**Last Updated**: 2026-01-02".to_string()));
}

#[test]
fn integrate_document_reports_line_growth() {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", "# D\n## S\nbasic\n", epoch());

    let result = integrator()
        .integrate_document(
            &document(vec![new_section("b", "New", "## New\nextra\n")]),
            &store,
        )
        .expect("integration should succeed")
        .expect("one improvement integrated");

    assert_eq!(result.original_line_count, 4);
    assert_eq!(result.integrated_line_count, line_count(&result.integrated_content));
    assert_eq!(
        result.added_lines,
        result.integrated_line_count - result.original_line_count
    );
    assert_eq!(result.improvements_integrated, 1);
    assert_eq!(result.source_folders, BTreeSet::from(["b".to_string()]));
    assert!(result.integrated_content.starts_with("# D\n## S\nbasic\n"));
    assert!(result.integrated_content.contains("## Document Evolution"));
    assert!(result.integrated_content.contains("**Integrated Lines**: 11 (+7 lines)"));
    assert!(result.integrated_content.contains("- b: 1 improvements"));
}

#[test]
fn integrate_document_without_metadata_leaves_no_footer() {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", "# D\n## S\nbasic", epoch());
    let plain = Integrator::new(&IntegrationSettings {
        add_evolution_metadata: false,
        ..IntegrationSettings::default()
    })
    .expect("integrator");

    let result = plain
        .integrate_document(&document(vec![new_section("b", "New", "## New\nx")]), &store)
        .expect("integration should succeed")
        .expect("integrated");
    assert!(!result.integrated_content.contains("Document Evolution"));
}

#[test]
fn integrate_document_returns_none_when_nothing_lands() {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", "# D", epoch());

    let result = integrator()
        .integrate_document(&document(vec![citation_enhancement("missing", 1)]), &store)
        .expect("integration should succeed");
    assert!(result.is_none());
}

#[test]
fn run_integration_writes_comprehensive_files() {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", "# D\n## S\nbasic\n", epoch());
    let settings = Settings {
        input_directory: PathBuf::from("/in"),
        ..Settings::default()
    };

    let results = run_integration(
        &[document(vec![new_section("b", "New", "## New\nextra\n")])],
        &settings,
        &store,
    )
    .expect("integration should run");

    assert_eq!(results.len(), 1);
    let written = store
        .get(&PathBuf::from("/in/output/COMPREHENSIVE_brief.md"))
        .expect("output written");
    assert_eq!(written, results[0].integrated_content);
}

#[test]
fn run_integration_requires_improvements() {
    let err = run_integration(&[], &Settings::default(), &MemoryStore::new())
        .expect_err("empty input");
    assert!(matches!(
        err.downcast_ref::<ConsolidationError>(),
        Some(ConsolidationError::NoImprovements)
    ));
}

#[test]
fn missing_champion_is_reported() {
    let err = integrator()
        .integrate_document(
            &document(vec![new_section("b", "New", "## New\nx")]),
            &MemoryStore::new(),
        )
        .expect_err("champion missing");
    assert!(matches!(
        err.downcast_ref::<ConsolidationError>(),
        Some(ConsolidationError::ChampionUnavailable { .. })
    ));
}
