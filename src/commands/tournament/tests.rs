use std::path::PathBuf;

use chrono::{DateTime, Utc};

use super::*;
use crate::model::DocumentVersion;
use crate::storage::memory::MemoryStore;
use crate::util::{line_count, sha256_text};

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(seconds, 0).expect("valid timestamp")
}

fn version(folder: &str, content: &str, modified: DateTime<Utc>) -> DocumentVersion {
    DocumentVersion {
        path: PathBuf::from(format!("/in/{folder}/brief.md")),
        folder: folder.to_string(),
        content: content.to_string(),
        line_count: line_count(content),
        modified,
        content_hash: sha256_text(content),
    }
}

fn versions(entries: &[(&str, &str, i64)]) -> VersionMap {
    entries
        .iter()
        .map(|(folder, content, seconds)| {
            (folder.to_string(), version(folder, content, at(*seconds)))
        })
        .collect()
}

fn scorer() -> Scorer {
    Scorer::new(&TournamentSettings::default()).expect("scorer should build")
}

const RICH: &str = "\
# Asylum Brief

## Background
The applicant arrived in 2019. Therefore the filing is timely.

## Argument
- Matter of Acosta controls.
- 8 U.S.C. 1158 establishes eligibility.
- Form I-589 was filed pursuant to 8 CFR 208.4.

### Analysis
However, the record demonstrates persecution.

```
exhibit list
```
";

const THIN: &str = "# Asylum Brief\nDraft notes only.";

#[test]
fn scores_stay_within_bounds_and_total_is_component_sum() {
    let family = versions(&[("a", RICH, 100), ("b", THIN, 200), ("c", "plain", 300)]);
    let scores = scorer().score_versions(&family);

    assert_eq!(scores.len(), 3);
    for breakdown in scores.values() {
        for component in [
            breakdown.completeness,
            breakdown.recency,
            breakdown.structure,
            breakdown.citations,
            breakdown.arguments,
        ] {
            assert!((0.0..=10.0).contains(&component), "component {component}");
        }
        let sum = breakdown.completeness
            + breakdown.recency
            + breakdown.structure
            + breakdown.citations
            + breakdown.arguments;
        assert_eq!(breakdown.total(), sum);
        assert!((0.0..=50.0).contains(&breakdown.total()));
    }
}

#[test]
fn identical_modification_times_give_neutral_recency() {
    let family = versions(&[("a", RICH, 500), ("b", THIN, 500)]);
    let scores = scorer().score_versions(&family);

    assert_eq!(scores["a"].recency, 5.0);
    assert_eq!(scores["b"].recency, 5.0);
}

#[test]
fn recency_spans_oldest_to_newest() {
    let family = versions(&[("a", THIN, 100), ("b", THIN, 150), ("c", THIN, 200)]);
    let scores = scorer().score_versions(&family);

    assert_eq!(scores["a"].recency, 0.0);
    assert_eq!(scores["b"].recency, 5.0);
    assert_eq!(scores["c"].recency, 10.0);
}

#[test]
fn structure_awards_each_element_once() {
    let family = versions(&[
        ("full", "# T\n## A\n- item\n```\ncode\n```", 1),
        ("bare", "no structure at all", 1),
        ("title", "\n\n# Only Title\ntext", 1),
    ]);
    let scores = scorer().score_versions(&family);

    assert_eq!(scores["full"].structure, 10.0);
    assert_eq!(scores["bare"].structure, 0.0);
    assert_eq!(scores["title"].structure, 2.5);
}

#[test]
fn richer_version_becomes_champion() {
    let family = versions(&[("draft", THIN, 100), ("final", RICH, 200)]);
    let result = run_tournament("brief.md", &family, &scorer()).expect("tournament should run");

    assert_eq!(result.champion_folder, "final");
    assert_eq!(result.champion_path, PathBuf::from("/in/final/brief.md"));
    assert_eq!(result.version_count, 2);
    assert_eq!(result.runners_up.len(), 1);
    assert_eq!(result.runners_up[0].folder, "draft");
    assert!(result.champion_score > result.runners_up[0].score);
    assert_eq!(result.champion_score, result.champion_breakdown.total());
    assert!(result.all_scores.contains_key(&result.champion_folder));
}

#[test]
fn ties_go_to_smallest_folder_name() {
    let family = versions(&[("zeta", RICH, 100), ("alpha", RICH, 100), ("mid", RICH, 100)]);
    let result = run_tournament("brief.md", &family, &scorer()).expect("tournament should run");

    assert_eq!(result.champion_folder, "alpha");
    let runner_folders = result
        .runners_up
        .iter()
        .map(|runner| runner.folder.as_str())
        .collect::<Vec<_>>();
    assert_eq!(runner_folders, vec!["mid", "zeta"]);
}

#[test]
fn tournament_is_deterministic() {
    let family = versions(&[("a", RICH, 100), ("b", THIN, 200), ("c", RICH, 300)]);
    let scorer = scorer();

    let first = run_tournament("brief.md", &family, &scorer).expect("first run");
    let second = run_tournament("brief.md", &family, &scorer).expect("second run");
    assert_eq!(first, second);
}

#[test]
fn empty_family_is_insufficient_input() {
    let result = run_tournament("brief.md", &VersionMap::new(), &scorer());
    assert!(matches!(
        result,
        Err(ConsolidationError::InsufficientInput(name)) if name == "brief.md"
    ));
}

#[test]
fn zero_weight_silences_a_criterion() {
    let weights = TournamentSettings {
        recency_weight: 0.0,
        ..TournamentSettings::default()
    };
    let scorer = Scorer::new(&weights).expect("scorer should build");
    let family = versions(&[("a", THIN, 100), ("b", THIN, 200)]);
    let scores = scorer.score_versions(&family);

    assert_eq!(scores["a"].recency, 0.0);
    assert_eq!(scores["b"].recency, 0.0);
}

fn seeded_store() -> MemoryStore {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", RICH, at(100));
    store.insert("/in/b/brief.md", THIN, at(200));
    store.insert("/in/a/only-in-a.md", "# Solo", at(100));
    store.insert("/in/output/brief.md", RICH, at(300));
    store
}

fn settings() -> Settings {
    Settings {
        input_directory: PathBuf::from("/in"),
        ..Settings::default()
    }
}

#[test]
fn grouping_keeps_multi_version_families_and_skips_output_folder() {
    let store = seeded_store();
    let groups = group_document_versions(&settings(), &store).expect("groups should build");

    assert_eq!(groups.len(), 1);
    let family = &groups["brief.md"];
    assert_eq!(family.keys().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(family["b"].folder, "b");
}

#[test]
fn configured_source_folders_limit_discovery() {
    let store = seeded_store();
    store.insert("/in/c/brief.md", THIN, at(50));

    let settings = Settings {
        source_folders: vec!["b".to_string(), "c".to_string()],
        ..settings()
    };
    let groups = group_document_versions(&settings, &store).expect("groups should build");
    assert_eq!(groups["brief.md"].keys().collect::<Vec<_>>(), vec!["b", "c"]);
}

#[test]
fn grouping_without_shared_files_is_an_error() {
    let store = MemoryStore::new();
    store.insert("/in/a/one.md", "# One", at(1));
    store.insert("/in/b/two.md", "# Two", at(1));

    let err = group_document_versions(&settings(), &store).expect_err("no families");
    assert!(matches!(
        err.downcast_ref::<ConsolidationError>(),
        Some(ConsolidationError::NoMultiVersionFamilies(_))
    ));
}

#[test]
fn execute_runs_one_tournament_per_family() {
    let store = seeded_store();
    let results = execute(&settings(), &store).expect("tournaments should run");

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].filename, "brief.md");
    assert_eq!(results[0].champion_folder, "a");
    assert_eq!(
        results[0].version_paths.get("b"),
        Some(&PathBuf::from("/in/b/brief.md"))
    );
}
