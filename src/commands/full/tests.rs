use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use super::*;
use crate::model::{ImprovementManifest, TournamentManifest, VerificationManifest};
use crate::storage::memory::MemoryStore;
use crate::util::read_json;

fn at(seconds: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(seconds, 0).expect("valid timestamp")
}

fn settings() -> Settings {
    Settings {
        input_directory: PathBuf::from("/in"),
        ..Settings::default()
    }
}

#[test]
fn full_pipeline_merges_and_verifies() {
    let store = MemoryStore::new();
    store.insert(
        "/in/final/brief.md",
        "# Brief\n\n## Facts\nThe applicant filed in 2020.\n\n## Law\nThe statute applies.\n",
        at(200),
    );
    store.insert(
        "/in/draft/brief.md",
        "# Brief\n\n## Facts\nThe applicant filed in 2020.\n\n## Relief\nRequest asylum.\n",
        at(100),
    );
    let manifests = TempDir::new().expect("temp dir");

    let summary = execute(&settings(), &store, manifests.path()).expect("pipeline should run");

    assert_eq!(summary.families, 1);
    assert_eq!(summary.documents_with_improvements, 1);
    assert_eq!(summary.documents_integrated, 1);
    assert_eq!((summary.passed, summary.failed), (1, 0));

    let merged = store
        .get(&PathBuf::from("/in/output/COMPREHENSIVE_brief.md"))
        .expect("merged document written");
    assert!(merged.contains("## Law"));
    assert!(merged.contains("## Relief"));
    assert!(merged.contains("*[Integrated from draft]*"));
    assert!(merged.contains("## Document Evolution"));

    assert!(
        store
            .get(&PathBuf::from("/in/output/INTEGRATION_REPORT.md"))
            .is_some()
    );
    let verification_report = store
        .get(&PathBuf::from("/in/output/VERIFICATION_REPORT.md"))
        .expect("verification report written");
    assert!(verification_report.contains("**Overall Status**: PASSED"));

    let tournaments: TournamentManifest =
        read_json(&manifests.path().join(tournament::MANIFEST_NAME)).expect("tournament manifest");
    assert_eq!(tournaments.families[0].champion_folder, "final");

    let verification: VerificationManifest =
        read_json(&manifests.path().join(verify::MANIFEST_NAME)).expect("verification manifest");
    assert_eq!(verification.passed, 1);
}

#[test]
fn identical_versions_stop_after_extraction() {
    let store = MemoryStore::new();
    store.insert("/in/a/brief.md", "# Brief\n## Facts\nsame\n", at(1));
    store.insert("/in/b/brief.md", "# Brief\n## Facts\nsame\n", at(1));
    let manifests = TempDir::new().expect("temp dir");

    let summary = execute(&settings(), &store, manifests.path()).expect("pipeline should run");

    assert_eq!(summary.families, 1);
    assert_eq!(summary.documents_with_improvements, 0);
    assert_eq!(summary.documents_integrated, 0);

    let improvements: ImprovementManifest =
        read_json(&manifests.path().join(extract::MANIFEST_NAME)).expect("improvements manifest");
    assert_eq!(improvements.total_improvements, 0);
    assert!(!manifests.path().join(integrate::MANIFEST_NAME).exists());
}
