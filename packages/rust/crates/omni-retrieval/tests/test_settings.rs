#![allow(missing_docs)]

use std::path::PathBuf;

use omni_retrieval::{RetrievalSettings, load_retrieval_settings_from_paths};
use tempfile::TempDir;

fn write_file(path: PathBuf, content: &str) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create parent dir");
    }
    std::fs::write(path, content).expect("write yaml");
}

fn paths(tmp: &TempDir) -> (PathBuf, PathBuf) {
    (
        tmp.path().join("packages/conf/retrieval.yaml"),
        tmp.path().join(".config/omni-dev-fusion/retrieval.yaml"),
    )
}

#[test]
fn test_merge_user_overrides_system() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);

    write_file(
        system.clone(),
        r#"
hybrid:
  default_limit: 20
  rrf_k: 40
  min_vector_only_threshold: 0.6
quality:
  retrieval:
    enable_quality_filter: true
    min_quality: 0.4
intent:
  documents:
    - title: "Klimaschutzprogramm"
      aliases: ["KSP"]
      collections: ["klima"]
embedding:
  model: "system-model"
  max_batch_size: 64
context:
  window: 1
"#,
    );
    write_file(
        user.clone(),
        r#"
hybrid:
  rrf_k: 30
quality:
  retrieval:
    min_quality: 0.5
embedding:
  model: "user-model"
"#,
    );

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings.hybrid.default_limit, 20);
    assert!((settings.hybrid.rrf_k - 30.0).abs() < f64::EPSILON);
    assert!((settings.hybrid.min_vector_only_threshold - 0.6).abs() < f64::EPSILON);
    assert!(settings.quality.retrieval.enable_quality_filter);
    assert!((settings.quality.retrieval.min_quality - 0.5).abs() < f64::EPSILON);
    assert_eq!(settings.intent.documents.len(), 1);
    assert_eq!(settings.intent.documents[0].aliases, vec!["KSP".to_string()]);
    assert_eq!(settings.embedding.model, "user-model");
    assert_eq!(settings.embedding.max_batch_size, 64);
    assert_eq!(settings.context.window, 1);
    // untouched fields keep their defaults
    assert_eq!(settings.hybrid.recall_multiplier, 3);
    assert_eq!(settings.context.document_field, "document_id");
}

#[test]
fn test_missing_files_fall_back_to_defaults() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings, RetrievalSettings::default());
}

#[test]
fn test_unparsable_user_file_is_ignored() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);
    write_file(system.clone(), "hybrid:\n  default_limit: 15\n");
    write_file(user.clone(), "hybrid: [unterminated\n");

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings.hybrid.default_limit, 15);
}

#[test]
fn test_non_mapping_file_is_ignored() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);
    write_file(system.clone(), "- just\n- a\n- list\n");
    write_file(user.clone(), "context:\n  min_overlap_words: 5\n");

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings.context.min_overlap_words, 5);
    assert_eq!(settings.hybrid, RetrievalSettings::default().hybrid);
}

#[test]
fn test_out_of_range_values_fall_back_to_defaults() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);
    write_file(
        system.clone(),
        "hybrid:\n  default_threshold: 1.7\n  default_limit: 25\n",
    );

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings, RetrievalSettings::default());
}

#[test]
fn test_schema_mismatch_falls_back_to_defaults() {
    let tmp = TempDir::new().expect("tempdir");
    let (system, user) = paths(&tmp);
    write_file(system.clone(), "hybrid:\n  default_limit: \"many\"\n");

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings, RetrievalSettings::default());
}

#[test]
fn test_shipped_system_file_matches_defaults() {
    let tmp = TempDir::new().expect("tempdir");
    let system = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../../conf/retrieval.yaml");
    let user = tmp.path().join("absent.yaml");
    assert!(system.exists(), "missing {}", system.display());

    let settings = load_retrieval_settings_from_paths(&system, &user);

    assert_eq!(settings, RetrievalSettings::default());
}
