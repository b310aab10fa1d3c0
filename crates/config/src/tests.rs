use super::*;
use std::collections::HashMap;
use tempfile::tempdir;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key| map.get(key).cloned()
}

// -------------------- Defaults & env --------------------

#[test]
fn defaults_are_valid() {
    let cfg = SortConfig::default();
    assert_eq!(cfg.spill_threshold, 4 * 1024 * 1024);
    assert_eq!(cfg.read_ahead, 10);
    assert_eq!(cfg.operation_id, "sort");
    assert!(cfg.validate().is_ok());
}

#[test]
fn lookup_overrides_defaults() {
    let cfg = SortConfig::from_lookup(lookup_from(&[
        ("SORT_SPILL_KB", "64"),
        ("SORT_TEMP_DIR", "/var/tmp/sorts"),
        ("SORT_ID", "report"),
        ("SORT_READ_AHEAD", "3"),
        ("SORT_READ_CHUNK_KB", "1"),
    ]));
    assert_eq!(cfg.spill_threshold, 64 * 1024);
    assert_eq!(cfg.temp_dir, PathBuf::from("/var/tmp/sorts"));
    assert_eq!(cfg.operation_id, "report");
    assert_eq!(cfg.read_ahead, 3);
    assert_eq!(cfg.read_chunk_bytes, 1024);
}

#[test]
fn unparsable_values_fall_back() {
    let cfg = SortConfig::from_lookup(lookup_from(&[
        ("SORT_SPILL_KB", "lots"),
        ("SORT_READ_AHEAD", "-1"),
        ("SORT_ID", ""),
    ]));
    assert_eq!(cfg, SortConfig::default());
}

// -------------------- Validation --------------------

#[test]
fn validate_rejects_zero_and_empty() {
    let base = SortConfig::default();
    assert!(matches!(
        base.clone().with_spill_threshold(0).validate(),
        Err(ConfigError::ZeroThreshold)
    ));
    assert!(matches!(
        base.clone().with_read_ahead(0).validate(),
        Err(ConfigError::ZeroReadAhead)
    ));
    assert!(matches!(
        base.clone().with_read_chunk_bytes(0).validate(),
        Err(ConfigError::ZeroChunk)
    ));
    assert!(matches!(
        base.with_operation_id("  ").validate(),
        Err(ConfigError::EmptyId)
    ));
}

// -------------------- Naming --------------------

#[test]
fn sanitized_id_collapses_unsafe_runs() {
    let cfg = SortConfig::default().with_operation_id("sales/2024: Q1\tsort");
    assert_eq!(cfg.sanitized_id(), "sales_2024_Q1_sort");
}

#[test]
fn run_paths_are_unique_per_tag_and_sequence() {
    let cfg = SortConfig::new("/tmp/x", "job 7");
    assert_eq!(
        cfg.run_path(0xbeef, 1),
        PathBuf::from("/tmp/x/job_7-0000beef-000001.sort")
    );
    assert_ne!(cfg.run_path(7, 1), cfg.run_path(7, 2));
    assert_ne!(cfg.run_path(7, 1), cfg.run_path(8, 1));
}

#[test]
fn create_temp_dir_makes_parents() {
    let dir = tempdir().unwrap();
    let nested = dir.path().join("a").join("b");
    let cfg = SortConfig::new(&nested, "t");
    cfg.create_temp_dir().unwrap();
    assert!(nested.is_dir());
}
