//! End-to-end tests of the pipeline against a local durable store.

use repodex::admission::AdmissionConfig;
use repodex::config::PipelineConfig;
use repodex::index::IndexKind;
use repodex::pipeline::{Pipeline, UnitOutcome, UnitState};
use repodex::publish::{DurableStorage, LocalFsStorage};
use repodex::unit::{FileRecord, RepositoryUnit, UnitKey};
use serde_json::{Value, json};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

fn test_config(root: &Path, workers: usize) -> PipelineConfig {
    PipelineConfig {
        admission: AdmissionConfig {
            ceiling: 25_000,
            low_water_mark: 1_000,
            backoff_ms: 5,
        },
        max_files_per_unit: 20_000,
        base_path: root.join("durable"),
        language: "java".to_string(),
        staging_root: root.join("staging"),
        workers,
    }
}

fn java_file(name: &str) -> FileRecord {
    FileRecord {
        file_location: Some(format!("src/main/java/{}.java", name)),
        searchable_refs: json!([name, "java.util.List"]),
        file_meta_data: json!({"lines": 12, "package": "demo"}),
        source_content: format!("public class {} {{}}", name),
        doc_comments: json!([{"target": name, "text": "Demo class"}]),
        type_facts: json!({"declared": [name], "extends": "Object"}),
    }
}

fn read_lines(path: &Path) -> Vec<Value> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect()
}

fn durable(root: &Path, kind: &str, unit: &str) -> PathBuf {
    root.join("durable").join("java").join(kind).join(unit)
}

/// Local storage whose moves take a while, keeping reservations held
struct SlowStorage {
    inner: LocalFsStorage,
    delay: Duration,
}

impl DurableStorage for SlowStorage {
    fn move_local_file_to(&self, local: &Path, durable: &Path) -> io::Result<()> {
        thread::sleep(self.delay);
        self.inner.move_local_file_to(local, durable)
    }

    fn recursive_delete(&self, local: &Path) -> io::Result<()> {
        self.inner.recursive_delete(local)
    }
}

#[test]
fn test_alice_demo_end_to_end() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let pipeline = Pipeline::new(test_config(root, 2), LocalFsStorage::new());

    let unit = RepositoryUnit::new("alice", "demo").with_files(vec![java_file("A"), java_file("B")]);
    let stats = pipeline.run(vec![unit]).unwrap();

    assert_eq!(stats.units_done, 1);
    assert_eq!(stats.artifacts_published, 5);

    for kind in ["tokens", "meta", "sources", "typesinfo", "comments"] {
        let lines = read_lines(&durable(root, kind, "alice~demo"));
        assert_eq!(lines.len(), 2, "{} should hold one line per file", kind);
    }

    let sources = read_lines(&durable(root, "sources", "alice~demo"));
    assert_eq!(sources[0]["payload"]["content"], "public class A {}");
    assert_eq!(sources[1]["fileLocation"], "src/main/java/B.java");

    let types = read_lines(&durable(root, "typesinfo", "alice~demo"));
    assert_eq!(types[0], json!({"declared": ["A"], "extends": "Object"}));

    assert!(!root.join("staging").join("alice~demo").exists());
    assert_eq!(pipeline.admission().aggregate(), 0);
}

#[test]
fn test_rerun_overwrites_published_artifacts() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let pipeline = Pipeline::new(test_config(root, 1), LocalFsStorage::new());

    let three = RepositoryUnit::new("alice", "demo")
        .with_files(vec![java_file("A"), java_file("B"), java_file("C")]);
    pipeline.run(vec![three]).unwrap();

    let one = RepositoryUnit::new("alice", "demo").with_files(vec![java_file("Z")]);
    pipeline.run(vec![one]).unwrap();

    for kind in IndexKind::ALL {
        let lines = read_lines(&durable(root, kind.as_str(), "alice~demo"));
        assert_eq!(lines.len(), 1);
    }
    let meta = read_lines(&durable(root, "meta", "alice~demo"));
    assert_eq!(meta[0]["fileLocation"], "src/main/java/Z.java");
}

#[test]
fn test_oversized_unit_skipped_without_touching_budget() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let pipeline = Pipeline::new(test_config(root, 1), LocalFsStorage::new());

    let huge = RepositoryUnit::new("big", "monorepo").with_files(vec![FileRecord::default(); 20_001]);
    let small = RepositoryUnit::new("alice", "demo").with_files(vec![java_file("A")]);

    let states = Mutex::new(Vec::new());
    let stats = pipeline
        .run_with(vec![huge, small], |outcome| {
            states.lock().unwrap().push((outcome.unit().clone(), outcome.state()));
        })
        .unwrap();

    assert_eq!(stats.units_skipped, 1);
    assert_eq!(stats.units_done, 1);
    assert_eq!(
        states.into_inner().unwrap(),
        vec![
            (UnitKey::new("big", "monorepo"), UnitState::Skipped),
            (UnitKey::new("alice", "demo"), UnitState::Released),
        ]
    );
    assert!(!durable(root, "tokens", "big~monorepo").exists());
    assert_eq!(pipeline.admission().aggregate(), 0);
}

#[test]
fn test_unit_names_cannot_escape_staging_root() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let victim = root.join("victim");
    fs::create_dir_all(&victim).unwrap();
    fs::write(victim.join("precious.txt"), "keep").unwrap();

    let pipeline = Pipeline::new(test_config(root, 2), LocalFsStorage::new());
    let units = vec![
        RepositoryUnit::new("o", "../../../victim").with_files(vec![java_file("A")]),
        RepositoryUnit::new("alice", "demo").with_files(vec![java_file("A")]),
    ];
    let stats = pipeline.run(units).unwrap();

    assert_eq!(stats.units_rejected, 1);
    assert_eq!(stats.units_done, 1);
    assert_eq!(stats.artifacts_published, 5);
    assert!(victim.join("precious.txt").exists());
    assert_eq!(pipeline.admission().aggregate(), 0);
}

#[test]
fn test_writer_failures_do_not_stop_the_pipeline() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let mut config = test_config(root, 2);
    // Staging root is a file, so every unit fails to stage
    config.staging_root = root.join("staging-file");
    fs::write(&config.staging_root, b"").unwrap();

    let pipeline = Pipeline::new(config, LocalFsStorage::new());
    let units: Vec<_> = (0..4)
        .map(|i| RepositoryUnit::new("org", format!("r{}", i)).with_files(vec![java_file("A")]))
        .collect();

    let stats = pipeline.run(units).unwrap();

    assert_eq!(stats.units_failed, 4);
    assert_eq!(stats.units_done, 0);
    assert_eq!(pipeline.admission().aggregate(), 0);
    assert!(!root.join("durable").exists());
}

#[test]
fn test_second_large_unit_waits_for_first() {
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    let storage = SlowStorage {
        inner: LocalFsStorage::new(),
        delay: Duration::from_millis(150),
    };
    let pipeline = Pipeline::new(test_config(root, 2), storage);

    let units = vec![
        RepositoryUnit::new("org", "first").with_files(vec![FileRecord::default(); 15_000]),
        RepositoryUnit::new("org", "second").with_files(vec![FileRecord::default(); 15_000]),
    ];

    let waits = Mutex::new(Vec::new());
    let stats = pipeline
        .run_with(units, |outcome| {
            if let UnitOutcome::Done { waited, .. } = outcome {
                waits.lock().unwrap().push(*waited);
            }
        })
        .unwrap();

    assert_eq!(stats.units_done, 2);
    let waits = waits.into_inner().unwrap();
    // A blocked reserve sleeps at least one backoff interval
    let blocked = waits.iter().filter(|w| **w >= Duration::from_millis(5)).count();
    assert_eq!(blocked, 1, "one unit should have waited for admission: {:?}", waits);
    assert_eq!(pipeline.admission().aggregate(), 0);

    for unit in ["org~first", "org~second"] {
        assert_eq!(read_lines(&durable(root, "typesinfo", unit)).len(), 15_000);
    }
}
