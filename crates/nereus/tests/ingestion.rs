//! Integration tests for the ingestion pipeline.
//!
//! Tests that the graph stays consistent as files are added, changed,
//! broken, and deleted:
//! - Unchanged content is a no-op
//! - Extractor failures keep the last good state
//! - Cross-file edges survive re-ingestion of their target
//! - Deletion cascades and leaves no dangling relation

mod common;

use std::path::Path;

use common::{lcd_scenario, workspace, write};
use nereus::{FileStatus, IngestErrorKind, Nereus, RelationKind, Symbol};

fn symbols_of(nereus: &Nereus, path: &str) -> Vec<Symbol> {
    let snap = nereus.store().snapshot().unwrap();
    let file = snap.get_file(path).unwrap().expect("file should be indexed");
    snap.symbols_in_file(file.id).unwrap()
}

fn assert_consistent(nereus: &Nereus) {
    let violations = nereus.verify_integrity().expect("integrity check should run");
    assert!(violations.is_empty(), "integrity violations: {violations:?}");
}

#[test]
fn reingesting_unchanged_file_leaves_graph_identical() {
    let (_dir, nereus, extractor) = lcd_scenario();
    let calls_before = extractor.calls();

    let snapshot = |n: &Nereus| {
        let snap = n.store().snapshot().unwrap();
        let file = snap.get_file("src/sys/system.c").unwrap().unwrap();
        let symbols = snap.symbols_in_file(file.id).unwrap();
        let relations: Vec<_> = symbols
            .iter()
            .flat_map(|s| snap.relations_from(s.id).unwrap())
            .collect();
        (file, symbols, relations)
    };

    let before = snapshot(&nereus);
    let version = nereus.store_version();

    let stats = nereus.ingest(Path::new("src/sys/system.c")).unwrap();
    assert!(stats.skipped);

    assert_eq!(snapshot(&nereus), before);
    assert_eq!(nereus.store_version(), version);
    assert_eq!(extractor.calls(), calls_before);
}

#[test]
fn second_sync_skips_everything() {
    let (_dir, nereus, _) = lcd_scenario();

    let report = nereus.sync().unwrap();
    assert_eq!(report.batch.indexed(), 0);
    assert_eq!(report.batch.unchanged(), 3);
}

#[test]
fn extraction_error_keeps_last_good_state() {
    let (dir, nereus, _) = lcd_scenario();
    let before = symbols_of(&nereus, "src/drivers/lcd.c");

    write(dir.path(), "src/drivers/lcd.c", "fn lcd_init\n!\n");
    let err = nereus.ingest(Path::new("src/drivers/lcd.c"));
    assert!(matches!(err, Err(nereus::Error::Extraction { .. })));

    assert_eq!(symbols_of(&nereus, "src/drivers/lcd.c"), before);
    let callers = nereus.get_callers("lcd_init", None, Some(1)).unwrap();
    assert_eq!(callers.hits().count(), 1);
}

#[test]
fn failing_file_does_not_abort_batch() {
    let (_dir, nereus, _) = workspace(&[
        ("a.c", "fn alpha\n"),
        ("b.c", "fn beta\n!\n"),
        ("c.c", "fn gamma\ncall gamma alpha\n"),
    ]);

    let report = nereus.sync().unwrap();

    assert_eq!(report.batch.indexed(), 2);
    let failed: Vec<_> = report
        .batch
        .outcomes
        .iter()
        .filter_map(|o| match &o.status {
            FileStatus::Failed(e) => Some((o.path.as_str(), e.kind)),
            _ => None,
        })
        .collect();
    assert_eq!(failed, vec![("b.c", IngestErrorKind::ExtractionFailed)]);

    let callers = nereus.get_callers("alpha", None, None).unwrap();
    assert_eq!(common::hit_names(&callers), vec![("gamma".to_string(), 1)]);
}

#[test]
fn callers_survive_reingest_of_target_file() {
    let (dir, nereus, _) = lcd_scenario();

    // lcd_init moves down two lines; its symbol row is replaced.
    write(dir.path(), "src/drivers/lcd.c", "fn lcd_reset\n\nfn lcd_init\n");
    let stats = nereus.ingest(Path::new("src/drivers/lcd.c")).unwrap();
    assert_eq!(stats.repointed, 1);

    let callers = nereus.get_callers("lcd_init", None, Some(1)).unwrap();
    assert_eq!(common::hit_names(&callers), vec![("init".to_string(), 1)]);
    assert_consistent(&nereus);
}

#[test]
fn removed_target_becomes_unresolved_then_rebinds() {
    let (dir, nereus, _) = lcd_scenario();

    write(dir.path(), "src/drivers/lcd.c", "fn lcd_reset\n");
    let stats = nereus.ingest(Path::new("src/drivers/lcd.c")).unwrap();
    assert_eq!(stats.orphaned, 1);
    assert!(matches!(
        nereus.get_callers("lcd_init", None, None),
        Err(nereus::Error::NotFound(_))
    ));

    write(dir.path(), "src/drivers/lcd.c", "fn lcd_reset\nfn lcd_init\n");
    let stats = nereus.ingest(Path::new("src/drivers/lcd.c")).unwrap();
    assert_eq!(stats.bound, 1);
    let callers = nereus.get_callers("lcd_init", None, Some(1)).unwrap();
    assert_eq!(common::hit_names(&callers), vec![("init".to_string(), 1)]);
}

#[test]
fn caller_indexed_before_callee_is_bound_later() {
    let (dir, nereus, _) = workspace(&[("main.c", "fn main\ncall main init\n")]);
    let stats = nereus.ingest(Path::new("main.c")).unwrap();
    assert_eq!(stats.unresolved, 1);
    assert_eq!(nereus.stats().unwrap().unresolved_relation_count, 1);

    write(dir.path(), "system.c", "fn init\n");
    nereus.ingest(Path::new("system.c")).unwrap();

    assert_eq!(nereus.stats().unwrap().unresolved_relation_count, 0);
    let callers = nereus.get_callers("init", None, None).unwrap();
    assert_eq!(common::hit_names(&callers), vec![("main".to_string(), 1)]);
}

#[test]
fn private_symbols_are_not_bound_across_files() {
    let (dir, nereus, _) = workspace(&[("main.c", "fn main\ncall main helper\n")]);
    nereus.ingest(Path::new("main.c")).unwrap();

    write(dir.path(), "util.c", "private fn helper\n");
    nereus.ingest(Path::new("util.c")).unwrap();

    let callers = nereus.get_callers("helper", None, None).unwrap();
    assert!(callers.is_empty());
    assert_eq!(nereus.stats().unwrap().unresolved_relation_count, 1);
}

#[test]
fn external_calls_go_to_placeholder() {
    let (_dir, nereus, _) = lcd_scenario();

    let snap = nereus.store().snapshot().unwrap();
    let (init, _) = snap.find_symbols("init", None).unwrap().remove(0);
    let relations = snap.relations_from(init.id).unwrap();

    let external: Vec<_> = relations
        .iter()
        .filter(|r| r.target_id.is_external())
        .map(|r| r.target_name.as_str())
        .collect();
    assert_eq!(external, vec!["printf"]);
    assert!(relations.iter().all(|r| r.kind == RelationKind::Calls));
}

#[test]
fn deleting_file_cascades_to_relations() {
    let (dir, nereus, _) = lcd_scenario();

    std::fs::remove_file(dir.path().join("src/sys/system.c")).unwrap();
    let report = nereus.sync().unwrap();
    assert_eq!(report.removed, vec!["src/sys/system.c"]);

    assert!(nereus.get_callers("lcd_init", None, None).unwrap().is_empty());
    assert!(nereus.get_callees("main", None, None).unwrap().is_empty());
    assert_consistent(&nereus);

    let stats = nereus.stats().unwrap();
    assert_eq!(stats.file_count, 2);
    assert_eq!(stats.symbol_count, 2);
}

#[test]
fn remove_file_reports_whether_it_existed() {
    let (_dir, nereus, _) = lcd_scenario();

    assert!(nereus.remove_file(Path::new("src/drivers/lcd.c")).unwrap());
    assert!(!nereus.remove_file(Path::new("src/drivers/lcd.c")).unwrap());
    assert_consistent(&nereus);
}

#[test]
fn rebuild_reindexes_everything() {
    let (_dir, nereus, extractor) = lcd_scenario();
    let before = extractor.calls();

    let report = nereus.rebuild().unwrap();

    assert_eq!(report.batch.indexed(), 3);
    assert_eq!(extractor.calls(), before + 3);
    assert_eq!(nereus.get_file_impact(Path::new("src/drivers/lcd.c"), true).unwrap().entries.len(), 2);
}

#[test]
fn critical_paths_flag_files() {
    let (_dir, nereus, _) = workspace(&[
        ("src/auth/login.c", "fn check_password\n"),
        ("src/ui/menu.c", "fn draw\ncall draw check_password\n"),
    ]);
    nereus.sync().unwrap();

    let critical: Vec<_> = nereus
        .critical_symbols()
        .unwrap()
        .into_iter()
        .map(|(s, _)| s.name)
        .collect();
    assert_eq!(critical, vec!["check_password"]);
    assert_eq!(nereus.stats().unwrap().critical_file_count, 1);
}
