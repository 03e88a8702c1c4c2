use std::fs;
use std::path::Path;

use filetime::{FileTime, set_file_mtime};
use folder_flow::{Classifier, DestinationRule, PluginOptions, PluginRegistry};
use tempfile::tempdir;

fn opts(pairs: &[(&str, &str)]) -> PluginOptions {
    let mut out = PluginOptions::new();
    for (k, v) in pairs {
        out.entry(k.to_string()).or_default().push(v.to_string());
    }
    out
}

fn images_rule(reg: &PluginRegistry, root: &Path) -> DestinationRule {
    DestinationRule::new(
        "images",
        root,
        reg.new_strategy("dirchain", &PluginOptions::new()).unwrap(),
    )
    .with_filter(reg.new_filter("extensions", &opts(&[("extensions", "jpg")])).unwrap())
}

/// One jpg and one txt; only the jpg has a rule.
#[test]
fn jpg_is_moved_and_txt_is_skipped() {
    let td = tempdir().unwrap();
    let src = td.path().join("inbox");
    let images = td.path().join("images");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.jpg"), vec![0xAB; 2048]).unwrap();
    fs::write(src.join("b.txt"), vec![b't'; 1024]).unwrap();

    let reg = PluginRegistry::with_builtins();
    let report = Classifier::new(vec![src.clone()], vec![images_rule(&reg, &images)])
        .unwrap()
        .classify()
        .unwrap();

    assert!(report.is_success());
    let snap = report.stats.snapshot();
    assert_eq!(snap.files.seen, 2);
    assert_eq!(snap.files.matched, 1);
    assert_eq!(snap.files.moved, 1);
    assert_eq!(snap.files.skipped, 1);
    assert_eq!(snap.files.failed, 0);
    assert_eq!(snap.run.bytes_written, 2048);
    assert!(snap.run.ended_at.is_some());

    assert_eq!(fs::read(images.join("a.jpg")).unwrap().len(), 2048);
    assert!(!src.join("a.jpg").exists());
    assert!(src.join("b.txt").exists());
}

#[test]
fn nested_layout_is_mirrored_by_dirchain() {
    let td = tempdir().unwrap();
    let src = td.path().join("inbox");
    let images = td.path().join("images");
    fs::create_dir_all(src.join("2023/trip")).unwrap();
    fs::write(src.join("2023/trip/beach.JPG"), b"sand").unwrap();

    let reg = PluginRegistry::with_builtins();
    let report = Classifier::new(vec![src.clone()], vec![images_rule(&reg, &images)])
        .unwrap()
        .classify()
        .unwrap();

    assert!(report.is_success());
    assert_eq!(fs::read(images.join("2023/trip/beach.JPG")).unwrap(), b"sand");
}

#[test]
fn date_strategy_buckets_by_modification_time() {
    let td = tempdir().unwrap();
    let src = td.path().join("inbox");
    let archive = td.path().join("archive");
    fs::create_dir_all(&src).unwrap();
    let doc = src.join("report.pdf");
    fs::write(&doc, b"%PDF").unwrap();
    // mid-June, so the bucket is the same in every time zone
    set_file_mtime(&doc, FileTime::from_unix_time(1_686_830_400, 0)).unwrap();

    let reg = PluginRegistry::with_builtins();
    let rule = DestinationRule::new(
        "archive",
        &archive,
        reg.new_strategy("date", &opts(&[("format", "%Y/%m")])).unwrap(),
    );
    let report = Classifier::new(vec![src], vec![rule]).unwrap().classify().unwrap();

    assert!(report.is_success());
    assert!(archive.join("2023/06/report.pdf").exists());
}

#[test]
fn dry_run_reports_without_touching_files() {
    let td = tempdir().unwrap();
    let src = td.path().join("inbox");
    let images = td.path().join("images");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.jpg"), b"img").unwrap();

    let reg = PluginRegistry::with_builtins();
    let report = Classifier::new(vec![src.clone()], vec![images_rule(&reg, &images)])
        .unwrap()
        .with_dry_run(true)
        .classify()
        .unwrap();

    assert_eq!(report.stats.snapshot().files.moved, 1);
    assert!(src.join("a.jpg").exists());
    assert!(!images.exists());
}

#[test]
fn several_sources_share_one_run() {
    let td = tempdir().unwrap();
    let (one, two) = (td.path().join("one"), td.path().join("two"));
    let images = td.path().join("images");
    fs::create_dir_all(&one).unwrap();
    fs::create_dir_all(&two).unwrap();
    fs::write(one.join("x.jpg"), b"1").unwrap();
    fs::write(two.join("y.jpg"), b"2").unwrap();

    let reg = PluginRegistry::with_builtins();
    let report = Classifier::new(vec![one, two], vec![images_rule(&reg, &images)])
        .unwrap()
        .with_max_workers(1)
        .classify()
        .unwrap();

    assert_eq!(report.stats.snapshot().files.moved, 2);
    assert!(images.join("x.jpg").exists());
    assert!(images.join("y.jpg").exists());
}
