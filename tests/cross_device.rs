#![cfg(unix)]

use std::fs;
use std::io;
use std::path::Path;

use folder_flow::fs_ops::OnExisting;
use folder_flow::{Classifier, DestinationRule, PluginOptions, PluginRegistry};
use tempfile::tempdir;

fn exdev(_: &Path, _: &Path, _: OnExisting) -> io::Result<()> {
    Err(io::Error::from_raw_os_error(libc::EXDEV))
}

fn busy(_: &Path, _: &Path, _: OnExisting) -> io::Result<()> {
    Err(io::Error::from(io::ErrorKind::PermissionDenied))
}

fn rule(dest: &Path) -> DestinationRule {
    let reg = PluginRegistry::with_builtins();
    DestinationRule::new(
        "all",
        dest,
        reg.new_strategy("dirchain", &PluginOptions::new()).unwrap(),
    )
}

#[test]
fn exdev_rename_falls_back_to_verified_copy() {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    let dest = td.path().join("dest");
    fs::create_dir_all(src.join("sub")).unwrap();
    let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
    fs::write(src.join("sub/big.bin"), &payload).unwrap();

    let report = Classifier::new(vec![src.clone()], vec![rule(&dest)])
        .unwrap()
        .with_rename(exdev)
        .classify()
        .unwrap();

    assert!(report.is_success());
    let snap = report.stats.snapshot();
    assert_eq!(snap.files.moved, 1);
    assert_eq!(snap.files.copied, 1);
    assert_eq!(snap.decisions.cross_fs, 1);
    assert_eq!(snap.hash.verified, 1);
    assert_eq!(snap.operations.copy, 1);
    assert_eq!(snap.operations.delete, 1);

    assert!(!src.join("sub/big.bin").exists());
    assert_eq!(fs::read(dest.join("sub/big.bin")).unwrap(), payload);
}

#[test]
fn other_rename_failures_leave_the_source() {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    let dest = td.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("a.txt"), b"stay").unwrap();

    let report = Classifier::new(vec![src.clone()], vec![rule(&dest)])
        .unwrap()
        .with_rename(busy)
        .classify()
        .unwrap();

    assert!(!report.is_success());
    let snap = report.stats.snapshot();
    assert_eq!(snap.files.failed, 1);
    assert_eq!(snap.errors.by_kind.get("permission"), Some(&1));
    assert_eq!(fs::read(src.join("a.txt")).unwrap(), b"stay");
    assert!(!dest.join("a.txt").exists());
}
