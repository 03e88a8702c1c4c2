use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use folder_flow::{Classifier, ConflictPolicy, DestinationRule, PluginOptions, PluginRegistry};
use tempfile::tempdir;

/// Every source file collapses onto `dest/flat/<name>`.
fn flat_rule(dest: &Path) -> DestinationRule {
    let reg = PluginRegistry::with_builtins();
    let mut opts = PluginOptions::new();
    opts.insert("format".into(), vec!["flat".into()]);
    DestinationRule::new("flat", dest, reg.new_strategy("date", &opts).unwrap())
        .with_conflict_policy(ConflictPolicy::Rename)
}

fn contents_by_name(dir: &Path) -> BTreeMap<String, Vec<u8>> {
    fs::read_dir(dir)
        .unwrap()
        .map(|e| {
            let e = e.unwrap();
            (e.file_name().to_string_lossy().into_owned(), fs::read(e.path()).unwrap())
        })
        .collect()
}

#[test]
fn same_name_files_from_many_workers_all_survive() {
    for round in 0..5 {
        let td = tempdir().unwrap();
        let src = td.path().join("src");
        let dest = td.path().join("dest");

        let mut expected = Vec::new();
        for i in 0..12 {
            let dir = src.join(format!("d{i:02}"));
            fs::create_dir_all(&dir).unwrap();
            let body = format!("round {round} copy {i:02}").into_bytes();
            fs::write(dir.join("a.txt"), &body).unwrap();
            expected.push(body);
        }
        // names the rename policy itself would pick
        for name in ["a_1.txt", "a_2.txt"] {
            let body = format!("round {round} literal {name}").into_bytes();
            fs::write(src.join(name), &body).unwrap();
            expected.push(body);
        }

        let report = Classifier::new(vec![src.clone()], vec![flat_rule(&dest)])
            .unwrap()
            .with_max_workers(4)
            .classify()
            .unwrap();

        assert!(report.is_success(), "round {round}");
        let snap = report.stats.snapshot();
        assert_eq!(snap.files.seen, 14);
        assert_eq!(snap.files.moved, 14, "round {round}");

        let landed = contents_by_name(&dest.join("flat"));
        assert_eq!(landed.len(), 14, "round {round}: {:?}", landed.keys());
        let mut got: Vec<_> = landed.into_values().collect();
        got.sort();
        expected.sort();
        assert_eq!(got, expected, "round {round}");

        let left = files_under(&src);
        assert!(left.is_empty(), "round {round}: {left:?}");
    }
}

#[test]
fn identical_content_is_kept_once() {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    let dest = td.path().join("dest");
    for i in 0..6 {
        let dir = src.join(format!("d{i}"));
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("same.bin"), b"identical bytes").unwrap();
    }

    let report = Classifier::new(vec![src.clone()], vec![flat_rule(&dest)])
        .unwrap()
        .with_max_workers(3)
        .classify()
        .unwrap();

    assert!(report.is_success());
    let snap = report.stats.snapshot();
    assert_eq!(snap.files.moved, 1);
    assert_eq!(snap.files.skipped, 5);
    assert_eq!(
        contents_by_name(&dest.join("flat")).into_keys().collect::<Vec<_>>(),
        ["same.bin"]
    );
    assert_eq!(files_under(&src).len(), 5);
}

fn files_under(root: &Path) -> Vec<std::path::PathBuf> {
    let mut out = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = entry.unwrap().path();
            if path.is_dir() {
                stack.push(path);
            } else {
                out.push(path);
            }
        }
    }
    out
}
