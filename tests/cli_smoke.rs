use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::cargo;
use tempfile::tempdir;

fn write_cfg(path: &Path, source: &Path, images: &Path) {
    let xml = format!(
        r#"<config>
  <log_level>quiet</log_level>
  <max_workers>2</max_workers>
  <source_dir>{}</source_dir>
  <dest_dir>
    <name>images</name>
    <path>{}</path>
    <filter name="extensions"><option key="extensions">jpg,png</option></filter>
  </dest_dir>
</config>"#,
        source.display(),
        images.display()
    );
    fs::write(path, xml).unwrap();
}

#[test]
fn list_plugins_names_the_builtins() {
    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me).arg("--list-plugins").output().expect("spawn binary");

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    for name in ["extensions", "regex", "script", "dirchain", "date"] {
        assert!(stdout.contains(name), "missing {name}: {stdout}");
    }
}

#[test]
fn print_config_reports_the_env_path() {
    let td = tempdir().unwrap();
    let cfg_path = td.path().join("flow.xml");

    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me)
        .env("FOLDER_FLOW_CONFIG", &cfg_path)
        .arg("--print-config")
        .output()
        .expect("spawn binary");

    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("flow.xml"), "{stdout}");
    assert!(stdout.contains("no file exists there yet"), "{stdout}");
}

#[test]
fn missing_config_file_fails() {
    let td = tempdir().unwrap();
    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me)
        .arg("--config")
        .arg(td.path().join("absent.xml"))
        .output()
        .expect("spawn binary");

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("config file not found"), "{stderr}");
}

#[test]
fn run_moves_files_and_writes_stats_json() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let inbox = base.join("inbox");
    let images = base.join("images");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("a.jpg"), vec![1u8; 2048]).unwrap();
    fs::write(inbox.join("b.txt"), vec![2u8; 1024]).unwrap();
    let cfg_path = base.join("config.xml");
    write_cfg(&cfg_path, &inbox, &images);
    let stats_path = base.join("stats.json");

    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me)
        .arg("-c")
        .arg(&cfg_path)
        .arg("--stats-json")
        .arg(&stats_path)
        .output()
        .expect("spawn binary");

    let stdout = String::from_utf8_lossy(&out.stdout);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "stdout: {stdout}\nstderr: {stderr}");
    assert!(stdout.contains("Moved:       1"), "{stdout}");
    assert!(images.join("a.jpg").exists());
    assert!(inbox.join("b.txt").exists());

    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&stats_path).unwrap()).unwrap();
    assert_eq!(json["files"]["seen"], 2);
    assert_eq!(json["files"]["moved"], 1);
    assert_eq!(json["files"]["skipped"], 1);
    assert_eq!(json["errors"]["total"], 0);
}

#[test]
fn dry_run_flag_leaves_tree_alone() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let inbox = base.join("inbox");
    let images = base.join("images");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("a.png"), b"png").unwrap();
    let cfg_path = base.join("config.xml");
    write_cfg(&cfg_path, &inbox, &images);

    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me)
        .env("FOLDER_FLOW_CONFIG", &cfg_path)
        .arg("--dry-run")
        .output()
        .expect("spawn binary");

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    assert!(String::from_utf8_lossy(&out.stdout).contains("dry-run"));
    assert!(inbox.join("a.png").exists());
    assert!(!images.exists());
}

#[test]
fn unknown_plugin_fails_before_touching_files() {
    let td = tempdir().unwrap();
    let base = fs::canonicalize(td.path()).unwrap();
    let inbox = base.join("inbox");
    fs::create_dir_all(&inbox).unwrap();
    fs::write(inbox.join("a.jpg"), b"x").unwrap();
    let cfg_path = base.join("config.xml");
    let xml = format!(
        r#"<config>
  <log_level>quiet</log_level>
  <source_dir>{}</source_dir>
  <dest_dir><path>{}</path><filter name="colour"/></dest_dir>
</config>"#,
        inbox.display(),
        base.join("out").display()
    );
    fs::write(&cfg_path, xml).unwrap();

    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me).arg("-c").arg(&cfg_path).output().expect("spawn binary");

    assert!(!out.status.success());
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("unknown filter plugin 'colour'"), "{stderr}");
    assert!(inbox.join("a.jpg").exists());
}

#[test]
fn list_extensions_prints_each_extension_once() {
    let td = tempdir().unwrap();
    let tree = td.path().join("tree");
    fs::create_dir_all(tree.join("nested/.git")).unwrap();
    for name in ["a.jpg", "nested/b.jpg", "nested/c.pdf", "Makefile", "nested/.git/HEAD.lock"] {
        fs::write(tree.join(name), b"x").unwrap();
    }

    let me = cargo::cargo_bin!("folder_flow");
    let out = Command::new(me)
        .arg("--list-extensions")
        .arg(&tree)
        .output()
        .expect("spawn binary");

    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert_eq!(stdout.lines().collect::<Vec<_>>(), [".jpg", ".pdf"]);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("file has no extension"), "{stderr}");
    assert!(stderr.contains("Makefile"), "{stderr}");
    assert!(tree.join("a.jpg").exists());
}
