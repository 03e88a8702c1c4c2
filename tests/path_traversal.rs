use std::fs;
use std::path::PathBuf;

use anyhow::Result;
use folder_flow::{
    Classifier, DestinationRule, FlowError, PluginOptions, PluginRegistry, PoolError, Strategy,
    StrategyContext,
};
use tempfile::tempdir;

/// Places every file one level above the destination root.
#[derive(Debug, Default)]
struct EscapingStrategy;

impl Strategy for EscapingStrategy {
    fn selector(&self) -> &str {
        "escape"
    }

    fn load_config(&mut self, _options: &PluginOptions) -> Result<()> {
        Ok(())
    }

    fn final_dir_path(&self, ctx: &StrategyContext<'_>) -> Result<PathBuf> {
        Ok(ctx.dest_dir.join("..").join("outside"))
    }
}

#[test]
fn escaping_destination_is_rejected_without_mutation() {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    let dest = td.path().join("dest");
    fs::create_dir_all(&src).unwrap();
    fs::write(src.join("x.txt"), b"payload").unwrap();

    let mut reg = PluginRegistry::with_builtins();
    reg.register_strategy("escape", || Box::new(EscapingStrategy)).unwrap();
    let strategy = reg.new_strategy("escape", &PluginOptions::new()).unwrap();

    let report = Classifier::new(vec![src.clone()], vec![DestinationRule::new("d", &dest, strategy)])
        .unwrap()
        .classify()
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.stats.snapshot().files.failed, 1);
    assert_eq!(report.stats.snapshot().files.moved, 0);

    let failure = &report.failures[0];
    let pool_err = failure.error.downcast_ref::<PoolError>().expect("pool aggregate");
    assert_eq!(pool_err.count(), 1);
    let traversal = pool_err.errors()[0]
        .chain()
        .any(|c| matches!(c.downcast_ref::<FlowError>(), Some(FlowError::PathTraversal { .. })));
    assert!(traversal, "{:#}", pool_err.errors()[0]);

    assert_eq!(fs::read(src.join("x.txt")).unwrap(), b"payload");
    assert!(!td.path().join("outside").exists());
    assert!(!dest.exists());

    let run_err = report.error().unwrap();
    assert_eq!(run_err.count, 1);
}

#[test]
fn literal_date_format_stays_inside_root() {
    let td = tempdir().unwrap();
    let src = td.path().join("src");
    let dest = td.path().join("dest");
    fs::create_dir_all(src.join("deep/er")).unwrap();
    fs::write(src.join("deep/er/f.txt"), b"f").unwrap();

    let reg = PluginRegistry::with_builtins();
    let mut opts = PluginOptions::new();
    opts.insert("format".into(), vec!["flat".into()]);
    let strategy = reg.new_strategy("date", &opts).unwrap();

    let report = Classifier::new(vec![src], vec![DestinationRule::new("d", &dest, strategy)])
        .unwrap()
        .classify()
        .unwrap();
    assert!(report.is_success());
    assert!(dest.join("flat/f.txt").exists());
}

#[test]
fn duplicate_registration_is_an_error() {
    let mut reg = PluginRegistry::with_builtins();
    let err = reg
        .register_strategy("dirchain", || Box::new(EscapingStrategy))
        .unwrap_err();
    assert!(matches!(err, FlowError::DuplicatePlugin { .. }));
}
