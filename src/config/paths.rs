//! Config file lookup and symlink checks.

use dirs::config_dir;
use std::env;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Environment variable naming an explicit config file.
pub const CONFIG_ENV: &str = "FOLDER_FLOW_CONFIG";

/// Where the config path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigOrigin {
    Flag,
    Env,
    Default,
}

impl fmt::Display for ConfigOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConfigOrigin::Flag => "--config",
            ConfigOrigin::Env => CONFIG_ENV,
            ConfigOrigin::Default => "default location",
        })
    }
}

/// OS-appropriate default config path: `<config dir>/folder_flow/config.xml`.
pub fn default_config_path() -> Option<PathBuf> {
    let base = config_dir().or_else(|| {
        env::var_os("HOME").map(|h| PathBuf::from(h).join(".config"))
    })?;
    Some(base.join("folder_flow").join("config.xml"))
}

/// Lookup order: explicit flag, `$FOLDER_FLOW_CONFIG`, default location.
/// Relative paths are taken against the current directory.
pub fn resolve_config_path(flag: Option<&Path>) -> Option<(PathBuf, ConfigOrigin)> {
    let (path, origin) = if let Some(p) = flag {
        (p.to_path_buf(), ConfigOrigin::Flag)
    } else if let Some(p) = env::var_os(CONFIG_ENV).filter(|v| !v.is_empty()) {
        (PathBuf::from(p), ConfigOrigin::Env)
    } else {
        (default_config_path()?, ConfigOrigin::Default)
    };
    Some((absolutize(&path), origin))
}

/// Join a relative path onto the current directory; absolute paths pass through.
pub fn absolutize(path: &Path) -> PathBuf {
    if path.is_absolute() {
        return path.to_path_buf();
    }
    match env::current_dir() {
        Ok(cwd) => cwd.join(path),
        Err(_) => path.to_path_buf(),
    }
}

/// Return true if any existing ancestor of `path` is a symlink.
pub fn path_has_symlink_ancestor(path: &Path) -> io::Result<bool> {
    for anc in path.ancestors().skip(1) {
        match fs::symlink_metadata(anc) {
            Ok(meta) if meta.file_type().is_symlink() => return Ok(true),
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(e),
        }
    }
    Ok(false)
}
