//! Built-in filters: `extensions`, `regex` and `script`.

use anyhow::{Context, Result, bail};
use regex::Regex;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use tracing::{debug, trace};

use super::{Filter, PluginOptions, check_option_keys, option_list, option_single};
use crate::context::FileContext;
use crate::errors::FlowError;

/// Case-insensitive match on the file extension.
/// Accepts `jpg`, `.jpg` and comma-separated lists.
#[derive(Debug, Default)]
pub struct ExtensionFilter {
    extensions: Vec<String>,
}

impl ExtensionFilter {
    pub const NAME: &'static str = "extensions";
}

impl Filter for ExtensionFilter {
    fn selector(&self) -> &str {
        Self::NAME
    }

    fn load_config(&mut self, options: &PluginOptions) -> Result<()> {
        check_option_keys(Self::NAME, options, &["extensions"])?;
        let extensions: Vec<String> = option_list(options, "extensions")
            .into_iter()
            .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
            .filter(|e| !e.is_empty())
            .collect();
        if extensions.is_empty() {
            return Err(FlowError::InvalidOption {
                plugin: Self::NAME.to_string(),
                message: "'extensions' must list at least one extension".to_string(),
            }
            .into());
        }
        debug!(?extensions, "extension filter configured");
        self.extensions = extensions;
        Ok(())
    }

    fn matches(&self, file: &FileContext) -> Result<bool> {
        let Some(ext) = file.path().extension().and_then(|e| e.to_str()) else {
            return Ok(false);
        };
        let ext = ext.to_ascii_lowercase();
        Ok(self.extensions.iter().any(|e| *e == ext))
    }
}

/// Matches the base name against any of the configured patterns.
#[derive(Debug, Default)]
pub struct RegexFilter {
    patterns: Vec<Regex>,
}

impl RegexFilter {
    pub const NAME: &'static str = "regex";
}

impl Filter for RegexFilter {
    fn selector(&self) -> &str {
        Self::NAME
    }

    fn load_config(&mut self, options: &PluginOptions) -> Result<()> {
        check_option_keys(Self::NAME, options, &["patterns"])?;
        // no comma splitting: commas are legal inside patterns
        let raw: Vec<&String> = options.get("patterns").into_iter().flatten().collect();
        if raw.is_empty() {
            return Err(FlowError::InvalidOption {
                plugin: Self::NAME.to_string(),
                message: "'patterns' cannot be empty".to_string(),
            }
            .into());
        }
        let mut compiled = Vec::with_capacity(raw.len());
        for pat in raw {
            let re = Regex::new(pat.trim()).map_err(|e| FlowError::InvalidOption {
                plugin: Self::NAME.to_string(),
                message: format!("invalid pattern {pat:?}: {e}"),
            })?;
            compiled.push(re);
        }
        self.patterns = compiled;
        Ok(())
    }

    fn matches(&self, file: &FileContext) -> Result<bool> {
        let Some(name) = file.file_name() else {
            return Ok(false);
        };
        let name = name.to_string_lossy();
        let hit = self.patterns.iter().find(|re| re.is_match(&name));
        if let Some(re) = hit {
            trace!(file = %name, pattern = re.as_str(), "regex match");
        }
        Ok(hit.is_some())
    }
}

/// Runs an external program with the file path as its last argument.
/// Exit status 0 matches, 1 does not; anything else is an error.
#[derive(Debug, Default)]
pub struct ScriptFilter {
    program: PathBuf,
    args: Vec<String>,
}

impl ScriptFilter {
    pub const NAME: &'static str = "script";
}

impl Filter for ScriptFilter {
    fn selector(&self) -> &str {
        Self::NAME
    }

    fn load_config(&mut self, options: &PluginOptions) -> Result<()> {
        check_option_keys(Self::NAME, options, &["script", "args"])?;
        let Some(script) = option_single(Self::NAME, options, "script")?.filter(|s| !s.is_empty())
        else {
            return Err(FlowError::InvalidOption {
                plugin: Self::NAME.to_string(),
                message: "'script' is required".to_string(),
            }
            .into());
        };
        self.program = PathBuf::from(script);
        self.args = options.get("args").cloned().unwrap_or_default();
        Ok(())
    }

    fn matches(&self, file: &FileContext) -> Result<bool> {
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(file.path())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .with_context(|| format!("run filter script '{}'", self.program.display()))?;
        match status.code() {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            Some(code) => bail!(
                "filter script '{}' exited with status {} for '{}'",
                self.program.display(),
                code,
                file.path().display()
            ),
            None => bail!(
                "filter script '{}' was terminated by a signal",
                self.program.display()
            ),
        }
    }
}
