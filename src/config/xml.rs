//! XML configuration support (quick_xml + serde).
//!
//! Document shape:
//!
//! ```xml
//! <config>
//!   <max_workers>0</max_workers>
//!   <log_level>normal</log_level>
//!   <source_dir>/data/inbox</source_dir>
//!   <dest_dir>
//!     <name>images</name>
//!     <path>/data/images</path>
//!     <on_conflict>rename</on_conflict>
//!     <filter name="extensions"><option key="extensions">jpg</option></filter>
//!     <strategy name="date"><option key="format">%Y/%m</option></strategy>
//!   </dest_dir>
//!   <regroup><path>/data/all</path><mode>symlink</mode></regroup>
//! </config>
//! ```
//!
//! Unknown elements are rejected so typos surface instead of being ignored.
//! Relative paths are resolved against the current directory.

use anyhow::{Context, Result, anyhow, bail};
use quick_xml::de::from_str as from_xml_str;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::paths::absolutize;
use super::types::{Config, DestinationConfig, LogLevel, PluginConfig, RegroupConfig};
use crate::mover::ConflictPolicy;
use crate::regroup::RegroupMode;

#[derive(Debug, Deserialize)]
#[serde(rename = "config", deny_unknown_fields)]
struct XmlConfig {
    #[serde(rename = "source_dir", default)]
    source_dirs: Vec<String>,
    #[serde(rename = "dest_dir", default)]
    dest_dirs: Vec<XmlDestination>,
    #[serde(default)]
    regroup: Option<XmlRegroup>,
    #[serde(default)]
    max_workers: Option<String>,
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    log_file: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlDestination {
    #[serde(default)]
    name: Option<String>,
    path: String,
    #[serde(default)]
    on_conflict: Option<String>,
    #[serde(rename = "filter", default)]
    filters: Vec<XmlPlugin>,
    #[serde(default)]
    strategy: Option<XmlPlugin>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlRegroup {
    path: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default)]
    strategy: Option<XmlPlugin>,
    #[serde(default)]
    fallback: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlPlugin {
    #[serde(rename = "@name")]
    name: String,
    #[serde(rename = "option", default)]
    options: Vec<XmlOption>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct XmlOption {
    #[serde(rename = "@key")]
    key: String,
    #[serde(rename = "$text", default)]
    value: String,
}

/// Load and map a config file.
pub fn load_config_from_path(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("read config xml '{}'", path.display()))?;
    let cfg = parse_config_str(&contents)
        .with_context(|| format!("parse config xml '{}'", path.display()))?;
    debug!(
        path = %path.display(),
        sources = cfg.sources.len(),
        destinations = cfg.destinations.len(),
        "config loaded"
    );
    Ok(cfg)
}

/// Parse an XML document into a `Config`. Names (policies, modes, levels)
/// are checked here; filesystem checks happen in `Config::validate`.
pub fn parse_config_str(xml: &str) -> Result<Config> {
    let parsed: XmlConfig = from_xml_str(xml)?;
    xml_to_config(parsed)
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

fn to_path(s: &str) -> PathBuf {
    absolutize(Path::new(s.trim()))
}

fn plugin(p: XmlPlugin) -> PluginConfig {
    let mut out = PluginConfig::named(p.name.trim());
    for opt in p.options {
        out = out.with_option(opt.key.trim(), opt.value.trim());
    }
    out
}

fn parse_bool(field: &str, s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" => Ok(true),
        "false" | "no" | "0" => Ok(false),
        other => bail!("<{field}> must be true or false, got '{other}'"),
    }
}

fn xml_to_config(parsed: XmlConfig) -> Result<Config> {
    let mut cfg = Config {
        sources: parsed
            .source_dirs
            .iter()
            .filter_map(|s| non_empty(Some(s.as_str())))
            .map(to_path)
            .collect(),
        ..Config::default()
    };

    for (idx, d) in parsed.dest_dirs.into_iter().enumerate() {
        let path = non_empty(Some(d.path.as_str()))
            .ok_or_else(|| anyhow!("<dest_dir> #{} has an empty <path>", idx + 1))?;
        let on_conflict = match non_empty(d.on_conflict.as_deref()) {
            Some(s) => s.parse::<ConflictPolicy>()?,
            None => ConflictPolicy::default(),
        };
        let name = non_empty(d.name.as_deref())
            .map(str::to_string)
            .unwrap_or_else(|| format!("dest_dir#{}", idx + 1));
        cfg.destinations.push(DestinationConfig {
            name,
            path: to_path(path),
            on_conflict,
            filters: d.filters.into_iter().map(plugin).collect(),
            strategy: d.strategy.map(plugin).unwrap_or_else(PluginConfig::default_strategy),
        });
    }

    if let Some(r) = parsed.regroup {
        let path = non_empty(Some(r.path.as_str())).ok_or_else(|| anyhow!("<regroup> has an empty <path>"))?;
        let mode = match non_empty(r.mode.as_deref()) {
            Some(s) => s.parse::<RegroupMode>()?,
            None => RegroupMode::default(),
        };
        let fallback = non_empty(r.fallback.as_deref())
            .map(|s| parse_bool("fallback", s))
            .transpose()?;
        cfg.regroup = Some(RegroupConfig {
            path: to_path(path),
            mode,
            strategy: r.strategy.map(plugin).unwrap_or_else(PluginConfig::default_strategy),
            fallback,
        });
    }

    if let Some(s) = non_empty(parsed.max_workers.as_deref()) {
        cfg.max_workers = s
            .parse::<i64>()
            .with_context(|| format!("<max_workers> must be an integer, got '{s}'"))?;
    }
    if let Some(s) = non_empty(parsed.log_level.as_deref()) {
        cfg.log_level = s.parse::<LogLevel>().map_err(|e| anyhow!(e))?;
    }
    cfg.log_file = non_empty(parsed.log_file.as_deref()).map(to_path);

    Ok(cfg)
}
