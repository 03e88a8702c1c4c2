//! Configuration: types, file lookup, XML loading, validation, and the
//! translation into a ready-to-run `Classifier` through a `PluginRegistry`.

pub mod paths;
pub mod types;
mod validate;
pub mod xml;

use anyhow::{Context, Result};

pub use paths::{
    CONFIG_ENV, ConfigOrigin, default_config_path, path_has_symlink_ancestor, resolve_config_path,
};
pub use types::{Config, DestinationConfig, LogLevel, PluginConfig, RegroupConfig};
pub use xml::{load_config_from_path, parse_config_str};

use crate::classifier::{Classifier, DestinationRule};
use crate::plugin::PluginRegistry;
use crate::regroup::RegroupRule;

impl Config {
    /// Instantiate every plugin and assemble the classifier.
    /// Unknown plugin names and bad options fail here, before any file is touched.
    pub fn build_classifier(&self, registry: &PluginRegistry) -> Result<Classifier> {
        let mut rules = Vec::with_capacity(self.destinations.len());
        for dest in &self.destinations {
            let strategy = registry
                .new_strategy(&dest.strategy.name, &dest.strategy.options)
                .with_context(|| format!("dest_dir '{}'", dest.name))?;
            let mut rule = DestinationRule::new(&dest.name, &dest.path, strategy)
                .with_conflict_policy(dest.on_conflict);
            for f in &dest.filters {
                let filter = registry
                    .new_filter(&f.name, &f.options)
                    .with_context(|| format!("dest_dir '{}'", dest.name))?;
                rule = rule.with_filter(filter);
            }
            rules.push(rule);
        }

        let mut classifier = Classifier::new(self.sources.clone(), rules)?
            .with_max_workers(self.max_workers)
            .with_dry_run(self.dry_run);

        if let Some(rg) = &self.regroup {
            let strategy = registry
                .new_strategy(&rg.strategy.name, &rg.strategy.options)
                .context("regroup")?;
            let mut rule = RegroupRule::new(&rg.path, rg.mode, strategy);
            if let Some(fallback) = rg.fallback {
                rule = rule.with_fallback_chain(fallback);
            }
            classifier = classifier.with_regroup(rule);
        }
        Ok(classifier)
    }
}
