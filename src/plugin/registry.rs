//! Name -> constructor tables for filters and strategies.
//!
//! The registry is an explicit value built once at startup and passed to
//! whatever turns configuration into rules. Nothing is registered globally.

use anyhow::{Context, Result};
use std::collections::BTreeMap;
use std::fmt;

use super::{
    DateStrategy, DirChainStrategy, ExtensionFilter, Filter, PluginOptions, RegexFilter,
    ScriptFilter, Strategy,
};
use crate::errors::FlowError;

pub type FilterFactory = Box<dyn Fn() -> Box<dyn Filter> + Send + Sync>;
pub type StrategyFactory = Box<dyn Fn() -> Box<dyn Strategy> + Send + Sync>;

#[derive(Default)]
pub struct PluginRegistry {
    filters: BTreeMap<String, FilterFactory>,
    strategies: BTreeMap<String, StrategyFactory>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("filters", &self.filter_names())
            .field("strategies", &self.strategy_names())
            .finish()
    }
}

impl PluginRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in filter and strategy.
    pub fn with_builtins() -> Self {
        let mut reg = Self::new();
        // Names are distinct constants; registration into an empty table cannot collide.
        let _ = reg.register_filter(ExtensionFilter::NAME, || Box::new(ExtensionFilter::default()));
        let _ = reg.register_filter(RegexFilter::NAME, || Box::new(RegexFilter::default()));
        let _ = reg.register_filter(ScriptFilter::NAME, || Box::new(ScriptFilter::default()));
        let _ = reg.register_strategy(DirChainStrategy::NAME, || Box::new(DirChainStrategy));
        let _ = reg.register_strategy(DateStrategy::NAME, || Box::new(DateStrategy::default()));
        reg
    }

    pub fn register_filter<F>(&mut self, name: &str, factory: F) -> Result<(), FlowError>
    where
        F: Fn() -> Box<dyn Filter> + Send + Sync + 'static,
    {
        if self.filters.contains_key(name) {
            return Err(FlowError::DuplicatePlugin {
                kind: "filter",
                name: name.to_string(),
            });
        }
        self.filters.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    pub fn register_strategy<F>(&mut self, name: &str, factory: F) -> Result<(), FlowError>
    where
        F: Fn() -> Box<dyn Strategy> + Send + Sync + 'static,
    {
        if self.strategies.contains_key(name) {
            return Err(FlowError::DuplicatePlugin {
                kind: "strategy",
                name: name.to_string(),
            });
        }
        self.strategies.insert(name.to_string(), Box::new(factory));
        Ok(())
    }

    /// Fresh, configured filter instance.
    pub fn new_filter(&self, name: &str, options: &PluginOptions) -> Result<Box<dyn Filter>> {
        let factory = self.filters.get(name).ok_or_else(|| FlowError::UnknownPlugin {
            kind: "filter",
            name: name.to_string(),
        })?;
        let mut filter = factory();
        filter
            .load_config(options)
            .with_context(|| format!("configure filter '{name}'"))?;
        Ok(filter)
    }

    /// Fresh, configured strategy instance.
    pub fn new_strategy(&self, name: &str, options: &PluginOptions) -> Result<Box<dyn Strategy>> {
        let factory = self
            .strategies
            .get(name)
            .ok_or_else(|| FlowError::UnknownPlugin {
                kind: "strategy",
                name: name.to_string(),
            })?;
        let mut strategy = factory();
        strategy
            .load_config(options)
            .with_context(|| format!("configure strategy '{name}'"))?;
        Ok(strategy)
    }

    pub fn filter_names(&self) -> Vec<&str> {
        self.filters.keys().map(String::as_str).collect()
    }

    pub fn strategy_names(&self) -> Vec<&str> {
        self.strategies.keys().map(String::as_str).collect()
    }
}
