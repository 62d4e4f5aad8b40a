//! Configuration loading and parsing

use anyhow::{bail, Context, Result};
use cohort_predicates::{DerivedPredicateSpec, PlainPredicateSpec, PredicatesConfig, StaticHandling};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from config.toml)
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub input: InputConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub options: OptionsConfig,
    /// Plain predicates by name, in file order
    #[serde(default)]
    pub predicates: toml::Table,
    /// Derived predicates by name, in file order
    #[serde(default)]
    pub derived: toml::Table,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct InputConfig {
    /// JSON-lines event log
    pub events: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OutputConfig {
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Tsv,
    Json,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct OptionsConfig {
    #[serde(default)]
    pub static_handling: StaticHandling,
    /// Worker threads (default: one per core)
    pub threads: Option<usize>,
    /// Keep only rows where this predicate fired
    pub trigger: Option<String>,
}

impl AppConfig {
    /// Convert the predicate tables into the library configuration
    pub fn predicates_config(&self) -> Result<PredicatesConfig> {
        let mut config = PredicatesConfig::new().with_static_handling(self.options.static_handling);

        for (name, value) in &self.predicates {
            let spec: PlainPredicateSpec = named_entry(name, value)
                .try_into()
                .with_context(|| format!("Invalid plain predicate '{}'", name))?;
            config = config.add_plain(spec);
        }

        for (name, value) in &self.derived {
            let spec: DerivedPredicateSpec = named_entry(name, value)
                .try_into()
                .with_context(|| format!("Invalid derived predicate '{}'", name))?;
            config = config.add_derived(spec.name, spec.expr);
        }

        Ok(config)
    }
}

/// A `[predicates.<name>]` / `[derived.<name>]` table with its key added as `name`
///
/// Non-table entries are passed through unchanged and fail to deserialize.
fn named_entry(name: &str, value: &toml::Value) -> toml::Value {
    let mut entry = value.clone();
    if let toml::Value::Table(table) = &mut entry {
        table.insert("name".to_string(), toml::Value::String(name.to_string()));
    }
    entry
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config = parse_config(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

/// Parse and sanity-check configuration text
pub fn parse_config(content: &str) -> Result<AppConfig> {
    let config: AppConfig = toml::from_str(content)?;

    if config.predicates.is_empty() && config.derived.is_empty() {
        bail!("No predicates declared: add [predicates.<name>] or [derived.<name>] tables");
    }
    if let Some(0) = config.options.threads {
        bail!("options.threads must be at least 1");
    }

    Ok(config)
}
