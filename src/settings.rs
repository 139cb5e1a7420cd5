//! File-based configuration for the import binary.

use std::path::PathBuf;

use serde::Deserialize;

use crate::error::{GraftError, Result};

/// Settings read from `deepgraft.{json,toml,...}` next to the binary,
/// overridable through `DEEPGRAFT_`-prefixed environment variables.
///
/// A store path of `None` means an in-memory store; the source store is
/// opened read-only whenever it is backed by a file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub source_store: Option<PathBuf>,
    #[serde(default)]
    pub target_store: Option<PathBuf>,
    /// Entity types to deep-copy, in order.
    #[serde(default)]
    pub entities: Vec<String>,
    /// Log filter directive, e.g. "deepgraft=debug".
    #[serde(default)]
    pub log_filter: Option<String>,
}

impl Settings {
    pub fn load(name: &str) -> Result<Settings> {
        let loaded = config::Config::builder()
            .add_source(config::File::with_name(name).required(false))
            .add_source(config::Environment::with_prefix("DEEPGRAFT"))
            .build()
            .map_err(|e| GraftError::Config(e.to_string()))?;
        loaded
            .try_deserialize()
            .map_err(|e| GraftError::Config(e.to_string()))
    }
}
