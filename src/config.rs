use serde::{Deserialize, Serialize};
use std::{fs::File, io::BufReader, path::Path};

use crate::{Error, InternalResult};

/// Engine-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    /// RNG seed for reproducible runs. Unset draws from entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

/// A full experiment description as loaded by the CLI: the declared
/// parameters plus run settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentConfig {
    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default = "default_trials")]
    pub trials: usize,

    pub parameters: Vec<ParameterDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParameterDecl {
    pub name: String,

    /// Expression source (or a rendered literal).
    pub expression: String,

    #[serde(default)]
    pub label: String,

    /// Should the parameter appear in the trial log?
    #[serde(default = "default_true")]
    pub log: bool,
}

pub fn from_file<T: for<'de> Deserialize<'de>, P: AsRef<Path>>(path: P) -> InternalResult<T> {
    let file = File::open(path)
        .map_err(|e| Error::Internal(format!("Failed to open config file: {}", e)))?;
    let reader = BufReader::new(file);
    let config = serde_json::from_reader(reader)
        .map_err(|e| Error::Internal(format!("Failed to parse config file: {}", e)))?;
    Ok(config)
}

pub fn from_str<T: for<'de> Deserialize<'de>>(s: &str) -> InternalResult<T> {
    let config = serde_json::from_str(s)
        .map_err(|e| Error::Internal(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

impl ExperimentConfig {
    pub fn from_file(path: &str) -> InternalResult<Self> {
        from_file(path)
    }
}

// デフォルト値の定義
fn default_trials() -> usize {
    100
}

fn default_true() -> bool {
    true
}
