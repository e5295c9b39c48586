//! Runtime configuration.
//!
//! The config file is TOML. The recognized keys mirror the runtime's
//! knobs; any additional string keys ride along into the environment store
//! so services can read them with `GETENV`.

use std::collections::HashMap;
use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use thiserror::Error;

use weft_core::EnvStore;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config: {0}")]
    Load(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("duplicate environment key: {0}")]
    Env(#[from] weft_core::EnvError),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Worker thread count.
    pub thread: usize,
    /// Node id, 1..=255.
    pub harbor: u8,
    /// Launch argument for the logger service (a file path, or nothing for
    /// tracing output).
    pub logger: Option<String>,
    /// Module search path: `;`-separated patterns with a `?` placeholder.
    pub cpath: String,
    /// Address of the cluster master.
    pub master: Option<String>,
    /// This node's address.
    pub address: Option<String>,
    /// First user service to launch.
    pub start: Option<String>,
    /// When set, also run the cluster master locally on this address.
    pub standalone: Option<String>,
    /// Unrecognized string keys, published into the environment store.
    #[serde(flatten)]
    pub extra: HashMap<String, String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            thread: 8,
            harbor: 1,
            logger: None,
            cpath: "./service/?.so".to_string(),
            master: None,
            address: None,
            start: None,
            standalone: None,
            extra: HashMap::new(),
        }
    }
}

/// Load and validate the config file at `path`.
pub fn load(path: &Path) -> Result<RuntimeConfig, ConfigError> {
    let raw = Config::builder()
        .add_source(File::new(&path.to_string_lossy(), FileFormat::Toml))
        .build()?;
    let loaded: RuntimeConfig = raw.try_deserialize()?;
    if loaded.harbor == 0 {
        return Err(ConfigError::Invalid("harbor must be in 1..=255".to_string()));
    }
    if loaded.thread == 0 {
        return Err(ConfigError::Invalid(
            "thread must be at least 1".to_string(),
        ));
    }
    Ok(loaded)
}

/// Publish every config key into the environment store, the recognized
/// ones under their standard names. Duplicates are impossible from one
/// TOML file; a collision here means `extra` shadows a standard key.
pub fn seed_env(config: &RuntimeConfig, env: &EnvStore) -> Result<(), ConfigError> {
    env.set("thread", &config.thread.to_string())?;
    env.set("harbor", &config.harbor.to_string())?;
    env.set("cpath", &config.cpath)?;
    for (key, value) in [
        ("logger", &config.logger),
        ("master", &config.master),
        ("address", &config.address),
        ("start", &config.start),
        ("standalone", &config.standalone),
    ] {
        if let Some(value) = value {
            env.set(key, value)?;
        }
    }
    for (key, value) in &config.extra {
        env.set(key, value)?;
    }
    Ok(())
}
