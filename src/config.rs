use failure::Fail;
use log::LevelFilter;
use serde::Deserialize;
use std::{collections::HashMap, fs, path::Path};
use toml;

pub fn load() -> crate::Result<Config> {
    Config::from_file("config.toml")
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub database: Option<Database>,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    /// Read configuration from a TOML file.
    pub fn from_file<P>(path: P) -> crate::Result<Config>
    where
        P: AsRef<Path>,
    {
        let data = fs::read(path).map_err(ReadConfigurationError)?;
        toml::from_slice(&data).map_err(|e| ConfigurationError(e).into())
    }
}

#[derive(Clone, Debug, Deserialize)]
pub struct Database {
    /// Database connection URL.
    pub url: String,
}

/// Logging configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct Logging {
    /// Default logging level.
    #[serde(default = "default_level_filter")]
    pub level: LevelFilter,
    /// Custom filters.
    #[serde(default)]
    pub filters: HashMap<String, LevelFilter>,
}

/// Configure the global logger according to a [`Logging`] section.
///
/// Callers embedding this crate (a server binary, the test harness) invoke
/// this once at startup; the `RUST_LOG` environment variable still takes
/// precedence over configured filters.
pub fn setup_logging(cfg: &Logging) {
    let mut builder = env_logger::Builder::from_default_env();

    builder.filter_level(cfg.level);

    for (module, level) in &cfg.filters {
        builder.filter_module(module, *level);
    }

    let _ = builder.try_init();
}

#[derive(Debug, Fail)]
#[fail(display = "Cannot read configuration file")]
pub struct ReadConfigurationError(#[fail(cause)] std::io::Error);

#[derive(Debug, Fail)]
#[fail(display = "Invalid configuration: {}", _0)]
pub struct ConfigurationError(#[fail(cause)] toml::de::Error);

fn default_level_filter() -> LevelFilter {
    LevelFilter::Info
}

impl Default for Logging {
    fn default() -> Self {
        Logging {
            level: default_level_filter(),
            filters: HashMap::new(),
        }
    }
}
