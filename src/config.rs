use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
};

use config::{Config, ConfigError, Environment, File};
use home::home_dir;
use log::debug;
use serde::Deserialize;

use crate::{model::SourceCodeOrigin, resolver::ReResolution};

/// Settings from `$HOME/.provenant/config.toml` and `PROVENANT_*` environment variables,
/// the latter taking precedence. Unset values fall back to the builder defaults.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ProvenantConfig {
    pub cache_dir: Option<PathBuf>,
    pub storage_file: Option<PathBuf>,
    pub origins: Option<Vec<SourceCodeOrigin>>,
    pub re_resolution: Option<ReResolution>,
    pub jobs: Option<usize>,
    pub http_timeout: Option<Duration>,
}

impl ProvenantConfig {
    pub fn load() -> anyhow::Result<Self> {
        let config_file = home_dir().map(|home| home.join(".provenant/config.toml"));
        if let Some(config_file) = &config_file {
            debug!("Loading configuration from {}", config_file.display());
        }
        let raw_config = RawConfig::load(config_file.as_deref(), None)?;

        Ok(raw_config.into())
    }
}

impl From<RawConfig> for ProvenantConfig {
    fn from(raw_config: RawConfig) -> Self {
        ProvenantConfig {
            cache_dir: raw_config.cache.dir,
            storage_file: raw_config.storage.file,
            origins: raw_config.resolution.origins,
            re_resolution: raw_config.resolution.retry,
            jobs: raw_config.resolution.jobs,
            http_timeout: raw_config.http.timeout.map(Duration::from_secs),
        }
    }
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct RawConfig {
    #[serde(default)]
    cache: CacheConfig,
    #[serde(default)]
    storage: StorageConfig,
    #[serde(default)]
    resolution: ResolutionConfig,
    #[serde(default)]
    http: HttpConfig,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct CacheConfig {
    dir: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct StorageConfig {
    file: Option<PathBuf>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct ResolutionConfig {
    origins: Option<Vec<SourceCodeOrigin>>,
    retry: Option<ReResolution>,
    jobs: Option<usize>,
}

#[derive(Default, Debug, Deserialize, PartialEq, Eq)]
struct HttpConfig {
    /// Seconds.
    timeout: Option<u64>,
}

impl RawConfig {
    fn load(
        config_file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(config_file) = config_file {
            builder = builder.add_source(File::from(config_file).required(false));
        }
        builder
            .add_source(
                Environment::with_prefix("PROVENANT")
                    .separator("_")
                    .list_separator(",")
                    .with_list_parse_key("resolution.origins")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()
    }
}
