use std::{io, path::Path};

use serde::Deserialize;

use libs::util;

const ENV_PREFIX: &str = "TOURIST_";

/// Process configuration, read from `TOURIST_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
    /// Relative paths land in the platform data directory.
    #[serde(default)]
    pub data_dir: String,
    #[serde(default = "default_db_file")]
    pub db_file: String,
    #[serde(default = "default_search_settings_file")]
    pub search_settings_file: String,
    pub flickr_api_key: String,
    #[serde(default = "default_flickr_api_url")]
    pub flickr_api_url: String,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

fn default_port() -> u16 {
    8080
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_db_file() -> String {
    "tourist.sqlite".to_owned()
}

fn default_search_settings_file() -> String {
    "search.toml".to_owned()
}

fn default_flickr_api_url() -> String {
    "https://api.flickr.com/services/rest".to_owned()
}

fn default_http_timeout_secs() -> u64 {
    30
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let mut config: Config = envy::prefixed(ENV_PREFIX).from_env()?;
        config.resolve_paths(&util::get_data_dir()?)?;
        Ok(config)
    }

    /// Turn the file settings into full paths below `base`, creating the
    /// data directory.
    fn resolve_paths(&mut self, base: &Path) -> io::Result<()> {
        let data_dir = base.join(&self.data_dir);
        std::fs::create_dir_all(&data_dir)?;

        self.db_file = data_dir.join(&self.db_file).to_string_lossy().into_owned();
        self.search_settings_file = data_dir
            .join(&self.search_settings_file)
            .to_string_lossy()
            .into_owned();
        self.data_dir = data_dir.to_string_lossy().into_owned();
        Ok(())
    }
}
