use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use url::Url;

use crate::error::{Error, Result};

pub const DEFAULT_API_URL: &str = "http://localhost:8080/api";
pub const DEFAULT_LOG_FILTER: &str = "warn";

const APP_DIR: &str = "webp2p";
const CONFIG_FILE: &str = "config.toml";

pub const ENV_API_URL: &str = "WEBP2P_API_URL";
pub const ENV_DATA_DIR: &str = "WEBP2P_DATA_DIR";
pub const ENV_LOG: &str = "RUST_LOG";

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Always ends in `/` so endpoint paths join below it.
    pub api_base_url: Url,
    /// Where the session is kept.
    pub data_dir: PathBuf,
    pub log_filter: String,
}

/// On-disk shape of `config.toml`. Every key is optional.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    api_base_url: Option<String>,
    data_dir: Option<PathBuf>,
    log_filter: Option<String>,
}

/// Values given on the command line, which win over everything else.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_base_url: Option<String>,
    pub data_dir: Option<PathBuf>,
}

impl Config {
    /// Defaults, then `~/.config/webp2p/config.toml`, then the environment,
    /// then `overrides`.
    pub fn load(overrides: Overrides) -> Result<Self> {
        let file = match dirs::config_dir() {
            Some(dir) => read_config_file(&dir.join(APP_DIR).join(CONFIG_FILE))?,
            None => ConfigFile::default(),
        };
        Self::resolve(file, |key| env::var(key).ok(), overrides)
    }

    fn resolve(
        file: ConfigFile,
        env: impl Fn(&str) -> Option<String>,
        overrides: Overrides,
    ) -> Result<Self> {
        let api_url = overrides
            .api_base_url
            .or_else(|| env(ENV_API_URL))
            .or(file.api_base_url)
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let data_dir = overrides
            .data_dir
            .or_else(|| env(ENV_DATA_DIR).map(PathBuf::from))
            .or(file.data_dir)
            .or_else(|| dirs::data_dir().map(|dir| dir.join(APP_DIR)))
            .unwrap_or_else(|| PathBuf::from(format!(".{APP_DIR}")));

        let log_filter = env(ENV_LOG)
            .or(file.log_filter)
            .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

        Ok(Self {
            api_base_url: parse_base_url(&api_url)?,
            data_dir,
            log_filter,
        })
    }
}

fn read_config_file(path: &Path) -> Result<ConfigFile> {
    if !path.exists() {
        return Ok(ConfigFile::default());
    }

    let content = fs::read_to_string(path).map_err(|e| Error::storage(path, e))?;
    if content.trim().is_empty() {
        return Ok(ConfigFile::default());
    }

    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {}", path.display(), e)))
}

pub fn parse_base_url(raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw.trim())?;
    if url.cannot_be_a_base() {
        return Err(Error::Config(format!("'{raw}' cannot be used as an API base URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
