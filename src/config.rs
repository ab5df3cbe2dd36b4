use crate::{
    error::{Result, SnowballError},
    model::ChannelId,
};
use chrono::{Local, NaiveDate};
use log::info;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

/// Looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "snowball-config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnowballConfig {
    /// Run folders are created under this directory.
    pub data_directory: PathBuf,
    /// Text file of channel ids that are never expanded.
    pub blacklist: Option<PathBuf>,
    /// Environment variable holding the YouTube Data API key.
    pub api_key_env: String,
    pub client: ClientConfig,
    pub sets: BTreeMap<String, StartingSet>,
}

/// A named seed and how far to grow it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartingSet {
    /// JSON array of channel ids.
    pub seed_file: PathBuf,
    pub target_size: usize,
    /// Run folders are named `<output_prefix><dd-mm-yyyy>`.
    pub output_prefix: String,
    /// Channels of these searches' results are appended to the seed.
    #[serde(default)]
    pub searches: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub watch_base_url: String,
    pub user_agent: String,
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_ms: u64,
    /// Results kept per seed search (the API caps this at 50).
    pub search_results: u32,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://www.googleapis.com/youtube/v3".to_string(),
            watch_base_url: "https://www.youtube.com".to_string(),
            user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36".to_string(),
            timeout_seconds: 30,
            max_retries: 3,
            retry_delay_ms: 1000,
            search_results: 50,
        }
    }
}

impl ClientConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl Default for SnowballConfig {
    fn default() -> Self {
        let mut sets = BTreeMap::new();
        sets.insert(
            "us".to_string(),
            StartingSet {
                seed_file: PathBuf::from("base_channels/us_information_channels.json"),
                target_size: 2000,
                output_prefix: "us-info-".to_string(),
                searches: Vec::new(),
            },
        );
        sets.insert(
            "fr".to_string(),
            StartingSet {
                seed_file: PathBuf::from("base_channels/france_information_channels.json"),
                target_size: 2000,
                output_prefix: "france-".to_string(),
                searches: Vec::new(),
            },
        );
        Self {
            data_directory: PathBuf::from("channel-stats"),
            blacklist: None,
            api_key_env: "YOUTUBE_API_KEY".to_string(),
            client: ClientConfig::default(),
            sets,
        }
    }
}

impl SnowballConfig {
    pub fn load(path: &Path) -> Result<Self> {
        info!("Loading configuration from {}", path.display());
        let text = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// The explicit path if given, else [`DEFAULT_CONFIG_FILE`] if present,
    /// else the built-in sets.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(DEFAULT_CONFIG_FILE).exists() => {
                Self::load(Path::new(DEFAULT_CONFIG_FILE))
            }
            None => {
                let config = Self::default();
                config.validate()?;
                Ok(config)
            }
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.sets.is_empty() {
            return Err(SnowballError::Config("no starting sets configured".into()));
        }
        if self.api_key_env.trim().is_empty() {
            return Err(SnowballError::Config("api_key_env must not be empty".into()));
        }
        if self.client.search_results == 0 || self.client.search_results > 50 {
            return Err(SnowballError::Config(format!(
                "search_results must be between 1 and 50, got {}",
                self.client.search_results
            )));
        }
        for (name, set) in &self.sets {
            if set.target_size == 0 {
                return Err(SnowballError::Config(format!(
                    "set \"{name}\": target_size must be positive"
                )));
            }
            if set.output_prefix.is_empty() {
                return Err(SnowballError::Config(format!(
                    "set \"{name}\": output_prefix must not be empty"
                )));
            }
        }
        Ok(())
    }

    /// Set names match case-insensitively.
    pub fn starting_set(&self, name: &str) -> Result<(&str, &StartingSet)> {
        self.sets
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(key, set)| (key.as_str(), set))
            .ok_or_else(|| SnowballError::UnknownSet {
                name: name.to_string(),
                known: self.sets.keys().cloned().collect::<Vec<_>>().join(", "),
            })
    }

    /// Reads the API key; fails before anything is fetched if it is missing.
    pub fn api_key(&self) -> Result<String> {
        match env::var(&self.api_key_env) {
            Ok(key) if !key.trim().is_empty() => Ok(key.trim().to_string()),
            _ => Err(SnowballError::MissingCredentials(self.api_key_env.clone())),
        }
    }
}

impl StartingSet {
    pub fn load_seed(&self) -> Result<Vec<ChannelId>> {
        info!("Loading seed channels from {}", self.seed_file.display());
        let text = fs::read_to_string(&self.seed_file)?;
        let seed: Vec<ChannelId> = serde_json::from_str(&text)?;
        Ok(seed)
    }
}

/// Parses `--date` (`dd-mm-yyyy`), defaulting to today.
pub fn run_date(arg: Option<&str>) -> Result<NaiveDate> {
    match arg.map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => NaiveDate::parse_from_str(raw, "%d-%m-%Y").map_err(|_| {
            SnowballError::Config(format!("date \"{raw}\" should be in format dd-mm-yyyy"))
        }),
        None => Ok(Local::now().date_naive()),
    }
}
