use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};

use crate::platform::PlatformMatcher;

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(default)]
pub struct Config {
    pub storage: StorageConfig,
    pub merge: MergeConfig,
    pub distribution: DistributionConfig,
    pub keywords: KeywordsConfig,
    pub formatting: FormattingConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MergePolicy {
    /// Add new rows after whatever is already merged for the platform.
    Append,
    /// Replace the merged dataset with this invocation's uploads.
    Overwrite,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct MergeConfig {
    pub policy: MergePolicy,
    /// Platform keys in match priority order.
    pub platforms: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct DistributionConfig {
    pub accounts: usize,
    pub rows_per_account: usize,
    pub archive_suffix: String,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct KeywordsConfig {
    pub api_url: String,
    pub model: String,
    pub api_key: String,
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(default)]
pub struct FormattingConfig {
    pub number_comma: bool,
    pub number_human: bool,
    pub locale: String,
    pub decimal_places: usize,
}

pub const DEFAULT_PLATFORMS: [&str; 6] = [
    "amazon_us",
    "ebay",
    "amazon_de",
    "amazon_uk",
    "amazon_ca",
    "amazon_au",
];

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("."),
        }
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            policy: MergePolicy::Append,
            platforms: DEFAULT_PLATFORMS.iter().map(|p| p.to_string()).collect(),
        }
    }
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            accounts: 23,
            rows_per_account: 100,
            archive_suffix: "_distribution".to_string(),
        }
    }
}

impl Default for KeywordsConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.groq.com/openai/v1/chat/completions".to_string(),
            model: "meta-llama/llama-4-maverick-17b-128e-instruct".to_string(),
            api_key: "".to_string(),
            retries: 3,
            retry_delay_ms: 1500,
            timeout_seconds: 30,
        }
    }
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            number_comma: false,
            number_human: false,
            locale: "en".to_string(),
            decimal_places: 2,
        }
    }
}

/// On-disk layout under the data directory.
#[derive(Debug, Clone)]
pub struct DataPaths {
    pub merged_dir: PathBuf,
    pub distributed_dir: PathBuf,
    pub leftover_dir: PathBuf,
    pub generated_dir: PathBuf,
    pub lock_file: PathBuf,
}

impl DataPaths {
    pub fn new(root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        Self {
            merged_dir: root.join("merged"),
            distributed_dir: root.join("distributed"),
            leftover_dir: root.join("leftover"),
            generated_dir: root.join("generated"),
            lock_file: root.join(".kwdist.lock"),
        }
    }
}

thread_local! {
    static TEST_CONFIG_PATH: RefCell<Option<PathBuf>> = const { RefCell::new(None) };
}

#[cfg(test)]
pub fn set_test_config_path(path: PathBuf) {
    TEST_CONFIG_PATH.with(|p| *p.borrow_mut() = Some(path));
}

impl Config {
    pub fn config_path() -> Result<PathBuf> {
        #[cfg(test)]
        {
            if let Some(path) = TEST_CONFIG_PATH.with(|p| p.borrow().clone()) {
                return Ok(path);
            }
        }

        Ok(dirs::home_dir()
            .context("Could not find home directory")?
            .join(".kwdist.toml"))
    }

    pub fn load() -> Result<Option<Config>> {
        let config_path = Self::config_path()?;

        if !config_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&config_path).context("Failed to read config file")?;

        let config: Config = toml::from_str(&content).context("Failed to parse config file")?;

        Ok(Some(config))
    }

    pub fn save(&self, silent: bool) -> Result<()> {
        let config_path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&config_path, content).context("Failed to write config file")?;

        if !silent {
            println!("✅ Configuration saved to: {}", config_path.display());
        }

        Ok(())
    }

    pub fn paths(&self) -> DataPaths {
        DataPaths::new(&self.storage.data_dir)
    }

    pub fn matcher(&self) -> PlatformMatcher {
        PlatformMatcher::from_names(&self.merge.platforms)
    }

    /// Configured key, or `GROQ_API_KEY` from the environment.
    pub fn api_key(&self) -> Option<String> {
        if !self.keywords.api_key.is_empty() {
            return Some(self.keywords.api_key.clone());
        }
        std::env::var("GROQ_API_KEY")
            .ok()
            .filter(|key| !key.trim().is_empty())
    }
}

// CLI helper functions
pub fn create_default_config(overwrite: bool) -> Result<()> {
    let config = Config::default();
    if !std::fs::exists(Config::config_path()?)? || overwrite {
        config.save(true)?;

        println!("📝 Created default configuration file.");
        println!("📍 Set your keyword API key with:");
        println!("   kwdist config set api-key ...");
        println!("or edit");
        println!("   {}", Config::config_path()?.display());
    } else {
        println!("Configuration already exists.  Pass `--overwrite` to overwrite.");
    }

    Ok(())
}

pub fn show_config() -> Result<()> {
    match Config::load()? {
        Some(config) => {
            println!("🔧 Current configuration:");
            println!("   Data Dir: {}", config.storage.data_dir.display());
            println!("   Merge Policy: {:?}", config.merge.policy);
            println!("   Platforms: {}", config.merge.platforms.join(", "));
            println!("   Accounts: {}", config.distribution.accounts);
            println!(
                "   Rows Per Account: {}",
                config.distribution.rows_per_account
            );
            println!("   Archive Suffix: {}", config.distribution.archive_suffix);
            println!(
                "   API Key: {}",
                if config.keywords.api_key.is_empty() {
                    "Not set"
                } else {
                    "Set"
                }
            );
            println!("   Model: {}", config.keywords.model);
            println!("   Retries: {}", config.keywords.retries);
            println!("   Number Comma: {}", config.formatting.number_comma);
            println!("   Number Human: {}", config.formatting.number_human);
            println!("   Locale: {}", config.formatting.locale);
            println!("   Decimal Places: {}", config.formatting.decimal_places);
        }
        None => {
            println!("❌ No configuration file found.");
            println!("   Run 'kwdist config init' to create one.");
        }
    }
    Ok(())
}

fn parse_bool(value: &str) -> Result<bool> {
    value
        .parse::<bool>()
        .context("Invalid boolean value. Use 'true' or 'false'")
}

fn parse_positive(value: &str) -> Result<usize> {
    let n = value.parse::<usize>().context("Invalid number value")?;
    if n == 0 {
        anyhow::bail!("Value must be at least 1");
    }
    Ok(n)
}

pub fn set_config_value(key: &str, value: &str) -> Result<()> {
    let mut config = Config::load()?.unwrap_or_default();

    match key {
        "data-dir" => config.storage.data_dir = PathBuf::from(value),
        "merge-policy" => {
            config.merge.policy = match value {
                "append" => MergePolicy::Append,
                "overwrite" => MergePolicy::Overwrite,
                _ => anyhow::bail!("Invalid merge policy. Use 'append' or 'overwrite'"),
            }
        }
        "platforms" => {
            let platforms: Vec<String> = value
                .split(',')
                .map(|p| p.trim().to_string())
                .filter(|p| !p.is_empty())
                .collect();
            if platforms.is_empty() {
                anyhow::bail!("At least one platform key is required");
            }
            config.merge.platforms = platforms;
        }
        "accounts" => config.distribution.accounts = parse_positive(value)?,
        "rows-per-account" => config.distribution.rows_per_account = parse_positive(value)?,
        "archive-suffix" => {
            crate::distribute::check_archive_suffix(value)?;
            config.distribution.archive_suffix = value.to_string();
        }
        "api-key" => config.keywords.api_key = value.to_string(),
        "api-url" => config.keywords.api_url = value.to_string(),
        "model" => config.keywords.model = value.to_string(),
        "retries" => {
            config.keywords.retries = value.parse::<u32>().context("Invalid number value")?
        }
        "retry-delay-ms" => {
            config.keywords.retry_delay_ms = value.parse::<u64>().context("Invalid number value")?
        }
        "timeout-seconds" => {
            config.keywords.timeout_seconds =
                value.parse::<u64>().context("Invalid number value")?
        }
        "number-comma" => config.formatting.number_comma = parse_bool(value)?,
        "number-human" => config.formatting.number_human = parse_bool(value)?,
        "locale" => {
            config.formatting.locale = value.to_string();
        }
        "decimal-places" => {
            let places = value.parse::<usize>().context("Invalid number value")?;
            config.formatting.decimal_places = places;
        }
        _ => anyhow::bail!("Unknown config key: {}", key),
    }

    config.save(false)?;
    Ok(())
}
