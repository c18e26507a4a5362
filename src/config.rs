//! TOML configuration.
//!
//! Every section except `[db]` may be omitted and falls back to the
//! defaults below.
//!
//! ```toml
//! [db]
//! path = "./data/deckforge.sqlite"
//!
//! [windowing]
//! transcript_window_tokens = 150
//!
//! [alignment]
//! fuzzy_threshold = 0.2
//! min_title_chars = 3
//!
//! [cards]
//! tiers = ["verified", "slide_only", "transcript_only"]
//!
//! [deck]
//! api_url = "http://127.0.0.1:8765"
//! model_name = "Basic"
//! timeout_secs = 10
//! fallback_dir = "./data/fallback"
//!
//! [sync]
//! max_attempts = 5
//! lock_timeout_secs = 30
//! stale_lock_secs = 300
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use deckforge_core::align::{AlignParams, DEFAULT_FUZZY_THRESHOLD, DEFAULT_MIN_TITLE_CHARS};
use deckforge_core::card::CardPolicy;
use deckforge_core::models::VerificationTier;
use deckforge_core::window::DEFAULT_WINDOW_TOKENS;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub windowing: WindowingConfig,
    #[serde(default)]
    pub alignment: AlignmentConfig,
    #[serde(default)]
    pub cards: CardsConfig,
    #[serde(default)]
    pub deck: DeckConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WindowingConfig {
    #[serde(default = "default_window_tokens")]
    pub transcript_window_tokens: usize,
}

impl Default for WindowingConfig {
    fn default() -> Self {
        Self {
            transcript_window_tokens: default_window_tokens(),
        }
    }
}

fn default_window_tokens() -> usize {
    DEFAULT_WINDOW_TOKENS
}

#[derive(Debug, Deserialize, Clone)]
pub struct AlignmentConfig {
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
    #[serde(default = "default_min_title_chars")]
    pub min_title_chars: usize,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: default_fuzzy_threshold(),
            min_title_chars: default_min_title_chars(),
        }
    }
}

impl AlignmentConfig {
    pub fn params(&self) -> AlignParams {
        AlignParams {
            fuzzy_threshold: self.fuzzy_threshold,
            min_title_chars: self.min_title_chars,
        }
    }
}

fn default_fuzzy_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}
fn default_min_title_chars() -> usize {
    DEFAULT_MIN_TITLE_CHARS
}

#[derive(Debug, Deserialize, Clone)]
pub struct CardsConfig {
    #[serde(default = "default_tiers")]
    pub tiers: Vec<VerificationTier>,
}

impl Default for CardsConfig {
    fn default() -> Self {
        Self {
            tiers: default_tiers(),
        }
    }
}

impl CardsConfig {
    pub fn policy(&self) -> CardPolicy {
        CardPolicy {
            tiers: self.tiers.clone(),
        }
    }
}

fn default_tiers() -> Vec<VerificationTier> {
    CardPolicy::default().tiers
}

#[derive(Debug, Deserialize, Clone)]
pub struct DeckConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_model_name")]
    pub model_name: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_fallback_dir")]
    pub fallback_dir: PathBuf,
}

impl Default for DeckConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            model_name: default_model_name(),
            timeout_secs: default_timeout_secs(),
            fallback_dir: default_fallback_dir(),
        }
    }
}

fn default_api_url() -> String {
    "http://127.0.0.1:8765".to_string()
}
fn default_model_name() -> String {
    "Basic".to_string()
}
fn default_timeout_secs() -> u64 {
    10
}
fn default_fallback_dir() -> PathBuf {
    PathBuf::from("./data/fallback")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SyncConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
    #[serde(default = "default_stale_lock_secs")]
    pub stale_lock_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            lock_timeout_secs: default_lock_timeout_secs(),
            stale_lock_secs: default_stale_lock_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    5
}
fn default_lock_timeout_secs() -> u64 {
    30
}
fn default_stale_lock_secs() -> u64 {
    300
}

impl Config {
    /// Path of the cross-process deck lock, next to the database.
    pub fn lock_path(&self) -> PathBuf {
        let mut path = self.db.path.clone().into_os_string();
        path.push(".lock");
        PathBuf::from(path)
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

pub fn validate(config: &Config) -> Result<()> {
    if config.windowing.transcript_window_tokens == 0 {
        anyhow::bail!("windowing.transcript_window_tokens must be > 0");
    }

    if !(0.0..=1.0).contains(&config.alignment.fuzzy_threshold) {
        anyhow::bail!("alignment.fuzzy_threshold must be in [0.0, 1.0]");
    }

    if config.cards.tiers.is_empty() {
        anyhow::bail!("cards.tiers must name at least one verification tier");
    }

    if config.deck.api_url.trim().is_empty() {
        anyhow::bail!("deck.api_url must not be empty");
    }

    if config.deck.timeout_secs == 0 {
        anyhow::bail!("deck.timeout_secs must be > 0");
    }

    if config.sync.max_attempts < 1 {
        anyhow::bail!("sync.max_attempts must be >= 1");
    }

    // A live lock holder must never look stale to a waiting process.
    if config.sync.stale_lock_secs <= config.deck.timeout_secs
        || config.sync.stale_lock_secs <= config.sync.lock_timeout_secs
    {
        anyhow::bail!(
            "sync.stale_lock_secs ({}) must be greater than deck.timeout_secs ({}) and sync.lock_timeout_secs ({})",
            config.sync.stale_lock_secs,
            config.deck.timeout_secs,
            config.sync.lock_timeout_secs
        );
    }

    Ok(())
}
