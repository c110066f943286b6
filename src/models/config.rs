//! Application configuration structures.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Environment keys recognised by [`Config::apply_env`].
pub mod env_keys {
    pub const MAGNITUDE: &str = "MAG";
    pub const WINDOW: &str = "TIMEFRAME";
    pub const USER: &str = "BSKYUSER";
    pub const PASSWORD: &str = "BSKYPASS";
    pub const DRY_RUN: &str = "DEBUG";
    pub const OUTPUT_DIR: &str = "TREMORS_DIR";
}

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Feed location and HTTP behavior
    #[serde(default)]
    pub feed: FeedConfig,

    /// Which events qualify for an announcement
    #[serde(default)]
    pub filter: FilterConfig,

    /// Bluesky account and service
    #[serde(default)]
    pub bluesky: BlueskyConfig,

    /// Per-run switches
    #[serde(default)]
    pub run: RunConfig,

    /// Output locations
    #[serde(default)]
    pub paths: PathsConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Overlay environment-style settings on top of the file values.
    ///
    /// `lookup` returns the raw value for a key, e.g. `|k| std::env::var(k).ok()`.
    /// Empty values are ignored; unparsable numbers are rejected.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(value) = get(env_keys::MAGNITUDE) {
            self.filter.magnitude_threshold = value.trim().parse().map_err(|_| {
                AppError::config(format!("{} is not a number: {value}", env_keys::MAGNITUDE))
            })?;
        }
        if let Some(value) = get(env_keys::WINDOW) {
            self.filter.window_secs = value.trim().parse().map_err(|_| {
                AppError::config(format!(
                    "{} is not a whole number of seconds: {value}",
                    env_keys::WINDOW
                ))
            })?;
        }
        if let Some(value) = get(env_keys::USER) {
            self.bluesky.identifier = value.trim().to_string();
        }
        if let Some(value) = get(env_keys::PASSWORD) {
            self.bluesky.password = value;
        }
        if let Some(value) = get(env_keys::DRY_RUN) {
            self.run.dry_run = parse_flag(&value);
        }
        if let Some(value) = get(env_keys::OUTPUT_DIR) {
            self.paths.output_dir = PathBuf::from(value.trim());
        }
        Ok(())
    }

    /// Validate configuration values before any work starts.
    pub fn validate(&self) -> Result<()> {
        if self.bluesky.identifier.trim().is_empty() || self.bluesky.password.is_empty() {
            return Err(AppError::config(format!(
                "{} and {} must both be set",
                env_keys::USER,
                env_keys::PASSWORD
            )));
        }
        if self.feed.url.trim().is_empty() {
            return Err(AppError::validation("feed.url is empty"));
        }
        if self.feed.user_agent.trim().is_empty() {
            return Err(AppError::validation("feed.user_agent is empty"));
        }
        if self.feed.connect_timeout_secs == 0 || self.feed.read_timeout_secs == 0 {
            return Err(AppError::validation("feed timeouts must be > 0"));
        }
        if !self.filter.magnitude_threshold.is_finite() {
            return Err(AppError::validation(
                "filter.magnitude_threshold must be a finite number",
            ));
        }
        if self.filter.event_type.trim().is_empty() {
            return Err(AppError::validation("filter.event_type is empty"));
        }
        if self.paths.ledger_file.trim().is_empty() {
            return Err(AppError::validation("paths.ledger_file is empty"));
        }
        Ok(())
    }

    /// Full path of the dedup ledger.
    pub fn ledger_path(&self) -> PathBuf {
        self.paths.output_dir.join(&self.paths.ledger_file)
    }
}

/// `DEBUG=True`, `DEBUG=t`, ... switch dry-run on; anything else is off.
fn parse_flag(value: &str) -> bool {
    matches!(value.trim().chars().next(), Some('T' | 't'))
}

/// Feed location and HTTP client settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedConfig {
    /// CSV feed URL
    #[serde(default = "defaults::feed_url")]
    pub url: String,

    /// User-Agent header sent with the feed request
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// TCP connect timeout in seconds
    #[serde(default = "defaults::connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Read timeout in seconds
    #[serde(default = "defaults::read_timeout")]
    pub read_timeout_secs: u64,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            url: defaults::feed_url(),
            user_agent: defaults::user_agent(),
            connect_timeout_secs: defaults::connect_timeout(),
            read_timeout_secs: defaults::read_timeout(),
        }
    }
}

/// Qualification rules for feed rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Events must be strictly above this magnitude
    #[serde(default = "defaults::magnitude_threshold")]
    pub magnitude_threshold: f64,

    /// Maximum distance between event time and now, in either direction
    #[serde(default = "defaults::window_secs")]
    pub window_secs: u64,

    /// Required value of the feed's `type` column
    #[serde(default = "defaults::event_type")]
    pub event_type: String,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            magnitude_threshold: defaults::magnitude_threshold(),
            window_secs: defaults::window_secs(),
            event_type: defaults::event_type(),
        }
    }
}

/// Bluesky account settings.
#[derive(Clone, Serialize, Deserialize)]
pub struct BlueskyConfig {
    /// PDS / entryway base URL
    #[serde(default = "defaults::bluesky_service")]
    pub service: String,

    /// Handle or email used to log in
    #[serde(default)]
    pub identifier: String,

    /// App password
    #[serde(default)]
    pub password: String,

    /// BCP-47 language tag attached to posts
    #[serde(default = "defaults::language")]
    pub language: String,
}

impl Default for BlueskyConfig {
    fn default() -> Self {
        Self {
            service: defaults::bluesky_service(),
            identifier: String::new(),
            password: String::new(),
            language: defaults::language(),
        }
    }
}

impl std::fmt::Debug for BlueskyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlueskyConfig")
            .field("service", &self.service)
            .field("identifier", &self.identifier)
            .field("password", &"<redacted>")
            .field("language", &self.language)
            .finish()
    }
}

/// Per-run switches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Do everything except log in and post
    #[serde(default)]
    pub dry_run: bool,

    /// Age after which a leftover ledger lock is ignored
    #[serde(default = "defaults::lock_stale_secs")]
    pub lock_stale_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            lock_stale_secs: defaults::lock_stale_secs(),
        }
    }
}

/// Output locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Directory holding the ledger
    #[serde(default = "defaults::output_dir")]
    pub output_dir: PathBuf,

    /// Ledger file name inside `output_dir`
    #[serde(default = "defaults::ledger_file")]
    pub ledger_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            output_dir: defaults::output_dir(),
            ledger_file: defaults::ledger_file(),
        }
    }
}

mod defaults {
    use std::path::PathBuf;

    // Feed defaults
    pub fn feed_url() -> String {
        "https://earthquake.usgs.gov/earthquakes/feed/v1.0/summary/all_day.csv".into()
    }
    pub fn user_agent() -> String {
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
         (KHTML, like Gecko) Chrome/129.0.0.0 Safari/537.36"
            .into()
    }
    pub fn connect_timeout() -> u64 {
        3
    }
    pub fn read_timeout() -> u64 {
        5
    }

    // Filter defaults
    pub fn magnitude_threshold() -> f64 {
        5.0
    }
    pub fn window_secs() -> u64 {
        60
    }
    pub fn event_type() -> String {
        "earthquake".into()
    }

    // Bluesky defaults
    pub fn bluesky_service() -> String {
        "https://bsky.social".into()
    }
    pub fn language() -> String {
        "en".into()
    }

    // Run defaults
    pub fn lock_stale_secs() -> u64 {
        600
    }

    // Path defaults
    pub fn output_dir() -> PathBuf {
        PathBuf::from("storage")
    }
    pub fn ledger_file() -> String {
        "tremors.csv".into()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn with_credentials() -> Config {
        let mut config = Config::default();
        config.bluesky.identifier = "quakes.bsky.social".to_string();
        config.bluesky.password = "app-pass".to_string();
        config
    }

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_usgs_feed() {
        let config = Config::default();
        assert_eq!(config.filter.magnitude_threshold, 5.0);
        assert_eq!(config.filter.window_secs, 60);
        assert_eq!(config.feed.connect_timeout_secs, 3);
        assert_eq!(config.feed.read_timeout_secs, 5);
        assert!(!config.run.dry_run);
        assert_eq!(config.ledger_path(), PathBuf::from("storage/tremors.csv"));
    }

    #[test]
    fn validate_requires_credentials() {
        assert!(Config::default().validate().is_err());
        assert!(with_credentials().validate().is_ok());

        let mut config = with_credentials();
        config.bluesky.identifier = "   ".to_string();
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn validate_rejects_zero_timeout() {
        let mut config = with_credentials();
        config.feed.read_timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_nan_threshold() {
        let mut config = with_credentials();
        config.filter.magnitude_threshold = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn toml_sections_override_defaults() {
        let text = r#"
            [filter]
            magnitude_threshold = 4.5
            window_secs = 120

            [paths]
            output_dir = "/var/lib/tremors"
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.filter.magnitude_threshold, 4.5);
        assert_eq!(config.filter.window_secs, 120);
        assert_eq!(config.filter.event_type, "earthquake");
        assert_eq!(
            config.ledger_path(),
            PathBuf::from("/var/lib/tremors/tremors.csv")
        );
    }

    #[test]
    fn load_or_default_falls_back_on_missing_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let config = Config::load_or_default(tmp.path().join("absent.toml"));
        assert_eq!(config.filter.window_secs, 60);
    }

    #[test]
    fn env_overlay_wins_over_file() {
        let mut config: Config = toml::from_str("[filter]\nmagnitude_threshold = 6.0").unwrap();
        config
            .apply_env(env(&[
                ("MAG", "4"),
                ("TIMEFRAME", "300"),
                ("BSKYUSER", " quakes.bsky.social "),
                ("BSKYPASS", "secret"),
                ("DEBUG", "True"),
                ("TREMORS_DIR", "/tmp/quakes"),
            ]))
            .unwrap();

        assert_eq!(config.filter.magnitude_threshold, 4.0);
        assert_eq!(config.filter.window_secs, 300);
        assert_eq!(config.bluesky.identifier, "quakes.bsky.social");
        assert_eq!(config.bluesky.password, "secret");
        assert!(config.run.dry_run);
        assert_eq!(config.paths.output_dir, PathBuf::from("/tmp/quakes"));
    }

    #[test]
    fn env_overlay_ignores_empty_values() {
        let mut config = with_credentials();
        config
            .apply_env(env(&[("BSKYUSER", ""), ("MAG", "  ")]))
            .unwrap();
        assert_eq!(config.bluesky.identifier, "quakes.bsky.social");
        assert_eq!(config.filter.magnitude_threshold, 5.0);
    }

    #[test]
    fn env_overlay_rejects_bad_numbers() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[("MAG", "big")])).is_err());
        assert!(config.apply_env(env(&[("TIMEFRAME", "-5")])).is_err());
    }

    #[test]
    fn dry_run_flag_reads_first_character() {
        assert!(parse_flag("true"));
        assert!(parse_flag("T"));
        assert!(!parse_flag("False"));
        assert!(!parse_flag("1"));
    }

    #[test]
    fn debug_output_redacts_password() {
        let rendered = format!("{:?}", with_credentials().bluesky);
        assert!(!rendered.contains("app-pass"));
        assert!(rendered.contains("<redacted>"));
    }
}
