//! Configuration loading and typed config structures for the MonaFarms client.
//!
//! The configuration lives in `monafarms-config.yaml`. This module defines
//! strongly-typed structs mirroring the YAML, with defaults for every
//! field, and a loader that reads and validates the file.
//!
//! Environment variables override YAML values:
//! - `MONAFARMS_PLAYER` overrides `player.address`
//! - `MONAFARMS_STATS_PATH` overrides `stats.path`

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use monafarms_farm::RarityRules;
use monafarms_types::{AddressError, PlayerAddress};

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// The configured player address is malformed.
    #[error("invalid player address: {source}")]
    Address {
        /// The underlying address error.
        #[from]
        source: AddressError,
    },

    /// A value parsed but is not usable.
    #[error("invalid configuration: {reason}")]
    Invalid {
        /// Explanation of what is wrong.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level client configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientConfig {
    /// Which player's farm to follow.
    #[serde(default)]
    pub player: PlayerConfig,

    /// Farm-wide rule parameters.
    #[serde(default)]
    pub farm: FarmConfig,

    /// Refresh scheduling.
    #[serde(default)]
    pub refresh: RefreshConfig,

    /// Mutating action submission.
    #[serde(default)]
    pub actions: ActionConfig,

    /// Time source.
    #[serde(default)]
    pub clock: ClockConfig,

    /// Local stats persistence.
    #[serde(default)]
    pub stats: StatsConfig,

    /// Logging.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ClientConfig {
    /// Load configuration from a YAML file, apply environment overrides,
    /// and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read,
    /// [`ConfigError::Yaml`] if it is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is unusable.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse configuration from a YAML string, apply environment
    /// overrides, and validate.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML, or
    /// [`ConfigError::Invalid`] if a value is unusable.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yml::from_str(yaml)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(address) = std::env::var("MONAFARMS_PLAYER") {
            self.player.address = address;
        }
        if let Ok(path) = std::env::var("MONAFARMS_STATS_PATH") {
            self.stats.path = Some(path);
        }
    }

    /// Check cross-field constraints that serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.refresh.periodic_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "refresh.periodic_interval_ms must be at least 1".to_owned(),
            });
        }
        if self.actions.timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "actions.timeout_ms must be at least 1".to_owned(),
            });
        }
        if self.clock.view_tick_ms == 0 {
            return Err(ConfigError::Invalid {
                reason: "clock.view_tick_ms must be at least 1".to_owned(),
            });
        }
        if self.refresh.stagger_offsets_ms.len() > MAX_STAGGERED_REFRESHES {
            return Err(ConfigError::Invalid {
                reason: format!(
                    "refresh.stagger_offsets_ms allows at most {MAX_STAGGERED_REFRESHES} entries"
                ),
            });
        }
        if self.stats.activity_capacity == 0 {
            return Err(ConfigError::Invalid {
                reason: "stats.activity_capacity must be at least 1".to_owned(),
            });
        }
        Ok(())
    }

    /// Parse the configured player address.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Address`] if the address is malformed.
    pub fn player_address(&self) -> Result<PlayerAddress, ConfigError> {
        Ok(PlayerAddress::parse(&self.player.address)?)
    }
}

/// Upper bound on post-action refresh attempts.
const MAX_STAGGERED_REFRESHES: usize = 8;

/// Player configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PlayerConfig {
    /// Wallet address of the farm owner.
    #[serde(default = "default_player_address")]
    pub address: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            address: default_player_address(),
        }
    }
}

/// Farm rule configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FarmConfig {
    /// Minimum owned tiles before the exclusive crop may be planted.
    #[serde(default = "default_exclusive_min_tiles")]
    pub exclusive_min_tiles: u32,
}

impl Default for FarmConfig {
    fn default() -> Self {
        Self {
            exclusive_min_tiles: default_exclusive_min_tiles(),
        }
    }
}

impl FarmConfig {
    /// Rarity rules derived from this configuration.
    pub const fn rarity_rules(&self) -> RarityRules {
        RarityRules {
            exclusive_min_tiles: self.exclusive_min_tiles,
        }
    }
}

/// Refresh scheduling configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshConfig {
    /// Interval between background refreshes of every tile.
    #[serde(default = "default_periodic_interval_ms")]
    pub periodic_interval_ms: u64,

    /// Maximum random delay added to each background refresh.
    #[serde(default = "default_jitter_ms")]
    pub jitter_ms: u64,

    /// Delays after a confirmed action at which the tile is re-read.
    #[serde(default = "default_stagger_offsets_ms")]
    pub stagger_offsets_ms: Vec<u64>,

    /// Requests for the same target due within this window collapse.
    #[serde(default = "default_coalesce_window_ms")]
    pub coalesce_window_ms: u64,

    /// Deadline for a single backend read.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,

    /// Whether to resynchronize the trusted clock on each background refresh.
    #[serde(default = "default_true")]
    pub sync_clock: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            periodic_interval_ms: default_periodic_interval_ms(),
            jitter_ms: default_jitter_ms(),
            stagger_offsets_ms: default_stagger_offsets_ms(),
            coalesce_window_ms: default_coalesce_window_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            sync_clock: true,
        }
    }
}

impl RefreshConfig {
    /// Background refresh interval.
    pub const fn periodic_interval(&self) -> Duration {
        Duration::from_millis(self.periodic_interval_ms)
    }

    /// Maximum background refresh jitter.
    pub const fn jitter(&self) -> Duration {
        Duration::from_millis(self.jitter_ms)
    }

    /// Post-action refresh delays.
    pub fn stagger_offsets(&self) -> Vec<Duration> {
        self.stagger_offsets_ms
            .iter()
            .map(|&ms| Duration::from_millis(ms))
            .collect()
    }

    /// Coalescing window.
    pub const fn coalesce_window(&self) -> Duration {
        Duration::from_millis(self.coalesce_window_ms)
    }

    /// Backend read deadline.
    pub const fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

/// Action submission configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ActionConfig {
    /// Deadline for a mutating action to confirm or fail.
    #[serde(default = "default_action_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for ActionConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_action_timeout_ms(),
        }
    }
}

impl ActionConfig {
    /// Action deadline.
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Which time source drives the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClockMode {
    /// Local wall clock only.
    Local,
    /// Local clock corrected by the backend's trusted time.
    Trusted,
}

/// Clock configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClockConfig {
    /// Time source selection.
    #[serde(default = "default_clock_mode")]
    pub mode: ClockMode,

    /// Seconds of skew tolerated when judging harvest readiness.
    #[serde(default = "default_skew_tolerance_secs")]
    pub skew_tolerance_secs: u64,

    /// How often derived views are recomputed.
    #[serde(default = "default_view_tick_ms")]
    pub view_tick_ms: u64,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            mode: default_clock_mode(),
            skew_tolerance_secs: default_skew_tolerance_secs(),
            view_tick_ms: default_view_tick_ms(),
        }
    }
}

impl ClockConfig {
    /// View recomputation interval.
    pub const fn view_tick(&self) -> Duration {
        Duration::from_millis(self.view_tick_ms)
    }
}

/// Local stats persistence configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StatsConfig {
    /// JSON file for player stats; `None` keeps stats in memory only.
    #[serde(default = "default_stats_path")]
    pub path: Option<String>,

    /// Number of confirmed actions kept in the activity log.
    #[serde(default = "default_activity_capacity")]
    pub activity_capacity: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            path: default_stats_path(),
            activity_capacity: default_activity_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

fn default_player_address() -> String {
    "0x000000000000000000000000000000000000f4a2".to_owned()
}

const fn default_exclusive_min_tiles() -> u32 {
    monafarms_farm::rarity::DEFAULT_EXCLUSIVE_MIN_TILES
}

const fn default_periodic_interval_ms() -> u64 {
    30_000
}

const fn default_jitter_ms() -> u64 {
    2_000
}

fn default_stagger_offsets_ms() -> Vec<u64> {
    vec![1_000, 2_000, 3_000, 4_000]
}

const fn default_coalesce_window_ms() -> u64 {
    500
}

const fn default_read_timeout_ms() -> u64 {
    10_000
}

const fn default_action_timeout_ms() -> u64 {
    60_000
}

const fn default_clock_mode() -> ClockMode {
    ClockMode::Trusted
}

const fn default_skew_tolerance_secs() -> u64 {
    5
}

const fn default_view_tick_ms() -> u64 {
    1_000
}

#[allow(clippy::unnecessary_wraps)]
fn default_stats_path() -> Option<String> {
    Some("monafarms-stats.json".to_owned())
}

const fn default_activity_capacity() -> usize {
    200
}

fn default_log_level() -> String {
    "info".to_owned()
}

const fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ClientConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.player_address().is_ok());
        assert_eq!(config.farm.exclusive_min_tiles, 12);
        assert_eq!(config.refresh.periodic_interval(), Duration::from_secs(30));
        assert_eq!(
            config.refresh.stagger_offsets(),
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(3),
                Duration::from_secs(4),
            ]
        );
        assert_eq!(config.clock.mode, ClockMode::Trusted);
    }

    #[test]
    fn parse_full_yaml() {
        let yaml = r#"
player:
  address: "0x1111111111111111111111111111111111111111"

farm:
  exclusive_min_tiles: 16

refresh:
  periodic_interval_ms: 15000
  jitter_ms: 0
  stagger_offsets_ms: [500, 1500]
  coalesce_window_ms: 100
  read_timeout_ms: 2000
  sync_clock: false

actions:
  timeout_ms: 20000

clock:
  mode: local
  skew_tolerance_secs: 2
  view_tick_ms: 250

stats:
  path: null
  activity_capacity: 50

logging:
  level: "debug"
  json: true
"#;
        let config = ClientConfig::parse(yaml);
        assert!(config.is_ok(), "parse failed: {config:?}");
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.farm.rarity_rules().exclusive_min_tiles, 16);
        assert_eq!(config.refresh.stagger_offsets_ms, vec![500, 1_500]);
        assert!(!config.refresh.sync_clock);
        assert_eq!(config.actions.timeout(), Duration::from_secs(20));
        assert_eq!(config.clock.mode, ClockMode::Local);
        assert_eq!(config.clock.view_tick(), Duration::from_millis(250));
        assert_eq!(config.stats.path, None);
        assert_eq!(config.stats.activity_capacity, 50);
        assert!(config.logging.json);
    }

    #[test]
    fn parse_minimal_yaml() {
        let yaml = "refresh:\n  jitter_ms: 10\n";
        let config = ClientConfig::parse(yaml);
        assert!(config.is_ok());
        let config = config.ok().unwrap_or_default();

        assert_eq!(config.refresh.jitter_ms, 10);
        assert_eq!(config.refresh.periodic_interval_ms, 30_000);
        assert_eq!(config.actions.timeout_ms, 60_000);
    }

    #[test]
    fn zero_interval_rejected() {
        let yaml = "refresh:\n  periodic_interval_ms: 0\n";
        assert!(matches!(
            ClientConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn too_many_stagger_offsets_rejected() {
        let yaml = "refresh:\n  stagger_offsets_ms: [1, 2, 3, 4, 5, 6, 7, 8, 9]\n";
        assert!(matches!(
            ClientConfig::parse(yaml),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn bad_address_reported() {
        let config = ClientConfig {
            player: PlayerConfig {
                address: "not-an-address".to_owned(),
            },
            ..ClientConfig::default()
        };
        assert!(matches!(
            config.player_address(),
            Err(ConfigError::Address { .. })
        ));
    }

    #[test]
    fn unknown_clock_mode_is_a_yaml_error() {
        let yaml = "clock:\n  mode: sundial\n";
        assert!(matches!(
            ClientConfig::parse(yaml),
            Err(ConfigError::Yaml { .. })
        ));
    }
}
