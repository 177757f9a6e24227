//! # Configuration Management Module
//!
//! All runtime settings for check-mate, loaded from a TOML file and then
//! overridden from the command line and environment.
//!
//! ## Configuration Structure
//!
//! - [`MeshConfig`] - radio node address, probe timing and payload limit
//! - [`StationConfig`] - location label and optional fixed coordinates
//! - [`WeatherConfig`] - OpenWeatherMap credential, cache and timeout
//! - [`ScheduleConfig`] - scheduled announcements and the scheduler tick
//! - [`StatusConfig`] - where `status.json` lives
//! - [`HealthConfig`] - optional push health-check URL
//! - [`DispatchConfig`] - outbound pacing and queue size
//! - [`LoggingConfig`] - log level and optional log file
//!
//! Every section is optional; a missing file means all defaults.
//!
//! ## Configuration File Format
//!
//! ```toml
//! [mesh]
//! host = "meshtastic.local"
//! port = 4403
//!
//! [station]
//! location = "Hilltop"
//! latitude = 45.52
//! longitude = -122.68
//!
//! [weather]
//! api_key = "..."
//!
//! [[schedule.rules]]
//! days = ["Monday"]
//! time = "18:45"
//! timezone = "America/Los_Angeles"
//! channel = 1
//! message = "Net starts in 15 minutes"
//! ```
//!
//! ## Environment Integration
//!
//! Precedence is CLI args > environment > config file > defaults. The CLI
//! layer (clap with `env`) resolves the first two into an [`Overrides`]
//! value which [`Config::apply_overrides`] lays over the file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Result};
use log::info;
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::meshtastic::{Position, DEFAULT_TCP_PORT};
use crate::schedule::{self, ScheduleError, ScheduledRule};
use crate::station::dispatch;
use crate::station::status::StatusManager;

/// Smallest payload limit that still leaves room for a chunk marker and text.
pub const MIN_PAYLOAD_BYTES: usize = 32;
/// Largest text payload a Meshtastic packet carries.
pub const MAX_PAYLOAD_BYTES: usize = 228;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub mesh: MeshConfig,
    pub station: StationConfig,
    pub weather: WeatherConfig,
    pub schedule: ScheduleConfig,
    pub status: StatusConfig,
    pub health: HealthConfig,
    pub dispatch: DispatchConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MeshConfig {
    /// Hostname or IP of the Meshtastic node. Required.
    pub host: String,
    pub port: u16,
    pub connect_timeout_secs: u64,
    /// Send a heartbeat after this long without hearing the radio.
    pub probe_after_secs: u64,
    /// Report status `unknown` after this long without hearing the radio.
    pub unhealthy_after_secs: u64,
    /// Largest text sent in one packet; longer replies are chunked.
    pub max_payload_bytes: usize,
}

impl Default for MeshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: DEFAULT_TCP_PORT,
            connect_timeout_secs: 10,
            probe_after_secs: 30,
            unhealthy_after_secs: 300,
            max_payload_bytes: 200,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Place name used in radio check replies.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    /// OpenWeatherMap API key. Weather commands are unavailable without it.
    pub api_key: String,
    pub cache_ttl_minutes: u64,
    pub timeout_seconds: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            cache_ttl_minutes: 10,
            timeout_seconds: 10,
        }
    }
}

/// One `[[schedule.rules]]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub days: Vec<String>,
    /// `HH:MM`, 24-hour.
    pub time: String,
    pub timezone: String,
    pub channel: u32,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<RuleConfig>,
    /// Rules in `Days;HH:MM;Timezone;Channel;Message` form, `;;;`-separated.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<String>,
    pub tick_seconds: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            messages: None,
            tick_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StatusConfig {
    /// Directory for `status.json`; platform default when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub throttle_seconds: u64,
    pub timeout_seconds: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            url: None,
            throttle_seconds: 60,
            timeout_seconds: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Gap between consecutive outbound messages (ms).
    pub pacing_ms: u64,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            pacing_ms: dispatch::DEFAULT_PACING.as_millis() as u64,
            queue_capacity: dispatch::DEFAULT_QUEUE_CAPACITY,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

/// Values resolved from CLI flags and environment variables.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub host: Option<String>,
    pub location: Option<String>,
    pub healthcheck_url: Option<String>,
    pub status_dir: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub weather_api_key: Option<String>,
    pub scheduled_messages: Option<String>,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Load configuration from a file
    pub async fn load(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| anyhow!("Failed to read config file {}: {}", path, e))?;

        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow!("Failed to parse config file {}: {}", path, e))?;

        Ok(config)
    }

    /// Like [`Config::load`], but a missing file yields the defaults.
    pub async fn load_or_default(path: &str) -> Result<Self> {
        if fs::try_exists(path).await.unwrap_or(false) {
            Self::load(path).await
        } else {
            info!("Config file {} not found, using defaults", path);
            Ok(Self::default())
        }
    }

    /// Create a default configuration file
    pub async fn create_default(path: &str) -> Result<()> {
        let config = Config::default();
        let content = toml::to_string_pretty(&config)
            .map_err(|e| anyhow!("Failed to serialize default config: {}", e))?;

        fs::write(path, content)
            .await
            .map_err(|e| anyhow!("Failed to write config file {}: {}", path, e))?;

        Ok(())
    }

    /// Lay CLI/environment values over the file. Empty strings are ignored.
    pub fn apply_overrides(&mut self, overrides: Overrides) {
        if let Some(host) = non_empty(overrides.host) {
            self.mesh.host = host;
        }
        if let Some(location) = non_empty(overrides.location) {
            self.station.location = Some(location);
        }
        if let Some(url) = non_empty(overrides.healthcheck_url) {
            self.health.url = Some(url);
        }
        if let Some(dir) = non_empty(overrides.status_dir) {
            self.status.dir = Some(dir);
        }
        if overrides.latitude.is_some() {
            self.station.latitude = overrides.latitude;
        }
        if overrides.longitude.is_some() {
            self.station.longitude = overrides.longitude;
        }
        if let Some(key) = non_empty(overrides.weather_api_key) {
            self.weather.api_key = key;
        }
        if let Some(messages) = non_empty(overrides.scheduled_messages) {
            self.schedule.messages = Some(messages);
        }
    }

    /// Fixed station coordinates, when both are configured.
    pub fn station_position(&self) -> Option<Position> {
        match (self.station.latitude, self.station.longitude) {
            (Some(latitude), Some(longitude)) => Some(Position {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    /// Every configured rule: `[[schedule.rules]]` tables first, then the
    /// rule string.
    pub fn scheduled_rules(&self) -> Result<Vec<ScheduledRule>, ScheduleError> {
        let mut rules = self
            .schedule
            .rules
            .iter()
            .map(|r| ScheduledRule::from_parts(&r.days, &r.time, &r.timezone, r.channel, &r.message))
            .collect::<Result<Vec<_>, _>>()?;
        if let Some(messages) = &self.schedule.messages {
            rules.extend(schedule::parse_rules(messages)?);
        }
        Ok(rules)
    }

    pub fn status_dir(&self) -> PathBuf {
        match &self.status.dir {
            Some(dir) => Path::new(dir).to_path_buf(),
            None => StatusManager::default_dir(),
        }
    }

    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.dispatch.pacing_ms)
    }

    /// Reject settings the service cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.mesh.host.trim().is_empty() {
            bail!("No Meshtastic host configured (set [mesh].host, --host or HOST)");
        }
        if let Some(lat) = self.station.latitude {
            if !(-90.0..=90.0).contains(&lat) {
                bail!("Latitude {} is out of range (-90..90)", lat);
            }
        }
        if let Some(lon) = self.station.longitude {
            if !(-180.0..=180.0).contains(&lon) {
                bail!("Longitude {} is out of range (-180..180)", lon);
            }
        }
        if self.station.latitude.is_some() != self.station.longitude.is_some() {
            bail!("Latitude and longitude must be set together");
        }
        if !(MIN_PAYLOAD_BYTES..=MAX_PAYLOAD_BYTES).contains(&self.mesh.max_payload_bytes) {
            bail!(
                "max_payload_bytes must be between {} and {}, got {}",
                MIN_PAYLOAD_BYTES,
                MAX_PAYLOAD_BYTES,
                self.mesh.max_payload_bytes
            );
        }
        if self.dispatch.pacing_ms == 0 {
            bail!("dispatch.pacing_ms must be greater than zero");
        }
        if self.dispatch.queue_capacity == 0 {
            bail!("dispatch.queue_capacity must be greater than zero");
        }
        if self.schedule.tick_seconds == 0 {
            bail!("schedule.tick_seconds must be greater than zero");
        }
        self.scheduled_rules()
            .map_err(|e| anyhow!("Invalid scheduled message: {}", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_host() -> Config {
        let mut config = Config::default();
        config.mesh.host = "127.0.0.1".into();
        config
    }

    #[test]
    fn defaults() {
        let config = Config::default();
        assert_eq!(config.mesh.port, 4403);
        assert_eq!(config.mesh.max_payload_bytes, 200);
        assert_eq!(config.dispatch.pacing_ms, 2000);
        assert_eq!(config.dispatch.queue_capacity, 64);
        assert_eq!(config.schedule.tick_seconds, 30);
        assert_eq!(config.logging.level, "info");
        assert!(config.validate().is_err(), "host is required");
        assert!(with_host().validate().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
            [mesh]
            host = "radio.lan"

            [station]
            location = "Hilltop"

            [[schedule.rules]]
            days = ["Mon", "Wednesday"]
            time = "18:45"
            timezone = "America/Los_Angeles"
            channel = 1
            message = "Net tonight"
            "#,
        )
        .unwrap();
        assert_eq!(config.mesh.host, "radio.lan");
        assert_eq!(config.mesh.port, 4403);
        assert_eq!(config.station.location.as_deref(), Some("Hilltop"));
        let rules = config.scheduled_rules().unwrap();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].days.len(), 2);
    }

    #[test]
    fn overrides_win_and_blank_values_are_ignored() {
        let mut config = with_host();
        config.station.location = Some("File".into());
        config.apply_overrides(Overrides {
            host: Some("10.0.0.5".into()),
            location: Some("  ".into()),
            latitude: Some(45.0),
            longitude: Some(-122.0),
            scheduled_messages: Some("Mon;09:00;UTC;1;hi".into()),
            ..Default::default()
        });
        assert_eq!(config.mesh.host, "10.0.0.5");
        assert_eq!(config.station.location.as_deref(), Some("File"));
        assert_eq!(
            config.station_position(),
            Some(Position {
                latitude: 45.0,
                longitude: -122.0
            })
        );
        assert_eq!(config.scheduled_rules().unwrap().len(), 1);
    }

    #[test]
    fn validate_rejects_bad_values() {
        let mut config = with_host();
        config.station.latitude = Some(91.0);
        config.station.longitude = Some(0.0);
        assert!(config.validate().is_err());

        let mut config = with_host();
        config.station.latitude = Some(45.0);
        assert!(config.validate().is_err());

        let mut config = with_host();
        config.dispatch.pacing_ms = 0;
        assert!(config.validate().is_err());

        let mut config = with_host();
        config.mesh.max_payload_bytes = 16;
        assert!(config.validate().is_err());

        let mut config = with_host();
        config.schedule.messages = Some("Mon;25:00;UTC;1;x".into());
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("25:00"), "{err}");
    }

    #[test]
    fn default_config_round_trips_through_toml() {
        let text = toml::to_string_pretty(&Config::default()).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.mesh.port, 4403);
        assert!(back.schedule.rules.is_empty());
    }
}
