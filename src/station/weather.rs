//! Weather lookups for the `?weather` and `?alerts` commands.
//!
//! Responders only see the [`WeatherProvider`] trait. The production
//! implementation, [`OpenWeatherMap`], calls the One Call 3.0 endpoint in
//! metric units. One response carries both current conditions and active
//! alerts, so it is cached per coordinate and serves both commands until the
//! TTL runs out.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::timeout;

use crate::meshtastic::Position;

pub const ONECALL_URL: &str = "https://api.openweathermap.org/data/3.0/onecall";

/// Current conditions at a coordinate.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditions {
    pub latitude: f64,
    pub longitude: f64,
    pub description: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity: u32,
    pub wind_speed_ms: f64,
    /// Event name of the first active alert, if any.
    pub hazard: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherAlert {
    pub title: String,
    pub source: String,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("request timed out after {0}s")]
    Timeout(u64),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("unexpected response: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn current(&self, at: Position) -> Result<Conditions, WeatherError>;
    /// Active alerts, in the order the provider lists them.
    async fn alerts(&self, at: Position) -> Result<Vec<WeatherAlert>, WeatherError>;
}

#[derive(Debug, Clone, Deserialize)]
pub struct OneCallResponse {
    pub lat: f64,
    pub lon: f64,
    pub current: Option<CurrentWeather>,
    #[serde(default)]
    pub alerts: Vec<AlertEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeather {
    pub temp: f64,
    pub feels_like: f64,
    pub humidity: u32,
    #[serde(default)]
    pub wind_speed: f64,
    #[serde(default)]
    pub weather: Vec<WeatherCondition>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WeatherCondition {
    pub description: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AlertEntry {
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub event: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl OneCallResponse {
    pub fn conditions(&self) -> Result<Conditions, WeatherError> {
        let current = self
            .current
            .as_ref()
            .ok_or_else(|| WeatherError::Malformed("no current conditions".into()))?;
        let description = current
            .weather
            .first()
            .map(|w| w.description.clone())
            .unwrap_or_else(|| "unknown weather".to_string());
        Ok(Conditions {
            latitude: self.lat,
            longitude: self.lon,
            description,
            temperature_c: current.temp,
            feels_like_c: current.feels_like,
            humidity: current.humidity,
            wind_speed_ms: current.wind_speed,
            hazard: self.alerts.first().map(|a| {
                a.event
                    .clone()
                    .unwrap_or_else(|| "weather alert".to_string())
            }),
        })
    }

    pub fn weather_alerts(&self) -> Vec<WeatherAlert> {
        self.alerts
            .iter()
            .map(|a| WeatherAlert {
                title: a.event.clone().unwrap_or_else(|| "Unknown Alert".into()),
                source: a
                    .sender_name
                    .clone()
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| "Weather Service".into()),
                body: a
                    .description
                    .clone()
                    .unwrap_or_else(|| "No details available".into()),
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
struct CacheEntry {
    fetched_at: Instant,
    response: OneCallResponse,
}

/// Coordinates rounded to about 10 m, so tiny GPS jitter still hits the cache.
type CacheKey = (i64, i64);

fn cache_key(at: Position) -> CacheKey {
    (
        (at.latitude * 10_000.0).round() as i64,
        (at.longitude * 10_000.0).round() as i64,
    )
}

pub struct OpenWeatherMap {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
    timeout: Duration,
    cache_ttl: Duration,
    cache: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl OpenWeatherMap {
    pub fn new(api_key: impl Into<String>, timeout: Duration, cache_ttl: Duration) -> Self {
        // The request-wide timeout also bounds reading the body.
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            endpoint: ONECALL_URL.to_string(),
            api_key: api_key.into(),
            client,
            timeout,
            cache_ttl,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Point at a different One Call endpoint (self-hosted proxy, tests).
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn build_url(&self, at: Position) -> String {
        format!(
            "{}?lat={:.4}&lon={:.4}&appid={}&units=metric&exclude=minutely,hourly,daily",
            self.endpoint,
            at.latitude,
            at.longitude,
            urlencoding::encode(&self.api_key)
        )
    }

    fn cached(&self, key: CacheKey) -> Option<OneCallResponse> {
        let cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let entry = cache.get(&key)?;
        let age = entry.fetched_at.elapsed();
        if age < self.cache_ttl {
            debug!(
                "Returning cached weather for {:?} (age: {:.1}min)",
                key,
                age.as_secs_f64() / 60.0
            );
            return Some(entry.response.clone());
        }
        None
    }

    async fn fetch(&self, at: Position) -> Result<OneCallResponse, WeatherError> {
        let key = cache_key(at);
        if let Some(hit) = self.cached(key) {
            return Ok(hit);
        }

        debug!(
            "Fetching weather for lat={:.4} lon={:.4}",
            at.latitude, at.longitude
        );
        let request = async {
            let response = self.client.get(self.build_url(at)).send().await?;
            if !response.status().is_success() {
                return Err(WeatherError::Status(response.status()));
            }
            response.json::<OneCallResponse>().await.map_err(|e| {
                if e.is_timeout() {
                    WeatherError::Timeout(self.timeout.as_secs())
                } else {
                    WeatherError::Malformed(e.to_string())
                }
            })
        };
        let parsed = timeout(self.timeout, request)
            .await
            .map_err(|_| WeatherError::Timeout(self.timeout.as_secs()))??;

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.retain(|_, e| e.fetched_at.elapsed() < self.cache_ttl);
        cache.insert(
            key,
            CacheEntry {
                fetched_at: Instant::now(),
                response: parsed.clone(),
            },
        );
        Ok(parsed)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherMap {
    async fn current(&self, at: Position) -> Result<Conditions, WeatherError> {
        self.fetch(at).await?.conditions()
    }

    async fn alerts(&self, at: Position) -> Result<Vec<WeatherAlert>, WeatherError> {
        Ok(self.fetch(at).await?.weather_alerts())
    }
}
