// src/config.rs

use std::{env, path::PathBuf, str::FromStr, time::Duration};
use thiserror::Error;

pub const DEFAULT_SOURCE_URL: &str =
    "https://www.edinburgh.gov.uk/downloads/file/32198/short-term-lets";
pub const DEFAULT_MAPBOX_BASE_URL: &str = "https://api.mapbox.com";

/// Fixed file names inside the data directory.
pub const SOURCE_FILE_NAME: &str = "short_term_lets.xls";
pub const OUTPUT_FILE_NAME: &str = "short_term_lets.csv";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Where the geocoder anchors its queries.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    pub city: String,
    pub country: String,
    /// ISO country filter passed to the geocoding service.
    pub country_code: String,
    /// Proximity bias point as (lng, lat).
    pub proximity: (f64, f64),
}

impl Default for Region {
    fn default() -> Self {
        Self {
            city: "Edinburgh".to_string(),
            country: "UK".to_string(),
            country_code: "GB".to_string(),
            proximity: (-3.1883, 55.9533),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GeocodeSettings {
    /// Access token; `None` disables lookups entirely.
    pub access_token: Option<String>,
    pub base_url: String,
    pub region: Region,
    pub timeout: Duration,
    /// Gap between consecutive request starts.
    pub delay: Duration,
    /// 1 means strictly sequential.
    pub concurrency: usize,
    /// Stop issuing requests once this much time has been spent geocoding.
    pub deadline: Option<Duration>,
}

impl Default for GeocodeSettings {
    fn default() -> Self {
        Self {
            access_token: None,
            base_url: DEFAULT_MAPBOX_BASE_URL.to_string(),
            region: Region::default(),
            timeout: Duration::from_secs(10),
            delay: Duration::from_millis(200),
            concurrency: 1,
            deadline: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub source_url: String,
    pub data_dir: PathBuf,
    pub fetch_timeout: Duration,
    pub max_redirects: usize,
    pub geocode: GeocodeSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            source_url: DEFAULT_SOURCE_URL.to_string(),
            data_dir: PathBuf::from("data"),
            fetch_timeout: Duration::from_secs(60),
            max_redirects: 10,
            geocode: GeocodeSettings::default(),
        }
    }
}

impl Config {
    /// Build from the process environment (after an optional `.env`).
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let mut cfg = Config::default();

        if let Some(url) = get("STL_SOURCE_URL") {
            cfg.source_url = url;
        }
        if let Some(dir) = get("STL_DATA_DIR") {
            cfg.data_dir = PathBuf::from(dir);
        }
        if let Some(secs) = parse_key::<u64>(&get, "STL_FETCH_TIMEOUT_SECS")? {
            cfg.fetch_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = parse_key::<usize>(&get, "STL_MAX_REDIRECTS")? {
            cfg.max_redirects = n;
        }

        let geo = &mut cfg.geocode;
        geo.access_token = get("MAPBOX_ACCESS_TOKEN");
        if let Some(base) = get("MAPBOX_BASE_URL") {
            geo.base_url = base;
        }
        if let Some(ms) = parse_key::<u64>(&get, "STL_GEOCODE_DELAY_MS")? {
            geo.delay = Duration::from_millis(ms);
        }
        if let Some(n) = parse_key::<usize>(&get, "STL_GEOCODE_CONCURRENCY")? {
            if n == 0 {
                return Err(ConfigError::Invalid {
                    key: "STL_GEOCODE_CONCURRENCY",
                    value: n.to_string(),
                    reason: "must be at least 1".to_string(),
                });
            }
            geo.concurrency = n;
        }
        if let Some(secs) = parse_key::<u64>(&get, "STL_GEOCODE_TIMEOUT_SECS")? {
            geo.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_key::<u64>(&get, "STL_GEOCODE_DEADLINE_SECS")? {
            geo.deadline = Some(Duration::from_secs(secs));
        }

        Ok(cfg)
    }

    pub fn source_path(&self) -> PathBuf {
        self.data_dir.join(SOURCE_FILE_NAME)
    }

    pub fn output_path(&self) -> PathBuf {
        self.data_dir.join(OUTPUT_FILE_NAME)
    }
}

fn parse_key<T>(
    get: &impl Fn(&str) -> Option<String>,
    key: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|e| ConfigError::Invalid {
                key,
                value: raw,
                reason: e.to_string(),
            }),
    }
}
