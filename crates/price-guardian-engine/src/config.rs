use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;

use crate::capture::DEFAULT_MAX_IMAGE_DIM;
use crate::location::{GeoPoint, DEFAULT_LOCATION_TIMEOUT};

pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";

#[derive(Debug, Clone, PartialEq)]
pub struct GuardianConfig {
    pub api_key: Option<String>,
    pub api_base: String,
    pub model: String,
    pub data_dir: PathBuf,
    pub location: Option<GeoPoint>,
    pub location_timeout: Duration,
    pub max_image_dim: u32,
}

impl GuardianConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the config from any key lookup, so tests never touch the process environment.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let location = match non_empty("PRICE_GUARDIAN_LOCATION") {
            Some(raw) => Some(
                raw.parse::<GeoPoint>()
                    .context("PRICE_GUARDIAN_LOCATION is not \"lat,lon\"")?,
            ),
            None => None,
        };
        let data_dir = non_empty("PRICE_GUARDIAN_HOME")
            .map(PathBuf::from)
            .or_else(|| non_empty("HOME").map(|home| PathBuf::from(home).join(".price-guardian")))
            .unwrap_or_else(|| PathBuf::from(".price-guardian"));

        Ok(Self {
            api_key: non_empty("GEMINI_API_KEY").or_else(|| non_empty("GOOGLE_API_KEY")),
            api_base: non_empty("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            model: non_empty("PRICE_GUARDIAN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            data_dir,
            location,
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            max_image_dim: DEFAULT_MAX_IMAGE_DIM,
        })
    }

    pub fn events_path(&self) -> PathBuf {
        self.data_dir.join("events.jsonl")
    }
}
