use std::env;
use std::fmt;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigError;
use crate::filter::MAX_RATING;
use crate::format::FeatureMode;
use crate::yts::DEFAULT_YTS_BASE;

pub const DEFAULT_MIN_RATING: f32 = 6.0;
pub const DEFAULT_MAX_RESULTS: usize = 10;
const DEFAULT_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:8080";

/// Per-request search knobs handed to the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSettings {
    pub min_rating: f32,
    pub max_results: usize,
    pub mode: FeatureMode,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            min_rating: DEFAULT_MIN_RATING,
            max_results: DEFAULT_MAX_RESULTS,
            mode: FeatureMode::default(),
        }
    }
}

#[derive(Clone, PartialEq)]
pub struct WebhookConfig {
    pub secret: String,
    pub public_url: Option<String>,
}

/// Process configuration, read once at startup.
#[derive(Clone)]
pub struct Config {
    pub bot_token: String,
    pub search: SearchSettings,
    pub omdb_api_key: Option<String>,
    pub yts_base_url: String,
    pub index_timeout: Duration,
    pub webhook: Option<WebhookConfig>,
    pub listen_addr: SocketAddr,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("bot_token", &"<redacted>")
            .field("search", &self.search)
            .field("omdb_api_key", &self.omdb_api_key.as_ref().map(|_| "<redacted>"))
            .field("yts_base_url", &self.yts_base_url)
            .field("index_timeout", &self.index_timeout)
            .field("webhook", &self.webhook.as_ref().map(|w| &w.public_url))
            .field("listen_addr", &self.listen_addr)
            .finish()
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup. Empty values
    /// count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;

        let min_rating = match get("MIN_RATING") {
            Some(raw) => parse_min_rating(&raw)?,
            None => DEFAULT_MIN_RATING,
        };
        let max_results = match get("MAX_RESULTS") {
            Some(raw) => parse_max_results(&raw)?,
            None => DEFAULT_MAX_RESULTS,
        };
        let mode = match get("FEATURE_MODE") {
            Some(raw) => raw.parse::<FeatureMode>().map_err(|message| ConfigError::Invalid {
                key: "FEATURE_MODE",
                message,
            })?,
            None => FeatureMode::default(),
        };
        let index_timeout = match get("INDEX_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|e| ConfigError::Invalid {
                    key: "INDEX_TIMEOUT_SECS",
                    message: e.to_string(),
                })?;
                if secs == 0 {
                    return Err(ConfigError::Invalid {
                        key: "INDEX_TIMEOUT_SECS",
                        message: "must be at least 1 second".to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };
        let listen_addr = get("LISTEN_ADDR")
            .unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string())
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::Invalid {
                key: "LISTEN_ADDR",
                message: e.to_string(),
            })?;

        let webhook = get("WEBHOOK_SECRET").map(|secret| WebhookConfig {
            secret,
            public_url: get("WEBHOOK_URL"),
        });

        Ok(Self {
            bot_token,
            search: SearchSettings {
                min_rating,
                max_results,
                mode,
            },
            omdb_api_key: get("OMDB_API_KEY"),
            yts_base_url: get("YTS_BASE_URL").unwrap_or_else(|| DEFAULT_YTS_BASE.to_string()),
            index_timeout,
            webhook,
            listen_addr,
        })
    }
}

fn parse_min_rating(raw: &str) -> Result<f32, ConfigError> {
    let value = raw.parse::<f32>().map_err(|e| ConfigError::Invalid {
        key: "MIN_RATING",
        message: e.to_string(),
    })?;
    if !value.is_finite() || !(0.0..=MAX_RATING).contains(&value) {
        return Err(ConfigError::Invalid {
            key: "MIN_RATING",
            message: format!("must be between 0 and {MAX_RATING}"),
        });
    }
    Ok(value)
}

fn parse_max_results(raw: &str) -> Result<usize, ConfigError> {
    let value = raw.parse::<i64>().map_err(|e| ConfigError::Invalid {
        key: "MAX_RESULTS",
        message: e.to_string(),
    })?;
    usize::try_from(value).map_err(|_| ConfigError::Invalid {
        key: "MAX_RESULTS",
        message: "must not be negative".to_string(),
    })
}
