use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::apis::openalex::{self, OpenAlexClient};
use crate::apis::semantic_scholar::{self, SemanticScholarClient};
use crate::apis::SourceError;
use crate::feed::{FeedAggregator, FeedSettings};
use crate::limiter::{RateLimiter, DEFAULT_MIN_INTERVAL};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{var} must be a whole number of milliseconds, got {value:?}")]
    InvalidMillis { var: &'static str, value: String },
}

/// Feed configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub openalex_base_url: String,
    pub openalex_email: Option<String>,
    pub semantic_scholar_base_url: String,
    pub semantic_scholar_api_key: Option<String>,
    pub min_interval: Duration,
    pub feed: FeedSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            openalex_base_url: openalex::DEFAULT_BASE_URL.to_string(),
            openalex_email: None,
            semantic_scholar_base_url: semantic_scholar::DEFAULT_BASE_URL.to_string(),
            semantic_scholar_api_key: None,
            min_interval: DEFAULT_MIN_INTERVAL,
            feed: FeedSettings::default(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through `lookup`; empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let defaults = Self::default();

        let min_interval = match get("FEED_MIN_INTERVAL_MS") {
            Some(v) => parse_millis("FEED_MIN_INTERVAL_MS", v)?,
            None => defaults.min_interval,
        };
        let mut feed = defaults.feed;
        if let Some(v) = get("FEED_INITIAL_DELAY_MS") {
            feed.initial_delay = parse_millis("FEED_INITIAL_DELAY_MS", v)?;
        }

        Ok(Self {
            openalex_base_url: get("OPENALEX_BASE_URL").unwrap_or(defaults.openalex_base_url),
            openalex_email: get("OPENALEX_EMAIL"),
            semantic_scholar_base_url: get("SEMANTIC_SCHOLAR_BASE_URL")
                .unwrap_or(defaults.semantic_scholar_base_url),
            semantic_scholar_api_key: get("SEMANTIC_SCHOLAR_API_KEY"),
            min_interval,
            feed,
        })
    }

    /// Wire both provider clients to one shared limiter.
    pub fn build_aggregator(&self) -> Result<FeedAggregator, SourceError> {
        let limiter = Arc::new(RateLimiter::new(self.min_interval));
        let openalex = OpenAlexClient::new(&self.openalex_base_url, self.openalex_email.clone())?;
        let semantic = SemanticScholarClient::new(
            &self.semantic_scholar_base_url,
            self.semantic_scholar_api_key.clone(),
        )?;
        Ok(FeedAggregator::new(
            Arc::new(openalex),
            Arc::new(semantic),
            limiter,
            self.feed.clone(),
        ))
    }

    /// Return a list of source status descriptions.
    pub fn source_status(&self) -> Vec<SourceStatus> {
        vec![
            SourceStatus {
                name: "openalex".into(),
                base_url: self.openalex_base_url.clone(),
                note: if self.openalex_email.is_some() {
                    "Polite pool email set".into()
                } else {
                    "No email (common pool)".into()
                },
            },
            SourceStatus {
                name: "semantic_scholar".into(),
                base_url: self.semantic_scholar_base_url.clone(),
                note: if self.semantic_scholar_api_key.is_some() {
                    "API key set".into()
                } else {
                    "No API key (shared rate limit)".into()
                },
            },
        ]
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SourceStatus {
    pub name: String,
    pub base_url: String,
    pub note: String,
}

fn parse_millis(var: &'static str, value: String) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::InvalidMillis { var, value })
}
