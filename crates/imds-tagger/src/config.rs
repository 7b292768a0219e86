// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::time::Duration;

use crate::constants::{
    DEFAULT_CACHE_SIZE, DEFAULT_CACHE_TTL, DEFAULT_IMDS_ENDPOINT, DEFAULT_LOG_LEVEL,
    DEFAULT_MAX_ORDERED_QUEUE_SIZE, DEFAULT_MAX_PARALLEL_CALLS, DEFAULT_STATS_INTERVAL,
    DEFAULT_TIMEOUT, MAX_ORDERED_QUEUE_SIZE_LIMIT, MAX_PARALLEL_CALLS_LIMIT,
};
use crate::errors::ConfigError;
use crate::tag::{split_tag_list, TagName};

const VALID_LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// User facing processor configuration, as read from the environment
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    /// Metadata tags to add to every record
    pub imds_tags: Vec<String>,
    /// Deadline for one metadata request
    pub timeout: Duration,
    /// How long fetched tags stay cached, zero caches forever
    pub cache_ttl: Duration,
    /// Emit records in the order they were added
    pub ordered: bool,
    /// Number of records enriched concurrently
    pub max_parallel_calls: usize,
    /// Results the ordered dispatcher may hold back before `add` blocks
    pub ordered_queue_size: usize,
    /// Maximum number of cached tag values
    pub tag_cache_size: usize,
    /// Periodically log cache hit/miss/eviction counters
    pub log_cache_stats: bool,
    pub stats_interval: Duration,
    /// Base URL of the metadata server
    pub endpoint: String,
    /// Log level (e.g., trace, debug, info, warn, error)
    pub log_level: String,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            imds_tags: Vec::new(),
            timeout: DEFAULT_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            ordered: false,
            max_parallel_calls: DEFAULT_MAX_PARALLEL_CALLS,
            ordered_queue_size: DEFAULT_MAX_ORDERED_QUEUE_SIZE,
            tag_cache_size: DEFAULT_CACHE_SIZE,
            log_cache_stats: false,
            stats_interval: DEFAULT_STATS_INTERVAL,
            endpoint: DEFAULT_IMDS_ENDPOINT.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
        }
    }
}

impl ProcessorConfig {
    /// Create configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Create configuration from any key lookup, unset keys keep their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(tags) = lookup("IMDS_TAGS") {
            config.imds_tags = split_tag_list(&tags);
        }
        if let Some(value) = lookup("IMDS_TIMEOUT_SECS") {
            config.timeout = parse_secs("IMDS_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = lookup("IMDS_CACHE_TTL_SECS") {
            config.cache_ttl = parse_secs("IMDS_CACHE_TTL_SECS", &value)?;
        }
        if let Some(value) = lookup("IMDS_ORDERED") {
            config.ordered = parse_bool("IMDS_ORDERED", &value)?;
        }
        if let Some(value) = lookup("IMDS_MAX_PARALLEL_CALLS") {
            config.max_parallel_calls = parse_usize("IMDS_MAX_PARALLEL_CALLS", &value)?;
        }
        if let Some(value) = lookup("IMDS_ORDERED_QUEUE_SIZE") {
            config.ordered_queue_size = parse_usize("IMDS_ORDERED_QUEUE_SIZE", &value)?;
        }
        if let Some(value) = lookup("IMDS_TAG_CACHE_SIZE") {
            config.tag_cache_size = parse_usize("IMDS_TAG_CACHE_SIZE", &value)?;
        }
        if let Some(value) = lookup("IMDS_LOG_CACHE_STATS") {
            config.log_cache_stats = parse_bool("IMDS_LOG_CACHE_STATS", &value)?;
        }
        if let Some(value) = lookup("IMDS_STATS_INTERVAL_SECS") {
            config.stats_interval = parse_secs("IMDS_STATS_INTERVAL_SECS", &value)?;
        }
        if let Some(endpoint) = lookup("IMDS_ENDPOINT") {
            config.endpoint = endpoint.trim().to_string();
        }
        if let Some(level) = lookup("IMDS_LOG_LEVEL") {
            config.log_level = level.trim().to_lowercase();
        }

        Ok(config)
    }

    /// Validate the configuration and freeze it into a [`PipelineConfig`]
    pub fn validate(&self) -> Result<PipelineConfig, ConfigError> {
        if self.imds_tags.is_empty() {
            return Err(ConfigError::NoTags);
        }

        let mut desired_tags = Vec::with_capacity(self.imds_tags.len());
        for raw in &self.imds_tags {
            let tag: TagName = raw.parse()?;
            if !desired_tags.contains(&tag) {
                desired_tags.push(tag);
            }
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Zero("timeout"));
        }
        if self.max_parallel_calls == 0 {
            return Err(ConfigError::Zero("max_parallel_calls"));
        }
        if self.max_parallel_calls > MAX_PARALLEL_CALLS_LIMIT {
            return Err(ConfigError::TooLarge {
                key: "max_parallel_calls",
                max: MAX_PARALLEL_CALLS_LIMIT,
            });
        }
        if self.ordered_queue_size == 0 {
            return Err(ConfigError::Zero("ordered_queue_size"));
        }
        if self.ordered_queue_size > MAX_ORDERED_QUEUE_SIZE_LIMIT {
            return Err(ConfigError::TooLarge {
                key: "ordered_queue_size",
                max: MAX_ORDERED_QUEUE_SIZE_LIMIT,
            });
        }
        if self.tag_cache_size == 0 {
            return Err(ConfigError::Zero("tag_cache_size"));
        }
        if self.log_cache_stats && self.stats_interval.is_zero() {
            return Err(ConfigError::Zero("stats_interval"));
        }
        if self.endpoint.is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "endpoint",
                value: self.endpoint.clone(),
            });
        }
        if !VALID_LOG_LEVELS.contains(&self.log_level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(self.log_level.clone()));
        }

        Ok(PipelineConfig {
            desired_tags,
            max_concurrency: self.max_parallel_calls,
            ordered: self.ordered,
            ordered_queue_capacity: self.ordered_queue_size,
            per_call_timeout: self.timeout,
            cache_capacity: self.tag_cache_size,
            cache_ttl: self.cache_ttl,
            log_cache_stats: self.log_cache_stats,
            stats_interval: self.stats_interval,
        })
    }
}

/// Validated, immutable settings the pipeline runs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineConfig {
    desired_tags: Vec<TagName>,
    max_concurrency: usize,
    ordered: bool,
    ordered_queue_capacity: usize,
    per_call_timeout: Duration,
    cache_capacity: usize,
    cache_ttl: Duration,
    log_cache_stats: bool,
    stats_interval: Duration,
}

impl PipelineConfig {
    /// Deduplicated, in configuration order
    pub fn desired_tags(&self) -> &[TagName] {
        &self.desired_tags
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    pub fn ordered(&self) -> bool {
        self.ordered
    }

    pub fn ordered_queue_capacity(&self) -> usize {
        self.ordered_queue_capacity
    }

    pub fn per_call_timeout(&self) -> Duration {
        self.per_call_timeout
    }

    pub fn cache_capacity(&self) -> usize {
        self.cache_capacity
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn log_cache_stats(&self) -> bool {
        self.log_cache_stats
    }

    pub fn stats_interval(&self) -> Duration {
        self.stats_interval
    }
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(invalid(key, value)),
    }
}

fn parse_usize(key: &'static str, value: &str) -> Result<usize, ConfigError> {
    value.trim().parse().map_err(|_| invalid(key, value))
}

fn parse_secs(key: &'static str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| invalid(key, value))
}

fn invalid(key: &'static str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: value.to_string(),
    }
}
