// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::fmt;
use std::time::Duration;

use crate::tag::TagName;

/// Rejected configuration. The processor is never built from a configuration that fails
/// validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("no tags specified in configuration")]
    NoTags,

    #[error("empty metadata tag specified in configuration")]
    EmptyTag,

    #[error("not allowed metadata tag specified in configuration: {0}")]
    UnknownTag(String),

    #[error("{0} must be greater than 0")]
    Zero(&'static str),

    #[error("{key} must be at most {max}")]
    TooLarge { key: &'static str, max: usize },

    #[error("invalid value '{value}' for {key}")]
    InvalidValue { key: &'static str, value: String },

    #[error("invalid log level '{0}'. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),
}

/// Failure to obtain the instance metadata document.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("metadata request timed out after {0:?}")]
    Timeout(Duration),

    #[error("metadata request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("metadata service responded with status {0}")]
    Status(u16),

    #[error("failed to decode metadata document: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CacheError {
    #[error("cache entry for {key} is too large: {len} bytes, limit is {max}")]
    EntryTooLarge {
        key: TagName,
        len: usize,
        max: usize,
    },

    #[error("cache is full ({capacity} entries) and no entry could be evicted")]
    Full { capacity: usize },
}

/// A record the processor refused to accept. The record is handed back to the caller.
#[derive(thiserror::Error)]
pub enum EnqueueError<R> {
    #[error("processor is stopping, record rejected")]
    Stopped(R),

    #[error("processor is not running, record rejected")]
    NotRunning(R),
}

impl<R> EnqueueError<R> {
    /// Recovers the rejected record.
    pub fn into_inner(self) -> R {
        match self {
            Self::Stopped(record) | Self::NotRunning(record) => record,
        }
    }
}

impl<R> fmt::Debug for EnqueueError<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped(_) => write!(f, "EnqueueError::Stopped(..)"),
            Self::NotRunning(_) => write!(f, "EnqueueError::NotRunning(..)"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProcessorError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Processor already started")]
    AlreadyStarted,

    #[error("Processor not running")]
    NotRunning,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty metric line")]
    Empty,

    #[error("missing measurement name")]
    MissingName,

    #[error("malformed tag '{0}'")]
    MalformedTag(String),
}
