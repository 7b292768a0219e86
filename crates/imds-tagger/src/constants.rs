// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::time::Duration;

/// Upper bound on results held back by the ordered dispatcher
pub const DEFAULT_MAX_ORDERED_QUEUE_SIZE: usize = 10_000;

pub const DEFAULT_MAX_PARALLEL_CALLS: usize = 10;

/// Largest accepted worker pool
pub const MAX_PARALLEL_CALLS_LIMIT: usize = 1024;

/// Largest accepted ordered window
pub const MAX_ORDERED_QUEUE_SIZE_LIMIT: usize = 1_000_000;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Zero means cached tags never expire
pub const DEFAULT_CACHE_TTL: Duration = Duration::ZERO;

pub const DEFAULT_CACHE_SIZE: usize = 1000;

pub const DEFAULT_STATS_INTERVAL: Duration = Duration::from_secs(30);

pub const DEFAULT_IMDS_ENDPOINT: &str = "http://metadata.google.internal";

pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Largest value, in bytes, a single cache entry may hold
pub const MAX_ENTRY_SIZE: usize = 1024;
