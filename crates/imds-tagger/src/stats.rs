// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Periodic cache statistics logging.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cache::{CacheStats, ExpiringCache};

pub struct StatsReporter {
    handle: JoinHandle<()>,
}

impl StatsReporter {
    /// Logs the cache counters every `period` until `cancel` fires.
    ///
    /// Counters are reset after every report, so each line covers one period.
    pub fn spawn(cache: Arc<ExpiringCache>, period: Duration, cancel: CancellationToken) -> Self {
        let handle = tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await; // discard first tick, which is instantaneous

            loop {
                tokio::select! {
                    () = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        report(&cache);
                    }
                }
            }
            debug!("Cache stats reporter stopped");
        });
        Self { handle }
    }

    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            error!("Cache stats reporter failed: {e}");
        }
    }
}

/// Logs and resets the counters of `cache`.
pub fn report(cache: &ExpiringCache) -> CacheStats {
    let stats = cache.take_stats();
    debug!(
        "cache: size={} hit={} miss={} full={}",
        stats.size, stats.hits, stats.misses, stats.evictions
    );
    stats
}
