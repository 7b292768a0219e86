// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Lifecycle of the enrichment pipeline.
//!
//! A [`Processor`] is built from a validated configuration, started once with a sink and stopped
//! once. Stopping drains every accepted record to the sink before returning.
//!
//! ```text
//! Created ──start──> Running ──stop──> Draining ──> Stopped
//!    └──────────────────stop───────────────────────────┘
//! ```

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::cache::{CacheStats, ExpiringCache};
use crate::config::{PipelineConfig, ProcessorConfig};
use crate::dispatch::Dispatcher;
use crate::enrich::Enricher;
use crate::errors::{EnqueueError, ProcessorError};
use crate::imds::MetadataSource;
use crate::metric::Taggable;
use crate::stats::StatsReporter;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    Created,
    Running,
    Draining,
    Stopped,
}

struct Running<R> {
    dispatcher: Arc<Dispatcher<R>>,
    reporter: Option<StatsReporter>,
    cache: Arc<ExpiringCache>,
    cancel: CancellationToken,
}

enum State<R> {
    Created,
    Running(Running<R>),
    Draining,
    Stopped,
}

pub struct Processor<R> {
    config: PipelineConfig,
    source: Arc<dyn MetadataSource>,
    state: Mutex<State<R>>,
}

impl<R: Taggable> Processor<R> {
    /// Validates `config`. Nothing is spawned until [`Processor::start`].
    pub fn new(
        config: &ProcessorConfig,
        source: Arc<dyn MetadataSource>,
    ) -> Result<Self, ProcessorError> {
        Ok(Self::with_pipeline_config(config.validate()?, source))
    }

    pub fn with_pipeline_config(config: PipelineConfig, source: Arc<dyn MetadataSource>) -> Self {
        Self {
            config,
            source,
            state: Mutex::new(State::Created),
        }
    }

    /// Creates the cache and spawns the workers, plus the stats reporter when enabled.
    ///
    /// Enriched records are sent to `sink`, which must keep being drained.
    pub fn start(&self, sink: mpsc::Sender<R>) -> Result<(), ProcessorError> {
        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        if !matches!(*state, State::Created) {
            return Err(ProcessorError::AlreadyStarted);
        }

        let cache = Arc::new(ExpiringCache::new(self.config.cache_capacity()));
        debug!("Tag cache size: {}", self.config.cache_capacity());
        if !self.config.cache_ttl().is_zero() {
            debug!("Tag cache TTL: {}s", self.config.cache_ttl().as_secs_f64());
        }

        let cancel = CancellationToken::new();
        let enricher = Arc::new(Enricher::new(
            &self.config,
            Arc::clone(&cache),
            Arc::clone(&self.source),
        ));
        let dispatcher = Arc::new(Dispatcher::start(
            &self.config,
            enricher,
            sink,
            cancel.child_token(),
        ));
        let reporter = self.config.log_cache_stats().then(|| {
            StatsReporter::spawn(
                Arc::clone(&cache),
                self.config.stats_interval(),
                cancel.child_token(),
            )
        });

        *state = State::Running(Running {
            dispatcher,
            reporter,
            cache,
            cancel,
        });
        info!(
            "Processor started, tags={:?} ordered={}",
            self.config
                .desired_tags()
                .iter()
                .map(|tag| tag.as_str())
                .collect::<Vec<_>>(),
            self.config.ordered()
        );
        Ok(())
    }

    /// Hands `record` to the dispatcher, waiting under backpressure.
    ///
    /// The record comes back inside the error when the processor is not running or is
    /// stopping, including when `stop` begins while this call is waiting.
    pub async fn add(&self, record: R) -> Result<(), EnqueueError<R>> {
        let dispatcher = {
            #[allow(clippy::expect_used)]
            let state = self.state.lock().expect("lock poisoned");
            match &*state {
                State::Running(running) => Arc::clone(&running.dispatcher),
                State::Created => return Err(EnqueueError::NotRunning(record)),
                State::Draining | State::Stopped => return Err(EnqueueError::Stopped(record)),
            }
        };
        dispatcher.enqueue(record).await
    }

    /// Stops accepting records, waits for accepted ones to reach the sink and tears down
    /// background tasks. A processor that never started goes straight to `Stopped`.
    pub async fn stop(&self) {
        let running = {
            #[allow(clippy::expect_used)]
            let mut state = self.state.lock().expect("lock poisoned");
            match std::mem::replace(&mut *state, State::Draining) {
                State::Running(running) => running,
                State::Created | State::Stopped => {
                    *state = State::Stopped;
                    return;
                }
                // another caller is draining
                State::Draining => return,
            }
        };

        info!("Processor draining");
        running.cancel.cancel();
        running.dispatcher.shutdown().await;
        if let Some(reporter) = running.reporter {
            reporter.join().await;
        }
        drop(running.cache);

        #[allow(clippy::expect_used)]
        let mut state = self.state.lock().expect("lock poisoned");
        *state = State::Stopped;
        info!("Processor stopped");
    }

    pub fn state(&self) -> PipelineState {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        match &*state {
            State::Created => PipelineState::Created,
            State::Running(_) => PipelineState::Running,
            State::Draining => PipelineState::Draining,
            State::Stopped => PipelineState::Stopped,
        }
    }

    /// Current cache counters, available while running.
    pub fn cache_stats(&self) -> Result<CacheStats, ProcessorError> {
        #[allow(clippy::expect_used)]
        let state = self.state.lock().expect("lock poisoned");
        match &*state {
            State::Running(running) => Ok(running.cache.stats()),
            _ => Err(ProcessorError::NotRunning),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }
}
