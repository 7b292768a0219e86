// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Metadata sources with scripted behavior

use async_trait::async_trait;
use imds_tagger::errors::FetchError;
use imds_tagger::imds::{InstanceDocument, MetadataSource};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Semaphore;

/// Answers every call with the same document, or fails every call
pub struct StaticSource {
    document: Option<InstanceDocument>,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl StaticSource {
    pub fn ok(document: InstanceDocument) -> Self {
        Self {
            document: Some(document),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            document: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for StaticSource {
    async fn fetch(&self, _timeout: Duration) -> Result<InstanceDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.document.clone().ok_or(FetchError::Status(503))
    }
}

/// Holds every call until [`GatedSource::open`] lets it through
#[allow(dead_code)]
pub struct GatedSource {
    gate: Semaphore,
    document: InstanceDocument,
    calls: AtomicUsize,
}

#[allow(dead_code)]
impl GatedSource {
    pub fn closed(document: InstanceDocument) -> Self {
        Self {
            gate: Semaphore::new(0),
            document,
            calls: AtomicUsize::new(0),
        }
    }

    /// Lets `calls` more fetches complete
    pub fn open(&self, calls: usize) {
        self.gate.add_permits(calls);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for GatedSource {
    async fn fetch(&self, _timeout: Duration) -> Result<InstanceDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.gate.acquire().await {
            Ok(permit) => permit.forget(),
            Err(_) => return Err(FetchError::Status(503)),
        }
        Ok(self.document.clone())
    }
}

/// Sleeps for the next scripted latency on every call, then returns an empty document
///
/// Empty fields are never cached, so every record enriched for a non-empty tag list reaches
/// the source.
#[allow(dead_code)]
pub struct LatencySource {
    latencies: Mutex<VecDeque<Duration>>,
}

#[allow(dead_code)]
impl LatencySource {
    pub fn new(latencies: impl IntoIterator<Item = Duration>) -> Self {
        Self {
            latencies: Mutex::new(latencies.into_iter().collect()),
        }
    }

    pub fn from_millis(latencies: &[u64]) -> Self {
        Self::new(latencies.iter().map(|ms| Duration::from_millis(*ms)))
    }
}

#[async_trait]
impl MetadataSource for LatencySource {
    async fn fetch(&self, _timeout: Duration) -> Result<InstanceDocument, FetchError> {
        let latency = self
            .latencies
            .lock()
            .expect("lock poisoned")
            .pop_front()
            .unwrap_or_default();
        tokio::time::sleep(latency).await;
        Ok(InstanceDocument::default())
    }
}
