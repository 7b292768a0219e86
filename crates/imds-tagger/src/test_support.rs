// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{PipelineConfig, ProcessorConfig};
use crate::errors::FetchError;
use crate::imds::{InstanceDocument, MetadataSource};

/// Metadata source answering every call with the same document, or failing every call.
pub(crate) struct StaticSource {
    document: Option<InstanceDocument>,
    delay: Duration,
    calls: AtomicUsize,
}

impl StaticSource {
    pub(crate) fn ok(document: InstanceDocument) -> Self {
        Self {
            document: Some(document),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn failing() -> Self {
        Self {
            document: None,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub(crate) fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetadataSource for StaticSource {
    async fn fetch(&self, _timeout: Duration) -> Result<InstanceDocument, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.document.clone().ok_or(FetchError::Status(503))
    }
}

pub(crate) fn document(id: &str, zone: &str) -> InstanceDocument {
    InstanceDocument {
        id: id.to_string(),
        zone: zone.to_string(),
        ..InstanceDocument::default()
    }
}

pub(crate) fn pipeline_config(tags: &[&str]) -> PipelineConfig {
    ProcessorConfig {
        imds_tags: tags.iter().map(|tag| tag.to_string()).collect(),
        ..ProcessorConfig::default()
    }
    .validate()
    .expect("test configuration is valid")
}
