// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Per-record tag lookup.
//!
//! Cached tags are applied straight away. Any tag missing from the cache costs exactly one
//! metadata request for the whole record, whatever the number of missing tags. Failures never
//! drop the record: it is returned with whatever tags could be applied.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error};

use crate::cache::ExpiringCache;
use crate::config::PipelineConfig;
use crate::errors::FetchError;
use crate::imds::{InstanceDocument, MetadataSource};
use crate::metric::Taggable;
use crate::tag::TagName;

pub struct Enricher {
    cache: Arc<ExpiringCache>,
    source: Arc<dyn MetadataSource>,
    tags: Vec<TagName>,
    timeout: Duration,
    cache_ttl: Duration,
}

impl Enricher {
    pub fn new(
        config: &PipelineConfig,
        cache: Arc<ExpiringCache>,
        source: Arc<dyn MetadataSource>,
    ) -> Self {
        Self {
            cache,
            source,
            tags: config.desired_tags().to_vec(),
            timeout: config.per_call_timeout(),
            cache_ttl: config.cache_ttl(),
        }
    }

    pub fn cache(&self) -> &Arc<ExpiringCache> {
        &self.cache
    }

    /// Adds every configured tag that can be resolved to `record`.
    pub async fn enrich<R: Taggable>(&self, mut record: R) -> R {
        let mut not_found = Vec::new();
        for &tag in &self.tags {
            match self.cache.get(tag) {
                Some(value) => record.add_tag(tag.as_str(), &value),
                None => not_found.push(tag),
            }
        }

        if not_found.is_empty() {
            return record;
        }

        let document = match self.fetch().await {
            Ok(document) => document,
            Err(e) => {
                error!("Error when fetching instance metadata: {e}");
                return record;
            }
        };

        for tag in not_found {
            let value = document.get(tag);
            if value.is_empty() {
                // not cached so the next record asks again
                debug!("Instance metadata has no value for {tag}");
                continue;
            }
            record.add_tag(tag.as_str(), value);
            if let Err(e) = self.cache.set(tag, value, self.cache_ttl) {
                error!("Error when setting metadata tag cache value: {e}");
            }
        }

        record
    }

    async fn fetch(&self) -> Result<InstanceDocument, FetchError> {
        match tokio::time::timeout(self.timeout, self.source.fetch(self.timeout)).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(self.timeout)),
        }
    }
}
