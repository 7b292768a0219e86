// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Access to the GCP instance metadata service.
//!
//! The processor only depends on [`MetadataSource`]. [`ImdsClient`] is the HTTP implementation
//! that talks to the metadata server reachable from every Compute Engine instance.
//!
//! <https://cloud.google.com/compute/docs/metadata/default-metadata-values>

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Deserializer};
use tracing::debug;

use crate::errors::FetchError;
use crate::tag::TagName;

const INSTANCE_METADATA_PATH: &str = "/computeMetadata/v1/instance";
const METADATA_FLAVOR_HEADER: &str = "Metadata-Flavor";
const METADATA_FLAVOR: &str = "Google";

/// Source of the instance metadata document.
///
/// Every call returns the whole document, there is no per-field lookup. Implementations must be
/// safe to call from many workers at once.
#[async_trait]
pub trait MetadataSource: Send + Sync {
    async fn fetch(&self, timeout: Duration) -> Result<InstanceDocument, FetchError>;
}

/// The subset of the instance document the processor turns into tags.
///
/// An empty field means the service did not provide it; absent and empty are not told apart.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstanceDocument {
    #[serde(default)]
    pub hostname: String,
    #[serde(default, deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub image: String,
    #[serde(default, rename = "machineType")]
    pub machine_type: String,
    #[serde(default)]
    pub zone: String,
}

impl InstanceDocument {
    #[must_use]
    pub fn get(&self, tag: TagName) -> &str {
        match tag {
            TagName::Hostname => &self.hostname,
            TagName::Id => &self.id,
            TagName::Image => &self.image,
            TagName::MachineType => &self.machine_type,
            TagName::Zone => &self.zone,
        }
    }
}

// The metadata server reports the instance id as a JSON number.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Str(String),
        Num(u64),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Str(value)) => value,
        Some(Raw::Num(value)) => value.to_string(),
        None => String::new(),
    })
}

/// HTTP client for the metadata server.
#[derive(Debug, Clone)]
pub struct ImdsClient {
    endpoint: String,
    client: reqwest::Client,
}

impl ImdsClient {
    /// Builds a client for `endpoint`, e.g. `http://metadata.google.internal`.
    ///
    /// Proxies are never used: the metadata server is only reachable directly.
    pub fn new(endpoint: &str) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().no_proxy().build()?;
        Ok(Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl MetadataSource for ImdsClient {
    async fn fetch(&self, timeout: Duration) -> Result<InstanceDocument, FetchError> {
        let url = format!("{}{}", self.endpoint, INSTANCE_METADATA_PATH);
        debug!("Requesting instance metadata from {url}");

        let response = self
            .client
            .get(&url)
            .header(METADATA_FLAVOR_HEADER, METADATA_FLAVOR)
            .query(&[("recursive", "true")])
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify(e, timeout))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let body = response.bytes().await.map_err(|e| classify(e, timeout))?;
        Ok(serde_json::from_slice(&body)?)
    }
}

fn classify(error: reqwest::Error, timeout: Duration) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout(timeout)
    } else {
        FetchError::Http(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_full_document() {
        let document: InstanceDocument = serde_json::from_str(
            r#"{
                "hostname": "web-1.c.project.internal",
                "id": 4520031799277581759,
                "image": "projects/debian-cloud/global/images/debian-12",
                "machineType": "projects/123/machineTypes/e2-medium",
                "zone": "projects/123/zones/us-central1-a",
                "tags": ["http-server"]
            }"#,
        )
        .unwrap();

        assert_eq!(document.get(TagName::Hostname), "web-1.c.project.internal");
        assert_eq!(document.get(TagName::Id), "4520031799277581759");
        assert_eq!(
            document.get(TagName::MachineType),
            "projects/123/machineTypes/e2-medium"
        );
        assert_eq!(document.get(TagName::Zone), "projects/123/zones/us-central1-a");
    }

    #[test]
    fn test_decode_missing_fields_as_empty() {
        let document: InstanceDocument =
            serde_json::from_str(r#"{"id": "i-1", "zone": ""}"#).unwrap();

        assert_eq!(document.get(TagName::Id), "i-1");
        assert_eq!(document.get(TagName::Hostname), "");
        assert_eq!(document.get(TagName::Zone), "");

        let document: InstanceDocument = serde_json::from_str(r#"{"id": null}"#).unwrap();
        assert_eq!(document, InstanceDocument::default());
    }

    #[test]
    fn test_endpoint_trailing_slash_is_trimmed() {
        let client = ImdsClient::new("http://127.0.0.1:8080/").unwrap();
        assert_eq!(client.endpoint(), "http://127.0.0.1:8080");
    }
}
