// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use imds_tagger::errors::FetchError;
use imds_tagger::imds::{ImdsClient, MetadataSource};
use imds_tagger::tag::TagName;
use mockito::{Matcher, Server};
use std::time::Duration;

const INSTANCE_PATH: &str = "/computeMetadata/v1/instance";

#[tokio::test]
async fn fetches_recursive_instance_document() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", INSTANCE_PATH)
        .match_query(Matcher::UrlEncoded("recursive".into(), "true".into()))
        .match_header("Metadata-Flavor", "Google")
        .with_status(200)
        .with_header("Content-Type", "application/json")
        .with_body(
            r#"{
                "hostname": "web-1.c.project.internal",
                "id": 4520031799277581759,
                "image": "",
                "machineType": "projects/123/machineTypes/e2-medium",
                "zone": "projects/123/zones/us-central1-a"
            }"#,
        )
        .create_async()
        .await;

    let client = ImdsClient::new(&server.url()).unwrap();
    let document = client.fetch(Duration::from_secs(5)).await.unwrap();

    mock.assert_async().await;
    assert_eq!(document.get(TagName::Hostname), "web-1.c.project.internal");
    assert_eq!(document.get(TagName::Id), "4520031799277581759");
    assert_eq!(document.get(TagName::Image), "");
    assert_eq!(
        document.get(TagName::Zone),
        "projects/123/zones/us-central1-a"
    );
}

#[tokio::test]
async fn error_status_is_reported() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", INSTANCE_PATH)
        .match_query(Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let client = ImdsClient::new(&server.url()).unwrap();
    let result = client.fetch(Duration::from_secs(5)).await;

    mock.assert_async().await;
    assert!(matches!(result, Err(FetchError::Status(500))));
}

#[tokio::test]
async fn malformed_body_is_a_decode_error() {
    let mut server = Server::new_async().await;
    server
        .mock("GET", INSTANCE_PATH)
        .match_query(Matcher::Any)
        .with_status(200)
        .with_body("<html>not metadata</html>")
        .create_async()
        .await;

    let client = ImdsClient::new(&server.url()).unwrap();
    let result = client.fetch(Duration::from_secs(5)).await;

    assert!(matches!(result, Err(FetchError::Decode(_))));
}

#[tokio::test]
async fn unreachable_server_is_a_transport_error() {
    // nothing listens on the discard port
    let client = ImdsClient::new("http://127.0.0.1:9").unwrap();
    let result = client.fetch(Duration::from_secs(5)).await;

    assert!(matches!(
        result,
        Err(FetchError::Http(_)) | Err(FetchError::Timeout(_))
    ));
}
