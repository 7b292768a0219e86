// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Helpers to run records through a processor

use imds_tagger::config::ProcessorConfig;
use imds_tagger::imds::InstanceDocument;
use imds_tagger::metric::Metric;
use imds_tagger::processor::Processor;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[allow(dead_code)]
pub fn config(tags: &[&str], ordered: bool, workers: usize, window: usize) -> ProcessorConfig {
    ProcessorConfig {
        imds_tags: tags.iter().map(|tag| tag.to_string()).collect(),
        ordered,
        max_parallel_calls: workers,
        ordered_queue_size: window,
        ..ProcessorConfig::default()
    }
}

#[allow(dead_code)]
pub fn document(id: &str, zone: &str) -> InstanceDocument {
    InstanceDocument {
        id: id.to_string(),
        zone: zone.to_string(),
        ..InstanceDocument::default()
    }
}

/// Starts `processor` with a sink drained by a background task
///
/// The task resolves to every emitted record once the processor has stopped.
#[allow(dead_code)]
pub fn start_collecting(processor: &Processor<Metric>) -> JoinHandle<Vec<Metric>> {
    let (sink, mut rx) = mpsc::channel(4);
    processor.start(sink).expect("processor starts");
    tokio::spawn(async move {
        let mut emitted = Vec::new();
        while let Some(metric) = rx.recv().await {
            emitted.push(metric);
        }
        emitted
    })
}

/// Adds `m0..m{count}` in order, stops the processor and returns what reached the sink
#[allow(dead_code)]
pub async fn run_named(processor: &Processor<Metric>, count: usize) -> Vec<Metric> {
    let collector = start_collecting(processor);
    for i in 0..count {
        processor
            .add(Metric::new(format!("m{i}")))
            .await
            .expect("record accepted");
    }
    processor.stop().await;
    collector.await.expect("collector task")
}

#[allow(dead_code)]
pub fn names(metrics: &[Metric]) -> Vec<String> {
    metrics.iter().map(|metric| metric.name.clone()).collect()
}
