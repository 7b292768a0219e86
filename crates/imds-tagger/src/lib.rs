// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Tag enrichment for telemetry records backed by the GCP instance metadata service.
//!
//! Records flow through a [`processor::Processor`], which fans them out to a bounded pool of
//! workers. Each worker consults an [`cache::ExpiringCache`] for the configured tags and only
//! calls the metadata service for the tags it could not find. Results are emitted either in
//! completion order or, in ordered mode, in the order they were enqueued.

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

pub mod cache;
pub mod config;
pub mod constants;
pub mod dispatch;
pub mod enrich;
pub mod errors;
pub mod imds;
pub mod metric;
pub mod processor;
pub mod stats;
pub mod tag;

#[cfg(test)]
pub(crate) mod test_support;
