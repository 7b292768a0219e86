// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod logger;

use std::{env, error::Error, future::Future, process::ExitCode, sync::Arc};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use imds_tagger::{
    config::ProcessorConfig,
    constants::DEFAULT_LOG_LEVEL,
    errors::ParseError,
    imds::ImdsClient,
    metric::Metric,
    processor::Processor,
};

const OUTPUT_BUFFER_SIZE: usize = 1024;

#[tokio::main]
pub async fn main() -> ExitCode {
    let log_level = env::var("IMDS_LOG_LEVEL")
        .map(|val| val.to_lowercase())
        .unwrap_or(DEFAULT_LOG_LEVEL.to_string());

    if let Err(e) = init_logging(&log_level) {
        eprintln!("IMDS_TAGGER | ERROR | Could not set up logging: {e}");
        return ExitCode::FAILURE;
    }
    debug!("Logging subsystem enabled");

    let config = match ProcessorConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Error loading configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let client = match ImdsClient::new(&config.endpoint) {
        Ok(client) => client,
        Err(e) => {
            error!("Error creating metadata client: {e}");
            return ExitCode::FAILURE;
        }
    };

    let processor = match Processor::<Metric>::new(&config, Arc::new(client)) {
        Ok(processor) => processor,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    let (sink, output) = mpsc::channel(OUTPUT_BUFFER_SIZE);
    if let Err(e) = processor.start(sink) {
        error!("Error starting processor: {e}");
        return ExitCode::FAILURE;
    }
    let writer = tokio::spawn(write_lines(output));

    let stdin = BufReader::new(tokio::io::stdin());
    forward_lines(stdin, &processor, tokio::signal::ctrl_c()).await;
    processor.stop().await;

    match writer.await {
        Ok(Ok(written)) => {
            info!("Wrote {written} enriched lines");
            ExitCode::SUCCESS
        }
        Ok(Err(e)) => {
            error!("Error writing output: {e}");
            ExitCode::FAILURE
        }
        Err(e) => {
            error!("Output task failed: {e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(log_level: &str) -> Result<(), Box<dyn Error + Send + Sync>> {
    let env_filter = format!("h2=off,hyper=off,rustls=off,{log_level}");

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(EnvFilter::try_new(env_filter)?)
        .event_format(logger::Formatter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;
    Ok(())
}

/// Feeds `input` lines to the processor until end of input, a read error or `interrupted`
/// resolves. Returns whether it stopped because of the interruption.
///
/// `add` waits under backpressure, so it races the interruption too.
async fn forward_lines<I, F>(input: I, processor: &Processor<Metric>, interrupted: F) -> bool
where
    I: AsyncBufRead + Unpin,
    F: Future,
{
    let mut lines = input.lines();
    tokio::pin!(interrupted);

    loop {
        let line = tokio::select! {
            _ = &mut interrupted => break,
            line = lines.next_line() => line,
        };

        let metric = match line {
            Ok(Some(line)) => match Metric::parse(&line) {
                Ok(metric) => metric,
                Err(ParseError::Empty) => continue,
                Err(e) => {
                    warn!("Skipping malformed line: {e}");
                    continue;
                }
            },
            Ok(None) => {
                debug!("End of input, draining pending records");
                return false;
            }
            Err(e) => {
                error!("Error reading input: {e}");
                return false;
            }
        };

        tokio::select! {
            _ = &mut interrupted => break,
            added = processor.add(metric) => {
                if let Err(e) = added {
                    warn!("{e}");
                    return false;
                }
            }
        }
    }

    info!("Interrupted, draining pending records");
    true
}

async fn write_lines(mut output: mpsc::Receiver<Metric>) -> std::io::Result<u64> {
    let mut stdout = tokio::io::stdout();
    let mut written = 0;
    while let Some(metric) = output.recv().await {
        stdout.write_all(format!("{metric}\n").as_bytes()).await?;
        stdout.flush().await?;
        written += 1;
    }
    Ok(written)
}
