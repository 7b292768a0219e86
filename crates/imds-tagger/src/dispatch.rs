// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Bounded-concurrency dispatch of records to the enricher.
//!
//! A fixed pool of workers pulls jobs from one bounded queue. In unordered mode each worker
//! hands its result to the sink as soon as it is done. In ordered mode results go through a
//! reorder task that releases them strictly by sequence number:
//!
//! ```text
//!  enqueue ──> jobs (bounded) ──> worker 0..n ──> sink                    (unordered)
//!  enqueue ──> jobs (bounded) ──> worker 0..n ──> reorder buffer ──> sink (ordered)
//! ```
//!
//! The ordered mode also holds a window of `ordered_queue_capacity` permits. A permit is taken
//! on enqueue and given back only once the result has reached the sink, which bounds the number
//! of results that can pile up behind a slow record.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::config::PipelineConfig;
use crate::enrich::Enricher;
use crate::errors::EnqueueError;
use crate::metric::Taggable;

struct Job<R> {
    seq: u64,
    record: R,
    /// Ordered mode only, released once the result is emitted
    permit: Option<OwnedSemaphorePermit>,
}

enum Output<R> {
    Sink(mpsc::Sender<R>),
    Reorder(mpsc::UnboundedSender<Job<R>>),
}

impl<R> Clone for Output<R> {
    fn clone(&self) -> Self {
        match self {
            Self::Sink(sink) => Self::Sink(sink.clone()),
            Self::Reorder(done) => Self::Reorder(done.clone()),
        }
    }
}

pub struct Dispatcher<R> {
    jobs: Mutex<Option<mpsc::Sender<Job<R>>>>,
    window: Option<Arc<Semaphore>>,
    next_seq: AtomicU64,
    cancel: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl<R: Taggable> Dispatcher<R> {
    /// Spawns the worker pool (and the reorder task in ordered mode) on the current runtime.
    ///
    /// The sink must keep being drained, a full sink stalls the workers and with them
    /// [`Dispatcher::shutdown`].
    pub fn start(
        config: &PipelineConfig,
        enricher: Arc<Enricher>,
        sink: mpsc::Sender<R>,
        cancel: CancellationToken,
    ) -> Self {
        let workers = config.max_concurrency();
        let (jobs_tx, jobs_rx) = mpsc::channel(workers);
        let jobs_rx = Arc::new(tokio::sync::Mutex::new(jobs_rx));
        let mut tasks = Vec::with_capacity(workers + 1);

        let (output, window) = if config.ordered() {
            let capacity = config.ordered_queue_capacity();
            let (done_tx, done_rx) = mpsc::unbounded_channel();
            tasks.push(tokio::spawn(reorder(done_rx, sink, capacity)));
            (
                Output::Reorder(done_tx),
                Some(Arc::new(Semaphore::new(capacity))),
            )
        } else {
            (Output::Sink(sink), None)
        };

        for id in 0..workers {
            tasks.push(tokio::spawn(work(
                id,
                Arc::clone(&jobs_rx),
                Arc::clone(&enricher),
                output.clone(),
            )));
        }

        debug!(
            "Dispatcher started with {workers} workers, ordered={}",
            config.ordered()
        );

        Self {
            jobs: Mutex::new(Some(jobs_tx)),
            window,
            next_seq: AtomicU64::new(0),
            cancel,
            tasks: Mutex::new(tasks),
        }
    }

    /// Queues `record` for enrichment.
    ///
    /// Waits while the queue (or, in ordered mode, the reorder window) is full. Once shutdown
    /// has begun, waiting and new callers get their record back in [`EnqueueError::Stopped`].
    pub async fn enqueue(&self, record: R) -> Result<(), EnqueueError<R>> {
        let jobs = match self.sender() {
            Some(jobs) if !self.cancel.is_cancelled() => jobs,
            _ => return Err(EnqueueError::Stopped(record)),
        };

        let permit = match &self.window {
            Some(window) => tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Err(EnqueueError::Stopped(record)),
                permit = Arc::clone(window).acquire_owned() => match permit {
                    Ok(permit) => Some(permit),
                    Err(_) => return Err(EnqueueError::Stopped(record)),
                },
            },
            None => None,
        };

        let slot = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(EnqueueError::Stopped(record)),
            slot = jobs.reserve() => match slot {
                Ok(slot) => slot,
                Err(_) => return Err(EnqueueError::Stopped(record)),
            },
        };

        // No await between numbering and sending, a numbered job is never lost.
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        slot.send(Job {
            seq,
            record,
            permit,
        });
        Ok(())
    }

    pub fn ordered(&self) -> bool {
        self.window.is_some()
    }

    /// Rejects further records, lets queued and in-flight ones reach the sink, then waits for
    /// every task to exit.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        #[allow(clippy::expect_used)]
        drop(self.jobs.lock().expect("lock poisoned").take());

        #[allow(clippy::expect_used)]
        let tasks = std::mem::take(&mut *self.tasks.lock().expect("lock poisoned"));
        for task in tasks {
            if let Err(e) = task.await {
                error!("Dispatch task failed: {e}");
            }
        }
        debug!("Dispatcher drained");
    }

    fn sender(&self) -> Option<mpsc::Sender<Job<R>>> {
        #[allow(clippy::expect_used)]
        let jobs = self.jobs.lock().expect("lock poisoned");
        jobs.clone()
    }
}

async fn work<R: Taggable>(
    id: usize,
    jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<Job<R>>>>,
    enricher: Arc<Enricher>,
    output: Output<R>,
) {
    loop {
        let job = jobs.lock().await.recv().await;
        let Some(Job {
            seq,
            record,
            permit,
        }) = job
        else {
            break;
        };

        let record = enricher.enrich(record).await;
        match &output {
            Output::Sink(sink) => emit(sink, record).await,
            Output::Reorder(done) => {
                if done
                    .send(Job {
                        seq,
                        record,
                        permit,
                    })
                    .is_err()
                {
                    error!("Dispatch worker {id} could not hand over result {seq}");
                }
            }
        }
    }
    debug!("Dispatch worker {id} stopped");
}

async fn reorder<R>(
    mut done: mpsc::UnboundedReceiver<Job<R>>,
    sink: mpsc::Sender<R>,
    capacity: usize,
) {
    let mut buffer = ReorderBuffer::new(capacity);

    while let Some(job) = done.recv().await {
        if let Err((record, permit)) = buffer.insert(job.seq, (job.record, job.permit)) {
            error!(
                "Result {} is outside the reorder window, emitting it out of order",
                job.seq
            );
            emit(&sink, record).await;
            drop(permit);
            continue;
        }

        while let Some((record, permit)) = buffer.pop_next() {
            emit(&sink, record).await;
            drop(permit);
        }
    }

    // a result went missing, e.g. its worker panicked
    if !buffer.is_empty() {
        error!(
            "{} results were waiting on a missing predecessor, emitting them in sequence order",
            buffer.len()
        );
        for (record, permit) in buffer.drain() {
            emit(&sink, record).await;
            drop(permit);
        }
    }
    debug!("Reorder task stopped");
}

async fn emit<R>(sink: &mpsc::Sender<R>, record: R) {
    if sink.send(record).await.is_err() {
        error!("Failed to emit enriched record - sink receiver dropped");
    }
}

/// Arena of result slots indexed by `seq % capacity`.
///
/// Holds results for sequence numbers in `[next, next + capacity)` and hands them out only in
/// sequence order. Slots are allocated as sequence numbers reach them, so memory follows the
/// widest gap actually seen rather than the configured capacity.
struct ReorderBuffer<T> {
    slots: Vec<Option<T>>,
    capacity: usize,
    next: u64,
    held: usize,
}

impl<T> ReorderBuffer<T> {
    fn new(capacity: usize) -> Self {
        Self {
            slots: Vec::new(),
            capacity: capacity.max(1),
            next: 0,
            held: 0,
        }
    }

    fn index(&self, seq: u64) -> usize {
        (seq % self.capacity as u64) as usize
    }

    /// Gives the item back if `seq` falls outside the window or its slot is taken.
    fn insert(&mut self, seq: u64, item: T) -> Result<(), T> {
        if seq < self.next || seq - self.next >= self.capacity as u64 {
            return Err(item);
        }
        let index = self.index(seq);
        if index >= self.slots.len() {
            self.slots.resize_with(index + 1, || None);
        }
        if self.slots[index].is_some() {
            return Err(item);
        }
        self.slots[index] = Some(item);
        self.held += 1;
        Ok(())
    }

    /// Takes the item for the lowest outstanding sequence number, if it has arrived.
    fn pop_next(&mut self) -> Option<T> {
        let index = self.index(self.next);
        let item = self.slots.get_mut(index)?.take()?;
        self.next += 1;
        self.held -= 1;
        Some(item)
    }

    /// Empties the buffer, skipping over missing sequence numbers, in sequence order.
    fn drain(&mut self) -> Vec<T> {
        let mut items = Vec::with_capacity(self.held);
        let mut seq = self.next;
        while self.held > 0 {
            let index = self.index(seq);
            if let Some(item) = self.slots.get_mut(index).and_then(Option::take) {
                items.push(item);
                self.held -= 1;
            }
            seq += 1;
        }
        self.next = seq;
        items
    }

    fn len(&self) -> usize {
        self.held
    }

    fn is_empty(&self) -> bool {
        self.held == 0
    }
}
