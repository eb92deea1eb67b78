// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Shared callback job queue.
//!
//! User callbacks never run on a subscriber's control thread. Each
//! received message becomes a job on a bounded, node-wide queue; a worker
//! drains the queue and executes jobs in order. The queue handle is
//! cheaply cloneable so every subscriber in a node can feed the same
//! worker.
//!
//! The worker shipped here is single-threaded, which preserves
//! per-publisher ordering end to end. Embedders with their own executor
//! can consume the [`JobConsumer`] end directly instead of spawning a
//! [`JobRunner`].

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam::channel::{self, Receiver, RecvTimeoutError, SendTimeoutError, Sender};

/// A unit of callback work.
pub type Job = Box<dyn FnOnce() + Send + 'static>;

/// Why a job was not enqueued.
#[derive(Debug, PartialEq, Eq)]
pub enum PostError {
    /// The queue stayed full for the whole budget.
    Timeout,

    /// The consumer is gone.
    Closed,
}

/// Create a bounded job queue.
///
/// Returns the producer handle (clone one per subscriber) and the
/// consumer end (feed it to [`JobRunner::spawn`] or drain it yourself).
pub fn queue(capacity: usize) -> (JobQueue, JobConsumer) {
    let (tx, rx) = channel::bounded(capacity);
    (JobQueue { tx }, JobConsumer { rx })
}

/// Producer half of the job queue.
#[derive(Clone)]
pub struct JobQueue {
    tx: Sender<Job>,
}

impl JobQueue {
    /// Enqueue a job, waiting at most `budget` for queue space.
    pub fn post_timeout(&self, job: Job, budget: Duration) -> Result<(), PostError> {
        match self.tx.send_timeout(job, budget) {
            Ok(()) => Ok(()),
            Err(SendTimeoutError::Timeout(_)) => Err(PostError::Timeout),
            Err(SendTimeoutError::Disconnected(_)) => Err(PostError::Closed),
        }
    }
}

/// Consumer half of the job queue.
pub struct JobConsumer {
    rx: Receiver<Job>,
}

impl JobConsumer {
    /// Wait up to `budget` for the next job.
    pub fn next_timeout(&self, budget: Duration) -> Option<Job> {
        self.rx.recv_timeout(budget).ok()
    }
}

/// Single worker thread draining a [`JobConsumer`].
pub struct JobRunner {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl JobRunner {
    /// Spawn the worker thread.
    pub fn spawn(consumer: JobConsumer) -> io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("roslink-jobs".to_string())
            .spawn(move || {
                log::debug!("[JOBS] worker started");
                while running_clone.load(Ordering::Relaxed) {
                    match consumer.rx.recv_timeout(Duration::from_millis(100)) {
                        Ok(job) => job(),
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => break,
                    }
                }
                log::debug!("[JOBS] worker exited");
            })?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    /// Stop the worker and wait for it to exit. Jobs already dequeued run
    /// to completion; queued jobs are abandoned.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for JobRunner {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Tests
// ============================================================================
