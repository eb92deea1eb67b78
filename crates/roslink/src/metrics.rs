// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Subscriber counters.
//!
//! All fields use relaxed atomics; consumers only need monotonic
//! snapshots for observability.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated across the connection, supervisor and job threads of
/// one subscriber.
#[derive(Debug, Default)]
pub struct SubscriberMetrics {
    /// Message frames read off the wire (all publishers).
    pub frames_received: AtomicU64,

    /// Frames dropped because the dispatch loop did not accept them
    /// within the delivery budget.
    pub delivery_drops: AtomicU64,

    /// Messages dropped because the shared job queue did not accept the
    /// callback job within the dispatch budget.
    pub dispatch_drops: AtomicU64,

    /// Callback jobs enqueued onto the shared job queue.
    pub jobs_enqueued: AtomicU64,

    /// Messages decoded and delivered to the callback set.
    pub messages_delivered: AtomicU64,

    /// Payloads that failed to decode inside a job.
    pub decode_errors: AtomicU64,

    /// Connections that completed the handshake.
    pub connections_opened: AtomicU64,

    /// Connections torn down (any reason).
    pub connections_closed: AtomicU64,

    /// Handshakes rejected for type or md5sum mismatch.
    pub incompatible_publishers: AtomicU64,
}

/// Point-in-time copy of [`SubscriberMetrics`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub delivery_drops: u64,
    pub dispatch_drops: u64,
    pub jobs_enqueued: u64,
    pub messages_delivered: u64,
    pub decode_errors: u64,
    pub connections_opened: u64,
    pub connections_closed: u64,
    pub incompatible_publishers: u64,
}

impl SubscriberMetrics {
    /// Create a zeroed metrics struct ready for concurrent updates.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Read all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            delivery_drops: self.delivery_drops.load(Ordering::Relaxed),
            dispatch_drops: self.dispatch_drops.load(Ordering::Relaxed),
            jobs_enqueued: self.jobs_enqueued.load(Ordering::Relaxed),
            messages_delivered: self.messages_delivered.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            connections_opened: self.connections_opened.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            incompatible_publishers: self.incompatible_publishers.load(Ordering::Relaxed),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
