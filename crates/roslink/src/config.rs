// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Subscriber runtime configuration.
//!
//! All budgets favor liveness over completeness: a slow consumer costs
//! dropped messages, never a stalled socket.

use std::time::Duration;

/// Configuration for one subscribed topic.
///
/// # Example
///
/// ```
/// use roslink::SubscriberConfig;
/// use std::time::Duration;
///
/// let config = SubscriberConfig {
///     dial_timeout: Duration::from_secs(1),
///     ..Default::default()
/// };
/// ```
#[derive(Clone, Debug)]
pub struct SubscriberConfig {
    // === Connection ===
    /// Budget for the TCP connect to a publisher.
    pub dial_timeout: Duration,

    /// Optional socket read timeout. When set, a timed-out frame read is
    /// treated as stream desynchronization and closes the connection.
    /// `None` (the default) lets reads block until data or EOF.
    pub read_timeout: Option<Duration>,

    /// Enable TCP_NODELAY on publisher connections.
    pub nodelay: bool,

    // === Backpressure ===
    /// Budget for handing one frame from a connection to the dispatch
    /// loop. On expiry the frame is dropped and reading continues.
    pub delivery_timeout: Duration,

    /// Budget for enqueueing one callback job onto the shared job queue.
    /// On expiry the message is dropped and logged.
    pub dispatch_timeout: Duration,

    // === Channels ===
    /// Capacity of the supervisor control channels (publisher lists,
    /// disconnect notices, callback appends).
    pub control_channel_capacity: usize,
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            dial_timeout: Duration::from_secs(3),
            read_timeout: None,
            nodelay: true,

            delivery_timeout: Duration::from_millis(30),
            dispatch_timeout: Duration::from_secs(3),

            control_channel_capacity: 10,
        }
    }
}
