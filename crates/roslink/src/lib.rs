// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! # roslink - TCPROS subscriber runtime
//!
//! A client-side subscriber runtime for the ROS 1 publish/subscribe
//! middleware. For a single named topic, roslink maintains a live TCP
//! connection to every currently-advertised publisher, frames each byte
//! stream into discrete messages, and fans the messages from all
//! publishers into a shared callback job queue.
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use roslink::msgs::RosString;
//! use roslink::{Callback, JobRunner, StaticRegistry, Subscriber, SubscriberConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // The node-wide queue user callbacks run on.
//!     let (jobs, consumer) = roslink::jobs::queue(64);
//!     let _runner = JobRunner::spawn(consumer)?;
//!
//!     // Resolves publisher names to TCPROS endpoints. A real node wires
//!     // its master RPC client in here instead.
//!     let registry = Arc::new(StaticRegistry::new());
//!
//!     let subscriber = Subscriber::<RosString>::spawn(
//!         "/chatter",
//!         "/listener",
//!         registry,
//!         jobs,
//!         SubscriberConfig::default(),
//!         Callback::message(|msg: &RosString| println!("heard: {}", msg.data)),
//!     )?;
//!
//!     // Fed by master polling or a pub-update callback.
//!     subscriber.update_publishers(vec!["/talker".to_string()]);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +---------------------------------------------------------------------+
//! |                        Registry (master RPC)                        |
//! |          requestTopic -> host:port | unregisterSubscriber           |
//! +-----------------------------------+---------------------------------+
//!                                     |
//! +-----------------------------------v---------------------------------+
//! |                        Supervisor (per topic)                       |
//! |    reconcile advertised list <-> connection table | dispatch        |
//! +-----------------------------------+---------------------------------+
//!                                     |
//! +-----------------------------------v---------------------------------+
//! |                      Connections (per publisher)                    |
//! |        dial -> header handshake -> frame pump -> teardown           |
//! +-----------------------------------+---------------------------------+
//!                                     |
//! +-----------------------------------v---------------------------------+
//! |                     Job queue (shared, bounded)                     |
//! |              decode once, run callbacks in order                    |
//! +---------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Subscriber`] | One subscribed topic; owns its publisher connections |
//! | [`Callback`] | User callback, message-only or message-plus-event |
//! | [`Message`] | Decodable, md5-fingerprinted message type |
//! | [`RegistryClient`] | Blocking endpoint resolution + unregistration |
//! | [`JobRunner`] | Minimal worker for the shared callback queue |
//! | [`SubscriberConfig`] | Dial, delivery and dispatch budgets |
//!
//! ## Guarantees
//!
//! - Messages from a single publisher reach callbacks in wire order;
//!   there is no ordering across publishers.
//! - Backpressure drops rather than blocks: a slow consumer never stalls
//!   a socket read.
//! - Enable/disable gates delivery only; disabled subscribers keep
//!   draining their sockets.
//! - `shutdown()` is a rendezvous: when it returns, every connection
//!   thread has exited and no further callback runs.
//!
//! Transports are exclusively client-initiated; the subscriber never
//! accepts inbound connections.

/// Subscriber runtime configuration (budgets and channel capacities).
pub mod config;
/// Shared callback job queue and minimal worker.
pub mod jobs;
/// Typed message model: `Message` trait, `MessageEvent`, decode errors.
pub mod message;
/// Runtime counters.
pub mod metrics;
/// Builtin `std_msgs` message types.
pub mod msgs;
/// Graph-resource-name validation and configuration-time errors.
pub mod names;
/// Master-registry client interface.
pub mod registry;
/// Publisher-set supervision and message dispatch.
pub mod subscriber;
/// TCPROS wire protocol: framing and connection headers.
pub mod tcpros;

pub use config::SubscriberConfig;
pub use jobs::{JobQueue, JobRunner};
pub use message::{DecodeError, Message, MessageEvent, TopicSpec};
pub use metrics::{MetricsSnapshot, SubscriberMetrics};
pub use names::SubscriberError;
pub use registry::{RegistryClient, RegistryError, StaticRegistry};
pub use subscriber::{Callback, Subscriber};
