// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Master-registry client interface.
//!
//! The ROS master tracks which nodes publish and subscribe to which
//! topics. The subscriber runtime consumes exactly two registry
//! operations, both blocking:
//!
//! - `requestTopic(node_id, topic, [["TCPROS"]])` against a publisher's
//!   node API, which negotiates a transport and returns
//!   `[protocol, host, port]`;
//! - `unregisterSubscriber(node_id, topic, node_api_uri)` against the
//!   master, on shutdown.
//!
//! The RPC transport itself is supplied by the embedding node; this
//! module defines the trait the supervisor consumes, the reply
//! validation shared by all implementations, and a static in-process
//! implementation used by tests and demos.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// The only transport protocol this runtime negotiates.
pub const TCPROS_PROTOCOL: &str = "TCPROS";

/// Errors from registry calls.
#[derive(Debug)]
pub enum RegistryError {
    /// The RPC transport failed (connection refused, timeout, ...).
    Transport(String),

    /// The publisher offered a protocol other than TCPROS.
    UnsupportedProtocol(String),

    /// The reply did not have the expected shape.
    MalformedReply(String),

    /// The registry returned an application-level fault.
    Fault {
        /// Fault code from the registry.
        code: i32,
        /// Fault description.
        message: String,
    },

    /// No endpoint is known for the requested publisher.
    UnknownPublisher(String),
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(s) => write!(f, "registry transport error: {}", s),
            Self::UnsupportedProtocol(p) => write!(f, "unsupported transport protocol: {}", p),
            Self::MalformedReply(s) => write!(f, "malformed registry reply: {}", s),
            Self::Fault { code, message } => write!(f, "registry fault {}: {}", code, message),
            Self::UnknownPublisher(p) => write!(f, "unknown publisher: {}", p),
        }
    }
}

impl std::error::Error for RegistryError {}

/// Blocking registry operations the supervisor consumes.
///
/// Implementations wrap the node's XML-RPC client. Both calls may block;
/// the supervisor invokes `request_topic_endpoint` inline during
/// reconciliation (individual failures are non-fatal) and `unregister`
/// from a detached thread so shutdown stays prompt.
pub trait RegistryClient: Send + Sync {
    /// Negotiate a TCPROS endpoint with `publisher`'s node API.
    ///
    /// Returns the endpoint as `host:port`.
    fn request_topic_endpoint(&self, publisher: &str) -> Result<String, RegistryError>;

    /// Tell the master this subscriber is leaving the topic.
    fn unregister(&self) -> Result<(), RegistryError>;
}

/// Validate a `requestTopic` reply tuple and format the endpoint.
///
/// The reply is `[protocol, host, port]`; anything but `TCPROS` is
/// rejected, as are empty hosts and out-of-range ports.
pub fn endpoint_from_protocol_params(
    protocol: &str,
    host: &str,
    port: i32,
) -> Result<String, RegistryError> {
    if protocol != TCPROS_PROTOCOL {
        return Err(RegistryError::UnsupportedProtocol(protocol.to_string()));
    }
    if host.is_empty() {
        return Err(RegistryError::MalformedReply("empty host".to_string()));
    }
    if !(1..=i32::from(u16::MAX)).contains(&port) {
        return Err(RegistryError::MalformedReply(format!(
            "port {} out of range",
            port
        )));
    }
    Ok(format!("{}:{}", host, port))
}

// ============================================================================
// Static registry (tests, demos)
// ============================================================================

/// An in-process registry with a fixed publisher -> endpoint map.
///
/// Used by tests and demos in place of the node's RPC client. Entries can
/// be added and removed while a subscriber is running to simulate
/// publisher churn.
#[derive(Default)]
pub struct StaticRegistry {
    endpoints: RwLock<HashMap<String, String>>,
    unregister_calls: AtomicU64,
}

impl StaticRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `publisher` to `endpoint` (`host:port`).
    pub fn insert(&self, publisher: &str, endpoint: &str) {
        self.endpoints
            .write()
            .insert(publisher.to_string(), endpoint.to_string());
    }

    /// Forget a publisher.
    pub fn remove(&self, publisher: &str) {
        self.endpoints.write().remove(publisher);
    }

    /// How many times `unregister` was called.
    pub fn unregister_calls(&self) -> u64 {
        self.unregister_calls.load(Ordering::Relaxed)
    }
}

impl RegistryClient for StaticRegistry {
    fn request_topic_endpoint(&self, publisher: &str) -> Result<String, RegistryError> {
        self.endpoints
            .read()
            .get(publisher)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPublisher(publisher.to_string()))
    }

    fn unregister(&self) -> Result<(), RegistryError> {
        self.unregister_calls.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
