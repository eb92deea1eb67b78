// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Typed message model.
//!
//! A ROS topic is strongly typed: both ends of a TCPROS connection must
//! agree on the message schema, fingerprinted by an MD5 digest computed
//! from the schema text at generation time. [`Message`] is the contract a
//! generated (or hand-written) message type implements so the subscriber
//! runtime can negotiate the handshake and decode payload frames.
//!
//! [`MessageEvent`] is the per-message metadata handed to two-argument
//! callbacks: who published it, when the frame finished arriving, and the
//! negotiated connection header.

use std::collections::HashMap;
use std::fmt;
use std::time::SystemTime;

/// A decodable ROS message type.
///
/// `type_name` and `md5sum` are schema constants; they are sent in the
/// subscriber's connection header and checked against the publisher's
/// response. `decode` consumes one complete frame payload.
pub trait Message: Sized + Send + 'static {
    /// Fully-qualified type name, e.g. `std_msgs/String`.
    fn type_name() -> &'static str;

    /// MD5 fingerprint of the message schema, 32 lowercase hex digits.
    fn md5sum() -> &'static str;

    /// Decode one serialized message from a frame payload.
    fn decode(payload: &[u8]) -> Result<Self, DecodeError>;
}

/// Metadata delivered alongside a message to two-argument callbacks.
#[derive(Clone, Debug)]
pub struct MessageEvent {
    /// Caller id of the publishing node, from its connection header.
    pub publisher_name: String,

    /// Instant the message frame was fully read off the wire.
    pub receipt_time: SystemTime,

    /// The publisher's negotiated connection header.
    pub connection_header: HashMap<String, String>,
}

/// Errors produced while decoding a message payload.
#[derive(Debug)]
pub enum DecodeError {
    /// The payload ended before the declared field data.
    Truncated {
        /// Bytes the decoder needed.
        expected: usize,
        /// Bytes actually present.
        actual: usize,
    },

    /// A string field was not valid UTF-8.
    InvalidUtf8(std::str::Utf8Error),

    /// Bytes were left over after the last field.
    TrailingBytes(usize),
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated { expected, actual } => {
                write!(f, "payload truncated: need {} bytes, have {}", expected, actual)
            }
            Self::InvalidUtf8(e) => write!(f, "string field is not valid UTF-8: {}", e),
            Self::TrailingBytes(n) => write!(f, "{} trailing bytes after message", n),
        }
    }
}

impl std::error::Error for DecodeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidUtf8(e) => Some(e),
            _ => None,
        }
    }
}

/// Topic identity: name plus the message-type descriptor. Immutable after
/// construction; validated by [`crate::names`].
#[derive(Clone, Debug)]
pub struct TopicSpec {
    /// Topic name, e.g. `/chatter`.
    pub topic: String,

    /// Message type name, e.g. `std_msgs/String`.
    pub type_name: String,

    /// Message schema fingerprint.
    pub md5sum: String,
}

impl TopicSpec {
    /// Build the spec for message type `M` on `topic`.
    pub fn of<M: Message>(topic: &str) -> Self {
        Self {
            topic: topic.to_string(),
            type_name: M::type_name().to_string(),
            md5sum: M::md5sum().to_string(),
        }
    }
}
