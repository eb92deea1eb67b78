// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! TCPROS wire protocol: framing and connection headers.
//!
//! TCPROS is the TCP transport of the ROS 1 middleware. A connection
//! carries one handshake frame (the connection header) followed by an
//! unbounded sequence of message frames. Every frame is length-prefixed:
//!
//! ```text
//! +----------------+-------------------+
//! | Length (4B LE) | Payload           |
//! +----------------+-------------------+
//! ```
//!
//! The connection-header payload is itself a sequence of length-prefixed
//! `key=value` entries:
//!
//! ```text
//! +----------------+-----------+----------------+-----------+----
//! | Length (4B LE) | key=value | Length (4B LE) | key=value | ...
//! +----------------+-----------+----------------+-----------+----
//! ```
//!
//! There is no escaping; the first `=` in an entry separates key from
//! value, so `=` is legal inside values.
//!
//! # Desync detection
//!
//! TCP gives no way to re-find a frame boundary once the stream is
//! misaligned. A length prefix of 256 MB or more is taken as evidence of
//! desynchronization rather than as a real message size; the reader
//! reports [`FrameOutcome::OutOfSync`] without consuming payload bytes.

pub mod frame;
pub mod header;

pub use frame::{read_frame, write_frame, FrameOutcome};
pub use header::{decode_header, encode_header, HeaderError};

/// Size of the length prefix on every TCPROS frame.
pub const FRAME_HEADER_SIZE: usize = 4;

/// Length prefixes at or above this value are treated as stream
/// desynchronization. A legitimate ROS message never reaches this size in
/// practice.
pub const MAX_REASONABLE_FRAME: usize = 256_000_000;

/// Header keys the subscriber sends in its half of the handshake.
pub const SUBSCRIBER_HEADER_KEYS: [&str; 4] = ["topic", "md5sum", "type", "callerid"];
