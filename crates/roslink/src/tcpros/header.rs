// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! TCPROS connection-header codec.
//!
//! The connection header is exchanged once per TCP connection, before any
//! message frames. Its payload is a concatenation of length-prefixed
//! `key=value` entries (see the module docs of [`crate::tcpros`] for the
//! wire layout). [`encode_header`] produces the full block including the
//! outer length prefix; [`decode_header`] takes the payload of an
//! already-deframed header (everything after the outer length).

use std::collections::HashMap;
use std::fmt;

/// Errors produced while decoding a connection header.
#[derive(Debug)]
pub enum HeaderError {
    /// An entry length overran the end of the block.
    Truncated {
        /// Declared entry length.
        declared: usize,
        /// Bytes remaining in the block.
        remaining: usize,
    },

    /// An entry contained no `=` separator.
    MissingSeparator(String),

    /// An entry was not valid UTF-8.
    InvalidUtf8,
}

impl fmt::Display for HeaderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Truncated {
                declared,
                remaining,
            } => write!(
                f,
                "header entry declares {} bytes but only {} remain",
                declared, remaining
            ),
            Self::MissingSeparator(entry) => {
                write!(f, "header entry without '=' separator: {:?}", entry)
            }
            Self::InvalidUtf8 => write!(f, "header entry is not valid UTF-8"),
        }
    }
}

impl std::error::Error for HeaderError {}

/// Encode a connection header, outer length prefix included.
///
/// Entry order is preserved; a duplicate key is emitted twice (the peer's
/// decoder keeps the last occurrence).
pub fn encode_header(fields: &[(String, String)]) -> Vec<u8> {
    let body_len: usize = fields
        .iter()
        .map(|(k, v)| 4 + k.len() + 1 + v.len())
        .sum();

    let mut buf = Vec::with_capacity(4 + body_len);
    buf.extend_from_slice(&(body_len as u32).to_le_bytes());
    for (key, value) in fields {
        let entry_len = (key.len() + 1 + value.len()) as u32;
        buf.extend_from_slice(&entry_len.to_le_bytes());
        buf.extend_from_slice(key.as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(value.as_bytes());
    }
    buf
}

/// Decode a connection-header payload into a key/value map.
///
/// Parses until the block is exhausted. Duplicate keys: last wins. The
/// first `=` separates key from value, so values may contain `=`.
pub fn decode_header(payload: &[u8]) -> Result<HashMap<String, String>, HeaderError> {
    let mut fields = HashMap::new();
    let mut pos = 0;

    while pos < payload.len() {
        let remaining = payload.len() - pos;
        if remaining < 4 {
            return Err(HeaderError::Truncated {
                declared: 4,
                remaining,
            });
        }
        let len = u32::from_le_bytes([
            payload[pos],
            payload[pos + 1],
            payload[pos + 2],
            payload[pos + 3],
        ]) as usize;
        pos += 4;

        if len > payload.len() - pos {
            return Err(HeaderError::Truncated {
                declared: len,
                remaining: payload.len() - pos,
            });
        }

        let entry =
            std::str::from_utf8(&payload[pos..pos + len]).map_err(|_| HeaderError::InvalidUtf8)?;
        pos += len;

        let eq = entry
            .find('=')
            .ok_or_else(|| HeaderError::MissingSeparator(entry.to_string()))?;
        fields.insert(entry[..eq].to_string(), entry[eq + 1..].to_string());
    }

    Ok(fields)
}

// ============================================================================
// Tests
// ============================================================================
