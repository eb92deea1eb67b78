// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Builtin message types.
//!
//! Hand-written implementations of a few `std_msgs` types plus an
//! opaque passthrough, enough for demos, bridges and tests without
//! pulling in the message code generator. Generated message crates
//! implement [`Message`] the same way.
//!
//! ROS serialization is little-endian; strings are a `u32` byte length
//! followed by UTF-8 data with no terminator.

use crate::message::{DecodeError, Message};

fn read_u32(payload: &[u8], at: usize) -> Result<u32, DecodeError> {
    let end = at + 4;
    if payload.len() < end {
        return Err(DecodeError::Truncated {
            expected: end,
            actual: payload.len(),
        });
    }
    Ok(u32::from_le_bytes([
        payload[at],
        payload[at + 1],
        payload[at + 2],
        payload[at + 3],
    ]))
}

/// `std_msgs/String`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RosString {
    pub data: String,
}

impl Message for RosString {
    fn type_name() -> &'static str {
        "std_msgs/String"
    }

    fn md5sum() -> &'static str {
        "992ce8a1687cec8cc3e3c1e4b3c6d3a0"
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let len = read_u32(payload, 0)? as usize;
        let end = 4 + len;
        if payload.len() < end {
            return Err(DecodeError::Truncated {
                expected: end,
                actual: payload.len(),
            });
        }
        if payload.len() > end {
            return Err(DecodeError::TrailingBytes(payload.len() - end));
        }
        let data = std::str::from_utf8(&payload[4..end])
            .map_err(DecodeError::InvalidUtf8)?
            .to_string();
        Ok(Self { data })
    }
}

impl RosString {
    /// Serialize to the wire form. The publisher side lives elsewhere;
    /// this is used by tests and bridging tools.
    pub fn encode(&self) -> Vec<u8> {
        let bytes = self.data.as_bytes();
        let mut buf = Vec::with_capacity(4 + bytes.len());
        buf.extend_from_slice(&(bytes.len() as u32).to_le_bytes());
        buf.extend_from_slice(bytes);
        buf
    }
}

impl From<&str> for RosString {
    fn from(s: &str) -> Self {
        Self {
            data: s.to_string(),
        }
    }
}

/// `std_msgs/Int32`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RosInt32 {
    pub data: i32,
}

impl Message for RosInt32 {
    fn type_name() -> &'static str {
        "std_msgs/Int32"
    }

    fn md5sum() -> &'static str {
        "da5909fbe378aeaf85e547e830cc1bb7"
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        let raw = read_u32(payload, 0)?;
        if payload.len() > 4 {
            return Err(DecodeError::TrailingBytes(payload.len() - 4));
        }
        Ok(Self { data: raw as i32 })
    }
}

impl RosInt32 {
    pub fn encode(&self) -> Vec<u8> {
        self.data.to_le_bytes().to_vec()
    }
}

/// Opaque payload passthrough for recording and bridging tools.
///
/// Carries the frame payload verbatim with no field interpretation.
/// The handshake still requires both ends to agree on type name and
/// fingerprint, so peers must present this exact descriptor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawBytes {
    pub data: Vec<u8>,
}

impl Message for RawBytes {
    fn type_name() -> &'static str {
        "roslink/RawBytes"
    }

    fn md5sum() -> &'static str {
        "6f8c1f2d9e3b4a5c8d7e6f5a4b3c2d1e"
    }

    fn decode(payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            data: payload.to_vec(),
        })
    }
}

impl RawBytes {
    pub fn encode(&self) -> Vec<u8> {
        self.data.clone()
    }
}

impl From<&[u8]> for RawBytes {
    fn from(data: &[u8]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_roundtrip() {
        let msg = RosString::from("hello world");
        let decoded = RosString::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_string_empty() {
        let decoded = RosString::decode(&0u32.to_le_bytes()).unwrap();
        assert_eq!(decoded.data, "");
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = RosString::from("hello").encode();
        buf.truncate(6);
        assert!(matches!(
            RosString::decode(&buf),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_string_trailing_bytes() {
        let mut buf = RosString::from("hi").encode();
        buf.push(0);
        assert!(matches!(
            RosString::decode(&buf),
            Err(DecodeError::TrailingBytes(1))
        ));
    }

    #[test]
    fn test_string_invalid_utf8() {
        let mut buf = 2u32.to_le_bytes().to_vec();
        buf.extend_from_slice(&[0xC3, 0x28]);
        assert!(matches!(
            RosString::decode(&buf),
            Err(DecodeError::InvalidUtf8(_))
        ));
    }

    #[test]
    fn test_int32_roundtrip() {
        for value in [0, 1, -1, i32::MAX, i32::MIN] {
            let msg = RosInt32 { data: value };
            assert_eq!(RosInt32::decode(&msg.encode()).unwrap(), msg);
        }
    }

    #[test]
    fn test_int32_short_payload() {
        assert!(matches!(
            RosInt32::decode(&[1, 2]),
            Err(DecodeError::Truncated { .. })
        ));
    }

    #[test]
    fn test_raw_bytes_roundtrip() {
        let msg = RawBytes::from(&[0x00, 0xFF, 0x7F, 0x80, 0x01][..]);
        let decoded = RawBytes::decode(&msg.encode()).unwrap();
        assert_eq!(decoded, msg);
    }

    #[test]
    fn test_raw_bytes_empty() {
        let decoded = RawBytes::decode(&[]).unwrap();
        assert!(decoded.data.is_empty());
    }

    #[test]
    fn test_raw_bytes_no_interpretation() {
        // A payload that would be invalid for any structured type passes
        // through untouched.
        let bogus = 0xFFFF_FFFFu32.to_le_bytes();
        let decoded = RawBytes::decode(&bogus).unwrap();
        assert_eq!(decoded.data, bogus);
    }
}
