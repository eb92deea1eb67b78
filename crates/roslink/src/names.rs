// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Graph-resource-name validation.
//!
//! The only errors a subscriber surfaces to the constructing caller are
//! configuration-time errors: an invalid topic name or an invalid message
//! type descriptor. Everything downstream (dial failures, handshake
//! rejections, broken streams) is recovered internally.
//!
//! Topic names follow the ROS graph-resource-name rules: first character
//! is a letter, `/` or `~`; the rest are alphanumerics, `_` or `/`.

use std::fmt;

/// Configuration-time subscriber errors.
#[derive(Debug)]
pub enum SubscriberError {
    /// Topic name violates the graph-resource-name rules.
    InvalidTopicName(String),

    /// Message type name is not of the form `package/Type`.
    InvalidTypeName(String),

    /// Message md5sum is not 32 hex digits.
    InvalidMd5Sum(String),

    /// Caller id violates the graph-resource-name rules.
    InvalidCallerId(String),

    /// The supervisor thread could not be spawned.
    Spawn(std::io::Error),
}

impl fmt::Display for SubscriberError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTopicName(name) => write!(f, "invalid topic name: {:?}", name),
            Self::InvalidTypeName(name) => write!(f, "invalid message type name: {:?}", name),
            Self::InvalidMd5Sum(sum) => write!(f, "invalid message md5sum: {:?}", sum),
            Self::InvalidCallerId(id) => write!(f, "invalid caller id: {:?}", id),
            Self::Spawn(e) => write!(f, "failed to spawn subscriber thread: {}", e),
        }
    }
}

impl std::error::Error for SubscriberError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Spawn(e) => Some(e),
            _ => None,
        }
    }
}

/// Check a topic or node name against the graph-resource-name rules.
pub fn is_valid_graph_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '/' || c == '~' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '/')
}

/// Check a message type name of the form `package/Type`.
pub fn is_valid_type_name(name: &str) -> bool {
    let mut parts = name.splitn(2, '/');
    let (Some(package), Some(ty)) = (parts.next(), parts.next()) else {
        return false;
    };
    if ty.contains('/') {
        return false;
    }
    is_identifier(package) && is_identifier(ty)
}

/// Check an md5 fingerprint: exactly 32 hex digits.
pub fn is_valid_md5sum(sum: &str) -> bool {
    sum.len() == 32 && sum.chars().all(|c| c.is_ascii_hexdigit())
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_topic_names() {
        for name in ["/chatter", "chatter", "~private", "/ns/deep/topic", "a1_b"] {
            assert!(is_valid_graph_name(name), "{:?} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_topic_names() {
        for name in ["", "1topic", "/topic with space", "top!c", "-lead", "топик"] {
            assert!(!is_valid_graph_name(name), "{:?} should be invalid", name);
        }
    }

    #[test]
    fn test_valid_type_names() {
        for name in ["std_msgs/String", "geometry_msgs/Twist", "my_pkg/Msg2"] {
            assert!(is_valid_type_name(name), "{:?} should be valid", name);
        }
    }

    #[test]
    fn test_invalid_type_names() {
        for name in ["String", "std_msgs/", "/String", "a/b/c", "1pkg/Msg", ""] {
            assert!(!is_valid_type_name(name), "{:?} should be invalid", name);
        }
    }

    #[test]
    fn test_md5_validation() {
        assert!(is_valid_md5sum("992ce8a1687cec8cc3e3c1e4b3c6d3a0"));
        assert!(is_valid_md5sum("DA5909FBE378AEAF85E547E830CC1BB7"));
        assert!(!is_valid_md5sum("992ce8a1"));
        assert!(!is_valid_md5sum("992ce8a1687cec8cc3e3c1e4b3c6d3a0ff"));
        assert!(!is_valid_md5sum("992ce8a1687cec8cc3e3c1e4b3c6d3ag"));
    }
}
