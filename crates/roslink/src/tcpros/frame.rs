// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Blocking length-prefix frame reader/writer for TCPROS streams.
//!
//! Unlike a poll-driven codec, this reader is meant to be parked on a
//! dedicated connection thread: it blocks until a full frame arrives and
//! classifies every way the read can end instead of surfacing raw
//! `io::Error`s. The classification drives the connection state machine
//! directly (see `subscriber::subscription`).

use std::io::{self, Read, Write};

use super::MAX_REASONABLE_FRAME;

/// Result of one frame read.
#[derive(Debug)]
pub enum FrameOutcome {
    /// A complete frame; the buffer is freshly allocated and may be
    /// retained by the consumer.
    Frame(Vec<u8>),

    /// The transport reported a read timeout.
    Timeout,

    /// Clean end-of-stream at a frame boundary.
    RemoteClosed,

    /// The length prefix failed the size sanity check; the stream is
    /// assumed desynchronized. No payload bytes were consumed.
    OutOfSync,

    /// Any other read failure, including EOF in the middle of a frame.
    Failed(io::Error),
}

impl FrameOutcome {
    /// Whether this outcome carries a complete frame.
    pub fn is_frame(&self) -> bool {
        matches!(self, FrameOutcome::Frame(_))
    }
}

fn is_timeout(err: &io::Error) -> bool {
    // Read timeouts surface as WouldBlock or TimedOut depending on platform.
    matches!(
        err.kind(),
        io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut
    )
}

/// Read one TCPROS frame: a `u32` little-endian length followed by that
/// many payload bytes.
///
/// Classification:
/// - clean EOF before the first length byte -> [`FrameOutcome::RemoteClosed`]
/// - EOF anywhere else -> [`FrameOutcome::Failed`]
/// - length >= [`MAX_REASONABLE_FRAME`] -> [`FrameOutcome::OutOfSync`]
/// - transport timeout -> [`FrameOutcome::Timeout`]
pub fn read_frame<R: Read + ?Sized>(stream: &mut R) -> FrameOutcome {
    let mut len_buf = [0u8; 4];
    let mut filled = 0;

    while filled < len_buf.len() {
        match stream.read(&mut len_buf[filled..]) {
            Ok(0) => {
                if filled == 0 {
                    return FrameOutcome::RemoteClosed;
                }
                return FrameOutcome::Failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside frame length",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) => return FrameOutcome::Timeout,
            Err(e) => return FrameOutcome::Failed(e),
        }
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len >= MAX_REASONABLE_FRAME {
        return FrameOutcome::OutOfSync;
    }

    // Fresh allocation per frame: the payload is handed downstream and may
    // outlive this connection.
    let mut payload = vec![0u8; len];
    let mut filled = 0;

    while filled < len {
        match stream.read(&mut payload[filled..]) {
            Ok(0) => {
                return FrameOutcome::Failed(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    "stream closed inside frame payload",
                ));
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) if is_timeout(&e) => return FrameOutcome::Timeout,
            Err(e) => return FrameOutcome::Failed(e),
        }
    }

    FrameOutcome::Frame(payload)
}

/// Write one TCPROS frame.
pub fn write_frame<W: Write + ?Sized>(stream: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "frame payload exceeds u32"))?;
    stream.write_all(&len.to_le_bytes())?;
    stream.write_all(payload)?;
    stream.flush()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn framed(payload: &[u8]) -> Vec<u8> {
        let mut buf = Vec::new();
        write_frame(&mut buf, payload).unwrap();
        buf
    }

    #[test]
    fn test_roundtrip_simple() {
        let buf = framed(b"hello");
        assert_eq!(&buf[..4], &5u32.to_le_bytes());

        let mut cursor = Cursor::new(buf);
        match read_frame(&mut cursor) {
            FrameOutcome::Frame(p) => assert_eq!(p, b"hello"),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_roundtrip_empty_payload() {
        let mut cursor = Cursor::new(framed(b""));
        match read_frame(&mut cursor) {
            FrameOutcome::Frame(p) => assert!(p.is_empty()),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_multiple_frames_in_order() {
        let mut buf = Vec::new();
        write_frame(&mut buf, b"first").unwrap();
        write_frame(&mut buf, b"second").unwrap();
        write_frame(&mut buf, b"third").unwrap();

        let mut cursor = Cursor::new(buf);
        for expected in [&b"first"[..], b"second", b"third"] {
            match read_frame(&mut cursor) {
                FrameOutcome::Frame(p) => assert_eq!(p, expected),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
    }

    #[test]
    fn test_clean_eof_is_remote_closed() {
        let mut cursor = Cursor::new(Vec::new());
        assert!(matches!(
            read_frame(&mut cursor),
            FrameOutcome::RemoteClosed
        ));
    }

    #[test]
    fn test_eof_inside_length_is_failure() {
        let mut cursor = Cursor::new(vec![0x05, 0x00]);
        match read_frame(&mut cursor) {
            FrameOutcome::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_eof_inside_payload_is_failure() {
        let buf = framed(b"hello, world");
        let mut cursor = Cursor::new(buf[..8].to_vec());
        match read_frame(&mut cursor) {
            FrameOutcome::Failed(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[test]
    fn test_oversized_length_is_out_of_sync() {
        // 0x7FFFFFFF is far above the sanity bound.
        let mut buf = 0x7FFF_FFFFu32.to_le_bytes().to_vec();
        buf.extend_from_slice(b"garbage");
        let mut cursor = Cursor::new(buf);
        assert!(matches!(read_frame(&mut cursor), FrameOutcome::OutOfSync));
    }

    #[test]
    fn test_sanity_bound_rejected_inclusive() {
        let bound = MAX_REASONABLE_FRAME as u32;
        let mut cursor = Cursor::new(bound.to_le_bytes().to_vec());
        assert!(matches!(read_frame(&mut cursor), FrameOutcome::OutOfSync));
    }

    #[test]
    fn test_plausible_length_with_missing_payload_fails() {
        // A length below the bound is a real length; the short read that
        // follows is a failure, not desync.
        let mut cursor = Cursor::new(1000u32.to_le_bytes().to_vec());
        assert!(matches!(read_frame(&mut cursor), FrameOutcome::Failed(_)));
    }

    #[test]
    fn test_timeout_classification() {
        struct TimesOut;
        impl Read for TimesOut {
            fn read(&mut self, _buf: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::WouldBlock, "timed out"))
            }
        }
        assert!(matches!(read_frame(&mut TimesOut), FrameOutcome::Timeout));
    }

    #[test]
    fn test_random_payload_roundtrip() {
        // Deterministic xorshift so the test is reproducible.
        let mut state = 0x9e37_79b9_7f4a_7c15u64;
        let mut next = move || {
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            state
        };

        let mut buf = Vec::new();
        let mut payloads = Vec::new();
        for _ in 0..32 {
            let len = (next() % 4096) as usize;
            let payload: Vec<u8> = (0..len).map(|_| (next() & 0xFF) as u8).collect();
            write_frame(&mut buf, &payload).unwrap();
            payloads.push(payload);
        }

        let mut cursor = Cursor::new(buf);
        for expected in &payloads {
            match read_frame(&mut cursor) {
                FrameOutcome::Frame(p) => assert_eq!(&p, expected),
                other => panic!("unexpected outcome: {:?}", other),
            }
        }
        assert!(matches!(
            read_frame(&mut cursor),
            FrameOutcome::RemoteClosed
        ));
    }
}
