// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! In-process TCPROS publisher for end-to-end tests.
//!
//! Accepts subscriber connections on a loopback listener, answers the
//! connection-header handshake (normally by echoing the subscriber's
//! `topic`/`md5sum`/`type` back), then runs a configurable behavior.

// Each test binary uses a different subset of the helpers.
#![allow(dead_code)]

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::Receiver;

use roslink::tcpros::{decode_header, encode_header, read_frame, write_frame, FrameOutcome};

/// What a mock publisher does with each accepted subscriber.
#[derive(Clone)]
pub enum PubBehavior {
    /// Handshake, send these payloads, close the connection.
    SendThenClose(Vec<Vec<u8>>),

    /// Handshake, send these payloads, hold the connection open until the
    /// publisher is stopped or the subscriber hangs up.
    SendThenHold(Vec<Vec<u8>>),

    /// Answer the handshake with a wrong md5sum, then send one frame that
    /// must never be delivered.
    WrongMd5,

    /// Handshake, then emit a length prefix far beyond the sanity bound.
    Desync,

    /// Handshake, then forward every payload received on the channel.
    Streamed(Receiver<Vec<u8>>),
}

pub struct MockPublisher {
    name: String,
    endpoint: String,
    stop: Arc<AtomicBool>,
    live: Arc<AtomicUsize>,
    accepted: Arc<AtomicUsize>,
    thread: Option<JoinHandle<()>>,
}

impl MockPublisher {
    pub fn spawn(name: &str, behavior: PubBehavior) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.set_nonblocking(true).unwrap();
        let endpoint = format!("127.0.0.1:{}", listener.local_addr().unwrap().port());

        let stop = Arc::new(AtomicBool::new(false));
        let live = Arc::new(AtomicUsize::new(0));
        let accepted = Arc::new(AtomicUsize::new(0));

        let caller_id = name.to_string();
        let stop_accept = Arc::clone(&stop);
        let live_accept = Arc::clone(&live);
        let accepted_accept = Arc::clone(&accepted);

        let thread = thread::spawn(move || {
            let mut handlers = Vec::new();
            while !stop_accept.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        accepted_accept.fetch_add(1, Ordering::Relaxed);
                        let behavior = behavior.clone();
                        let caller_id = caller_id.clone();
                        let stop = Arc::clone(&stop_accept);
                        let live = Arc::clone(&live_accept);
                        handlers.push(thread::spawn(move || {
                            serve(stream, &caller_id, &behavior, &stop, &live);
                        }));
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
            for handler in handlers {
                let _ = handler.join();
            }
        });

        Self {
            name: name.to_string(),
            endpoint,
            stop,
            live,
            accepted,
            thread: Some(thread),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Subscriber connections that completed the handshake and are still
    /// attached.
    pub fn live_connections(&self) -> usize {
        self.live.load(Ordering::Relaxed)
    }

    /// Total connections ever accepted.
    pub fn accepted(&self) -> usize {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

impl Drop for MockPublisher {
    fn drop(&mut self) {
        self.stop();
    }
}

fn serve(
    mut stream: TcpStream,
    caller_id: &str,
    behavior: &PubBehavior,
    stop: &AtomicBool,
    live: &AtomicUsize,
) {
    stream.set_nonblocking(false).unwrap();

    let request = match read_frame(&mut stream) {
        FrameOutcome::Frame(payload) => match decode_header(&payload) {
            Ok(header) => header,
            Err(_) => return,
        },
        _ => return,
    };

    let md5 = match behavior {
        PubBehavior::WrongMd5 => "deadbeefdeadbeefdeadbeefdeadbeef".to_string(),
        _ => request.get("md5sum").cloned().unwrap_or_default(),
    };
    let response = vec![
        ("topic".to_string(), request.get("topic").cloned().unwrap_or_default()),
        ("md5sum".to_string(), md5),
        ("type".to_string(), request.get("type").cloned().unwrap_or_default()),
        ("callerid".to_string(), caller_id.to_string()),
    ];
    if stream.write_all(&encode_header(&response)).is_err() {
        return;
    }

    live.fetch_add(1, Ordering::Relaxed);
    run_behavior(&mut stream, behavior, stop);
    live.fetch_sub(1, Ordering::Relaxed);
}

fn run_behavior(stream: &mut TcpStream, behavior: &PubBehavior, stop: &AtomicBool) {
    match behavior {
        PubBehavior::SendThenClose(payloads) => {
            for payload in payloads {
                if write_frame(stream, payload).is_err() {
                    return;
                }
            }
        }
        PubBehavior::SendThenHold(payloads) => {
            for payload in payloads {
                if write_frame(stream, payload).is_err() {
                    return;
                }
            }
            hold_until_closed(stream, stop);
        }
        PubBehavior::WrongMd5 => {
            let _ = write_frame(stream, b"never delivered");
        }
        PubBehavior::Desync => {
            let _ = stream.write_all(&0x7FFF_FFFFu32.to_le_bytes());
            let _ = stream.write_all(b"junk");
            hold_until_closed(stream, stop);
        }
        PubBehavior::Streamed(frames) => {
            while !stop.load(Ordering::Relaxed) {
                match frames.recv_timeout(Duration::from_millis(20)) {
                    Ok(payload) => {
                        if write_frame(stream, &payload).is_err() {
                            return;
                        }
                    }
                    Err(crossbeam::channel::RecvTimeoutError::Timeout) => {}
                    Err(crossbeam::channel::RecvTimeoutError::Disconnected) => {
                        hold_until_closed(stream, stop);
                        return;
                    }
                }
            }
        }
    }
}

/// Park on the socket until the peer hangs up or the publisher stops.
fn hold_until_closed(stream: &mut TcpStream, stop: &AtomicBool) {
    let _ = stream.set_read_timeout(Some(Duration::from_millis(20)));
    let mut buf = [0u8; 16];
    while !stop.load(Ordering::Relaxed) {
        match stream.read(&mut buf) {
            Ok(0) => return,
            Ok(_) => {}
            Err(e)
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(_) => return,
        }
    }
}
