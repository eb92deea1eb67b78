// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! One live attachment to one publisher.
//!
//! A subscription dials the publisher's TCPROS endpoint, exchanges
//! connection headers, then pumps message frames into the supervisor's
//! dispatch channel until the stream ends or a stop is requested.
//!
//! # State Machine
//!
//! ```text
//!      +----------+
//!      | Dialing  |--(error/timeout/stop)--+
//!      +----+-----+                        |
//!           | connected                    |
//!           v                              |
//!      +------------+                      |
//!      |Handshaking |--(reject/stop)-------+
//!      +----+-------+                      |
//!           | headers verified             v
//!           v                         +--------+
//!      +----------+                   | Closed |
//!      |  Ready   |--(read ends)----->+--------+
//!      +----------+
//! ```
//!
//! `Closed` is terminal. Blocking I/O runs on this connection's own
//! thread (plus a short-lived dial thread), so cancellation works by
//! setting the stop flag and shutting down the socket: any read in
//! flight returns immediately.
//!
//! Only terminal read results reached from `Ready` notify the
//! supervisor's disconnect channel. Dial and handshake failures exit
//! silently; the publisher stays in the advertised list and the next
//! list update is the retry mechanism.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant, SystemTime};

use crossbeam::channel::{self, RecvTimeoutError, SendTimeoutError, Sender};
use parking_lot::Mutex;

use crate::config::SubscriberConfig;
use crate::message::{MessageEvent, TopicSpec};
use crate::metrics::SubscriberMetrics;
use crate::tcpros::{decode_header, encode_header, read_frame, FrameOutcome};

/// Extra slack on top of the dial budget to cover name resolution.
const DIAL_GRACE: Duration = Duration::from_millis(500);

/// How often the dial wait loop rechecks the stop flag.
const DIAL_POLL_INTERVAL: Duration = Duration::from_millis(25);

// ============================================================================
// Close classification
// ============================================================================

/// Why a subscription ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CloseReason {
    /// Cancelled from outside; never notifies the supervisor.
    StopRequested,

    /// TCP connect failed.
    DialFailed,

    /// TCP connect exceeded the dial budget.
    DialTimeout,

    /// Header write or read failed during the handshake.
    HeaderIoFailed,

    /// The publisher's header block did not parse.
    MalformedHeader,

    /// The publisher's `type`/`md5sum` did not match ours.
    IncompatibleType,

    /// Frame read timed out or the length prefix failed the size sanity
    /// check; the stream is assumed desynchronized.
    Resync,

    /// Clean end-of-stream: the publisher went away.
    PeerGone,

    /// Any other read failure.
    Fatal,
}

impl CloseReason {
    /// Whether the supervisor should be told this endpoint disconnected.
    ///
    /// Only terminal read results from an established connection notify;
    /// setup failures leave the publisher listed for the next reconcile.
    pub(crate) fn notifies_disconnect(self) -> bool {
        matches!(self, Self::Resync | Self::PeerGone | Self::Fatal)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::StopRequested => "stop requested",
            Self::DialFailed => "dial failed",
            Self::DialTimeout => "dial timeout",
            Self::HeaderIoFailed => "header I/O failed",
            Self::MalformedHeader => "malformed header",
            Self::IncompatibleType => "incompatible type",
            Self::Resync => "stream out of sync",
            Self::PeerGone => "publisher disconnected",
            Self::Fatal => "read failure",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// Events toward the supervisor
// ============================================================================

/// A message frame plus its receipt metadata, handed to the supervisor.
pub(crate) struct FrameEvent {
    pub(crate) payload: Vec<u8>,
    pub(crate) event: MessageEvent,
}

/// Notification that an endpoint's subscription ended on its own.
#[derive(Debug)]
pub(crate) struct Disconnect {
    pub(crate) endpoint: String,
    pub(crate) reason: CloseReason,
}

// ============================================================================
// Handle
// ============================================================================

/// Supervisor-side handle for one subscription.
pub(crate) struct SubscriptionHandle {
    stop: Arc<AtomicBool>,
    cancel_slot: Arc<Mutex<Option<TcpStream>>>,
    thread: Option<JoinHandle<()>>,
}

impl SubscriptionHandle {
    /// Request the subscription to exit from whatever state it is in.
    ///
    /// Sets the stop flag first, then shuts down the socket so a blocking
    /// read returns immediately. Idempotent.
    pub(crate) fn cancel(&self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(stream) = self.cancel_slot.lock().take() {
            let _ = stream.shutdown(std::net::Shutdown::Both);
        }
    }

    /// Whether the worker thread has exited.
    pub(crate) fn is_finished(&self) -> bool {
        self.thread.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for the worker thread to exit.
    pub(crate) fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

// ============================================================================
// Subscription worker
// ============================================================================

/// Everything a subscription worker needs, supplied by the supervisor.
pub(crate) struct SubscriptionContext {
    pub(crate) endpoint: String,
    pub(crate) spec: TopicSpec,
    pub(crate) caller_id: String,
    pub(crate) config: SubscriberConfig,
    pub(crate) msg_tx: Sender<FrameEvent>,
    pub(crate) disconnect_tx: Sender<Disconnect>,
    pub(crate) delivery_enabled: Arc<AtomicBool>,
    pub(crate) metrics: Arc<SubscriberMetrics>,
}

/// Spawn the worker thread for one publisher endpoint.
pub(crate) fn spawn(ctx: SubscriptionContext) -> io::Result<SubscriptionHandle> {
    let stop = Arc::new(AtomicBool::new(false));
    let cancel_slot = Arc::new(Mutex::new(None));

    let worker = Subscription {
        ctx,
        stop: Arc::clone(&stop),
        cancel_slot: Arc::clone(&cancel_slot),
    };
    let thread = std::thread::Builder::new()
        .name("roslink-conn".to_string())
        .spawn(move || worker.run())?;

    Ok(SubscriptionHandle {
        stop,
        cancel_slot,
        thread: Some(thread),
    })
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum SubscriptionState {
    Dialing,
    Handshaking,
    Ready,
    Closed,
}

struct Subscription {
    ctx: SubscriptionContext,
    stop: Arc<AtomicBool>,
    cancel_slot: Arc<Mutex<Option<TcpStream>>>,
}

impl Subscription {
    fn run(self) {
        log::debug!(
            "[CONN] {}: subscription to {} started",
            self.ctx.spec.topic,
            self.ctx.endpoint
        );

        let reason = self.run_to_close();

        // Drop our duplicate socket handle; the worker-owned stream is
        // already gone by now on every path.
        *self.cancel_slot.lock() = None;

        if reason.notifies_disconnect() {
            let _ = self.ctx.disconnect_tx.send(Disconnect {
                endpoint: self.ctx.endpoint.clone(),
                reason,
            });
        }

        log::debug!(
            "[CONN] {}: subscription to {} closed ({})",
            self.ctx.spec.topic,
            self.ctx.endpoint,
            reason
        );
    }

    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    fn enter(&self, state: SubscriptionState) {
        log::debug!(
            "[CONN] {}: {} -> {:?}",
            self.ctx.spec.topic,
            self.ctx.endpoint,
            state
        );
    }

    fn run_to_close(&self) -> CloseReason {
        self.enter(SubscriptionState::Dialing);
        let mut stream = match self.dial() {
            Ok(stream) => stream,
            Err(reason) => return self.closed(reason),
        };

        if self.ctx.config.nodelay {
            let _ = stream.set_nodelay(true);
        }
        let _ = stream.set_read_timeout(self.ctx.config.read_timeout);

        // Publish a duplicate handle so cancel() can shut the socket down
        // underneath any blocking read.
        match stream.try_clone() {
            Ok(clone) => *self.cancel_slot.lock() = Some(clone),
            Err(e) => {
                log::error!(
                    "[CONN] {}: could not clone stream for {}: {}",
                    self.ctx.spec.topic,
                    self.ctx.endpoint,
                    e
                );
                return self.closed(CloseReason::Fatal);
            }
        }
        if self.stopped() {
            return self.closed(CloseReason::StopRequested);
        }

        self.enter(SubscriptionState::Handshaking);
        let header = match self.handshake(&mut stream) {
            Ok(header) => header,
            Err(reason) => return self.closed(reason),
        };
        if self.stopped() {
            return self.closed(CloseReason::StopRequested);
        }

        self.enter(SubscriptionState::Ready);
        SubscriberMetrics::incr(&self.ctx.metrics.connections_opened);

        let template = MessageEvent {
            publisher_name: header.get("callerid").cloned().unwrap_or_default(),
            receipt_time: SystemTime::UNIX_EPOCH,
            connection_header: header,
        };

        let reason = self.read_loop(&mut stream, &template);
        SubscriberMetrics::incr(&self.ctx.metrics.connections_closed);
        self.closed(reason)
    }

    fn closed(&self, reason: CloseReason) -> CloseReason {
        self.enter(SubscriptionState::Closed);
        reason
    }

    // ========================================================================
    // Dialing
    // ========================================================================

    /// Connect within the dial budget, staying responsive to stop.
    ///
    /// The blocking connect runs on a short-lived child thread; its
    /// lifetime is bounded by `connect_timeout`, so waiting for it after
    /// a stop keeps teardown within the dial budget and leaks neither the
    /// thread nor a just-established socket.
    fn dial(&self) -> Result<TcpStream, CloseReason> {
        let (tx, rx) = channel::bounded::<io::Result<TcpStream>>(1);
        let endpoint = self.ctx.endpoint.clone();
        let budget = self.ctx.config.dial_timeout;

        let spawned = std::thread::Builder::new()
            .name("roslink-dial".to_string())
            .spawn(move || {
                let _ = tx.send(dial_blocking(&endpoint, budget));
            });
        if let Err(e) = spawned {
            log::error!(
                "[CONN] {}: could not spawn dial thread: {}",
                self.ctx.spec.topic,
                e
            );
            return Err(CloseReason::DialFailed);
        }

        let deadline = Instant::now() + budget + DIAL_GRACE;
        loop {
            if self.stopped() {
                if let Ok(Ok(stream)) = rx.recv_timeout(budget + DIAL_GRACE) {
                    drop(stream);
                }
                return Err(CloseReason::StopRequested);
            }

            match rx.recv_timeout(DIAL_POLL_INTERVAL) {
                Ok(Ok(stream)) => return Ok(stream),
                Ok(Err(e)) => {
                    log::error!(
                        "[CONN] {}: failed to connect to {}: {}",
                        self.ctx.spec.topic,
                        self.ctx.endpoint,
                        e
                    );
                    return Err(CloseReason::DialFailed);
                }
                Err(RecvTimeoutError::Timeout) => {
                    if Instant::now() >= deadline {
                        log::error!(
                            "[CONN] {}: connect to {} timed out",
                            self.ctx.spec.topic,
                            self.ctx.endpoint
                        );
                        // Scoop up a photo-finish success so the socket is
                        // closed rather than leaked.
                        if let Ok(Ok(stream)) = rx.try_recv() {
                            drop(stream);
                        }
                        return Err(CloseReason::DialTimeout);
                    }
                }
                Err(RecvTimeoutError::Disconnected) => return Err(CloseReason::DialFailed),
            }
        }
    }

    // ========================================================================
    // Handshaking
    // ========================================================================

    fn handshake(&self, stream: &mut TcpStream) -> Result<HashMap<String, String>, CloseReason> {
        let spec = &self.ctx.spec;
        let fields = vec![
            ("topic".to_string(), spec.topic.clone()),
            ("md5sum".to_string(), spec.md5sum.clone()),
            ("type".to_string(), spec.type_name.clone()),
            ("callerid".to_string(), self.ctx.caller_id.clone()),
        ];

        if let Err(e) = stream.write_all(&encode_header(&fields)) {
            log::error!(
                "[CONN] {}: failed to write connection header to {}: {}",
                spec.topic,
                self.ctx.endpoint,
                e
            );
            return Err(CloseReason::HeaderIoFailed);
        }
        if self.stopped() {
            return Err(CloseReason::StopRequested);
        }

        let payload = match read_frame(stream) {
            FrameOutcome::Frame(payload) => payload,
            outcome => {
                log::error!(
                    "[CONN] {}: failed to read response header from {}: {:?}",
                    spec.topic,
                    self.ctx.endpoint,
                    outcome
                );
                return Err(CloseReason::HeaderIoFailed);
            }
        };
        if self.stopped() {
            return Err(CloseReason::StopRequested);
        }

        let mut header = match decode_header(&payload) {
            Ok(header) => header,
            Err(e) => {
                log::error!(
                    "[CONN] {}: malformed response header from {}: {}",
                    spec.topic,
                    self.ctx.endpoint,
                    e
                );
                return Err(CloseReason::MalformedHeader);
            }
        };

        let type_ok = header.get("type").map(String::as_str) == Some(spec.type_name.as_str());
        let md5_ok = header.get("md5sum").map(String::as_str) == Some(spec.md5sum.as_str());
        if !type_ok || !md5_ok {
            log::error!(
                "[CONN] {}: publisher {} offers incompatible type {:?}/{:?}, expected {}/{}",
                spec.topic,
                self.ctx.endpoint,
                header.get("type"),
                header.get("md5sum"),
                spec.type_name,
                spec.md5sum
            );
            SubscriberMetrics::incr(&self.ctx.metrics.incompatible_publishers);
            return Err(CloseReason::IncompatibleType);
        }

        // Some partial TCPROS implementations omit the topic in their
        // response; fill it in so downstream consumers always see it.
        if header.get("topic").map_or(true, |t| t.is_empty()) {
            header.insert("topic".to_string(), spec.topic.clone());
        }

        Ok(header)
    }

    // ========================================================================
    // Ready: frame pump
    // ========================================================================

    fn read_loop(&self, stream: &mut TcpStream, template: &MessageEvent) -> CloseReason {
        loop {
            let outcome = read_frame(stream);

            // cancel() shuts the socket down under us; a read error after
            // a stop request is the stop, not a peer failure.
            if self.stopped() {
                return CloseReason::StopRequested;
            }

            match outcome {
                FrameOutcome::Frame(payload) => {
                    SubscriberMetrics::incr(&self.ctx.metrics.frames_received);

                    // The gate applies to delivery only; disabled frames
                    // are still drained off the socket and discarded.
                    if !self.ctx.delivery_enabled.load(Ordering::Relaxed) {
                        continue;
                    }

                    let mut event = template.clone();
                    event.receipt_time = SystemTime::now();
                    let send = self.ctx.msg_tx.send_timeout(
                        FrameEvent { payload, event },
                        self.ctx.config.delivery_timeout,
                    );
                    match send {
                        Ok(()) => {}
                        Err(SendTimeoutError::Timeout(_)) => {
                            SubscriberMetrics::incr(&self.ctx.metrics.delivery_drops);
                            log::debug!(
                                "[CONN] {}: dispatch busy, dropping frame from {}",
                                self.ctx.spec.topic,
                                self.ctx.endpoint
                            );
                        }
                        Err(SendTimeoutError::Disconnected(_)) => {
                            return CloseReason::StopRequested;
                        }
                    }
                }
                FrameOutcome::Timeout => {
                    log::warn!(
                        "[CONN] {}: read from {} timed out, assuming desync",
                        self.ctx.spec.topic,
                        self.ctx.endpoint
                    );
                    return CloseReason::Resync;
                }
                FrameOutcome::OutOfSync => {
                    log::warn!(
                        "[CONN] {}: stream from {} is out of sync",
                        self.ctx.spec.topic,
                        self.ctx.endpoint
                    );
                    return CloseReason::Resync;
                }
                FrameOutcome::RemoteClosed => {
                    log::info!(
                        "[CONN] {}: publisher at {} disconnected",
                        self.ctx.spec.topic,
                        self.ctx.endpoint
                    );
                    return CloseReason::PeerGone;
                }
                FrameOutcome::Failed(e) => {
                    log::error!(
                        "[CONN] {}: read from {} failed: {}",
                        self.ctx.spec.topic,
                        self.ctx.endpoint,
                        e
                    );
                    return CloseReason::Fatal;
                }
            }
        }
    }
}

fn dial_blocking(endpoint: &str, budget: Duration) -> io::Result<TcpStream> {
    let addr = endpoint.to_socket_addrs()?.next().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("no address for {}", endpoint),
        )
    })?;
    TcpStream::connect_timeout(&addr, budget)
}
