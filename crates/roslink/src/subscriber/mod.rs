// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Subscriber runtime: publisher-set supervision and message dispatch.
//!
//! One [`Subscriber`] owns everything for one subscribed topic:
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                      Subscriber<M>                           |
//! |  +--------------------------------------------------------+  |
//! |  |                 Supervisor thread                      |  |
//! |  |   publisher list --> reconcile --> connection table    |  |
//! |  |   disconnects    --> evict                             |  |
//! |  |   frames         --> snapshot callbacks, enqueue job   |  |
//! |  +----------------------------+---------------------------+  |
//! |                               |                              |
//! |      +------------------------+-----------------------+      |
//! |      v                        v                       v      |
//! |  +--------+             +--------+               +--------+  |
//! |  | Conn 1 |             | Conn 2 |      ...      | Conn N |  |
//! |  +--------+             +--------+               +--------+  |
//! |   one thread + TCPROS stream per advertised publisher        |
//! +--------------------------------------------------------------+
//!                                |
//!                                v
//!                      shared job queue (node-wide)
//!                                |
//!                                v
//!                         user callbacks
//! ```
//!
//! The supervisor thread is the single serialization point for all state
//! of the topic: the tracked publisher list, the endpoint-to-publisher
//! map, the connection table and the callback set are owned by it and
//! never touched from another thread. Everything crosses thread
//! boundaries through bounded channels.
//!
//! # Reconciliation
//!
//! Each incoming advertised list is diffed by publisher name against the
//! tracked list: departed publishers have their connections cancelled,
//! new publishers get their endpoint resolved through the registry and a
//! connection started. The tracked list is then replaced by the full
//! incoming list even when endpoint resolution failed for some names —
//! the next list delivery is the retry mechanism for those.
//!
//! A publisher whose connection dies on its own is evicted from the
//! table but stays in the tracked list; it is only re-dialed after it
//! leaves and re-enters the advertised list.
//!
//! # Backpressure
//!
//! Connection to supervisor uses a rendezvous channel with a 30 ms send
//! budget; supervisor to job queue uses a 3 s budget. Both drop on
//! expiry: for live robot data, losing a stale sample beats stalling a
//! socket.

pub mod callback;
pub(crate) mod subscription;


pub use callback::Callback;

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use crossbeam::channel::{self, Receiver, Sender};

use crate::config::SubscriberConfig;
use crate::jobs::{Job, JobQueue};
use crate::message::{Message, TopicSpec};
use crate::metrics::SubscriberMetrics;
use crate::names::{self, SubscriberError};
use crate::registry::RegistryClient;
use crate::subscriber::callback::CallbackSet;
use crate::subscriber::subscription::{
    Disconnect, FrameEvent, SubscriptionContext, SubscriptionHandle,
};

// ============================================================================
// Public handle
// ============================================================================

/// A running subscription to one topic.
///
/// Dropping the handle shuts the subscriber down; [`Subscriber::shutdown`]
/// does the same explicitly and blocks until every connection thread has
/// exited and the registry unregistration has been kicked off.
pub struct Subscriber<M: Message> {
    topic: String,
    pub_list_tx: Sender<Vec<String>>,
    callback_tx: Sender<Callback<M>>,
    shutdown_tx: Sender<ShutdownRequest>,
    delivery_enabled: Arc<AtomicBool>,
    publisher_count: Arc<AtomicUsize>,
    metrics: Arc<SubscriberMetrics>,
    supervisor: Option<JoinHandle<()>>,
}

struct ShutdownRequest {
    ack: Sender<()>,
}

impl<M: Message> Subscriber<M> {
    /// Validate the topic and message type, then start the supervisor.
    ///
    /// `registry` resolves publisher endpoints and handles
    /// unregistration; `jobs` is the node-wide queue user callbacks run
    /// on. The subscriber knows no publishers until the first
    /// [`update_publishers`](Self::update_publishers) call.
    ///
    /// These are the only errors the subscriber ever surfaces to the
    /// caller; everything after construction is recovered internally.
    pub fn spawn(
        topic: &str,
        caller_id: &str,
        registry: Arc<dyn RegistryClient>,
        jobs: JobQueue,
        config: SubscriberConfig,
        callback: Callback<M>,
    ) -> Result<Self, SubscriberError> {
        if !names::is_valid_graph_name(topic) {
            return Err(SubscriberError::InvalidTopicName(topic.to_string()));
        }
        if !names::is_valid_graph_name(caller_id) {
            return Err(SubscriberError::InvalidCallerId(caller_id.to_string()));
        }
        if !names::is_valid_type_name(M::type_name()) {
            return Err(SubscriberError::InvalidTypeName(M::type_name().to_string()));
        }
        if !names::is_valid_md5sum(M::md5sum()) {
            return Err(SubscriberError::InvalidMd5Sum(M::md5sum().to_string()));
        }

        let spec = TopicSpec::of::<M>(topic);
        let capacity = config.control_channel_capacity;

        let (pub_list_tx, pub_list_rx) = channel::bounded(capacity);
        let (callback_tx, callback_rx) = channel::bounded(capacity);
        let (disconnect_tx, disconnect_rx) = channel::bounded(capacity);
        // Rendezvous: a frame is either taken by the dispatch loop within
        // the delivery budget or dropped by the connection.
        let (msg_tx, msg_rx) = channel::bounded(0);
        let (shutdown_tx, shutdown_rx) = channel::bounded(1);

        let delivery_enabled = Arc::new(AtomicBool::new(true));
        let publisher_count = Arc::new(AtomicUsize::new(0));
        let alive = Arc::new(AtomicBool::new(true));
        let metrics = Arc::new(SubscriberMetrics::new());

        let supervisor = Supervisor {
            spec,
            caller_id: caller_id.to_string(),
            config,
            registry,
            jobs,
            callbacks: CallbackSet::new(callback),
            pub_list: Vec::new(),
            endpoint_to_pub: HashMap::new(),
            connections: HashMap::new(),
            departed: Vec::new(),
            msg_tx,
            disconnect_tx,
            delivery_enabled: Arc::clone(&delivery_enabled),
            publisher_count: Arc::clone(&publisher_count),
            alive,
            metrics: Arc::clone(&metrics),
        };
        let channels = SupervisorChannels {
            pub_list_rx,
            disconnect_rx,
            callback_rx,
            msg_rx,
            shutdown_rx,
        };

        let handle = std::thread::Builder::new()
            .name("roslink-sub".to_string())
            .spawn(move || supervisor.run(channels))
            .map_err(SubscriberError::Spawn)?;

        Ok(Self {
            topic: topic.to_string(),
            pub_list_tx,
            callback_tx,
            shutdown_tx,
            delivery_enabled,
            publisher_count,
            metrics,
            supervisor: Some(handle),
        })
    }

    /// The subscribed topic name.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Deliver a new advertised publisher list.
    ///
    /// The supervisor reconciles its connection table against the list:
    /// one connection per named publisher, zero per absent one.
    pub fn update_publishers(&self, publishers: Vec<String>) {
        if self.pub_list_tx.send(publishers).is_err() {
            log::debug!("[SUB] {}: supervisor gone, publisher update dropped", self.topic);
        }
    }

    /// Append a callback. In-flight dispatches keep their pre-append
    /// snapshot; subsequent messages see the new callback.
    pub fn add_callback(&self, callback: Callback<M>) {
        if self.callback_tx.send(callback).is_err() {
            log::debug!("[SUB] {}: supervisor gone, callback dropped", self.topic);
        }
    }

    /// Gate message delivery without touching the read side. Disabled
    /// subscribers keep draining their sockets and discard the frames.
    pub fn set_delivery_enabled(&self, enabled: bool) {
        self.delivery_enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether delivery is currently enabled.
    pub fn delivery_enabled(&self) -> bool {
        self.delivery_enabled.load(Ordering::Relaxed)
    }

    /// Number of publishers in the latest advertised list.
    pub fn publisher_count(&self) -> usize {
        self.publisher_count.load(Ordering::Relaxed)
    }

    /// Runtime counters for this subscriber.
    pub fn metrics(&self) -> Arc<SubscriberMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Tear the subscriber down and wait for the teardown to finish.
    ///
    /// Kicks off registry unregistration on a detached thread (a slow
    /// registry cannot stall us), cancels every connection, waits for the
    /// connection threads to exit, then returns. After this returns no
    /// further callback is invoked for this subscriber. Idempotent.
    pub fn shutdown(&mut self) {
        let Some(handle) = self.supervisor.take() else {
            return;
        };

        let (ack_tx, ack_rx) = channel::bounded(1);
        if self.shutdown_tx.send(ShutdownRequest { ack: ack_tx }).is_ok() {
            let _ = ack_rx.recv();
        }
        let _ = handle.join();
    }
}

impl<M: Message> Drop for Subscriber<M> {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// ============================================================================
// Supervisor
// ============================================================================

struct SupervisorChannels<M: Message> {
    pub_list_rx: Receiver<Vec<String>>,
    disconnect_rx: Receiver<Disconnect>,
    callback_rx: Receiver<Callback<M>>,
    msg_rx: Receiver<FrameEvent>,
    shutdown_rx: Receiver<ShutdownRequest>,
}

/// Per-topic control loop state. Owned by the supervisor thread; nothing
/// in here is shared except through the channels and atomics.
struct Supervisor<M: Message> {
    spec: TopicSpec,
    caller_id: String,
    config: SubscriberConfig,
    registry: Arc<dyn RegistryClient>,
    jobs: JobQueue,
    callbacks: CallbackSet<M>,

    /// Latest advertised publisher list, replaced wholesale on every
    /// update. May name publishers with no live connection.
    pub_list: Vec<String>,

    /// Resolved endpoint back to the publisher that owns it.
    endpoint_to_pub: HashMap<String, String>,

    /// Live connection per publisher name. At most one per publisher.
    connections: HashMap<String, SubscriptionHandle>,

    /// Cancelled connections not yet observed to have exited.
    departed: Vec<SubscriptionHandle>,

    msg_tx: Sender<FrameEvent>,
    disconnect_tx: Sender<Disconnect>,
    delivery_enabled: Arc<AtomicBool>,
    publisher_count: Arc<AtomicUsize>,
    alive: Arc<AtomicBool>,
    metrics: Arc<SubscriberMetrics>,
}

impl<M: Message> Supervisor<M> {
    fn run(mut self, channels: SupervisorChannels<M>) {
        log::debug!("[SUB] {}: supervisor started", self.spec.topic);

        loop {
            crossbeam::channel::select! {
                recv(channels.pub_list_rx) -> msg => match msg {
                    Ok(list) => self.reconcile(list),
                    Err(_) => {
                        // Handle dropped without an explicit shutdown.
                        self.teardown(None);
                        return;
                    }
                },
                recv(channels.disconnect_rx) -> msg => {
                    if let Ok(disconnect) = msg {
                        self.on_disconnect(&disconnect);
                    }
                },
                recv(channels.callback_rx) -> msg => {
                    if let Ok(callback) = msg {
                        log::debug!("[SUB] {}: callback appended", self.spec.topic);
                        self.callbacks.push(callback);
                    }
                },
                recv(channels.msg_rx) -> msg => {
                    if let Ok(frame) = msg {
                        self.dispatch(frame);
                    }
                },
                recv(channels.shutdown_rx) -> msg => {
                    self.teardown(msg.ok().map(|req| req.ack));
                    return;
                },
            }
        }
    }

    // ========================================================================
    // Reconciliation
    // ========================================================================

    fn reconcile(&mut self, list: Vec<String>) {
        log::debug!(
            "[SUB] {}: advertised list with {} publisher(s)",
            self.spec.topic,
            list.len()
        );

        let dead = set_difference(&self.pub_list, &list);
        let fresh = set_difference(&list, &self.pub_list);

        // The tracked list becomes the full incoming list even when
        // endpoint resolution fails below; publishers we could not reach
        // are retried when a later list re-introduces them.
        self.pub_list = list;
        self.publisher_count
            .store(self.pub_list.len(), Ordering::Relaxed);

        for publisher in dead {
            if let Some(connection) = self.connections.remove(&publisher) {
                connection.cancel();
                self.departed.push(connection);
            }
            self.endpoint_to_pub.retain(|_, owner| owner != &publisher);
        }

        for publisher in fresh {
            let endpoint = match self.registry.request_topic_endpoint(&publisher) {
                Ok(endpoint) => endpoint,
                Err(e) => {
                    log::error!(
                        "[SUB] {}: endpoint request for {} failed: {}",
                        self.spec.topic,
                        publisher,
                        e
                    );
                    continue;
                }
            };

            let context = SubscriptionContext {
                endpoint: endpoint.clone(),
                spec: self.spec.clone(),
                caller_id: self.caller_id.clone(),
                config: self.config.clone(),
                msg_tx: self.msg_tx.clone(),
                disconnect_tx: self.disconnect_tx.clone(),
                delivery_enabled: Arc::clone(&self.delivery_enabled),
                metrics: Arc::clone(&self.metrics),
            };
            match subscription::spawn(context) {
                Ok(handle) => {
                    self.endpoint_to_pub.insert(endpoint, publisher.clone());
                    if let Some(previous) = self.connections.insert(publisher, handle) {
                        previous.cancel();
                        self.departed.push(previous);
                    }
                }
                Err(e) => {
                    log::error!(
                        "[SUB] {}: could not start connection to {} ({}): {}",
                        self.spec.topic,
                        publisher,
                        endpoint,
                        e
                    );
                }
            }
        }

        self.reap_departed();
    }

    fn on_disconnect(&mut self, disconnect: &Disconnect) {
        log::debug!(
            "[SUB] {}: connection to {} ended ({})",
            self.spec.topic,
            disconnect.endpoint,
            disconnect.reason
        );

        // Forget both mappings. The publisher stays in pub_list, so it is
        // only re-dialed once a future advertised list re-introduces it.
        if let Some(publisher) = self.endpoint_to_pub.remove(&disconnect.endpoint) {
            if let Some(connection) = self.connections.remove(&publisher) {
                connection.cancel();
                self.departed.push(connection);
            }
        }

        self.reap_departed();
    }

    /// Drop handles of cancelled connections whose threads have exited.
    fn reap_departed(&mut self) {
        self.departed.retain(|connection| !connection.is_finished());
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn dispatch(&mut self, frame: FrameEvent) {
        if !self.delivery_enabled.load(Ordering::Relaxed) {
            return;
        }

        let snapshot = self.callbacks.snapshot();
        let alive = Arc::clone(&self.alive);
        let metrics = Arc::clone(&self.metrics);
        let topic = self.spec.topic.clone();

        let job: Job = Box::new(move || {
            // A job that outlived its subscriber is a no-op; nothing may
            // run user code after shutdown() has returned.
            if !alive.load(Ordering::Relaxed) {
                return;
            }

            let message = match M::decode(&frame.payload) {
                Ok(message) => message,
                Err(e) => {
                    log::error!("[SUB] {}: failed to decode message: {}", topic, e);
                    SubscriberMetrics::incr(&metrics.decode_errors);
                    return;
                }
            };

            for callback in &snapshot {
                if !alive.load(Ordering::Relaxed) {
                    return;
                }
                callback.invoke(&message, &frame.event);
            }
            SubscriberMetrics::incr(&metrics.messages_delivered);
        });

        match self.jobs.post_timeout(job, self.config.dispatch_timeout) {
            Ok(()) => {
                SubscriberMetrics::incr(&self.metrics.jobs_enqueued);
            }
            Err(e) => {
                SubscriberMetrics::incr(&self.metrics.dispatch_drops);
                log::warn!(
                    "[SUB] {}: job queue unavailable ({:?}), message dropped",
                    self.spec.topic,
                    e
                );
            }
        }
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    fn teardown(&mut self, ack: Option<Sender<()>>) {
        log::debug!("[SUB] {}: shutting down", self.spec.topic);
        self.alive.store(false, Ordering::Relaxed);

        // Unregister on a detached thread; shutdown must stay prompt even
        // when the registry is slow or unreachable.
        let registry = Arc::clone(&self.registry);
        let topic = self.spec.topic.clone();
        let spawned = std::thread::Builder::new()
            .name("roslink-unreg".to_string())
            .spawn(move || {
                if let Err(e) = registry.unregister() {
                    log::warn!("[SUB] {}: unregister failed: {}", topic, e);
                }
            });
        if spawned.is_err() {
            log::warn!("[SUB] {}: could not spawn unregister thread", self.spec.topic);
        }

        for (_, connection) in self.connections.drain() {
            connection.cancel();
            self.departed.push(connection);
        }
        for connection in self.departed.drain(..) {
            connection.join();
        }

        self.publisher_count.store(0, Ordering::Relaxed);
        log::debug!("[SUB] {}: supervisor exited", self.spec.topic);

        if let Some(ack) = ack {
            let _ = ack.send(());
        }
    }
}

/// Names in `lhs` that do not appear in `rhs`.
fn set_difference(lhs: &[String], rhs: &[String]) -> Vec<String> {
    lhs.iter()
        .filter(|name| !rhs.contains(*name))
        .cloned()
        .collect()
}

// ============================================================================
// Tests
// ============================================================================
