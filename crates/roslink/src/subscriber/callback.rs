// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 roslink contributors

//! Callback shapes and the per-topic callback set.
//!
//! A callback either takes just the decoded message or the message plus
//! its [`MessageEvent`] metadata. The two shapes are a sum type; there is
//! no runtime arity inspection.
//!
//! The set is append-only while the subscriber runs. Dispatch takes a
//! snapshot, so a callback appended mid-flight is only observed by
//! subsequent messages.

use std::sync::Arc;

use crate::message::{Message, MessageEvent};

/// A user callback for messages of type `M`.
///
/// Callbacks run on the shared job worker, not on the subscriber's
/// control thread, and must therefore be `Send + Sync`.
pub enum Callback<M: Message> {
    /// Invoked with the decoded message only.
    Message(Box<dyn Fn(&M) + Send + Sync>),

    /// Invoked with the decoded message and its receipt metadata.
    MessageEvent(Box<dyn Fn(&M, &MessageEvent) + Send + Sync>),
}

impl<M: Message> Callback<M> {
    /// Wrap a message-only closure.
    pub fn message<F>(f: F) -> Self
    where
        F: Fn(&M) + Send + Sync + 'static,
    {
        Self::Message(Box::new(f))
    }

    /// Wrap a message-plus-event closure.
    pub fn with_event<F>(f: F) -> Self
    where
        F: Fn(&M, &MessageEvent) + Send + Sync + 'static,
    {
        Self::MessageEvent(Box::new(f))
    }

    pub(crate) fn invoke(&self, message: &M, event: &MessageEvent) {
        match self {
            Self::Message(f) => f(message),
            Self::MessageEvent(f) => f(message, event),
        }
    }
}

/// Ordered, append-only set of callbacks for one topic.
pub(crate) struct CallbackSet<M: Message> {
    slots: Vec<Arc<Callback<M>>>,
}

impl<M: Message> CallbackSet<M> {
    pub(crate) fn new(initial: Callback<M>) -> Self {
        Self {
            slots: vec![Arc::new(initial)],
        }
    }

    pub(crate) fn push(&mut self, callback: Callback<M>) {
        self.slots.push(Arc::new(callback));
    }

    /// Cheap copy for one dispatch; later appends are not visible to it.
    pub(crate) fn snapshot(&self) -> Vec<Arc<Callback<M>>> {
        self.slots.clone()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::msgs::RosString;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::SystemTime;

    fn event() -> MessageEvent {
        MessageEvent {
            publisher_name: "/talker".to_string(),
            receipt_time: SystemTime::now(),
            connection_header: HashMap::new(),
        }
    }

    #[test]
    fn test_both_shapes_invoke() {
        let hits = Arc::new(AtomicUsize::new(0));

        let hits_a = Arc::clone(&hits);
        let one = Callback::<RosString>::message(move |msg| {
            assert_eq!(msg.data, "x");
            hits_a.fetch_add(1, Ordering::SeqCst);
        });

        let hits_b = Arc::clone(&hits);
        let two = Callback::<RosString>::with_event(move |msg, ev| {
            assert_eq!(msg.data, "x");
            assert_eq!(ev.publisher_name, "/talker");
            hits_b.fetch_add(1, Ordering::SeqCst);
        });

        let msg = RosString::from("x");
        let ev = event();
        one.invoke(&msg, &ev);
        two.invoke(&msg, &ev);
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_snapshot_isolated_from_append() {
        let mut set = CallbackSet::new(Callback::<RosString>::message(|_| {}));
        let snap = set.snapshot();
        set.push(Callback::message(|_| {}));

        assert_eq!(snap.len(), 1);
        assert_eq!(set.snapshot().len(), 2);
    }
}
