// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! A topic-routed publish/subscribe bus for log lines and lifecycle events.
//!
//! Subscribers register a glob pattern (`"myservice.*"`, `"*.evt"`, `"*"`)
//! against a per-subscriber bounded queue. Publishing never blocks and
//! never drops a message for the whole system — if one subscriber falls
//! behind, only *that* subscriber's queue is trimmed (oldest half
//! discarded) rather than stalling the publisher or starving everyone
//! else.

use std::collections::VecDeque;
use std::sync::Arc;

use glob::Pattern;
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;

struct Subscription<T> {
    pattern: Pattern,
    queue: VecDeque<T>,
    max_len: usize,
    wake: mpsc::UnboundedSender<()>,
}

struct BusInner<T> {
    subscribers: IndexMap<u64, Subscription<T>>,
    next_id: u64,
}

impl<T> Default for BusInner<T> {
    fn default() -> Self {
        Self {
            subscribers: IndexMap::new(),
            next_id: 0,
        }
    }
}

/// A publish/subscribe bus carrying messages of type `T`.
///
/// Clone to share the same underlying routing table (it's `Arc` internally).
pub struct Bus<T> {
    inner: Arc<Mutex<BusInner<T>>>,
}

impl<T> Clone for Bus<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for Bus<T> {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusInner::default())),
        }
    }
}

/// Default per-subscriber queue capacity before the oldest half is dropped.
pub const DEFAULT_MAX_QUEUE_LEN: usize = 1000;

impl<T: Clone> Bus<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a glob pattern against topics published on this bus.
    pub fn subscribe(
        &self,
        pattern: &str,
        max_len: usize,
    ) -> Result<Subscriber<T>, glob::PatternError> {
        let pattern = Pattern::new(pattern)?;
        let (wake_tx, wake_rx) = mpsc::unbounded_channel();
        let id = {
            let mut inner = self.inner.lock();
            let id = inner.next_id;
            inner.next_id += 1;
            inner.subscribers.insert(
                id,
                Subscription {
                    pattern,
                    queue: VecDeque::new(),
                    max_len,
                    wake: wake_tx,
                },
            );
            id
        };
        Ok(Subscriber {
            id,
            bus: Arc::clone(&self.inner),
            wake_rx,
        })
    }

    /// Publish `msg` under `topic` to every subscriber whose pattern matches.
    pub fn publish(&self, topic: &str, msg: T) {
        let mut inner = self.inner.lock();
        for sub in inner.subscribers.values_mut() {
            if !sub.pattern.matches(topic) {
                continue;
            }
            sub.queue.push_back(msg.clone());
            if sub.queue.len() > sub.max_len {
                let drop_count = sub.max_len / 2;
                tracing::warn!(
                    topic,
                    drop_count,
                    "bus subscriber queue overflowed, dropping oldest half"
                );
                for _ in 0..drop_count {
                    sub.queue.pop_front();
                }
            }
            // Best-effort: if the subscriber task is gone the send fails
            // and is ignored, the entry is cleaned up on next unsubscribe.
            let _ = sub.wake.send(());
        }
    }

    /// Number of currently registered subscribers, for introspection.
    pub fn subscriber_count(&self) -> usize {
        self.inner.lock().subscribers.len()
    }
}

/// A live subscription. Dropping it unsubscribes.
pub struct Subscriber<T> {
    id: u64,
    bus: Arc<Mutex<BusInner<T>>>,
    wake_rx: mpsc::UnboundedReceiver<()>,
}

impl<T: Clone> Subscriber<T> {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Pop the next queued message, waiting for a publish if the queue is
    /// currently empty. Returns `None` once the bus itself has been
    /// dropped.
    pub async fn recv(&mut self) -> Option<T> {
        loop {
            if let Some(msg) = self
                .bus
                .lock()
                .subscribers
                .get_mut(&self.id)
                .and_then(|s| s.queue.pop_front())
            {
                return Some(msg);
            }
            self.wake_rx.recv().await?;
        }
    }
}

impl<T> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.bus.lock().subscribers.shift_remove(&self.id);
    }
}
