// Copyright 2026, Jeroen van Erp <jeroen@geeko.me>
// SPDX-License-Identifier: Apache-2.0

//! Deduplicating, rate-limited work queue.
//!
//! A key is in at most one of three places at a time: waiting in the
//! queue, being processed by a worker, or both "processing" and "dirty"
//! when it was re-added mid-flight. A dirty key goes back into the queue
//! when its worker calls [`WorkQueue::done`], so no two workers ever hold
//! the same key.

use super::rate_limiter::ItemExponentialRateLimiter;
use std::collections::{HashSet, VecDeque};
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct State<K> {
    queue: VecDeque<K>,
    dirty: HashSet<K>,
    processing: HashSet<K>,
    rate_limiter: ItemExponentialRateLimiter<K>,
}

struct Shared<K> {
    state: Mutex<State<K>>,
    available: Notify,
    shutdown: CancellationToken,
}

/// Cheaply cloneable handle to a shared work queue
pub struct WorkQueue<K> {
    shared: Arc<Shared<K>>,
}

impl<K> Clone for WorkQueue<K> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

impl<K> WorkQueue<K>
where
    K: Clone + Eq + Hash + Debug + Send + 'static,
{
    /// `base_delay` and `max_delay` bound the per-key retry backoff
    pub fn new(base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    queue: VecDeque::new(),
                    dirty: HashSet::new(),
                    processing: HashSet::new(),
                    rate_limiter: ItemExponentialRateLimiter::new(base_delay, max_delay),
                }),
                available: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Enqueue a key. Duplicates of a pending key collapse into one entry.
    pub async fn add(&self, key: K) {
        if self.is_shutting_down() {
            trace!("Ignoring {:?}, queue is shutting down", key);
            return;
        }

        let mut state = self.shared.state.lock().await;
        if !state.dirty.insert(key.clone()) {
            return;
        }
        if state.processing.contains(&key) {
            // Delivered again once the current worker calls done()
            return;
        }
        state.queue.push_back(key);
        drop(state);
        self.shared.available.notify_one();
    }

    /// Enqueue a key once `delay` has elapsed
    pub fn add_after(&self, key: K, delay: Duration) {
        if delay.is_zero() {
            let queue = self.clone();
            tokio::spawn(async move { queue.add(key).await });
            return;
        }

        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = queue.shared.shutdown.cancelled() => {}
                _ = tokio::time::sleep(delay) => queue.add(key).await,
            }
        });
    }

    /// Enqueue a failed key after its backoff delay
    pub async fn add_rate_limited(&self, key: K) {
        let delay = self.shared.state.lock().await.rate_limiter.when(&key);
        debug!("Requeueing {:?} in {:?}", key, delay);
        self.add_after(key, delay);
    }

    /// Wait for the next key. Returns `None` once the queue is shut down and
    /// drained.
    pub async fn get(&self) -> Option<K> {
        loop {
            let notified = self.shared.available.notified();
            {
                let mut state = self.shared.state.lock().await;
                if let Some(key) = state.queue.pop_front() {
                    state.dirty.remove(&key);
                    state.processing.insert(key.clone());
                    return Some(key);
                }
                if self.is_shutting_down() {
                    return None;
                }
            }
            tokio::select! {
                _ = notified => {}
                _ = self.shared.shutdown.cancelled() => {}
            }
        }
    }

    /// Mark a key as finished; re-queues it if it was added meanwhile
    pub async fn done(&self, key: &K) {
        let mut state = self.shared.state.lock().await;
        state.processing.remove(key);
        if state.dirty.contains(key) {
            state.queue.push_back(key.clone());
            drop(state);
            self.shared.available.notify_one();
        }
    }

    /// Clear the backoff history of a key
    pub async fn forget(&self, key: &K) {
        self.shared.state.lock().await.rate_limiter.forget(key);
    }

    pub async fn num_requeues(&self, key: &K) -> u32 {
        self.shared.state.lock().await.rate_limiter.num_requeues(key)
    }

    pub async fn len(&self) -> usize {
        self.shared.state.lock().await.queue.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Stop accepting keys and release every waiting consumer
    pub fn shut_down(&self) {
        self.shared.shutdown.cancel();
        self.shared.available.notify_waiters();
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutdown.is_cancelled()
    }
}
