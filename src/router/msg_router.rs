// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The topic multiplexer.
//!
//! Several components want messages from the same topic, but the broker
//! should only ever see one subscription per topic. [`MsgRouter`] keeps a
//! handler registry per topic, issues the broker subscribe on first
//! registration, and unsubscribes exactly once when the last handler leaves.
//!
//! Unsubscribing talks to the broker without holding the registry lock, so a
//! new handler can arrive for a topic that is mid-unsubscribe. The registry
//! entry is only deleted if it is still empty after the broker call
//! resolves; a resurrected topic keeps its entry and its fresh broker
//! subscription.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::broker::{BrokerLink, MsgEvent, PublishOpts, Qos};
use crate::error::Result;

type Handler = Arc<dyn Fn(&MsgEvent) + Send + Sync>;

struct TopicEntry {
    handlers: Vec<(u64, Handler)>,
    /// A broker unsubscribe for this topic is in flight.
    unsubbing: bool,
    /// The topic emptied again while the release was in flight, so the
    /// in-flight owner must issue one more broker unsubscribe.
    release_queued: bool,
}

/// Proof of a registered handler; required to unsubscribe it.
#[derive(Debug)]
pub struct RouterHandle {
    topic: String,
    id: u64,
}

/// Multiplexes broker topic subscriptions across many handlers.
pub struct MsgRouter<L: BrokerLink> {
    link: Arc<L>,
    topics: Mutex<HashMap<String, TopicEntry>>,
    next_id: AtomicU64,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl<L: BrokerLink> MsgRouter<L> {
    /// Creates a router over the given broker link.
    #[must_use]
    pub fn new(link: Arc<L>) -> Self {
        Self {
            link,
            topics: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            listener: Mutex::new(None),
        }
    }

    /// Registers a handler for a topic, subscribing on the broker first.
    ///
    /// The broker subscribe is issued even when other handlers already hold
    /// the topic; a redundant subscribe is harmless and keeps registration
    /// free of failure windows. The handler is only registered once the
    /// broker has accepted the subscription.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the subscription. No handler
    /// is registered in that case.
    pub async fn subscribe<F>(&self, topic: &str, qos: Qos, handler: F) -> Result<RouterHandle>
    where
        F: Fn(&MsgEvent) + Send + Sync + 'static,
    {
        self.link.subscribe(topic, qos).await?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut topics = self.topics.lock();
        let entry = topics.entry(topic.to_string()).or_insert_with(|| TopicEntry {
            handlers: Vec::new(),
            unsubbing: false,
            release_queued: false,
        });
        entry.handlers.push((id, Arc::new(handler)));
        tracing::debug!(topic = %topic, handlers = entry.handlers.len(), "Handler registered");

        Ok(RouterHandle {
            topic: topic.to_string(),
            id,
        })
    }

    /// Removes a handler. When it was the last one for its topic, the
    /// broker subscription is released.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the unsubscribe. The topic
    /// entry is kept so a later removal can retry the release.
    pub async fn unsubscribe(&self, handle: RouterHandle) -> Result<()> {
        {
            let mut topics = self.topics.lock();
            let Some(entry) = topics.get_mut(&handle.topic) else {
                tracing::warn!(topic = %handle.topic, "Unsubscribe for unknown topic");
                return Ok(());
            };
            entry.handlers.retain(|(id, _)| *id != handle.id);
            if !entry.handlers.is_empty() {
                return Ok(());
            }
            if entry.unsubbing {
                // The topic was resurrected mid-release and has now emptied
                // again. The in-flight owner issues the matching broker
                // unsubscribe once its current call resolves.
                entry.release_queued = true;
                return Ok(());
            }
            entry.unsubbing = true;
        }

        self.release_topic(&handle.topic).await
    }

    /// Issues the broker unsubscribe for an emptied topic, repeating it when
    /// the topic emptied again while a call was in flight. Only the caller
    /// that set `unsubbing` runs this.
    async fn release_topic(&self, topic: &str) -> Result<()> {
        loop {
            // Lock released while the broker call is in flight; a new
            // handler may register for this topic in the meantime.
            let released = self.link.unsubscribe(topic).await;

            let mut topics = self.topics.lock();
            let Some(entry) = topics.get_mut(topic) else {
                released?;
                return Ok(());
            };
            match released {
                Ok(()) => {
                    if !entry.handlers.is_empty() {
                        // Resurrected mid-release. The new handler already
                        // re-issued the broker subscribe, so the entry stays.
                        entry.unsubbing = false;
                        entry.release_queued = false;
                        tracing::debug!(topic = %topic, "Topic resurrected during release");
                        return Ok(());
                    }
                    if entry.release_queued {
                        // A resurrection came and went while the call was in
                        // flight; its subscribe still needs an unsubscribe.
                        entry.release_queued = false;
                        drop(topics);
                        continue;
                    }
                    topics.remove(topic);
                    tracing::debug!(topic = %topic, "Topic released");
                    return Ok(());
                }
                Err(e) => {
                    // Entry kept so a later removal can retry the release.
                    entry.unsubbing = false;
                    entry.release_queued = false;
                    tracing::warn!(topic = %topic, error = %e, "Broker unsubscribe failed");
                    return Err(e.into());
                }
            }
        }
    }

    /// Publishes a payload through the underlying broker link.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the publish.
    pub async fn publish(&self, topic: &str, payload: &[u8], opts: PublishOpts) -> Result<()> {
        self.link.publish(topic, payload, opts).await?;
        Ok(())
    }

    /// Dispatches an inbound message to all handlers of its topic, in
    /// registration order.
    pub fn route(&self, evt: &MsgEvent) {
        let handlers: Vec<Handler> = {
            let topics = self.topics.lock();
            let Some(entry) = topics.get(&evt.topic) else {
                tracing::warn!(topic = %evt.topic, "Message for topic with no registry entry");
                return;
            };
            if entry.handlers.is_empty() {
                if entry.unsubbing {
                    // Expected straggler while the broker release is in flight.
                    tracing::debug!(topic = %evt.topic, "Message during release, dropped");
                } else {
                    tracing::warn!(topic = %evt.topic, "Message for topic with no handlers");
                }
                return;
            }
            entry.handlers.iter().map(|(_, h)| Arc::clone(h)).collect()
        };

        for handler in handlers {
            handler(evt);
        }
    }

    /// Starts draining the link's inbound messages into [`Self::route`].
    ///
    /// Idempotent; a second call while the drain task is running does
    /// nothing.
    pub fn listen(self: &Arc<Self>) {
        let mut listener = self.listener.lock();
        if listener.is_some() {
            return;
        }
        let router = Arc::clone(self);
        let mut rx = self.link.messages();
        *listener = Some(tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(evt) => router.route(&evt),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Inbound channel lagged, messages dropped");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }));
    }

    /// Stops the inbound drain task started by [`Self::listen`].
    pub fn unlisten(&self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }

    /// Number of handlers currently registered for a topic.
    #[must_use]
    pub fn handler_count(&self, topic: &str) -> usize {
        self.topics
            .lock()
            .get(topic)
            .map_or(0, |e| e.handlers.len())
    }

    /// Number of topics with a registry entry.
    #[must_use]
    pub fn topic_count(&self) -> usize {
        self.topics.lock().len()
    }
}

impl<L: BrokerLink> Drop for MsgRouter<L> {
    fn drop(&mut self) {
        if let Some(handle) = self.listener.lock().take() {
            handle.abort();
        }
    }
}
