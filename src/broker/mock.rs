// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! In-memory broker double for unit tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::broker::{BrokerLink, MsgEvent, PublishOpts, Qos};
use crate::error::BrokerError;

/// A recorded publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PublishRecord {
    pub topic: String,
    pub payload: Vec<u8>,
}

/// An in-memory [`BrokerLink`] that records traffic and lets tests inject
/// inbound messages.
pub(crate) struct MockLink {
    inbound_tx: broadcast::Sender<MsgEvent>,
    outbound_tx: broadcast::Sender<PublishRecord>,
    subscribes: Mutex<Vec<String>>,
    unsubscribes: Mutex<Vec<String>>,
    publishes: Mutex<Vec<PublishRecord>>,
    /// Artificial latency for `unsubscribe`, to widen race windows.
    unsubscribe_delay: Mutex<Duration>,
    fail_subscribe: AtomicBool,
}

impl MockLink {
    pub(crate) fn new() -> Arc<Self> {
        let (inbound_tx, _) = broadcast::channel(64);
        let (outbound_tx, _) = broadcast::channel(64);
        Arc::new(Self {
            inbound_tx,
            outbound_tx,
            subscribes: Mutex::new(Vec::new()),
            unsubscribes: Mutex::new(Vec::new()),
            publishes: Mutex::new(Vec::new()),
            unsubscribe_delay: Mutex::new(Duration::ZERO),
            fail_subscribe: AtomicBool::new(false),
        })
    }

    /// Delivers an inbound message as if the broker pushed it.
    pub(crate) fn inject(&self, topic: &str, payload: &[u8]) {
        let _ = self
            .inbound_tx
            .send(MsgEvent::new(topic, payload.to_vec()));
    }

    /// Receiver over everything published through this link.
    pub(crate) fn watch_published(&self) -> broadcast::Receiver<PublishRecord> {
        self.outbound_tx.subscribe()
    }

    pub(crate) fn set_unsubscribe_delay(&self, delay: Duration) {
        *self.unsubscribe_delay.lock() = delay;
    }

    pub(crate) fn set_fail_subscribe(&self, fail: bool) {
        self.fail_subscribe.store(fail, Ordering::Release);
    }

    pub(crate) fn subscribe_calls(&self) -> Vec<String> {
        self.subscribes.lock().clone()
    }

    pub(crate) fn unsubscribe_calls(&self) -> Vec<String> {
        self.unsubscribes.lock().clone()
    }

    pub(crate) fn published(&self) -> Vec<PublishRecord> {
        self.publishes.lock().clone()
    }

    /// Publishes to a topic, counted.
    pub(crate) fn published_to(&self, topic: &str) -> Vec<PublishRecord> {
        self.publishes
            .lock()
            .iter()
            .filter(|p| p.topic == topic)
            .cloned()
            .collect()
    }
}

impl BrokerLink for MockLink {
    async fn subscribe(&self, topic: &str, _qos: Qos) -> Result<(), BrokerError> {
        if self.fail_subscribe.load(Ordering::Acquire) {
            return Err(BrokerError::ConnectionFailed("subscribe refused".to_string()));
        }
        self.subscribes.lock().push(topic.to_string());
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        let delay = *self.unsubscribe_delay.lock();
        if delay > Duration::ZERO {
            tokio::time::sleep(delay).await;
        }
        self.unsubscribes.lock().push(topic.to_string());
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        _opts: PublishOpts,
    ) -> Result<(), BrokerError> {
        let record = PublishRecord {
            topic: topic.to_string(),
            payload: payload.to_vec(),
        };
        self.publishes.lock().push(record.clone());
        let _ = self.outbound_tx.send(record);
        Ok(())
    }

    fn messages(&self) -> broadcast::Receiver<MsgEvent> {
        self.inbound_tx.subscribe()
    }
}

/// Spawns a simulated binary device behind the mock link.
///
/// The sim watches for publishes to `<prefix>/<name>/set` and
/// `<prefix>/<name>/get` and answers each with a state broadcast on
/// `<prefix>/<name>` after `latency`. A set payload updates the simulated
/// state before the broadcast.
pub(crate) fn spawn_device_sim(
    link: &Arc<MockLink>,
    prefix: &str,
    name: &str,
    initial: &str,
    latency: Duration,
) -> tokio::task::JoinHandle<()> {
    let set_topic = format!("{prefix}/{name}/set");
    let get_topic = format!("{prefix}/{name}/get");
    let state_topic = format!("{prefix}/{name}");
    let mut outbound = link.watch_published();
    let link = Arc::clone(link);
    let mut state = initial.to_string();

    tokio::spawn(async move {
        while let Ok(record) = outbound.recv().await {
            if record.topic == set_topic {
                if let Ok(value) = serde_json::from_slice::<serde_json::Value>(&record.payload)
                    && let Some(next) = value.get("state").and_then(serde_json::Value::as_str)
                    && !next.is_empty()
                {
                    state = next.to_string();
                }
            } else if record.topic != get_topic {
                continue;
            }
            tokio::time::sleep(latency).await;
            let body = format!(r#"{{"state":"{state}"}}"#);
            link.inject(&state_topic, body.as_bytes());
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn records_traffic() {
        let link = MockLink::new();
        link.subscribe("a/b", Qos::AtLeastOnce).await.unwrap();
        link.publish("a/b/set", b"x", PublishOpts::default())
            .await
            .unwrap();
        link.unsubscribe("a/b").await.unwrap();

        assert_eq!(link.subscribe_calls(), vec!["a/b"]);
        assert_eq!(link.unsubscribe_calls(), vec!["a/b"]);
        assert_eq!(link.published_to("a/b/set").len(), 1);
    }

    #[tokio::test]
    async fn inject_reaches_receivers() {
        let link = MockLink::new();
        let mut rx = link.messages();
        link.inject("t", b"payload");
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.topic, "t");
        assert_eq!(evt.payload, b"payload");
    }

    #[tokio::test]
    async fn failing_subscribe() {
        let link = MockLink::new();
        link.set_fail_subscribe(true);
        let result = link.subscribe("t", Qos::AtLeastOnce).await;
        assert!(result.is_err());
        assert!(link.subscribe_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn device_sim_answers_get() {
        let link = MockLink::new();
        let mut rx = link.messages();
        let _sim = spawn_device_sim(&link, "zigbee2mqtt", "croc", "OFF", Duration::from_millis(50));
        tokio::task::yield_now().await;

        link.publish("zigbee2mqtt/croc/get", br#"{"state":""}"#, PublishOpts::default())
            .await
            .unwrap();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.topic, "zigbee2mqtt/croc");
        assert_eq!(evt.payload_str(), r#"{"state":"OFF"}"#);
    }

    #[tokio::test(start_paused = true)]
    async fn device_sim_applies_set() {
        let link = MockLink::new();
        let mut rx = link.messages();
        let _sim = spawn_device_sim(&link, "zigbee2mqtt", "croc", "OFF", Duration::from_millis(50));
        tokio::task::yield_now().await;

        link.publish("zigbee2mqtt/croc/set", br#"{"state":"ON"}"#, PublishOpts::default())
            .await
            .unwrap();
        let evt = rx.recv().await.unwrap();
        assert_eq!(evt.payload_str(), r#"{"state":"ON"}"#);
    }
}
