// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Broker transport abstraction.
//!
//! [`BrokerLink`] is the seam between the routing/control layers and the
//! actual MQTT connection. Production code uses [`MqttLink`]; tests swap in
//! an in-memory double so protocol behavior can be exercised without a
//! broker process.

mod mqtt_link;

#[cfg(test)]
pub(crate) mod mock;

pub use mqtt_link::MqttLink;

use std::future::Future;

use tokio::sync::broadcast;

use crate::error::BrokerError;

/// Quality-of-service level for subscriptions and publishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Qos {
    /// Fire and forget.
    AtMostOnce,
    /// Acknowledged delivery.
    #[default]
    AtLeastOnce,
}

/// Options for a single publish.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishOpts {
    /// Delivery guarantee.
    pub qos: Qos,
    /// Whether the broker should retain the message for late subscribers.
    pub retain: bool,
}

/// An inbound message delivered by the broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MsgEvent {
    /// The topic the message arrived on.
    pub topic: String,
    /// The raw payload bytes.
    pub payload: Vec<u8>,
}

impl MsgEvent {
    /// Creates an event from a topic and payload.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// Returns the payload as text, replacing invalid UTF-8.
    #[must_use]
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// Parses the payload as JSON, or `None` if it is not valid JSON.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.payload).ok()
    }
}

/// A connection to a message broker.
///
/// Implementations are shared behind an `Arc` and must be safe to call from
/// multiple tasks concurrently. `subscribe` and `unsubscribe` resolve once
/// the broker has accepted the request; callers may treat a resolved
/// `unsubscribe` as confirmation that no further deliveries for that topic
/// are in flight.
///
/// Methods return explicitly `Send` futures so callers can spawn work that
/// awaits them.
pub trait BrokerLink: Send + Sync + 'static {
    /// Subscribes to a topic. Issuing a subscribe for a topic that is
    /// already subscribed is permitted and harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the subscription.
    fn subscribe(
        &self,
        topic: &str,
        qos: Qos,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Unsubscribes from a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the request.
    fn unsubscribe(&self, topic: &str) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Publishes a payload to a topic.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the publish.
    fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        opts: PublishOpts,
    ) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Returns a receiver over all inbound messages on this connection.
    ///
    /// Every call yields an independent receiver; messages arriving after
    /// the call are delivered to it.
    fn messages(&self) -> broadcast::Receiver<MsgEvent>;
}
