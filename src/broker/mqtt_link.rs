// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! MQTT broker connection.
//!
//! A thin, shareable wrapper over `rumqttc` implementing [`BrokerLink`].
//! The connection owns a background task that polls the MQTT event loop and
//! fans inbound publishes out on a broadcast channel.
//!
//! # Examples
//!
//! ```no_run
//! use mqtt_maison::broker::MqttLink;
//!
//! # async fn example() -> mqtt_maison::Result<()> {
//! let link = MqttLink::builder()
//!     .host("192.168.1.50")
//!     .port(1883)
//!     .credentials("user", "password")
//!     .build()
//!     .await?;
//!
//! if link.is_connected() {
//!     println!("Connected to MQTT broker");
//! }
//!
//! link.disconnect().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use tokio::sync::{broadcast, oneshot};

use crate::broker::{BrokerLink, MsgEvent, PublishOpts, Qos};
use crate::error::BrokerError;

/// Global counter for generating unique client IDs.
static CLIENT_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Capacity of the inbound fan-out channel.
const INBOUND_CAPACITY: usize = 256;

const fn to_rumqttc_qos(qos: Qos) -> QoS {
    match qos {
        Qos::AtMostOnce => QoS::AtMostOnce,
        Qos::AtLeastOnce => QoS::AtLeastOnce,
    }
}

/// Configuration for an MQTT broker connection.
#[derive(Debug, Clone)]
pub struct MqttLinkConfig {
    host: String,
    port: u16,
    credentials: Option<(String, String)>,
    keep_alive: Duration,
    connection_timeout: Duration,
}

impl Default for MqttLinkConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 1883,
            credentials: None,
            keep_alive: Duration::from_secs(30),
            connection_timeout: Duration::from_secs(10),
        }
    }
}

/// A persistent MQTT broker connection.
///
/// `MqttLink` is cheaply cloneable (via `Arc`) and safe to share across the
/// routing and control layers.
#[derive(Clone)]
pub struct MqttLink {
    inner: Arc<MqttLinkInner>,
}

struct MqttLinkInner {
    client: AsyncClient,
    inbound_tx: broadcast::Sender<MsgEvent>,
    config: MqttLinkConfig,
    connected: AtomicBool,
}

impl MqttLink {
    /// Creates a new builder for configuring a connection.
    #[must_use]
    pub fn builder() -> MqttLinkBuilder {
        MqttLinkBuilder::default()
    }

    /// Returns whether the link is currently connected.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.connected.load(Ordering::Acquire)
    }

    /// Returns the host address of the broker.
    #[must_use]
    pub fn host(&self) -> &str {
        &self.inner.config.host
    }

    /// Returns the port of the broker.
    #[must_use]
    pub fn port(&self) -> u16 {
        self.inner.config.port
    }

    /// Disconnects from the broker.
    ///
    /// # Errors
    ///
    /// Returns an error if the disconnect operation fails.
    pub async fn disconnect(&self) -> Result<(), BrokerError> {
        tracing::info!(
            host = %self.inner.config.host,
            port = %self.inner.config.port,
            "Disconnecting from MQTT broker"
        );
        self.inner
            .client
            .disconnect()
            .await
            .map_err(BrokerError::Mqtt)?;
        self.inner.connected.store(false, Ordering::Release);
        Ok(())
    }
}

impl BrokerLink for MqttLink {
    async fn subscribe(&self, topic: &str, qos: Qos) -> Result<(), BrokerError> {
        self.inner
            .client
            .subscribe(topic, to_rumqttc_qos(qos))
            .await
            .map_err(BrokerError::Mqtt)?;
        tracing::debug!(topic = %topic, "Subscribed to topic");
        Ok(())
    }

    async fn unsubscribe(&self, topic: &str) -> Result<(), BrokerError> {
        self.inner
            .client
            .unsubscribe(topic)
            .await
            .map_err(BrokerError::Mqtt)?;
        tracing::debug!(topic = %topic, "Unsubscribed from topic");
        Ok(())
    }

    async fn publish(
        &self,
        topic: &str,
        payload: &[u8],
        opts: PublishOpts,
    ) -> Result<(), BrokerError> {
        self.inner
            .client
            .publish(topic, to_rumqttc_qos(opts.qos), opts.retain, payload)
            .await
            .map_err(BrokerError::Mqtt)?;
        tracing::debug!(topic = %topic, bytes = payload.len(), "Published message");
        Ok(())
    }

    fn messages(&self) -> broadcast::Receiver<MsgEvent> {
        self.inner.inbound_tx.subscribe()
    }
}

impl std::fmt::Debug for MqttLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MqttLink")
            .field("host", &self.inner.config.host)
            .field("port", &self.inner.config.port)
            .field("connected", &self.is_connected())
            .finish()
    }
}

/// Builder for creating an MQTT broker connection.
///
/// # Examples
///
/// ```no_run
/// use mqtt_maison::broker::MqttLink;
/// use std::time::Duration;
///
/// # async fn example() -> mqtt_maison::Result<()> {
/// let link = MqttLink::builder()
///     .host("192.168.1.50")
///     .port(1883)
///     .credentials("user", "password")
///     .keep_alive(Duration::from_secs(60))
///     .connection_timeout(Duration::from_secs(5))
///     .build()
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Default)]
pub struct MqttLinkBuilder {
    config: MqttLinkConfig,
}

impl MqttLinkBuilder {
    /// Sets the broker host address.
    #[must_use]
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.config.host = host.into();
        self
    }

    /// Sets the broker port (default: 1883).
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.config.port = port;
        self
    }

    /// Sets authentication credentials.
    #[must_use]
    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.config.credentials = Some((username.into(), password.into()));
        self
    }

    /// Sets the keep-alive interval (default: 30 seconds).
    #[must_use]
    pub fn keep_alive(mut self, duration: Duration) -> Self {
        self.config.keep_alive = duration;
        self
    }

    /// Sets the connection timeout (default: 10 seconds).
    #[must_use]
    pub fn connection_timeout(mut self, duration: Duration) -> Self {
        self.config.connection_timeout = duration;
        self
    }

    /// Builds and connects to the MQTT broker.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Host is not set
    /// - Connection fails
    /// - Connection times out
    pub async fn build(self) -> Result<MqttLink, BrokerError> {
        if self.config.host.is_empty() {
            return Err(BrokerError::InvalidAddress(
                "MQTT broker host is required".to_string(),
            ));
        }

        let counter = CLIENT_ID_COUNTER.fetch_add(1, Ordering::Relaxed);
        let client_id = format!("maison_{}_{}", std::process::id(), counter);

        let mut mqtt_options = MqttOptions::new(&client_id, &self.config.host, self.config.port);
        mqtt_options.set_keep_alive(self.config.keep_alive);
        mqtt_options.set_clean_session(true);

        if let Some((ref username, ref password)) = self.config.credentials {
            mqtt_options.set_credentials(username, password);
        }

        let (client, event_loop) = AsyncClient::new(mqtt_options, 10);
        let (inbound_tx, _) = broadcast::channel(INBOUND_CAPACITY);

        let link = MqttLink {
            inner: Arc::new(MqttLinkInner {
                client,
                inbound_tx,
                config: self.config.clone(),
                connected: AtomicBool::new(false),
            }),
        };

        // Channel to signal when ConnAck is received
        let (connack_tx, connack_rx) = oneshot::channel();

        let link_clone = link.clone();
        tokio::spawn(async move {
            handle_link_events(event_loop, link_clone, Some(connack_tx)).await;
        });

        // Wait for ConnAck with timeout
        let timeout = self.config.connection_timeout;
        match tokio::time::timeout(timeout, connack_rx).await {
            Ok(Ok(())) => {
                link.inner.connected.store(true, Ordering::Release);
                tracing::info!(
                    host = %self.config.host,
                    port = %self.config.port,
                    "Connected to MQTT broker"
                );
            }
            Ok(Err(_)) => {
                return Err(BrokerError::ConnectionFailed(
                    "MQTT event loop terminated unexpectedly".to_string(),
                ));
            }
            Err(_) => {
                return Err(BrokerError::ConnectionFailed(format!(
                    "MQTT connection timeout after {}s",
                    timeout.as_secs()
                )));
            }
        }

        Ok(link)
    }
}

/// Polls the MQTT event loop, fanning inbound publishes out to subscribers.
async fn handle_link_events(
    mut event_loop: EventLoop,
    link: MqttLink,
    mut connack_tx: Option<oneshot::Sender<()>>,
) {
    loop {
        match event_loop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(connack))) => {
                tracing::debug!(?connack, "MQTT broker connected");
                link.inner.connected.store(true, Ordering::Release);
                if let Some(tx) = connack_tx.take() {
                    let _ = tx.send(());
                }
            }
            Ok(Event::Incoming(Packet::SubAck(suback))) => {
                tracing::debug!(?suback, "MQTT subscription acknowledged");
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                tracing::trace!(
                    topic = %publish.topic,
                    bytes = publish.payload.len(),
                    "MQTT message received"
                );
                // Send errors mean no receiver is listening right now.
                let _ = link
                    .inner
                    .inbound_tx
                    .send(MsgEvent::new(publish.topic.clone(), publish.payload.to_vec()));
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                tracing::info!("MQTT broker disconnected");
                link.inner.connected.store(false, Ordering::Release);
                break;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::error!(error = %e, "MQTT event loop error");
                link.inner.connected.store(false, Ordering::Release);
                break;
            }
        }
    }
}
