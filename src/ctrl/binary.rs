// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary-state set+confirm protocol.
//!
//! Setting a device's state is not fire-and-forget: the command is
//! published, then a temporary subscription on the device's state topic
//! watches for a broadcast confirming the target state. If nothing arrives
//! within a short grace window, exactly one "get" nudge asks the device to
//! rebroadcast. The whole operation runs under a fixed wall-clock budget
//! and the temporary subscription is released on every exit path.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::broker::{BrokerLink, PublishOpts, Qos};
use crate::config::{ProtocolTiming, TopicScheme};
use crate::error::{BrokerError, Error, Result, ValidationError};
use crate::router::MsgRouter;
use crate::state::{DeviceStateCache, REFRESH_PAYLOAD};
use crate::types::BinaryState;

/// Drives binary devices through set+confirm operations.
pub struct BinaryStateCtrl<L: BrokerLink> {
    router: Arc<MsgRouter<L>>,
    cache: Arc<DeviceStateCache<L>>,
    topics: TopicScheme,
    timing: ProtocolTiming,
}

impl<L: BrokerLink> BinaryStateCtrl<L> {
    /// Creates a controller over the given router and cache.
    #[must_use]
    pub fn new(
        router: Arc<MsgRouter<L>>,
        cache: Arc<DeviceStateCache<L>>,
        topics: TopicScheme,
        timing: ProtocolTiming,
    ) -> Self {
        Self {
            router,
            cache,
            topics,
            timing,
        }
    }

    /// Drives `device` to `target` and waits for a confirming broadcast.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::ConfirmTimeout`] when no broadcast reporting
    /// `target` arrives within the configured budget, or a broker error if
    /// any publish or the temporary subscription is rejected.
    pub async fn set_binary_state(&self, device: &str, target: BinaryState) -> Result<()> {
        let state_topic = self.topics.state_topic(device);
        let (confirm_tx, mut confirm_rx) = mpsc::channel::<()>(4);
        let want = target.as_str();

        // The confirm watch must be in place before the command goes out,
        // or a fast device could confirm into the void.
        let handle = self
            .router
            .subscribe(&state_topic, Qos::AtLeastOnce, move |evt| {
                if let Some(value) = evt.json()
                    && value.get("state").and_then(Value::as_str) == Some(want)
                {
                    let _ = confirm_tx.try_send(());
                }
            })
            .await?;

        let outcome = self.drive_and_confirm(device, target, &mut confirm_rx).await;

        if let Err(e) = self.router.unsubscribe(handle).await {
            tracing::warn!(device = %device, error = %e, "Failed to release confirm subscription");
        }
        outcome
    }

    async fn drive_and_confirm(
        &self,
        device: &str,
        target: BinaryState,
        confirm_rx: &mut mpsc::Receiver<()>,
    ) -> Result<()> {
        let payload = format!(r#"{{"state":"{target}"}}"#);
        self.router
            .publish(
                &self.topics.set_topic(device),
                payload.as_bytes(),
                PublishOpts::default(),
            )
            .await?;
        tracing::debug!(device = %device, target = %target, "Set command published");

        let budget = self.timing.confirm_timeout;
        let confirmed = tokio::time::timeout(budget, async {
            tokio::select! {
                msg = confirm_rx.recv() => return msg.is_some(),
                () = tokio::time::sleep(self.timing.nudge_grace) => {}
            }
            // Grace elapsed without a broadcast; ask once for a rebroadcast.
            tracing::debug!(device = %device, "No confirmation within grace, nudging");
            if let Err(e) = self
                .router
                .publish(
                    &self.topics.get_topic(device),
                    REFRESH_PAYLOAD,
                    PublishOpts::default(),
                )
                .await
            {
                tracing::warn!(device = %device, error = %e, "Nudge publish failed");
            }
            confirm_rx.recv().await.is_some()
        })
        .await;

        match confirmed {
            Ok(true) => {
                tracing::debug!(device = %device, target = %target, "State confirmed");
                Ok(())
            }
            Ok(false) => Err(Error::Broker(BrokerError::ChannelClosed(
                "confirm channel".to_string(),
            ))),
            Err(_) => Err(Error::ConfirmTimeout {
                device: device.to_string(),
                budget_ms: u64::try_from(budget.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }

    /// Reads the device's current state string through the cache.
    ///
    /// # Errors
    ///
    /// Fails with a [`ValidationError`] when the cached payload is not a
    /// JSON object or its `state` field is not a string.
    pub async fn get_binary_state(&self, device: &str) -> Result<String> {
        let msg = self.cache.get_or_await_first(device).await?;
        let value = msg
            .evt
            .json()
            .ok_or(ValidationError::PayloadNotObject)?;
        let Value::Object(map) = value else {
            return Err(ValidationError::PayloadNotObject.into());
        };
        let state = map
            .get("state")
            .and_then(Value::as_str)
            .ok_or(ValidationError::StateNotString)?;
        Ok(state.to_string())
    }
}
