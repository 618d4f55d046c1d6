// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The device state cache.
//!
//! Each known device's state topic is subscribed once at startup and held
//! for the process lifetime. The cache remembers the most recent broadcast
//! per device and can answer "what is the current state, requesting one if
//! necessary" without duplicate refresh publishes: concurrent callers before
//! the first broadcast all await the same watch channel, and at most one
//! `{"state":""}` refresh goes out per device.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::broker::{BrokerLink, MsgEvent, PublishOpts, Qos};
use crate::config::TopicScheme;
use crate::error::{BrokerError, Error, Result};
use crate::router::{MsgRouter, RouterHandle};

/// Payload used to ask a device to rebroadcast its state.
pub(crate) const REFRESH_PAYLOAD: &[u8] = br#"{"state":""}"#;

/// A cached device broadcast.
#[derive(Debug, Clone)]
pub struct StateMsg {
    /// The broadcast message as received.
    pub evt: MsgEvent,
    /// When the broadcast was received.
    pub received_at: DateTime<Utc>,
}

struct DeviceEntry {
    /// Holds the latest broadcast; `None` until the first one arrives.
    latest: watch::Sender<Option<StateMsg>>,
    /// A refresh publish has already been issued for this device.
    refresh_sent: bool,
}

/// Latest-state cache over the long-lived per-device subscriptions.
pub struct DeviceStateCache<L: BrokerLink> {
    router: Arc<MsgRouter<L>>,
    topics: TopicScheme,
    entries: Arc<Mutex<HashMap<String, DeviceEntry>>>,
    /// Process-lifetime subscriptions, deliberately never released.
    _subs: Vec<RouterHandle>,
}

impl<L: BrokerLink> DeviceStateCache<L> {
    /// Builds the cache and subscribes each device's state topic.
    ///
    /// # Errors
    ///
    /// Returns an error if any broker subscription fails.
    pub async fn init(
        router: Arc<MsgRouter<L>>,
        topics: TopicScheme,
        devices: &[String],
    ) -> Result<Self> {
        let entries = Arc::new(Mutex::new(HashMap::new()));
        let mut subs = Vec::with_capacity(devices.len());

        for device in devices {
            let (latest, _) = watch::channel(None);
            entries.lock().insert(
                device.clone(),
                DeviceEntry {
                    latest,
                    refresh_sent: false,
                },
            );

            let entries_ref = Arc::clone(&entries);
            let name = device.clone();
            let handle = router
                .subscribe(&topics.state_topic(device), Qos::AtLeastOnce, move |evt: &MsgEvent| {
                    let msg = StateMsg {
                        evt: evt.clone(),
                        received_at: Utc::now(),
                    };
                    let entries = entries_ref.lock();
                    if let Some(entry) = entries.get(&name) {
                        entry.latest.send_replace(Some(msg));
                    }
                })
                .await?;
            subs.push(handle);
        }

        Ok(Self {
            router,
            topics,
            entries,
            _subs: subs,
        })
    }

    /// Returns the cached state, requesting one from the device if nothing
    /// has been observed yet.
    ///
    /// A cached message is returned immediately with no broker traffic.
    /// Otherwise at most one refresh publish goes out and all callers share
    /// the wait for the device's next broadcast.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownDevice`] for devices not configured at
    /// startup, or a broker error if the refresh publish is rejected.
    pub async fn get_or_await_first(&self, device: &str) -> Result<StateMsg> {
        let (mut rx, need_refresh) = {
            let mut entries = self.entries.lock();
            let entry = entries
                .get_mut(device)
                .ok_or_else(|| Error::UnknownDevice(device.to_string()))?;
            if let Some(msg) = entry.latest.borrow().clone() {
                return Ok(msg);
            }
            let need_refresh = !entry.refresh_sent;
            entry.refresh_sent = true;
            (entry.latest.subscribe(), need_refresh)
        };

        if need_refresh {
            let topic = self.topics.get_topic(device);
            tracing::debug!(device = %device, topic = %topic, "Requesting state refresh");
            self.router
                .publish(&topic, REFRESH_PAYLOAD, PublishOpts::default())
                .await?;
        }

        let guard = rx
            .wait_for(Option::is_some)
            .await
            .map_err(|_| Error::Broker(BrokerError::ChannelClosed("state cache".to_string())))?;
        guard
            .clone()
            .ok_or_else(|| Error::Broker(BrokerError::ChannelClosed("state cache".to_string())))
    }

    /// Returns the cached state without any broker interaction, or `None`
    /// when no broadcast has been observed yet.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::UnknownDevice`] for unconfigured devices.
    pub fn peek(&self, device: &str) -> Result<Option<StateMsg>> {
        let entries = self.entries.lock();
        let entry = entries
            .get(device)
            .ok_or_else(|| Error::UnknownDevice(device.to_string()))?;
        Ok(entry.latest.borrow().clone())
    }
}
