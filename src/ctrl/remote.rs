// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Remote-control ingress.
//!
//! The physical remote publishes raw event strings on its own topic. This
//! adapter maps each event to a logical action and re-publishes it as an
//! [`ActionPayload`] on the action bus, where the dispatcher picks it up.
//! Unmapped events are logged and discarded.

use std::sync::Arc;

use crate::action::{ActionPayload, map_remote_event};
use crate::broker::{BrokerLink, PublishOpts, Qos};
use crate::config::TopicScheme;
use crate::error::Result;
use crate::router::{MsgRouter, RouterHandle};

/// Bridges raw remote events onto the action bus.
pub struct RemoteAdapter {
    _sub: RouterHandle,
}

impl RemoteAdapter {
    /// Subscribes the remote's action topic for the process lifetime.
    ///
    /// # Errors
    ///
    /// Returns an error if the broker rejects the subscription.
    pub async fn init<L: BrokerLink>(
        router: Arc<MsgRouter<L>>,
        topics: &TopicScheme,
    ) -> Result<Self> {
        let remote_topic = topics.remote_action_topic();
        let bus_topic = topics.action_bus_topic();
        let publisher = Arc::clone(&router);

        let sub = router
            .subscribe(&remote_topic, Qos::AtLeastOnce, move |evt| {
                let raw = evt.payload_str();
                let Some(action) = map_remote_event(raw.trim()) else {
                    tracing::warn!(event = %raw, "Unmapped remote event, discarded");
                    return;
                };
                tracing::debug!(event = %raw, action = %action, "Remote event mapped");

                let payload = ActionPayload::mint(action);
                let publisher = Arc::clone(&publisher);
                let bus_topic = bus_topic.clone();
                tokio::spawn(async move {
                    if let Err(e) = publisher
                        .publish(&bus_topic, &payload.encode(), PublishOpts::default())
                        .await
                    {
                        tracing::warn!(action = %payload.action, error = %e, "Failed to publish action");
                    }
                });
            })
            .await?;

        Ok(Self { _sub: sub })
    }
}
