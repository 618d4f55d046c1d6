// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Top-level wiring.
//!
//! [`Maison`] assembles the router, state cache, binary controller, action
//! dispatcher, and remote adapter over one broker link, and starts the
//! inbound message drain.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqtt_maison::broker::MqttLink;
//! use mqtt_maison::{DeviceDef, Maison, MaisonConfig};
//!
//! # async fn example() -> mqtt_maison::Result<()> {
//! let link = MqttLink::builder().host("192.168.1.50").build().await?;
//! let devices = vec![
//!     DeviceDef::new("croc", &["action_main"]),
//!     DeviceDef::new("sengled_light_1", &["etc_lights"]),
//! ];
//! let maison = Maison::init(Arc::new(link), MaisonConfig::default(), devices).await?;
//! maison.get_binary_state("croc").await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use crate::action::MaisonAction;
use crate::broker::{BrokerLink, MsgEvent, PublishOpts, Qos};
use crate::config::MaisonConfig;
use crate::ctrl::{BinaryStateCtrl, MaisonCtrl, RemoteAdapter};
use crate::device::DeviceDef;
use crate::error::Result;
use crate::router::{MsgRouter, RouterHandle};
use crate::state::DeviceStateCache;
use crate::types::BinaryState;

/// The assembled controller service.
pub struct Maison<L: BrokerLink> {
    router: Arc<MsgRouter<L>>,
    ctrl: Arc<BinaryStateCtrl<L>>,
    dispatcher: Arc<MaisonCtrl<L>>,
    _remote: RemoteAdapter,
    _bus_sub: RouterHandle,
}

impl<L: BrokerLink> Maison<L> {
    /// Wires all layers over `link` and starts listening.
    ///
    /// # Errors
    ///
    /// Returns an error if any startup subscription is rejected by the
    /// broker.
    pub async fn init(
        link: Arc<L>,
        config: MaisonConfig,
        devices: Vec<DeviceDef>,
    ) -> Result<Arc<Self>> {
        let router = Arc::new(MsgRouter::new(link));
        router.listen();

        let names: Vec<String> = devices.iter().map(|d| d.name.clone()).collect();
        let cache = Arc::new(
            DeviceStateCache::init(Arc::clone(&router), config.topics.clone(), &names).await?,
        );
        let ctrl = Arc::new(BinaryStateCtrl::new(
            Arc::clone(&router),
            cache,
            config.topics.clone(),
            config.timing,
        ));
        let dispatcher = Arc::new(MaisonCtrl::new(Arc::clone(&ctrl), &config, &devices));

        // Action bus consumer. Dispatch runs on its own task so one slow
        // handler cannot stall the routing loop.
        let bus_topic = config.topics.action_bus_topic();
        let consumer = Arc::clone(&dispatcher);
        let bus_sub = router
            .subscribe(&bus_topic, Qos::AtLeastOnce, move |evt| {
                let dispatcher = Arc::clone(&consumer);
                let evt = evt.clone();
                tokio::spawn(async move {
                    dispatcher.handle_msg(&evt).await;
                });
            })
            .await?;

        let remote = RemoteAdapter::init(Arc::clone(&router), &config.topics).await?;

        tracing::info!(devices = names.len(), bus = %bus_topic, "Maison controller started");

        Ok(Arc::new(Self {
            router,
            ctrl,
            dispatcher,
            _remote: remote,
            _bus_sub: bus_sub,
        }))
    }

    /// Drives a device to a state with confirmation.
    ///
    /// # Errors
    ///
    /// See [`BinaryStateCtrl::set_binary_state`].
    pub async fn set_binary_state(&self, device: &str, target: BinaryState) -> Result<()> {
        self.ctrl.set_binary_state(device, target).await
    }

    /// Reads a device's current state string.
    ///
    /// # Errors
    ///
    /// See [`BinaryStateCtrl::get_binary_state`].
    pub async fn get_binary_state(&self, device: &str) -> Result<String> {
        self.ctrl.get_binary_state(device).await
    }

    /// Dispatches a logical action directly, bypassing the action bus.
    pub async fn dispatch(&self, action: MaisonAction) {
        self.dispatcher.dispatch(action).await;
    }

    /// Registers a handler for a topic through the router.
    ///
    /// # Errors
    ///
    /// See [`MsgRouter::subscribe`].
    pub async fn subscribe<F>(&self, topic: &str, qos: Qos, handler: F) -> Result<RouterHandle>
    where
        F: Fn(&MsgEvent) + Send + Sync + 'static,
    {
        self.router.subscribe(topic, qos, handler).await
    }

    /// Publishes a payload through the broker link.
    ///
    /// # Errors
    ///
    /// See [`MsgRouter::publish`].
    pub async fn publish(&self, topic: &str, payload: &[u8], opts: PublishOpts) -> Result<()> {
        self.router.publish(topic, payload, opts).await
    }

    /// The underlying topic router.
    #[must_use]
    pub fn router(&self) -> &Arc<MsgRouter<L>> {
        &self.router
    }

    /// Stops draining inbound messages.
    pub fn shutdown(&self) {
        self.router.unlisten();
        tracing::info!("Maison controller stopped");
    }
}
