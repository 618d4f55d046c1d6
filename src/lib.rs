// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `mqtt_maison` - an MQTT-driven controller for binary smart-home devices.
//!
//! The library speaks the zigbee2mqtt topic conventions: devices broadcast
//! `{"state":"ON"|"OFF"}` on their own topic, accept commands on
//! `<topic>/set`, and rebroadcast on request via `<topic>/get`. On top of
//! that wire model it provides:
//!
//! - **Topic multiplexing**: one broker connection, one broker-level
//!   subscription per topic, any number of local handlers
//!   ([`MsgRouter`]).
//! - **State caching**: the latest broadcast per device, with a shared
//!   "request one if nothing is cached yet" path ([`DeviceStateCache`]).
//! - **Set+confirm**: commanded state changes are confirmed against the
//!   device's own broadcast, with one bounded nudge and a fixed timeout
//!   ([`BinaryStateCtrl`]).
//! - **Action dispatch**: remote-control events become logical actions
//!   driving group toggles, on/off sweeps, and a blink-to-select cursor
//!   ([`MaisonCtrl`]).
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use mqtt_maison::broker::MqttLink;
//! use mqtt_maison::{BinaryState, DeviceDef, Maison, MaisonConfig};
//!
//! #[tokio::main]
//! async fn main() -> mqtt_maison::Result<()> {
//!     let link = MqttLink::builder()
//!         .host("192.168.1.50")
//!         .credentials("user", "password")
//!         .build()
//!         .await?;
//!
//!     let devices = vec![
//!         DeviceDef::new("croc", &["action_main"]),
//!         DeviceDef::new("rabbit", &["action_main"]),
//!         DeviceDef::new("sengled_light_1", &["etc_lights"]),
//!     ];
//!
//!     let maison = Maison::init(Arc::new(link), MaisonConfig::default(), devices).await?;
//!
//!     // Drive a device and wait for its confirming broadcast.
//!     maison.set_binary_state("croc", BinaryState::On).await?;
//!     Ok(())
//! }
//! ```

pub mod action;
pub mod broker;
pub mod config;
mod ctrl;
mod device;
pub mod error;
pub mod router;
mod service;
pub mod state;
pub mod types;

pub use action::{ActionPayload, MaisonAction, map_remote_event};
pub use broker::{BrokerLink, MqttLink, MsgEvent, PublishOpts, Qos};
pub use config::{MaisonConfig, ProtocolTiming, TopicScheme};
pub use ctrl::{BinaryStateCtrl, MaisonCtrl, RemoteAdapter};
pub use device::DeviceDef;
pub use error::{BrokerError, Error, Result, ValidationError};
pub use router::{MsgRouter, RouterHandle};
pub use service::Maison;
pub use state::{DeviceStateCache, StateMsg};
pub use types::BinaryState;
