// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration for the maison controller.
//!
//! The values here are explicit and defaulted; loading them from the
//! environment or a config file is the embedding process's job.

use std::time::Duration;

/// Topic rendering for the broker conventions this system speaks.
///
/// | Purpose | Shape |
/// |---|---|
/// | Device state broadcast | `<z2m_prefix>/<device>` |
/// | Device command | `<z2m_prefix>/<device>/set` |
/// | Device state refresh | `<z2m_prefix>/<device>/get` |
/// | Raw remote events | `<z2m_prefix>/<remote>/action` |
/// | Logical-action bus | `<app_prefix>/<channel>` |
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicScheme {
    /// Vendor prefix the devices publish under (e.g. `zigbee2mqtt`).
    pub z2m_prefix: String,
    /// Prefix for this application's own topics.
    pub app_prefix: String,
    /// Channel name for the logical-action bus.
    pub action_channel: String,
    /// Friendly name of the remote control publishing raw events.
    pub remote_name: String,
}

impl Default for TopicScheme {
    fn default() -> Self {
        Self {
            z2m_prefix: "zigbee2mqtt".to_string(),
            app_prefix: "ezd".to_string(),
            action_channel: "etc".to_string(),
            remote_name: "symfonisk_remote".to_string(),
        }
    }
}

impl TopicScheme {
    /// Topic a device broadcasts its state on.
    #[must_use]
    pub fn state_topic(&self, device: &str) -> String {
        format!("{}/{device}", self.z2m_prefix)
    }

    /// Topic a device accepts set commands on.
    #[must_use]
    pub fn set_topic(&self, device: &str) -> String {
        format!("{}/{device}/set", self.z2m_prefix)
    }

    /// Topic a device accepts state refresh requests on.
    #[must_use]
    pub fn get_topic(&self, device: &str) -> String {
        format!("{}/{device}/get", self.z2m_prefix)
    }

    /// Topic the remote control publishes raw events on.
    #[must_use]
    pub fn remote_action_topic(&self) -> String {
        format!("{}/{}/action", self.z2m_prefix, self.remote_name)
    }

    /// The application's logical-action bus topic.
    #[must_use]
    pub fn action_bus_topic(&self) -> String {
        format!("{}/{}", self.app_prefix, self.action_channel)
    }
}

/// Timing knobs for the set+confirm protocol and group actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolTiming {
    /// Wall-clock budget for one set+confirm operation.
    pub confirm_timeout: Duration,
    /// Wait before the single "get" nudge is published.
    pub nudge_grace: Duration,
    /// Target spacing between consecutive toggles of a blink sequence.
    pub toggle_delay: Duration,
    /// Number of on/off blink cycles for selection feedback.
    pub blink_count: u8,
}

impl Default for ProtocolTiming {
    fn default() -> Self {
        Self {
            confirm_timeout: Duration::from_secs(10),
            nudge_grace: Duration::from_millis(800),
            toggle_delay: Duration::from_millis(200),
            blink_count: 2,
        }
    }
}

/// Top-level configuration for a [`Maison`](crate::Maison) instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaisonConfig {
    /// Topic conventions.
    pub topics: TopicScheme,
    /// Protocol timing.
    pub timing: ProtocolTiming,
    /// Group tag selecting the primary action group.
    pub main_group_tag: String,
    /// Group tag selecting the secondary ("etc") selection group.
    pub etc_group_tag: String,
    /// Device whose reading wins when a group disagrees on current state
    /// before a toggle. `None` selects the first device of the group in
    /// configured order.
    pub canonical_device: Option<String>,
}

impl Default for MaisonConfig {
    fn default() -> Self {
        Self {
            topics: TopicScheme::default(),
            timing: ProtocolTiming::default(),
            main_group_tag: "action_main".to_string(),
            etc_group_tag: "etc_lights".to_string(),
            canonical_device: None,
        }
    }
}
