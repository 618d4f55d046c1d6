// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device definitions.
//!
//! Definitions are supplied by the embedding process at startup (from a flat
//! file or a store; persistence is out of scope here) and are immutable for
//! the process lifetime. Only binary (ON/OFF) state features are targeted.

use serde::{Deserialize, Serialize};

/// A controllable binary device known to the system.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDef {
    /// The device's broker-facing identifier (friendly name).
    pub name: String,
    /// Group tags this device belongs to (e.g. `action_main`, `etc_lights`).
    #[serde(default)]
    pub groups: Vec<String>,
}

impl DeviceDef {
    /// Creates a definition with the given name and group tags.
    #[must_use]
    pub fn new(name: impl Into<String>, groups: &[&str]) -> Self {
        Self {
            name: name.into(),
            groups: groups.iter().map(ToString::to_string).collect(),
        }
    }

    /// Returns `true` if the device carries the given group tag.
    #[must_use]
    pub fn in_group(&self, tag: &str) -> bool {
        self.groups.iter().any(|g| g == tag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_group_matches_tag() {
        let device = DeviceDef::new("croc", &["action_main", "etc_lights"]);
        assert!(device.in_group("action_main"));
        assert!(device.in_group("etc_lights"));
        assert!(!device.in_group("bedroom"));
    }

    #[test]
    fn deserialize_without_groups() {
        let device: DeviceDef = serde_json::from_str(r#"{"name":"rabbit"}"#).unwrap();
        assert_eq!(device.name, "rabbit");
        assert!(device.groups.is_empty());
    }

    #[test]
    fn deserialize_with_groups() {
        let json = r#"{"name":"sengled_light_1","groups":["etc_lights"]}"#;
        let device: DeviceDef = serde_json::from_str(json).unwrap();
        assert_eq!(device.groups, vec!["etc_lights"]);
    }
}
