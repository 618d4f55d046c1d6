// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Logical actions and the action bus payload.
//!
//! Raw remote-control events (vendor strings like `dots_2_double_press`)
//! map onto a closed enumeration of logical actions through a static table.
//! Unmapped events are discarded by the caller.

mod payload;

pub use payload::ActionPayload;

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// A logical action derived from a raw remote-control event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaisonAction {
    /// Toggle the primary action group.
    Main,
    /// Drive the primary group ON.
    Up,
    /// Held variant of `up`; recognized but unhandled.
    UpHold,
    /// Drive the primary group OFF.
    Down,
    /// Held variant of `down`; recognized but unhandled.
    DownHold,
    /// Advance the selection cursor over the etc group.
    Next,
    /// Retreat the selection cursor over the etc group.
    Prev,
    /// Single dot press; deliberate no-op.
    Dot,
    /// Double dot press: toggle the etc group as a whole.
    DotDouble,
    /// Long dot press; recognized but unhandled.
    DotLong,
    /// Double-dot press: blink the currently selected device.
    Dots,
    /// Double-dot double press: toggle the currently selected device.
    DotsDouble,
    /// Double-dot long press; recognized but unhandled.
    DotsLong,
}

impl MaisonAction {
    /// Returns the wire string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Up => "up",
            Self::UpHold => "up_hold",
            Self::Down => "down",
            Self::DownHold => "down_hold",
            Self::Next => "next",
            Self::Prev => "prev",
            Self::Dot => "dot",
            Self::DotDouble => "dot_double",
            Self::DotLong => "dot_long",
            Self::Dots => "dots",
            Self::DotsDouble => "dots_double",
            Self::DotsLong => "dots_long",
        }
    }
}

impl fmt::Display for MaisonAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for MaisonAction {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" => Ok(Self::Main),
            "up" => Ok(Self::Up),
            "up_hold" => Ok(Self::UpHold),
            "down" => Ok(Self::Down),
            "down_hold" => Ok(Self::DownHold),
            "next" => Ok(Self::Next),
            "prev" => Ok(Self::Prev),
            "dot" => Ok(Self::Dot),
            "dot_double" => Ok(Self::DotDouble),
            "dot_long" => Ok(Self::DotLong),
            "dots" => Ok(Self::Dots),
            "dots_double" => Ok(Self::DotsDouble),
            "dots_long" => Ok(Self::DotsLong),
            _ => Err(ValidationError::UnknownAction(s.to_string())),
        }
    }
}

/// Maps a raw remote-control event string to a logical action.
///
/// The table covers the IKEA Symfonisk remote's event vocabulary. Events
/// with no mapping return `None` and should be discarded by the caller.
#[must_use]
pub fn map_remote_event(event: &str) -> Option<MaisonAction> {
    match event {
        "toggle" => Some(MaisonAction::Main),
        "volume_up" => Some(MaisonAction::Up),
        "volume_up_hold" => Some(MaisonAction::UpHold),
        "volume_down" => Some(MaisonAction::Down),
        "volume_down_hold" => Some(MaisonAction::DownHold),
        "track_next" => Some(MaisonAction::Next),
        "track_previous" => Some(MaisonAction::Prev),
        "dots_1_short_release" => Some(MaisonAction::Dot),
        "dots_1_double_press" => Some(MaisonAction::DotDouble),
        "dots_1_long_release" => Some(MaisonAction::DotLong),
        "dots_2_short_release" => Some(MaisonAction::Dots),
        "dots_2_double_press" => Some(MaisonAction::DotsDouble),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_str_round_trip() {
        let all = [
            MaisonAction::Main,
            MaisonAction::Up,
            MaisonAction::UpHold,
            MaisonAction::Down,
            MaisonAction::DownHold,
            MaisonAction::Next,
            MaisonAction::Prev,
            MaisonAction::Dot,
            MaisonAction::DotDouble,
            MaisonAction::DotLong,
            MaisonAction::Dots,
            MaisonAction::DotsDouble,
            MaisonAction::DotsLong,
        ];
        for action in all {
            assert_eq!(action.as_str().parse::<MaisonAction>().unwrap(), action);
        }
    }

    #[test]
    fn from_str_rejects_unknown() {
        let result = "warp".parse::<MaisonAction>();
        assert!(matches!(result, Err(ValidationError::UnknownAction(_))));
    }

    #[test]
    fn remote_map_known_events() {
        assert_eq!(map_remote_event("toggle"), Some(MaisonAction::Main));
        assert_eq!(map_remote_event("volume_up"), Some(MaisonAction::Up));
        assert_eq!(map_remote_event("volume_down"), Some(MaisonAction::Down));
        assert_eq!(map_remote_event("track_next"), Some(MaisonAction::Next));
        assert_eq!(map_remote_event("track_previous"), Some(MaisonAction::Prev));
        assert_eq!(
            map_remote_event("dots_2_double_press"),
            Some(MaisonAction::DotsDouble)
        );
    }

    #[test]
    fn remote_map_unknown_event() {
        assert_eq!(map_remote_event("dots_2_long_press"), None);
        assert_eq!(map_remote_event(""), None);
    }
}
