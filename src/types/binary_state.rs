// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The binary device state type.

use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

/// Observable state of a binary device.
///
/// # Examples
///
/// ```
/// use mqtt_maison::BinaryState;
///
/// let on: BinaryState = "ON".parse().unwrap();
/// assert_eq!(on, BinaryState::On);
/// assert_eq!(on.toggled(), BinaryState::Off);
/// assert!("DIM".parse::<BinaryState>().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryState {
    /// Device is off.
    Off,
    /// Device is on.
    On,
}

impl BinaryState {
    /// Returns the wire string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Off => "OFF",
            Self::On => "ON",
        }
    }

    /// Returns the opposite state.
    #[must_use]
    pub const fn toggled(&self) -> Self {
        match self {
            Self::Off => Self::On,
            Self::On => Self::Off,
        }
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for BinaryState {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OFF" => Ok(Self::Off),
            "ON" => Ok(Self::On),
            _ => Err(ValidationError::InvalidState(s.to_string())),
        }
    }
}

impl From<bool> for BinaryState {
    fn from(value: bool) -> Self {
        if value { Self::On } else { Self::Off }
    }
}
