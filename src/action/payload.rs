// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde_json::{Value, json};

use crate::action::MaisonAction;
use crate::error::ValidationError;

/// The envelope carried on the logical-action bus.
///
/// Wire shape: `{"action": "<name>", "dob": "<rfc3339-ms>"}`. The `dob`
/// (date of birth) records when the action was minted, so consumers can
/// measure delivery latency.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionPayload {
    /// The logical action to dispatch.
    pub action: MaisonAction,
    /// When the action was minted.
    pub dob: DateTime<FixedOffset>,
}

impl ActionPayload {
    /// Mints a payload for `action` stamped with the current time.
    #[must_use]
    pub fn mint(action: MaisonAction) -> Self {
        Self {
            action,
            dob: Utc::now().fixed_offset(),
        }
    }

    /// Parses a payload from raw JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the bytes are not a JSON object,
    /// the action name is unknown, or the timestamp does not parse.
    pub fn parse(raw: &[u8]) -> Result<Self, ValidationError> {
        let value: Value = serde_json::from_slice(raw)?;
        let Value::Object(map) = value else {
            return Err(ValidationError::PayloadNotObject);
        };
        let action = map
            .get("action")
            .and_then(Value::as_str)
            .ok_or(ValidationError::PayloadNotObject)?
            .parse::<MaisonAction>()?;
        let dob_raw = map
            .get("dob")
            .and_then(Value::as_str)
            .ok_or(ValidationError::PayloadNotObject)?;
        let dob = DateTime::parse_from_rfc3339(dob_raw)
            .map_err(|_| ValidationError::InvalidTimestamp(dob_raw.to_string()))?;
        Ok(Self { action, dob })
    }

    /// Encodes the payload to its JSON wire form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let value = json!({
            "action": self.action.as_str(),
            "dob": self.dob.to_rfc3339_opts(SecondsFormat::Millis, true),
        });
        value.to_string().into_bytes()
    }

    /// Milliseconds elapsed since the payload was minted.
    ///
    /// Clamps to zero when the mint timestamp lies in the future.
    #[must_use]
    pub fn age_ms(&self) -> u64 {
        let delta = Utc::now().signed_duration_since(self.dob);
        u64::try_from(delta.num_milliseconds()).unwrap_or(0)
    }
}
