// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Error types for the `mqtt_maison` crate.
//!
//! Three failure families exist: payload/argument validation, broker
//! transport failures, and the set+confirm protocol timing out. Validation
//! failures are always local and non-fatal; the offending message is dropped
//! by the caller. Broker and timeout failures propagate as failed operations.

use thiserror::Error;

/// The main error type for this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// A payload or argument failed validation.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The broker rejected or failed a subscribe/unsubscribe/publish.
    #[error("broker error: {0}")]
    Broker(#[from] BrokerError),

    /// A set+confirm operation exhausted its budget without a matching
    /// confirming broadcast. Temporary subscriptions are already released
    /// by the time this surfaces.
    #[error("no state confirmation from '{device}' within {budget_ms} ms")]
    ConfirmTimeout {
        /// The device that never confirmed.
        device: String,
        /// The confirmation budget that elapsed, in milliseconds.
        budget_ms: u64,
    },

    /// A device name was not present in the configured device list.
    #[error("unknown device: {0}")]
    UnknownDevice(String),
}

/// Errors from validating payloads, actions, and state arguments.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// A state string was neither `ON` nor `OFF`.
    #[error("invalid binary state: '{0}'")]
    InvalidState(String),

    /// An action string is not in the recognized action enumeration.
    #[error("unrecognized action: '{0}'")]
    UnknownAction(String),

    /// A message `dob` timestamp was missing or not valid RFC 3339.
    #[error("invalid dob timestamp: '{0}'")]
    InvalidTimestamp(String),

    /// A payload expected to be a JSON object was not.
    #[error("expected payload to be a JSON object")]
    PayloadNotObject,

    /// A payload `state` field was missing or not a string.
    #[error("expected payload.state to be a string")]
    StateNotString,

    /// JSON parsing failed outright.
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from the broker transport.
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The MQTT client rejected the request.
    #[error("MQTT error: {0}")]
    Mqtt(#[from] rumqttc::ClientError),

    /// Connecting to the broker failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Invalid broker address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// An internal channel was closed while an operation was in flight.
    #[error("channel closed: {0}")]
    ChannelClosed(String),
}

/// A specialized Result type for this crate.
pub type Result<T> = std::result::Result<T, Error>;
