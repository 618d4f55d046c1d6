// SPDX-License-Identifier: MPL-2.0
// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Device control layers.
//!
//! [`BinaryStateCtrl`] speaks the set+confirm protocol to individual
//! devices. [`MaisonCtrl`] sits above it, turning logical actions into
//! group-level behaviors. [`RemoteAdapter`] feeds the action bus from raw
//! remote-control events.

mod binary;
mod dispatcher;
mod remote;

pub use binary::BinaryStateCtrl;
pub use dispatcher::MaisonCtrl;
pub use remote::RemoteAdapter;
