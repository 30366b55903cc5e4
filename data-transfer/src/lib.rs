// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Reliable byte stream transport over BLE GATT.
//!
//! Messages are fragmented to the negotiated MTU, flow controlled by the
//! peer's reads and reassembled on reception. A [`BleNetwork`] exposes each
//! service instance as a connection to transport agnostic upper layers.

#![no_std]

extern crate alloc;

mod fmt;

pub mod attributes;
pub mod config;
pub mod event;
pub mod gatt;
pub mod incoming;
pub mod link;
pub mod network;
pub mod reassembly;
pub mod service;
pub mod transfer;

pub use config::DataTransferConfig;
pub use event::{GattEvent, ReadRequest, WriteKind, WriteRequest};
pub use gatt::{GattError, GattServer, Response, ResponseStatus};
pub use incoming::{Incoming, ReceiveHandler};
pub use link::LinkContext;
pub use network::{BleConnection, BleNetwork, NetworkError};
pub use service::DataTransferService;
pub use transfer::{DataTransfer, ServiceId};

#[cfg(test)]
mod tests;
