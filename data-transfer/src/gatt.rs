// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::attributes::{AttributeHandles, ServiceTable};

/// Failure reported by the underlying GATT stack.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GattError {
    /// The service could not be registered.
    ServiceCreation,
    /// The stack rejected or dropped a notification.
    Notify,
    /// The stack failed to send a read or write response.
    Response,
    /// The peer is no longer reachable.
    Disconnected,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseStatus {
    Success,
    Failure,
}

/// Response to a read or write request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response<'a> {
    pub handle: u16,
    pub status: ResponseStatus,
    pub offset: u16,
    pub value: &'a [u8],
}

impl<'a> Response<'a> {
    pub fn success(handle: u16, value: &'a [u8]) -> Self {
        Self {
            handle,
            status: ResponseStatus::Success,
            offset: 0,
            value,
        }
    }

    pub fn with_status(handle: u16, status: ResponseStatus, value: &'a [u8]) -> Self {
        Self {
            handle,
            status,
            offset: 0,
            value,
        }
    }
}

/// Primitives the BLE stack provides to the data transfer service.
///
/// The platform forwards every GATT event it receives for the registered
/// services to [`DataTransfer::handle_event`](crate::DataTransfer::handle_event);
/// this trait covers the opposite direction.
pub trait GattServer {
    /// Registers a service and returns the handle assigned to each attribute.
    fn create_service(&self, table: &ServiceTable) -> Result<AttributeHandles, GattError>;

    /// Sends a notification (or an indication when `confirm` is set).
    fn send_indication(&self, conn_id: u16, handle: u16, value: &[u8], confirm: bool) -> Result<(), GattError>;

    /// Answers the read or write request identified by `trans_id`.
    fn send_response(&self, conn_id: u16, trans_id: u32, response: &Response<'_>) -> Result<(), GattError>;
}

impl<T: GattServer + ?Sized> GattServer for &T {
    fn create_service(&self, table: &ServiceTable) -> Result<AttributeHandles, GattError> {
        (**self).create_service(table)
    }

    fn send_indication(&self, conn_id: u16, handle: u16, value: &[u8], confirm: bool) -> Result<(), GattError> {
        (**self).send_indication(conn_id, handle, value, confirm)
    }

    fn send_response(&self, conn_id: u16, trans_id: u32, response: &Response<'_>) -> Result<(), GattError> {
        (**self).send_response(conn_id, trans_id, response)
    }
}
