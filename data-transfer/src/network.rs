// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Transport agnostic connection interface over a data transfer service.

use embassy_time::Timer;

use crate::gatt::GattServer;
use crate::incoming::{Incoming, ReceiveHandler};
use crate::service::DataTransferService;
use crate::transfer::DataTransfer;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NetworkError {
    InvalidService,
    NotConnected,
    NotInitialized,
    InUse,
    Timeout,
}

pub struct BleNetwork<'a, G, const S: usize, const TX: usize> {
    transfer: &'a DataTransfer<G, S, TX>,
}

impl<'a, G: GattServer, const S: usize, const TX: usize> BleNetwork<'a, G, S, TX> {
    pub fn new(transfer: &'a DataTransfer<G, S, TX>) -> Self {
        Self { transfer }
    }

    /// Opens a connection over service `service_id` if it is free.
    pub fn create(&self, service_id: usize) -> Result<BleConnection<'a, G, S, TX>, NetworkError> {
        let service = self.transfer.service(service_id).ok_or(NetworkError::InvalidService)?;
        if !self.transfer.link().is_connected() {
            return Err(NetworkError::NotConnected);
        }
        if !service.is_initialized() {
            return Err(NetworkError::NotInitialized);
        }
        if service.is_open() {
            return Err(NetworkError::InUse);
        }
        Ok(BleConnection {
            transfer: self.transfer,
            service,
        })
    }

    /// Like [`BleNetwork::create`], waiting for the link to come up.
    pub async fn create_with_retry(&self, service_id: usize) -> Result<BleConnection<'a, G, S, TX>, NetworkError> {
        let config = self.transfer.link().config();
        let mut attempts = 0;
        loop {
            match self.create(service_id) {
                Err(NetworkError::NotConnected | NetworkError::NotInitialized) if attempts < config.create_retries => {
                    attempts += 1;
                    Timer::after(config.create_retry_wait).await;
                }
                result => return result,
            }
        }
    }
}

/// An open connection, bound to one service instance.
pub struct BleConnection<'a, G, const S: usize, const TX: usize> {
    transfer: &'a DataTransfer<G, S, TX>,
    service: &'a DataTransferService<TX>,
}

impl<G: GattServer, const S: usize, const TX: usize> BleConnection<'_, G, S, TX> {
    pub fn service_id(&self) -> u8 {
        self.service.id()
    }

    /// Registers the handler for incoming messages; this marks the service as taken.
    pub fn set_receive_callback(&self, handler: &'static dyn ReceiveHandler) {
        self.service.set_receiver(Some(handler));
    }

    pub async fn send(&self, message: &[u8]) -> usize {
        self.service.send(self.transfer.link(), message).await
    }

    /// Copies from the message currently lent to the receive handler.
    pub fn receive(&self, message: &mut Incoming<'_>, buf: &mut [u8]) -> usize {
        message.receive(buf)
    }

    /// Unregisters the receive handler and frees the service for another `create`.
    pub fn close(&self) {
        if self.service.is_open() {
            self.service.set_receiver(None);
        }
    }

    /// Clears the send buffer of a closed connection.
    pub async fn destroy(self) -> Result<(), NetworkError> {
        if self.service.is_open() {
            return Err(NetworkError::InUse);
        }
        let timeout = self.transfer.link().config().send_timeout;
        if self.service.reset_send_buffer(timeout).await {
            Ok(())
        } else {
            Err(NetworkError::Timeout)
        }
    }
}
