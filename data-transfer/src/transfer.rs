// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{MQTT_SERVICE_ID, NUM_DATA_TRANSFER_SERVICES, TX_BUFFER_SIZE, WIFI_PROVISIONING_SERVICE_ID};

use crate::config::DataTransferConfig;
use crate::event::GattEvent;
use crate::gatt::{GattError, GattServer};
use crate::link::LinkContext;
use crate::service::DataTransferService;

/// Well known service instances.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ServiceId {
    Mqtt,
    WifiProvisioning,
}

impl ServiceId {
    pub const fn index(self) -> usize {
        match self {
            ServiceId::Mqtt => MQTT_SERVICE_ID as usize,
            ServiceId::WifiProvisioning => WIFI_PROVISIONING_SERVICE_ID as usize,
        }
    }
}

/// The link context together with every service instance multiplexed over it.
pub struct DataTransfer<G, const S: usize = NUM_DATA_TRANSFER_SERVICES, const TX: usize = TX_BUFFER_SIZE> {
    link: LinkContext<G>,
    services: [DataTransferService<TX>; S],
}

impl<G: GattServer, const S: usize, const TX: usize> DataTransfer<G, S, TX> {
    pub fn new(gatt: G, config: DataTransferConfig) -> Self {
        Self {
            link: LinkContext::new(gatt, config),
            services: core::array::from_fn(|id| DataTransferService::new(id as u8)),
        }
    }

    /// Registers the GATT services that are not registered yet.
    pub fn init(&self) -> Result<(), GattError> {
        for service in &self.services {
            service.init(self.link.gatt())?;
        }
        Ok(())
    }

    pub fn link(&self) -> &LinkContext<G> {
        &self.link
    }

    pub fn service(&self, id: usize) -> Option<&DataTransferService<TX>> {
        self.services.get(id)
    }

    pub fn services(&self) -> &[DataTransferService<TX>] {
        &self.services
    }

    /// Dispatches an event received from the BLE stack.
    pub fn handle_event(&self, event: GattEvent<'_>) {
        match event {
            GattEvent::Connected { conn_id } => {
                info!("Connected, conn_id {}", conn_id);
                self.link.on_connected(conn_id);
            }
            GattEvent::Disconnected { conn_id } => {
                info!("Disconnected, conn_id {}", conn_id);
                for service in &self.services {
                    service.on_disconnected();
                }
                self.link.on_disconnected();
            }
            GattEvent::MtuChanged { mtu, .. } => {
                self.link.on_mtu_changed(mtu);
                debug!("MTU changed to {}", self.link.mtu());
            }
            GattEvent::Read(request) => {
                if let Some(service) = self.service_for_handle(request.handle) {
                    service.on_read(&self.link, &request);
                }
            }
            GattEvent::Write(request) => {
                if let Some(service) = self.service_for_handle(request.handle) {
                    service.on_write(&self.link, &request);
                }
            }
        }
    }

    fn service_for_handle(&self, handle: u16) -> Option<&DataTransferService<TX>> {
        self.services.iter().find(|service| service.owns_handle(handle))
    }
}
