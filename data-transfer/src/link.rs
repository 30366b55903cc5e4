// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::sync::atomic::{AtomicBool, AtomicU16, Ordering};

use consts::{ATT_HEADER_LEN, DEFAULT_ATT_MTU, MAX_ATT_MTU};

use crate::config::DataTransferConfig;

/// State of the single BLE link shared by every service instance.
pub struct LinkContext<G> {
    gatt: G,
    config: DataTransferConfig,
    mtu: AtomicU16,
    connected: AtomicBool,
    conn_id: AtomicU16,
}

impl<G> LinkContext<G> {
    pub fn new(gatt: G, config: DataTransferConfig) -> Self {
        Self {
            gatt,
            mtu: AtomicU16::new(clamp_mtu(config.preferred_mtu)),
            config,
            connected: AtomicBool::new(false),
            conn_id: AtomicU16::new(0),
        }
    }

    pub fn gatt(&self) -> &G {
        &self.gatt
    }

    pub fn config(&self) -> &DataTransferConfig {
        &self.config
    }

    pub fn mtu(&self) -> u16 {
        self.mtu.load(Ordering::Acquire)
    }

    /// Payload carried by one notification, read response or write.
    pub fn transmit_len(&self) -> usize {
        self.mtu() as usize - ATT_HEADER_LEN
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn conn_id(&self) -> u16 {
        self.conn_id.load(Ordering::Acquire)
    }

    pub(crate) fn on_connected(&self, conn_id: u16) {
        self.conn_id.store(conn_id, Ordering::Release);
        self.connected.store(true, Ordering::Release);
    }

    pub(crate) fn on_disconnected(&self) {
        self.connected.store(false, Ordering::Release);
        self.mtu.store(clamp_mtu(self.config.preferred_mtu), Ordering::Release);
    }

    pub(crate) fn on_mtu_changed(&self, mtu: u16) {
        self.mtu.store(clamp_mtu(mtu), Ordering::Release);
    }
}

fn clamp_mtu(mtu: u16) -> u16 {
    mtu.clamp(DEFAULT_ATT_MTU, MAX_ATT_MTU)
}
