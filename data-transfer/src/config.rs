// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::{CREATE_CONNECTION_RETRY, CREATE_CONNECTION_WAIT_MS, PREFERRED_MTU, RX_BUFFER_SIZE, SEND_TIMEOUT_MS};
use embassy_time::Duration;

/// Runtime tunables of the data transfer services.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DataTransferConfig {
    /// MTU the link starts with and returns to after a disconnect.
    pub preferred_mtu: u16,
    /// Budget for a large send: waiting for the previous transfer, then for the peer to drain.
    pub send_timeout: Duration,
    /// First allocation of the reassembly buffer.
    pub rx_initial_size: usize,
    pub create_retries: u32,
    pub create_retry_wait: Duration,
}

impl Default for DataTransferConfig {
    fn default() -> Self {
        Self {
            preferred_mtu: PREFERRED_MTU,
            send_timeout: Duration::from_millis(SEND_TIMEOUT_MS),
            rx_initial_size: RX_BUFFER_SIZE,
            create_retries: CREATE_CONNECTION_RETRY,
            create_retry_wait: Duration::from_millis(CREATE_CONNECTION_WAIT_MS),
        }
    }
}
