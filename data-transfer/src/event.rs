// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// Events the BLE stack delivers to the data transfer services.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GattEvent<'a> {
    Connected { conn_id: u16 },
    Disconnected { conn_id: u16 },
    MtuChanged { conn_id: u16, mtu: u16 },
    Read(ReadRequest),
    Write(WriteRequest<'a>),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ReadRequest {
    pub conn_id: u16,
    pub trans_id: u32,
    pub handle: u16,
    pub offset: u16,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriteKind {
    /// Write request, the peer waits for a response.
    Request,
    /// Write command, no response.
    Command,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WriteRequest<'a> {
    pub conn_id: u16,
    pub trans_id: u32,
    pub handle: u16,
    pub offset: u16,
    pub kind: WriteKind,
    /// Part of a queued prepare-write transaction.
    pub is_prep: bool,
    pub value: &'a [u8],
}

impl WriteRequest<'_> {
    pub fn needs_response(&self) -> bool {
        self.kind == WriteKind::Request
    }
}
