// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! GATT attribute table of one data transfer service instance.

use bitflags::bitflags;
use consts::{CCCD_UUID, DATA_TRANSFER_UUID_MASK};

/// Number of attributes in a data transfer service, declaration included.
pub const ATTRIBUTE_COUNT: usize = 7;

/// Handles assigned by the GATT stack, indexed by [`Attribute`].
pub type AttributeHandles = [u16; ATTRIBUTE_COUNT];

/// Position of each attribute in the service table.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(usize)]
pub enum Attribute {
    Service = 0,
    TxChar,
    TxCccd,
    RxChar,
    TxLargeChar,
    TxLargeCccd,
    RxLargeChar,
}

impl Attribute {
    pub const ALL: [Attribute; ATTRIBUTE_COUNT] = [
        Attribute::Service,
        Attribute::TxChar,
        Attribute::TxCccd,
        Attribute::RxChar,
        Attribute::TxLargeChar,
        Attribute::TxLargeCccd,
        Attribute::RxLargeChar,
    ];

    /// Looks up the attribute a handle belongs to.
    pub fn from_handle(handles: &AttributeHandles, handle: u16) -> Option<Self> {
        handles
            .iter()
            .position(|&h| h == handle)
            .map(|idx| Self::ALL[idx])
    }

    /// Identifier placed in byte 0 of the 128-bit UUID.
    fn uuid_id(self) -> Option<u8> {
        match self {
            Attribute::Service => Some(0x00),
            Attribute::TxChar => Some(0x02),
            Attribute::RxChar => Some(0x03),
            Attribute::TxLargeChar => Some(0x04),
            Attribute::RxLargeChar => Some(0x05),
            Attribute::TxCccd | Attribute::TxLargeCccd => None,
        }
    }
}

bitflags! {
    /// Characteristic properties as advertised in the declaration.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Properties: u8 {
        const READ = 0x02;
        const WRITE_WITHOUT_RESPONSE = 0x04;
        const WRITE = 0x08;
        const NOTIFY = 0x10;
    }
}

bitflags! {
    /// Access permissions of an attribute value.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct Permissions: u8 {
        const READ = 0x01;
        const WRITE = 0x02;
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Uuid {
    Uuid16(u16),
    /// Little endian byte order, as sent over the air.
    Uuid128([u8; 16]),
}

impl Uuid {
    /// Builds the 128-bit UUID of `attribute` for service instance `service_id`.
    pub fn data_transfer(attribute: Attribute, service_id: u8) -> Option<Self> {
        let id = attribute.uuid_id()?;
        let mut bytes = [0u8; 16];
        bytes[0] = id;
        bytes[1] = service_id;
        bytes[2..].copy_from_slice(&DATA_TRANSFER_UUID_MASK);
        Some(Uuid::Uuid128(bytes))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeKind {
    PrimaryService,
    Characteristic(Properties),
    Descriptor,
}

/// One row of the table handed to the GATT stack.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeDef {
    pub kind: AttributeKind,
    pub uuid: Uuid,
    pub permissions: Permissions,
}

pub type ServiceTable = [AttributeDef; ATTRIBUTE_COUNT];

/// Attribute table of the data transfer service instance `service_id`.
pub fn service_table(service_id: u8) -> ServiceTable {
    let uuid = |attribute| match Uuid::data_transfer(attribute, service_id) {
        Some(uuid) => uuid,
        None => Uuid::Uuid16(CCCD_UUID),
    };
    let rw = Permissions::READ | Permissions::WRITE;
    let characteristic = |attribute, properties, permissions| AttributeDef {
        kind: AttributeKind::Characteristic(properties),
        uuid: uuid(attribute),
        permissions,
    };
    let cccd = AttributeDef {
        kind: AttributeKind::Descriptor,
        uuid: Uuid::Uuid16(CCCD_UUID),
        permissions: rw,
    };

    [
        AttributeDef {
            kind: AttributeKind::PrimaryService,
            uuid: uuid(Attribute::Service),
            permissions: Permissions::empty(),
        },
        characteristic(Attribute::TxChar, Properties::READ | Properties::NOTIFY, Permissions::READ),
        cccd,
        characteristic(Attribute::RxChar, Properties::READ | Properties::WRITE | Properties::WRITE_WITHOUT_RESPONSE, rw),
        characteristic(Attribute::TxLargeChar, Properties::READ | Properties::NOTIFY, Permissions::READ),
        cccd,
        characteristic(Attribute::RxLargeChar, Properties::READ | Properties::WRITE | Properties::WRITE_WITHOUT_RESPONSE, rw),
    ]
}
