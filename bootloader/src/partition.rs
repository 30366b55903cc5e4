// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Binary partition table: 32 byte entries, an optional MD5 entry and a
//! `0xFFFF` terminator.

use consts::{
    MAX_NVS_PARTITIONS, MAX_OTA_SLOTS, PARTITION_ENTRY_LEN, PARTITION_MAGIC, PARTITION_MD5_MAGIC, PARTITION_TABLE_MAX_LEN,
    PARTITION_TABLE_OFFSET,
};
use embedded_storage::nor_flash::ReadNorFlash;
use heapless::Vec;
use md5::{Digest, Md5};

use crate::error::{BootError, FlashError, TableError};

pub const TYPE_APP: u8 = 0x00;
pub const TYPE_DATA: u8 = 0x01;

pub const SUBTYPE_APP_FACTORY: u8 = 0x00;
pub const SUBTYPE_APP_OTA_MIN: u8 = 0x10;
pub const SUBTYPE_APP_OTA_MAX: u8 = SUBTYPE_APP_OTA_MIN + MAX_OTA_SLOTS as u8 - 1;
pub const SUBTYPE_APP_TEST: u8 = 0x20;

pub const SUBTYPE_DATA_OTA: u8 = 0x00;
pub const SUBTYPE_DATA_PHY: u8 = 0x01;
pub const SUBTYPE_DATA_NVS: u8 = 0x02;

const TERMINATOR: u16 = 0xFFFF;

/// Location of a partition in flash. A zero size means absent.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PartitionPos {
    pub offset: u32,
    pub size: u32,
}

impl PartitionPos {
    pub const fn new(offset: u32, size: u32) -> Self {
        Self { offset, size }
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// First address past the partition, saturating at the top of the address space.
    pub fn end(&self) -> u32 {
        self.offset.saturating_add(self.size)
    }

    fn fits(&self) -> bool {
        self.offset.checked_add(self.size).is_some()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PartitionEntry {
    pub ty: u8,
    pub subtype: u8,
    pub pos: PartitionPos,
    pub label: [u8; 16],
    pub flags: u32,
}

impl PartitionEntry {
    pub fn from_bytes(bytes: &[u8; PARTITION_ENTRY_LEN]) -> Self {
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        let mut label = [0u8; 16];
        label.copy_from_slice(&bytes[12..28]);
        Self {
            ty: bytes[2],
            subtype: bytes[3],
            pos: PartitionPos::new(word(4), word(8)),
            label,
            flags: word(28),
        }
    }

    pub fn to_bytes(&self) -> [u8; PARTITION_ENTRY_LEN] {
        let mut bytes = [0u8; PARTITION_ENTRY_LEN];
        bytes[0..2].copy_from_slice(&PARTITION_MAGIC.to_le_bytes());
        bytes[2] = self.ty;
        bytes[3] = self.subtype;
        bytes[4..8].copy_from_slice(&self.pos.offset.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.pos.size.to_le_bytes());
        bytes[12..28].copy_from_slice(&self.label);
        bytes[28..32].copy_from_slice(&self.flags.to_le_bytes());
        bytes
    }

    pub fn label(&self) -> &str {
        let len = self.label.iter().position(|&b| b == 0).unwrap_or(self.label.len());
        core::str::from_utf8(&self.label[..len]).unwrap_or("?")
    }

    pub fn kind(&self) -> PartitionKind {
        match (self.ty, self.subtype) {
            (TYPE_APP, SUBTYPE_APP_FACTORY) => PartitionKind::Factory,
            (TYPE_APP, SUBTYPE_APP_TEST) => PartitionKind::Test,
            (TYPE_APP, sub @ SUBTYPE_APP_OTA_MIN..=SUBTYPE_APP_OTA_MAX) => {
                PartitionKind::Ota((sub - SUBTYPE_APP_OTA_MIN) as usize)
            }
            (TYPE_APP, _) => PartitionKind::UnknownApp,
            (TYPE_DATA, SUBTYPE_DATA_OTA) => PartitionKind::OtaData,
            (TYPE_DATA, SUBTYPE_DATA_PHY) => PartitionKind::Phy,
            (TYPE_DATA, SUBTYPE_DATA_NVS) => PartitionKind::Nvs,
            (TYPE_DATA, _) => PartitionKind::UnknownData,
            _ => PartitionKind::Unknown,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionKind {
    Factory,
    Test,
    Ota(usize),
    OtaData,
    Phy,
    Nvs,
    UnknownApp,
    UnknownData,
    Unknown,
}

impl PartitionKind {
    fn usage(&self) -> &'static str {
        match self {
            PartitionKind::Factory => "factory app",
            PartitionKind::Test => "test app",
            PartitionKind::Ota(_) => "OTA app",
            PartitionKind::OtaData => "OTA data",
            PartitionKind::Phy => "RF data",
            PartitionKind::Nvs => "WiFi data",
            PartitionKind::UnknownApp | PartitionKind::UnknownData | PartitionKind::Unknown => "unknown",
        }
    }
}

/// Where a boot attempt starts or which partition it tries.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootIndex {
    Factory,
    Test,
    Ota(usize),
}

/// Partitions relevant to booting, as read from the partition table.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BootloaderState {
    pub ota_info: PartitionPos,
    pub factory: PartitionPos,
    pub test: PartitionPos,
    pub ota: [PartitionPos; MAX_OTA_SLOTS],
    /// Number of OTA application partitions.
    pub app_count: usize,
    pub nvs: Vec<PartitionPos, MAX_NVS_PARTITIONS>,
}

impl BootloaderState {
    pub fn partition(&self, index: BootIndex) -> PartitionPos {
        match index {
            BootIndex::Factory => self.factory,
            BootIndex::Test => self.test,
            BootIndex::Ota(slot) => self.ota.get(slot).copied().unwrap_or_default(),
        }
    }

    fn record(&mut self, entry: &PartitionEntry) {
        if !entry.pos.fits() {
            warn!("Partition {} at {:#x} runs past the end of flash, ignoring", entry.label(), entry.pos.offset);
            return;
        }
        match entry.kind() {
            PartitionKind::Factory => self.factory = entry.pos,
            PartitionKind::Test => self.test = entry.pos,
            PartitionKind::Ota(slot) => {
                self.ota[slot] = entry.pos;
                self.app_count += 1;
            }
            PartitionKind::OtaData => self.ota_info = entry.pos,
            PartitionKind::Nvs => {
                if self.nvs.push(entry.pos).is_err() {
                    warn!("Too many NVS partitions, ignoring {}", entry.label());
                }
            }
            PartitionKind::Phy | PartitionKind::UnknownApp | PartitionKind::UnknownData | PartitionKind::Unknown => {}
        }
    }
}

/// Checks the raw table and returns the number of partition entries.
pub fn verify_table(table: &[u8]) -> Result<usize, TableError> {
    let mut count = 0;
    for (index, entry) in table.chunks_exact(PARTITION_ENTRY_LEN).enumerate() {
        match u16::from_le_bytes([entry[0], entry[1]]) {
            PARTITION_MAGIC => count += 1,
            PARTITION_MD5_MAGIC => {
                let digest = Md5::digest(&table[..index * PARTITION_ENTRY_LEN]);
                if digest.as_slice() != &entry[16..32] {
                    return Err(TableError::Md5Mismatch);
                }
            }
            TERMINATOR => return Ok(count),
            _ => return Err(TableError::BadMagic { index }),
        }
    }
    Err(TableError::Unterminated)
}

/// Reads, verifies and classifies the partition table.
pub fn load_partition_table<F: ReadNorFlash>(flash: &mut F) -> Result<BootloaderState, BootError> {
    let mut table = [0u8; PARTITION_TABLE_MAX_LEN];
    flash
        .read(PARTITION_TABLE_OFFSET, &mut table)
        .map_err(FlashError::from_nor)?;

    let count = verify_table(&table).map_err(|e| {
        error!("Partition table verification failed {:?}", e);
        e
    })?;

    info!("Partition Table:");
    info!("## Label Usage Type ST Offset Length");

    let mut state = BootloaderState::default();
    for (index, raw) in table.chunks_exact(PARTITION_ENTRY_LEN).take(count).enumerate() {
        let mut bytes = [0u8; PARTITION_ENTRY_LEN];
        bytes.copy_from_slice(raw);
        let entry = PartitionEntry::from_bytes(&bytes);
        let kind = entry.kind();
        if matches!(kind, PartitionKind::UnknownApp | PartitionKind::UnknownData | PartitionKind::Unknown) {
            warn!("Unknown partition type {} subtype {}", entry.ty, entry.subtype);
        }
        info!(
            "{} {} {} {:#x} {:#x} {:#x} {:#x}",
            index,
            entry.label(),
            kind.usage(),
            entry.ty,
            entry.subtype,
            entry.pos.offset,
            entry.pos.size
        );
        state.record(&entry);
    }
    info!("End of partition table");

    Ok(state)
}
