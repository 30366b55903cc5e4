// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! OTA select records. The otadata partition holds two copies, A in its
//! first sector and B in the second.

use consts::FLASH_SECTOR_SIZE;
use crc::{Crc, CRC_32_ISO_HDLC};
use embedded_storage::nor_flash::NorFlash;

use crate::error::FlashError;
use crate::partition::PartitionPos;

pub const OTA_SELECT_ENTRY_LEN: usize = 12;

const ERASED_SEQ: u32 = u32::MAX;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OtaState {
    /// Written by the updater, never booted.
    New,
    /// Booted once, waiting for the application to confirm itself.
    PendingVerify,
    Valid,
    Invalid,
    /// Never confirmed; rolled back.
    Aborted,
    Undefined,
}

impl OtaState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => OtaState::New,
            1 => OtaState::PendingVerify,
            2 => OtaState::Valid,
            3 => OtaState::Invalid,
            4 => OtaState::Aborted,
            _ => OtaState::Undefined,
        }
    }

    pub fn raw(self) -> u32 {
        match self {
            OtaState::New => 0,
            OtaState::PendingVerify => 1,
            OtaState::Valid => 2,
            OtaState::Invalid => 3,
            OtaState::Aborted => 4,
            OtaState::Undefined => u32::MAX,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct OtaSelectEntry {
    pub seq: u32,
    pub state: u32,
    pub crc: u32,
}

impl OtaSelectEntry {
    pub const ERASED: Self = Self {
        seq: ERASED_SEQ,
        state: u32::MAX,
        crc: u32::MAX,
    };

    /// A sealed record for sequence number `seq`.
    pub fn new(seq: u32, state: OtaState) -> Self {
        let mut entry = Self {
            seq,
            state: state.raw(),
            crc: 0,
        };
        entry.seal();
        entry
    }

    pub fn from_bytes(bytes: &[u8; OTA_SELECT_ENTRY_LEN]) -> Self {
        let word = |at: usize| u32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
        Self {
            seq: word(0),
            state: word(4),
            crc: word(8),
        }
    }

    pub fn to_bytes(&self) -> [u8; OTA_SELECT_ENTRY_LEN] {
        let mut bytes = [0u8; OTA_SELECT_ENTRY_LEN];
        bytes[0..4].copy_from_slice(&self.seq.to_le_bytes());
        bytes[4..8].copy_from_slice(&self.state.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.crc.to_le_bytes());
        bytes
    }

    pub fn ota_state(&self) -> OtaState {
        OtaState::from_raw(self.state)
    }

    /// Updates the state and recomputes the checksum.
    pub fn set_state(&mut self, state: OtaState) {
        self.state = state.raw();
        self.seal();
    }

    pub fn compute_crc(&self) -> u32 {
        let crc = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        crc.checksum(&self.to_bytes()[..8])
    }

    pub fn seal(&mut self) {
        self.crc = self.compute_crc();
    }

    pub fn is_erased(&self) -> bool {
        self.seq == ERASED_SEQ
    }

    /// Written, intact, whatever its state.
    pub fn is_intact(&self) -> bool {
        !self.is_erased() && self.crc == self.compute_crc()
    }

    /// Intact and still eligible for booting.
    pub fn is_valid(&self) -> bool {
        self.is_intact() && !matches!(self.ota_state(), OtaState::Invalid | OtaState::Aborted)
    }

    /// OTA slot this record selects among `app_count` slots.
    pub fn slot(&self, app_count: usize) -> usize {
        self.seq.wrapping_sub(1) as usize % app_count
    }
}

fn newest(entries: &[OtaSelectEntry; 2], eligible: impl Fn(&OtaSelectEntry) -> bool) -> Option<usize> {
    match (eligible(&entries[0]), eligible(&entries[1])) {
        (true, true) if entries[1].seq > entries[0].seq => Some(1),
        (true, _) => Some(0),
        (false, true) => Some(1),
        (false, false) => None,
    }
}

/// Copy selecting the image to boot: the valid record with the higher sequence number, A on ties.
pub fn active_otadata(entries: &[OtaSelectEntry; 2]) -> Option<usize> {
    newest(entries, OtaSelectEntry::is_valid)
}

/// Newest intact copy regardless of its state.
pub fn newest_intact(entries: &[OtaSelectEntry; 2]) -> Option<usize> {
    newest(entries, OtaSelectEntry::is_intact)
}

fn copy_offset(otadata: &PartitionPos, copy: usize) -> u32 {
    otadata.offset + copy as u32 * FLASH_SECTOR_SIZE
}

pub fn read_otadata<F: NorFlash>(flash: &mut F, otadata: &PartitionPos) -> Result<[OtaSelectEntry; 2], FlashError> {
    let mut entries = [OtaSelectEntry::ERASED; 2];
    for (copy, entry) in entries.iter_mut().enumerate() {
        let mut bytes = [0u8; OTA_SELECT_ENTRY_LEN];
        flash
            .read(copy_offset(otadata, copy), &mut bytes)
            .map_err(FlashError::from_nor)?;
        *entry = OtaSelectEntry::from_bytes(&bytes);
    }
    Ok(entries)
}

/// Erases the sector of `copy` and writes `entry` to it.
pub fn write_otadata<F: NorFlash>(
    flash: &mut F,
    otadata: &PartitionPos,
    copy: usize,
    entry: &OtaSelectEntry,
) -> Result<(), FlashError> {
    erase_otadata(flash, otadata, copy)?;
    flash
        .write(copy_offset(otadata, copy), &entry.to_bytes())
        .map_err(FlashError::from_nor)
}

pub fn erase_otadata<F: NorFlash>(flash: &mut F, otadata: &PartitionPos, copy: usize) -> Result<(), FlashError> {
    let offset = copy_offset(otadata, copy);
    flash
        .erase(offset, offset + FLASH_SECTOR_SIZE)
        .map_err(FlashError::from_nor)
}
