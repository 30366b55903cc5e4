// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::{NorFlashError, NorFlashErrorKind};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FlashError {
    NotAligned,
    OutOfBounds,
    Other,
}

impl FlashError {
    pub fn from_nor<E: NorFlashError>(e: E) -> Self {
        match e.kind() {
            NorFlashErrorKind::NotAligned => FlashError::NotAligned,
            NorFlashErrorKind::OutOfBounds => FlashError::OutOfBounds,
            _ => FlashError::Other,
        }
    }
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableError {
    /// Entry `index` starts with neither a partition nor an MD5 magic.
    BadMagic { index: usize },
    Md5Mismatch,
    /// No terminating entry within the table region.
    Unterminated,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SecurityError {
    DigestGeneration,
    FlashEncryption,
    SecureBootEnable,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MmuError {
    /// Virtual or physical address not on a page boundary.
    Unaligned,
    /// Mapping falls outside the DROM and IROM windows.
    OutOfRange,
}

/// Reason reported by the image loader for rejecting a partition.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ImageError {
    InvalidHeader,
    TooManySegments,
    Checksum,
    Hash,
    Signature,
    Flash(FlashError),
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BootError {
    Flash(FlashError),
    PartitionTable(TableError),
    NoBootableImage,
    Security(SecurityError),
    Mmu(MmuError),
}

impl From<FlashError> for BootError {
    fn from(e: FlashError) -> Self {
        BootError::Flash(e)
    }
}

impl From<TableError> for BootError {
    fn from(e: TableError) -> Self {
        BootError::PartitionTable(e)
    }
}

impl From<SecurityError> for BootError {
    fn from(e: SecurityError) -> Self {
        BootError::Security(e)
    }
}

impl From<MmuError> for BootError {
    fn from(e: MmuError) -> Self {
        BootError::Mmu(e)
    }
}
