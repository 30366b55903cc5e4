// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::NorFlash;

use crate::config::BootConfig;
use crate::error::BootError;
use crate::ota::{self, OtaSelectEntry, OtaState};
use crate::partition::{BootIndex, BootloaderState};

/// Picks the partition the boot search starts from.
pub fn selected_boot_partition<F: NorFlash>(
    flash: &mut F,
    state: &BootloaderState,
    config: &BootConfig,
) -> Result<BootIndex, BootError> {
    if state.ota_info.is_empty() {
        debug!("No OTA data partition, starting from factory");
        return Ok(BootIndex::Factory);
    }

    let mut entries = ota::read_otadata(flash, &state.ota_info)?;

    if entries.iter().all(OtaSelectEntry::is_erased) {
        info!("OTA data is erased");
        if !state.factory.is_empty() {
            return Ok(BootIndex::Factory);
        }
        if config.app_rollback {
            let first = OtaSelectEntry::new(1, OtaState::Valid);
            match ota::write_otadata(flash, &state.ota_info, 0, &first) {
                Ok(()) => info!("Marked OTA slot 0 as the initial image"),
                Err(e) => warn!("Failed to initialize OTA data {:?}", e),
            }
        }
        return Ok(BootIndex::Ota(0));
    }

    if config.app_rollback {
        abort_unconfirmed(flash, state, &mut entries);
    }

    match ota::active_otadata(&entries) {
        Some(active) if state.app_count > 0 => {
            let slot = entries[active].slot(state.app_count);
            info!("Active OTA data copy {} (seq {}), slot {}", active, entries[active].seq, slot);
            Ok(BootIndex::Ota(slot))
        }
        _ => {
            warn!("No valid OTA data, starting from factory");
            Ok(BootIndex::Factory)
        }
    }
}

/// An image still pending verification at boot never confirmed itself.
fn abort_unconfirmed<F: NorFlash>(flash: &mut F, state: &BootloaderState, entries: &mut [OtaSelectEntry; 2]) {
    let Some(newest) = ota::newest_intact(entries) else {
        return;
    };
    if entries[newest].ota_state() != OtaState::PendingVerify {
        return;
    }

    warn!("Image of OTA seq {} was not confirmed, rolling back", entries[newest].seq);
    entries[newest].set_state(OtaState::Aborted);
    if let Err(e) = ota::write_otadata(flash, &state.ota_info, newest, &entries[newest]) {
        warn!("Failed to mark image aborted {:?}", e);
    }
}
