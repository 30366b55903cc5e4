// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use embedded_storage::nor_flash::NorFlash;

use crate::config::BootConfig;
use crate::error::FlashError;
use crate::ota::{self, OtaState};
use crate::partition::{BootIndex, BootloaderState};
use crate::platform::Soc;

/// Bookkeeping for the image about to boot. Best effort: failures are only logged.
pub fn update_rollback_state<F: NorFlash, S: Soc>(
    flash: &mut F,
    soc: &mut S,
    state: &BootloaderState,
    config: &BootConfig,
    booted: BootIndex,
) {
    let BootIndex::Ota(slot) = booted else {
        return;
    };
    if !config.app_rollback || state.ota_info.is_empty() || state.app_count == 0 {
        return;
    }

    let mut entries = match ota::read_otadata(flash, &state.ota_info) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Failed to read OTA data {:?}", e);
            return;
        }
    };
    let Some(active) = ota::active_otadata(&entries) else {
        return;
    };
    if entries[active].slot(state.app_count) != slot {
        return;
    }

    match entries[active].ota_state() {
        OtaState::New => {
            entries[active].set_state(OtaState::PendingVerify);
            if let Some(timeout_ms) = config.rollback_watchdog_ms {
                info!("Arming RTC watchdog for {} ms", timeout_ms);
                soc.arm_rtc_watchdog(timeout_ms);
            }
            match ota::write_otadata(flash, &state.ota_info, active, &entries[active]) {
                Ok(()) => info!("OTA slot {} pending verification", slot),
                Err(e) => warn!("Failed to mark image pending verification {:?}", e),
            }
        }
        OtaState::Valid if config.erase_passive_on_valid => {
            let passive = 1 - active;
            if !entries[passive].is_intact() {
                return;
            }
            let passive_slot = entries[passive].slot(state.app_count);
            if passive_slot != slot {
                if let Err(e) = erase_partition(flash, state, passive_slot) {
                    warn!("Failed to erase passive slot {} {:?}", passive_slot, e);
                    return;
                }
            }
            match ota::erase_otadata(flash, &state.ota_info, passive) {
                Ok(()) => info!("Erased passive OTA slot {}", passive_slot),
                Err(e) => warn!("Failed to erase passive OTA data {:?}", e),
            }
        }
        _ => {}
    }
}

fn erase_partition<F: NorFlash>(flash: &mut F, state: &BootloaderState, slot: usize) -> Result<(), FlashError> {
    let pos = state.partition(BootIndex::Ota(slot));
    if pos.is_empty() {
        return Ok(());
    }
    flash.erase(pos.offset, pos.end()).map_err(FlashError::from_nor)
}
