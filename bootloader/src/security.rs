// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use crate::config::BootConfig;
use crate::error::SecurityError;
use crate::platform::{FlashEncryption, SecureBoot};

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provisioned {
    /// Continue booting.
    Ready,
    /// Flash encryption was turned on during this boot, the chip must restart.
    ResetRequired,
}

/// Runs the first boot security steps. Each step is a no-op once done, so an
/// interrupted sequence resumes on the next boot.
pub fn provision<P: SecureBoot + FlashEncryption>(platform: &mut P, config: &BootConfig) -> Result<Provisioned, SecurityError> {
    if config.secure_boot {
        info!("Checking secure boot...");
        platform.generate_digest().map_err(|e| {
            error!("Bootloader digest generation failed {:?}", e);
            e
        })?;
    }

    let encryption_was_enabled = platform.is_enabled();
    if config.flash_encryption {
        info!("Checking flash encryption...");
        platform.check_and_update().map_err(|e| {
            error!("Flash encryption check failed {:?}", e);
            e
        })?;
    }

    if config.secure_boot {
        // Test chips may refuse the fuse, keep booting.
        if let Err(e) = platform.permanently_enable() {
            error!("FAILED TO ENABLE SECURE BOOT ({:?})", e);
        }
    }

    if config.flash_encryption && !encryption_was_enabled && platform.is_enabled() {
        info!("Resetting with flash encryption enabled...");
        return Ok(Provisioned::ResetRequired);
    }

    Ok(Provisioned::Ready)
}
