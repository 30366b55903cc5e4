// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::ROLLBACK_WDT_TIMEOUT_MS;

/// Boot time options, defaulting to the enabled cargo features.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BootConfig {
    pub secure_boot: bool,
    pub flash_encryption: bool,
    pub app_rollback: bool,
    /// Erase the passive slot once the running image is confirmed.
    pub erase_passive_on_valid: bool,
    /// Watchdog armed while a new image is pending verification.
    pub rollback_watchdog_ms: Option<u32>,
}

impl Default for BootConfig {
    fn default() -> Self {
        Self {
            secure_boot: cfg!(feature = "secure-boot"),
            flash_encryption: cfg!(feature = "flash-encryption"),
            app_rollback: cfg!(feature = "app-rollback"),
            erase_passive_on_valid: cfg!(feature = "no-force-rollback"),
            rollback_watchdog_ms: if cfg!(feature = "rollback-watchdog") {
                Some(ROLLBACK_WDT_TIMEOUT_MS)
            } else {
                None
            },
        }
    }
}
