// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Hardware primitives the boot flow relies on.

use bitflags::bitflags;

use crate::error::SecurityError;

pub trait SecureBoot {
    /// Generates the digest of the plaintext bootloader and burns the secure boot key.
    /// Does nothing when the digest already exists.
    fn generate_digest(&mut self) -> Result<(), SecurityError>;

    /// Burns the secure boot enable fuse.
    fn permanently_enable(&mut self) -> Result<(), SecurityError>;
}

pub trait FlashEncryption {
    fn is_enabled(&self) -> bool;

    /// Encrypts the bootloader, digest and application partitions if that has
    /// not happened yet and burns the enable fuse.
    fn check_and_update(&mut self) -> Result<(), SecurityError>;
}

pub trait Soc {
    /// Turns off the entropy source used during early boot.
    fn random_disable(&mut self);

    fn arm_rtc_watchdog(&mut self, timeout_ms: u32);
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Cpu {
    Pro,
    App,
}

impl Cpu {
    pub const ALL: [Cpu; 2] = [Cpu::Pro, Cpu::App];
}

bitflags! {
    /// Cache mask bits; a set bit keeps the region out of the cache.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct CacheMask: u32 {
        const IRAM0 = 1 << 0;
        const IRAM1 = 1 << 1;
        const IROM0 = 1 << 2;
        const DRAM1 = 1 << 3;
        const DROM0 = 1 << 4;
    }
}

/// Flash cache and its MMU page table, one per CPU.
pub trait CacheMmu {
    fn cache_read_disable(&mut self, cpu: Cpu);
    fn cache_flush(&mut self, cpu: Cpu);
    fn cache_read_enable(&mut self, cpu: Cpu);
    fn clear_cache_mask(&mut self, cpu: Cpu, mask: CacheMask);
    fn set_mmu_entry(&mut self, cpu: Cpu, index: usize, value: u32);
}

/// Everything the boot flow needs from the chip.
pub trait Platform: SecureBoot + FlashEncryption + Soc + CacheMmu {}

impl<T: SecureBoot + FlashEncryption + Soc + CacheMmu> Platform for T {}
