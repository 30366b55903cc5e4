// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::iter;

use embedded_storage::nor_flash::NorFlash;

use crate::config::BootConfig;
use crate::error::{BootError, FlashError};
use crate::image::{ImageLoader, ImageMetadata};
use crate::mmu;
use crate::partition::{self, BootIndex, BootloaderState, PartitionPos};
use crate::platform::Platform;
use crate::rollback;
use crate::security::{self, Provisioned};
use crate::select;

/// What the platform has to do once the boot flow is over.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Caches are mapped for the application, jump to `entry`.
    Handoff { entry: u32 },
    /// Restart the chip.
    Reset,
    /// Nothing can be booted.
    Fatal(BootError),
}

/// Requested at reset, usually by holding a button.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootRequest {
    #[default]
    Normal,
    /// Forget every OTA update and the NVS contents, boot the factory image.
    FactoryReset,
    /// Boot the test application.
    TestApp,
}

pub struct Bootloader<F, L, P> {
    flash: F,
    loader: L,
    platform: P,
    config: BootConfig,
}

impl<F: NorFlash, L: ImageLoader, P: Platform> Bootloader<F, L, P> {
    pub fn new(flash: F, loader: L, platform: P, config: BootConfig) -> Self {
        Self {
            flash,
            loader,
            platform,
            config,
        }
    }

    pub fn into_parts(self) -> (F, L, P) {
        (self.flash, self.loader, self.platform)
    }

    pub fn run(&mut self, request: BootRequest) -> Outcome {
        let state = match partition::load_partition_table(&mut self.flash) {
            Ok(state) => state,
            Err(e) => return Outcome::Fatal(e),
        };

        let start = match request {
            BootRequest::Normal => match select::selected_boot_partition(&mut self.flash, &state, &self.config) {
                Ok(index) => index,
                Err(e) => {
                    error!("Failed to read OTA data {:?}", e);
                    return Outcome::Fatal(e);
                }
            },
            BootRequest::FactoryReset => {
                self.factory_reset(&state);
                BootIndex::Factory
            }
            BootRequest::TestApp => BootIndex::Test,
        };

        self.load_boot_image(&state, start)
    }

    /// Searches for a bootable image from `start` and hands off to the first one found.
    ///
    /// Slots below `start` are tried first, newest first, down to the factory
    /// image, then the slots above `start` and finally the test image.
    pub fn load_boot_image(&mut self, state: &BootloaderState, start: BootIndex) -> Outcome {
        let first_slot = match start {
            BootIndex::Test => {
                if let Some(metadata) = self.try_load(state, BootIndex::Test) {
                    return self.load_image(state, BootIndex::Test, &metadata);
                }
                error!("No bootable test partition in the partition table");
                return Outcome::Reset;
            }
            BootIndex::Factory => None,
            BootIndex::Ota(slot) => Some(slot),
        };

        let backward = first_slot
            .into_iter()
            .flat_map(|slot| (0..=slot).rev().map(BootIndex::Ota))
            .chain(iter::once(BootIndex::Factory));
        let forward = (first_slot.map_or(0, |slot| slot + 1)..state.app_count).map(BootIndex::Ota);

        for index in backward.chain(forward) {
            if let Some(metadata) = self.try_load(state, index) {
                return self.load_image(state, index, &metadata);
            }
        }

        if let Some(metadata) = self.try_load(state, BootIndex::Test) {
            warn!("Falling back to test app as only bootable partition");
            return self.load_image(state, BootIndex::Test, &metadata);
        }

        error!("No bootable app partitions in the partition table");
        Outcome::Fatal(BootError::NoBootableImage)
    }

    fn try_load(&mut self, state: &BootloaderState, index: BootIndex) -> Option<ImageMetadata> {
        let partition = state.partition(index);
        if partition.is_empty() {
            return None;
        }
        debug!("Trying partition {:?} at {:#x}", index, partition.offset);
        match self.loader.load(&partition) {
            Ok(metadata) => Some(metadata),
            Err(e) => {
                warn!("Partition {:?} at {:#x} is not bootable {:?}", index, partition.offset, e);
                None
            }
        }
    }

    /// Finishes security provisioning and rollback bookkeeping, then maps the image.
    fn load_image(&mut self, state: &BootloaderState, index: BootIndex, metadata: &ImageMetadata) -> Outcome {
        match security::provision(&mut self.platform, &self.config) {
            Ok(Provisioned::Ready) => {}
            Ok(Provisioned::ResetRequired) => return Outcome::Reset,
            Err(e) => return Outcome::Fatal(e.into()),
        }

        rollback::update_rollback_state(&mut self.flash, &mut self.platform, state, &self.config, index);

        self.platform.random_disable();

        info!("Loaded app from partition {:?}", index);
        let mapping = mmu::unpack_load_app(metadata);
        match mmu::set_cache_and_start_app(&mut self.platform, &mapping) {
            Ok(entry) => Outcome::Handoff { entry },
            Err(e) => {
                error!("Failed to map application {:?}", e);
                Outcome::Fatal(e.into())
            }
        }
    }

    fn factory_reset(&mut self, state: &BootloaderState) {
        warn!("Factory reset requested");
        let nvs = state.nvs.iter();
        for pos in iter::once(&state.ota_info).chain(nvs) {
            if let Err(e) = erase(&mut self.flash, pos) {
                warn!("Failed to erase partition at {:#x} {:?}", pos.offset, e);
            }
        }
    }
}

fn erase<F: NorFlash>(flash: &mut F, pos: &PartitionPos) -> Result<(), FlashError> {
    if pos.is_empty() {
        return Ok(());
    }
    flash.erase(pos.offset, pos.end()).map_err(FlashError::from_nor)
}
