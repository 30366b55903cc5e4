// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Second stage boot flow: reads the partition table, arbitrates between OTA
//! slots, sequences secure boot and flash encryption provisioning, keeps the
//! rollback records and maps the chosen image before handing off to it.

#![no_std]

mod fmt;

pub mod boot;
pub mod config;
pub mod error;
pub mod image;
pub mod jump_app;
pub mod mmu;
pub mod ota;
pub mod partition;
pub mod platform;
pub mod rollback;
pub mod security;
pub mod select;

pub use boot::{BootRequest, Bootloader, Outcome};
pub use config::BootConfig;
pub use error::{BootError, FlashError, ImageError, MmuError, SecurityError, TableError};
pub use image::{ImageLoader, ImageMetadata, Segment};
pub use partition::{BootIndex, BootloaderState, PartitionPos};
pub use platform::{CacheMask, CacheMmu, Cpu, FlashEncryption, Platform, SecureBoot, Soc};
