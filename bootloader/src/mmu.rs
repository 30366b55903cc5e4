// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

//! Flash cache mapping of the application's DROM and IROM regions.

use consts::{
    DROM_HIGH, DROM_LOW, DROM_MMU_BASE, DROM_MMU_FIRST_ENTRY, IROM_HIGH, IROM_LOW, IROM_MMU_BASE, IROM_MMU_FIRST_ENTRY,
    MMU_INVALID, MMU_PAGE_SIZE, MMU_TABLE_SIZE,
};

use crate::error::MmuError;
use crate::image::ImageMetadata;
use crate::platform::{CacheMask, CacheMmu, Cpu};

const PAGE_MASK: u32 = !(MMU_PAGE_SIZE - 1);

/// A flash region and the virtual address it must appear at.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MappedRegion {
    pub flash_addr: u32,
    pub load_addr: u32,
    pub size: u32,
}

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppMapping {
    pub drom: Option<MappedRegion>,
    pub irom: Option<MappedRegion>,
    pub entry_addr: u32,
}

/// Finds the segments executed or read in place from flash.
pub fn unpack_load_app(metadata: &ImageMetadata) -> AppMapping {
    let mut mapping = AppMapping {
        entry_addr: metadata.entry_addr,
        ..Default::default()
    };

    for segment in &metadata.segments {
        let region = MappedRegion {
            flash_addr: segment.data_offset,
            load_addr: segment.load_addr,
            size: segment.data_len,
        };
        if (DROM_LOW..DROM_HIGH).contains(&segment.load_addr) {
            if mapping.drom.is_some() {
                error!("Multiple DROM segments, only the last one is mapped");
            }
            debug!("DROM segment at {:#x}, {} bytes", segment.load_addr, segment.data_len);
            mapping.drom = Some(region);
        } else if (IROM_LOW..IROM_HIGH).contains(&segment.load_addr) {
            if mapping.irom.is_some() {
                error!("Multiple IROM segments, only the last one is mapped");
            }
            debug!("IROM segment at {:#x}, {} bytes", segment.load_addr, segment.data_len);
            mapping.irom = Some(region);
        }
    }

    mapping
}

/// Pages needed to map `size` bytes starting at `vaddr`.
pub fn pages_to_map(size: u32, vaddr: u32) -> Result<u32, MmuError> {
    size
        .checked_add(vaddr & !PAGE_MASK)
        .and_then(|len| len.checked_add(MMU_PAGE_SIZE - 1))
        .map(|len| len / MMU_PAGE_SIZE)
        .ok_or(MmuError::OutOfRange)
}

/// Invalidates every entry of the CPU's page table.
pub fn mmu_init<M: CacheMmu>(mmu: &mut M, cpu: Cpu) {
    for index in 0..MMU_TABLE_SIZE {
        mmu.set_mmu_entry(cpu, index, MMU_INVALID);
    }
}

/// Maps `pages` flash pages from `paddr` at virtual address `vaddr`.
pub fn flash_mmu_set<M: CacheMmu>(mmu: &mut M, cpu: Cpu, vaddr: u32, paddr: u32, pages: u32) -> Result<(), MmuError> {
    if vaddr & !PAGE_MASK != 0 || paddr & !PAGE_MASK != 0 {
        return Err(MmuError::Unaligned);
    }

    let window = |base: u32, high: u32, first: usize| {
        let index = first + ((vaddr - base) / MMU_PAGE_SIZE) as usize;
        let end = first + ((high - base) / MMU_PAGE_SIZE) as usize;
        (index, end)
    };
    let (first, end) = if (DROM_MMU_BASE..DROM_HIGH).contains(&vaddr) {
        window(DROM_MMU_BASE, DROM_HIGH, DROM_MMU_FIRST_ENTRY)
    } else if (IROM_MMU_BASE..IROM_HIGH).contains(&vaddr) {
        window(IROM_MMU_BASE, IROM_HIGH, IROM_MMU_FIRST_ENTRY)
    } else {
        return Err(MmuError::OutOfRange);
    };
    if first + pages as usize > end {
        return Err(MmuError::OutOfRange);
    }

    let first_page = paddr / MMU_PAGE_SIZE;
    for page in 0..pages {
        mmu.set_mmu_entry(cpu, first + page as usize, first_page + page);
    }
    Ok(())
}

fn map_region<M: CacheMmu>(mmu: &mut M, name: &str, region: &MappedRegion) -> Result<(), MmuError> {
    let vaddr = region.load_addr & PAGE_MASK;
    let paddr = region.flash_addr & PAGE_MASK;
    let pages = pages_to_map(region.size, region.load_addr)?;
    debug!("Mapping {} {:#x} -> {:#x}, {} pages", name, paddr, vaddr, pages);
    for cpu in Cpu::ALL {
        flash_mmu_set(mmu, cpu, vaddr, paddr, pages)?;
    }
    Ok(())
}

/// Rebuilds the flash MMU for the application and re-enables the caches.
///
/// Returns the entry address to jump to.
pub fn set_cache_and_start_app<M: CacheMmu>(mmu: &mut M, mapping: &AppMapping) -> Result<u32, MmuError> {
    for cpu in Cpu::ALL {
        mmu.cache_read_disable(cpu);
        mmu.cache_flush(cpu);
    }
    for cpu in Cpu::ALL {
        mmu_init(mmu, cpu);
    }

    if let Some(drom) = &mapping.drom {
        map_region(mmu, "DROM", drom)?;
    }
    if let Some(irom) = &mapping.irom {
        map_region(mmu, "IROM", irom)?;
    }

    for cpu in Cpu::ALL {
        mmu.clear_cache_mask(cpu, CacheMask::IRAM0 | CacheMask::DROM0 | CacheMask::DRAM1);
    }
    for cpu in Cpu::ALL {
        mmu.cache_read_enable(cpu);
    }

    Ok(mapping.entry_addr)
}
