// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundation.xyz>
// SPDX-License-Identifier: GPL-3.0-or-later

#![no_std]

/// Size of the ATT header that precedes every notification and write payload.
/// The usable payload of a single GATT PDU is always `MTU - ATT_HEADER_LEN`.
pub const ATT_HEADER_LEN: usize = 3;

/// Minimum ATT MTU every BLE link supports before any exchange.
pub const DEFAULT_ATT_MTU: u16 = 23;

/// Largest ATT MTU allowed by the Bluetooth core specification.
pub const MAX_ATT_MTU: u16 = 517;

/// Largest payload a single notification, read response or write can carry.
pub const MAX_TRANSMIT_LEN: usize = MAX_ATT_MTU as usize - ATT_HEADER_LEN;

/// MTU requested from the peer, and the value the link falls back to after a disconnect.
pub const PREFERRED_MTU: u16 = 512;

/// Capacity in bytes of the per-service ring buffer that holds the tail of a large message.
pub const TX_BUFFER_SIZE: usize = 1024;

/// Initial size of the reassembly buffer for large incoming messages.
/// The buffer doubles whenever a fragment would overflow it.
pub const RX_BUFFER_SIZE: usize = 1024;

/// Time budget in milliseconds for a large send, covering both the wait for
/// the previous transfer and the wait for the peer to drain the ring buffer.
pub const SEND_TIMEOUT_MS: u64 = 2000;

/// Number of attempts made to open a connection over a service before giving up.
pub const CREATE_CONNECTION_RETRY: u32 = 60;

/// Delay in milliseconds between two connection attempts.
pub const CREATE_CONNECTION_WAIT_MS: u64 = 1000;

/// Number of data transfer service instances (MQTT and WiFi provisioning).
pub const NUM_DATA_TRANSFER_SERVICES: usize = 2;

/// Service identifier carried in the UUIDs of the MQTT instance.
pub const MQTT_SERVICE_ID: u8 = 0x00;

/// Service identifier carried in the UUIDs of the WiFi provisioning instance.
pub const WIFI_PROVISIONING_SERVICE_ID: u8 = 0x01;

/// Upper 14 bytes (little endian) shared by every data transfer UUID.
/// Byte 0 selects the attribute and byte 1 the service instance.
pub const DATA_TRANSFER_UUID_MASK: [u8; 14] = [
    0x2E, 0x80, 0x1F, 0x64, 0x52, 0xB3, 0x6F, 0xA0, 0x14, 0x4C, 0x9D, 0x3E, 0xC6, 0xA9,
];

/// Standard 16-bit UUID of the Client Characteristic Configuration Descriptor.
pub const CCCD_UUID: u16 = 0x2902;

/// Flash offset of the partition table.
pub const PARTITION_TABLE_OFFSET: u32 = 0x8000;

/// Maximum length of the partition table, MD5 entry and terminator included.
pub const PARTITION_TABLE_MAX_LEN: usize = 0xC00;

/// Size of one serialized partition table entry.
pub const PARTITION_ENTRY_LEN: usize = 32;

/// Magic number opening every partition table entry.
pub const PARTITION_MAGIC: u16 = 0x50AA;

/// Magic number of the entry holding the MD5 digest of the preceding entries.
pub const PARTITION_MD5_MAGIC: u16 = 0xEBEB;

/// Flash sector size. The two OTA select records live one sector apart.
pub const FLASH_SECTOR_SIZE: u32 = 0x1000;

/// Maximum number of OTA application slots a partition table may declare.
pub const MAX_OTA_SLOTS: usize = 16;

/// Maximum number of NVS partitions cleared on factory reset.
pub const MAX_NVS_PARTITIONS: usize = 4;

/// Maximum number of segments in an application image.
pub const MAX_IMAGE_SEGMENTS: usize = 16;

/// Default RTC watchdog timeout armed while a new image waits for confirmation.
pub const ROLLBACK_WDT_TIMEOUT_MS: u32 = 9000;

/// Flash MMU page size.
pub const MMU_PAGE_SIZE: u32 = 0x1_0000;

/// Number of flash MMU entries per CPU.
pub const MMU_TABLE_SIZE: usize = 256;

/// Value of an unmapped flash MMU entry.
pub const MMU_INVALID: u32 = 0x100;

/// Data ROM window mapped through the flash cache.
pub const DROM_LOW: u32 = 0x3F40_0000;
pub const DROM_HIGH: u32 = 0x3F80_0000;

/// Instruction ROM window mapped through the flash cache.
pub const IROM_LOW: u32 = 0x400D_0000;
pub const IROM_HIGH: u32 = 0x4040_0000;

/// Virtual base addresses and first MMU entries of the two windows.
pub const DROM_MMU_BASE: u32 = 0x3F40_0000;
pub const DROM_MMU_FIRST_ENTRY: usize = 0;
pub const IROM_MMU_BASE: u32 = 0x4000_0000;
pub const IROM_MMU_FIRST_ENTRY: usize = 64;
