// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use consts::MAX_IMAGE_SEGMENTS;
use heapless::Vec;

use crate::error::ImageError;
use crate::partition::PartitionPos;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub load_addr: u32,
    pub data_len: u32,
    /// Flash address of the segment data.
    pub data_offset: u32,
}

/// What the image loader learned about a verified image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageMetadata {
    pub start_addr: u32,
    pub entry_addr: u32,
    pub image_len: u32,
    pub segments: Vec<Segment, MAX_IMAGE_SEGMENTS>,
}

/// Verifies an application image and loads its RAM segments.
pub trait ImageLoader {
    fn load(&mut self, partition: &PartitionPos) -> Result<ImageMetadata, ImageError>;
}
