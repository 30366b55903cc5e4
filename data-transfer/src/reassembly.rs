// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use alloc::vec::Vec;
use core::mem;

#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReassemblyError {
    /// The heap could not satisfy the grown buffer.
    OutOfMemory,
}

/// Accumulates the fragments of a large incoming message.
///
/// The buffer is allocated on the first fragment, doubles each time a fragment
/// would overflow it and is released once the message has been taken.
#[derive(Debug, Default)]
pub struct Reassembly {
    buffer: Vec<u8>,
    offset: usize,
}

impl Reassembly {
    pub const fn new() -> Self {
        Self {
            buffer: Vec::new(),
            offset: 0,
        }
    }

    /// Bytes accumulated so far.
    pub fn len(&self) -> usize {
        self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset == 0
    }

    /// Current size of the reassembly buffer, zero when nothing is pending.
    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Appends a fragment. On allocation failure everything pending is dropped.
    pub fn push(&mut self, fragment: &[u8], initial_size: usize) -> Result<(), ReassemblyError> {
        if let Err(e) = self.reserve(fragment.len(), initial_size) {
            self.reset();
            return Err(e);
        }
        self.buffer[self.offset..self.offset + fragment.len()].copy_from_slice(fragment);
        self.offset += fragment.len();
        Ok(())
    }

    /// Hands out the accumulated message and starts over with no buffer.
    pub fn take(&mut self) -> Vec<u8> {
        let mut message = mem::take(&mut self.buffer);
        message.truncate(self.offset);
        self.offset = 0;
        message
    }

    pub fn reset(&mut self) {
        self.buffer = Vec::new();
        self.offset = 0;
    }

    fn reserve(&mut self, additional: usize, initial_size: usize) -> Result<(), ReassemblyError> {
        let required = self.offset.checked_add(additional).ok_or(ReassemblyError::OutOfMemory)?;
        let mut size = match self.buffer.len() {
            0 => initial_size.max(1),
            len if required > len => len.checked_mul(2).ok_or(ReassemblyError::OutOfMemory)?,
            _ => return Ok(()),
        };
        while size < required {
            size = size.checked_mul(2).ok_or(ReassemblyError::OutOfMemory)?;
        }

        let mut grown = Vec::new();
        grown.try_reserve_exact(size).map_err(|_| ReassemblyError::OutOfMemory)?;
        grown.extend_from_slice(&self.buffer[..self.offset]);
        grown.resize(size, 0);
        self.buffer = grown;
        Ok(())
    }
}
