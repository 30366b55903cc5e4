// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

/// A received message, lent to the receive handler for the duration of the callback.
#[derive(Debug)]
pub struct Incoming<'a> {
    data: &'a [u8],
    cursor: usize,
}

impl<'a> Incoming<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, cursor: 0 }
    }

    /// Total length of the message.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes not yet consumed by [`Incoming::receive`].
    pub fn remaining(&self) -> usize {
        self.data.len() - self.cursor
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Copies as many unread bytes as fit into `buf`.
    pub fn receive(&mut self, buf: &mut [u8]) -> usize {
        let n = buf.len().min(self.remaining());
        buf[..n].copy_from_slice(&self.data[self.cursor..self.cursor + n]);
        self.cursor += n;
        n
    }
}

/// Upper layer sink for complete messages.
///
/// Called from the GATT event context; implementations must not block.
pub trait ReceiveHandler: Sync {
    fn on_receive(&self, message: &mut Incoming<'_>);
}
