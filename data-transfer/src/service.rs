// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

use core::cell::Cell;
use core::sync::atomic::{AtomicBool, AtomicU16, AtomicUsize, Ordering};

use consts::{MAX_TRANSMIT_LEN, TX_BUFFER_SIZE};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::blocking_mutex::Mutex as BlockingMutex;
use embassy_sync::mutex::Mutex;
use embassy_sync::pipe::Pipe;
use embassy_sync::signal::Signal;
use embassy_time::{with_timeout, Duration, Instant, Timer};
use futures::future::{select, Either};
use futures::pin_mut;

use crate::attributes::{service_table, Attribute, AttributeHandles, ATTRIBUTE_COUNT};
use crate::event::{ReadRequest, WriteRequest};
use crate::gatt::{GattError, GattServer, Response, ResponseStatus};
use crate::incoming::{Incoming, ReceiveHandler};
use crate::link::LinkContext;
use crate::reassembly::Reassembly;

/// One data transfer service instance.
///
/// Small messages travel as a single notification on the TX characteristic.
/// A large message is announced by a notification on the TX-large
/// characteristic carrying its first payload; the peer then pulls the rest
/// with reads of the same characteristic until it gets a short chunk.
/// Incoming large messages arrive as consecutive writes to the RX-large
/// characteristic and end with a short write.
pub struct DataTransferService<const TX: usize = TX_BUFFER_SIZE> {
    id: u8,
    initialized: AtomicBool,
    handles: BlockingMutex<CriticalSectionRawMutex, Cell<AttributeHandles>>,
    ccfg: AtomicU16,
    receiver: BlockingMutex<CriticalSectionRawMutex, Cell<Option<&'static dyn ReceiveHandler>>>,
    /// Held for the whole duration of a large transfer.
    send_lock: Mutex<CriticalSectionRawMutex, ()>,
    tx: Pipe<CriticalSectionRawMutex, TX>,
    tx_active: AtomicBool,
    tx_drained: AtomicUsize,
    /// Raised by the read callback once the peer pulled the last chunk.
    tx_done: Signal<CriticalSectionRawMutex, ()>,
    /// Raised when the receive handler goes away.
    cancel: Signal<CriticalSectionRawMutex, ()>,
    rx: Mutex<CriticalSectionRawMutex, Reassembly>,
}

impl<const TX: usize> DataTransferService<TX> {
    pub const fn new(id: u8) -> Self {
        Self {
            id,
            initialized: AtomicBool::new(false),
            handles: BlockingMutex::new(Cell::new([0; ATTRIBUTE_COUNT])),
            ccfg: AtomicU16::new(0),
            receiver: BlockingMutex::new(Cell::new(None)),
            send_lock: Mutex::new(()),
            tx: Pipe::new(),
            tx_active: AtomicBool::new(false),
            tx_drained: AtomicUsize::new(0),
            tx_done: Signal::new(),
            cancel: Signal::new(),
            rx: Mutex::new(Reassembly::new()),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }

    pub fn handles(&self) -> AttributeHandles {
        self.handles.lock(|handles| handles.get())
    }

    pub fn handle(&self, attribute: Attribute) -> u16 {
        self.handles()[attribute as usize]
    }

    /// Last value the peer wrote to a client characteristic configuration descriptor.
    pub fn ccfg(&self) -> u16 {
        self.ccfg.load(Ordering::Acquire)
    }

    pub fn notifications_enabled(&self) -> bool {
        self.ccfg() & 0x0001 != 0
    }

    /// A receive handler is registered, the instance is taken.
    pub fn is_open(&self) -> bool {
        self.receiver().is_some()
    }

    /// Bytes of a large message waiting for the peer to read them.
    pub fn pending_bytes(&self) -> usize {
        self.tx.len()
    }

    /// A large transfer holds the send lock.
    pub fn is_sending(&self) -> bool {
        self.send_lock.try_lock().is_err()
    }

    /// Handles of this service, excluding the declaration itself.
    pub fn owns_handle(&self, handle: u16) -> bool {
        let handles = self.handles();
        self.is_initialized() && handle > handles[0] && handle <= handles[ATTRIBUTE_COUNT - 1]
    }

    pub(crate) fn init<G: GattServer>(&self, gatt: &G) -> Result<(), GattError> {
        if self.is_initialized() {
            return Ok(());
        }
        let handles = gatt.create_service(&service_table(self.id))?;
        self.handles.lock(|h| h.set(handles));
        self.initialized.store(true, Ordering::Release);
        info!("Data transfer service {} registered", self.id);
        Ok(())
    }

    pub(crate) fn receiver(&self) -> Option<&'static dyn ReceiveHandler> {
        self.receiver.lock(|receiver| receiver.get())
    }

    /// Clearing the handler cancels a pending send and drops a partial incoming message.
    pub(crate) fn set_receiver(&self, handler: Option<&'static dyn ReceiveHandler>) {
        self.receiver.lock(|receiver| receiver.set(handler));
        if handler.is_none() {
            self.cancel.signal(());
            if let Ok(mut rx) = self.rx.try_lock() {
                rx.reset();
            }
        }
    }

    /// Sends `message` and returns the number of bytes accepted.
    ///
    /// Anything below `message.len()` means the transfer was cut short by a
    /// timeout, a GATT failure or the connection closing.
    pub async fn send<G: GattServer>(&self, link: &LinkContext<G>, message: &[u8]) -> usize {
        if !self.is_open() {
            warn!("Service {}: send without an open connection", self.id);
            return 0;
        }

        let transmit_len = link.transmit_len();
        if message.len() < transmit_len {
            return match self.notify(link, Attribute::TxChar, message) {
                Ok(()) => message.len(),
                Err(e) => {
                    error!("Service {}: notification failed {:?}", self.id, e);
                    0
                }
            };
        }

        self.send_large(link, message, transmit_len).await
    }

    async fn send_large<G: GattServer>(&self, link: &LinkContext<G>, message: &[u8], transmit_len: usize) -> usize {
        let timeout = link.config().send_timeout;
        let Ok(_guard) = with_timeout(timeout, self.send_lock.lock()).await else {
            warn!("Service {}: previous large transfer still in progress", self.id);
            return 0;
        };

        self.cancel.reset();
        self.tx_done.reset();
        self.tx.clear();
        self.tx_drained.store(0, Ordering::Release);
        self.tx_active.store(true, Ordering::Release);

        let (first, rest) = message.split_at(transmit_len);
        if let Err(e) = self.notify(link, Attribute::TxLargeChar, first) {
            error!("Service {}: large object notification failed {:?}", self.id, e);
            self.abort_transfer();
            return 0;
        }

        let deadline = Instant::now() + timeout;
        let mut pushed = 0;
        while pushed < rest.len() {
            if !self.is_open() {
                warn!("Service {}: connection closed during send", self.id);
                return first.len() + self.abort_transfer();
            }
            // A short read already ended the message on the peer side.
            if !self.tx_active.load(Ordering::Acquire) {
                warn!("Service {}: peer drained the buffer before the message was queued", self.id);
                return first.len() + self.abort_transfer();
            }

            let write = self.tx.write(&rest[pushed..]);
            let cancelled = self.cancel.wait();
            let expired = Timer::at(deadline);
            pin_mut!(write, cancelled, expired);

            match select(write, select(cancelled, expired)).await {
                Either::Left((n, _)) => pushed += n,
                Either::Right((Either::Left(_), _)) => {
                    warn!("Service {}: connection closed during send", self.id);
                    return first.len() + self.abort_transfer();
                }
                Either::Right((Either::Right(_), _)) => {
                    warn!("Service {}: timed out queueing {} bytes", self.id, rest.len() - pushed);
                    return first.len() + self.abort_transfer();
                }
            }
        }

        let drained = self.tx_done.wait();
        let cancelled = self.cancel.wait();
        let expired = Timer::after(timeout);
        pin_mut!(drained, cancelled, expired);

        match select(drained, select(cancelled, expired)).await {
            Either::Left(_) => {
                let delivered = self.tx_drained.load(Ordering::Acquire);
                if delivered == rest.len() {
                    message.len()
                } else {
                    warn!("Service {}: message ended after {} of {} bytes", self.id, delivered, rest.len());
                    first.len() + self.abort_transfer()
                }
            }
            Either::Right(_) => {
                warn!("Service {}: peer did not read the whole message", self.id);
                first.len() + self.abort_transfer()
            }
        }
    }

    /// Drops whatever the peer has not read yet and returns how much it did read.
    fn abort_transfer(&self) -> usize {
        self.tx_active.store(false, Ordering::Release);
        self.tx.clear();
        self.tx_drained.load(Ordering::Acquire)
    }

    pub(crate) async fn reset_send_buffer(&self, timeout: Duration) -> bool {
        match with_timeout(timeout, self.send_lock.lock()).await {
            Ok(_guard) => {
                self.tx.clear();
                true
            }
            Err(_) => false,
        }
    }

    pub(crate) fn on_disconnected(&self) {
        self.set_receiver(None);
    }

    pub(crate) fn on_read<G: GattServer>(&self, link: &LinkContext<G>, request: &ReadRequest) {
        match Attribute::from_handle(&self.handles(), request.handle) {
            Some(Attribute::TxLargeChar) => self.on_tx_large_read(link, request),
            Some(Attribute::TxCccd | Attribute::TxLargeCccd) => {
                let value = self.ccfg().to_le_bytes();
                self.respond(link, request.conn_id, request.trans_id, &Response::success(request.handle, &value));
            }
            Some(Attribute::TxChar | Attribute::RxChar | Attribute::RxLargeChar) => {
                self.respond(link, request.conn_id, request.trans_id, &Response::success(request.handle, &[]));
            }
            Some(Attribute::Service) | None => {}
        }
    }

    pub(crate) fn on_write<G: GattServer>(&self, link: &LinkContext<G>, request: &WriteRequest<'_>) {
        let status = match Attribute::from_handle(&self.handles(), request.handle) {
            Some(Attribute::RxChar) => self.on_rx_write(request),
            Some(Attribute::RxLargeChar) => self.on_rx_large_write(link, request),
            Some(Attribute::TxCccd | Attribute::TxLargeCccd) => self.on_cccd_write(request),
            Some(_) | None => ResponseStatus::Failure,
        };

        if request.needs_response() {
            let response = Response::with_status(request.handle, status, &[]);
            self.respond(link, request.conn_id, request.trans_id, &response);
        }
    }

    /// Serves the next chunk of the pending large message.
    fn on_tx_large_read<G: GattServer>(&self, link: &LinkContext<G>, request: &ReadRequest) {
        let transmit_len = link.transmit_len().min(MAX_TRANSMIT_LEN);
        let mut chunk = [0u8; MAX_TRANSMIT_LEN];
        let mut len = 0;
        // The pipe only hands out contiguous bytes, keep reading across the wrap.
        while len < transmit_len {
            match self.tx.try_read(&mut chunk[len..transmit_len]) {
                Ok(n) => len += n,
                Err(_) => break,
            }
        }
        self.tx_drained.fetch_add(len, Ordering::AcqRel);

        self.respond(link, request.conn_id, request.trans_id, &Response::success(request.handle, &chunk[..len]));

        if len < transmit_len && self.tx_active.swap(false, Ordering::AcqRel) {
            self.tx_done.signal(());
        }
    }

    fn on_rx_write(&self, request: &WriteRequest<'_>) -> ResponseStatus {
        if request.is_prep {
            return ResponseStatus::Failure;
        }
        let Ok(_rx) = self.rx.try_lock() else {
            warn!("Service {}: receive path busy", self.id);
            return ResponseStatus::Failure;
        };
        match self.receiver() {
            Some(handler) => {
                handler.on_receive(&mut Incoming::new(request.value));
                ResponseStatus::Success
            }
            None => ResponseStatus::Failure,
        }
    }

    fn on_rx_large_write<G: GattServer>(&self, link: &LinkContext<G>, request: &WriteRequest<'_>) -> ResponseStatus {
        if request.is_prep || !self.is_open() {
            return ResponseStatus::Failure;
        }
        let Ok(mut rx) = self.rx.try_lock() else {
            warn!("Service {}: receive path busy", self.id);
            return ResponseStatus::Failure;
        };

        if let Err(e) = rx.push(request.value, link.config().rx_initial_size) {
            error!("Service {}: cannot grow receive buffer {:?}", self.id, e);
            return ResponseStatus::Failure;
        }

        if request.value.len() < link.transmit_len() {
            let message = rx.take();
            debug!("Service {}: received {} byte message", self.id, message.len());
            if let Some(handler) = self.receiver() {
                handler.on_receive(&mut Incoming::new(&message));
            }
        }
        ResponseStatus::Success
    }

    fn on_cccd_write(&self, request: &WriteRequest<'_>) -> ResponseStatus {
        match request.value {
            &[lo, hi] => {
                self.ccfg.store(u16::from_le_bytes([lo, hi]), Ordering::Release);
                ResponseStatus::Success
            }
            _ => ResponseStatus::Failure,
        }
    }

    fn notify<G: GattServer>(&self, link: &LinkContext<G>, attribute: Attribute, value: &[u8]) -> Result<(), GattError> {
        link.gatt().send_indication(link.conn_id(), self.handle(attribute), value, false)
    }

    fn respond<G: GattServer>(&self, link: &LinkContext<G>, conn_id: u16, trans_id: u32, response: &Response<'_>) {
        if let Err(e) = link.gatt().send_response(conn_id, trans_id, response) {
            error!("Service {}: response failed {:?}", self.id, e);
        }
    }
}
