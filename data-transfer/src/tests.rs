// SPDX-FileCopyrightText: 2024 Foundation Devices, Inc. <hello@foundationdevices.com>
// SPDX-License-Identifier: GPL-3.0-or-later

extern crate std;

use core::sync::atomic::{AtomicBool, Ordering};
use std::boxed::Box;
use std::sync::Mutex;
use std::time::Instant as StdInstant;
use std::vec;
use std::vec::Vec;

use embassy_time::{Duration, Timer};
use futures::executor::block_on;
use futures::future::{join, join3};

use super::*;
use crate::attributes::{Attribute, AttributeHandles, ServiceTable, ATTRIBUTE_COUNT};

#[derive(Clone, Debug, PartialEq, Eq)]
enum Record {
    Notify { handle: u16, value: Vec<u8> },
    Response { handle: u16, status: ResponseStatus, value: Vec<u8> },
}

#[derive(Default)]
struct MockGatt {
    next_handle: Mutex<u16>,
    log: Mutex<Vec<Record>>,
    fail_notify: AtomicBool,
}

impl MockGatt {
    fn log(&self) -> Vec<Record> {
        self.log.lock().unwrap().clone()
    }

    fn notifications(&self, handle: u16) -> Vec<Vec<u8>> {
        self.log()
            .into_iter()
            .filter_map(|record| match record {
                Record::Notify { handle: h, value } if h == handle => Some(value),
                _ => None,
            })
            .collect()
    }

    fn last_response(&self) -> Option<(ResponseStatus, Vec<u8>)> {
        self.log().into_iter().rev().find_map(|record| match record {
            Record::Response { status, value, .. } => Some((status, value)),
            _ => None,
        })
    }
}

impl GattServer for MockGatt {
    fn create_service(&self, _table: &ServiceTable) -> Result<AttributeHandles, GattError> {
        let mut next = self.next_handle.lock().unwrap();
        let base = *next + 1;
        *next += 10;
        Ok(core::array::from_fn(|i| base + i as u16))
    }

    fn send_indication(&self, _conn_id: u16, handle: u16, value: &[u8], _confirm: bool) -> Result<(), GattError> {
        if self.fail_notify.load(Ordering::Relaxed) {
            return Err(GattError::Notify);
        }
        self.log.lock().unwrap().push(Record::Notify {
            handle,
            value: value.to_vec(),
        });
        Ok(())
    }

    fn send_response(&self, _conn_id: u16, _trans_id: u32, response: &Response<'_>) -> Result<(), GattError> {
        self.log.lock().unwrap().push(Record::Response {
            handle: response.handle,
            status: response.status,
            value: response.value.to_vec(),
        });
        Ok(())
    }
}

#[derive(Default)]
struct Recorder {
    messages: Mutex<Vec<Vec<u8>>>,
}

impl Recorder {
    fn messages(&self) -> Vec<Vec<u8>> {
        self.messages.lock().unwrap().clone()
    }
}

impl ReceiveHandler for Recorder {
    fn on_receive(&self, message: &mut Incoming<'_>) {
        let mut buf = vec![0; message.len()];
        let n = message.receive(&mut buf);
        buf.truncate(n);
        self.messages.lock().unwrap().push(buf);
    }
}

type Transfer = DataTransfer<&'static MockGatt>;

fn recorder() -> &'static Recorder {
    Box::leak(Box::new(Recorder::default()))
}

fn test_config() -> DataTransferConfig {
    DataTransferConfig {
        send_timeout: Duration::from_millis(1000),
        rx_initial_size: 64,
        create_retry_wait: Duration::from_millis(5),
        ..Default::default()
    }
}

fn new_transfer(config: DataTransferConfig) -> &'static Transfer {
    let gatt: &'static MockGatt = Box::leak(Box::new(MockGatt::default()));
    Box::leak(Box::new(DataTransfer::new(gatt, config)))
}

fn connected(mtu: u16, config: DataTransferConfig) -> &'static Transfer {
    let transfer = new_transfer(config);
    transfer.init().unwrap();
    transfer.handle_event(GattEvent::Connected { conn_id: 1 });
    transfer.handle_event(GattEvent::MtuChanged { conn_id: 1, mtu });
    transfer
}

fn gatt(transfer: &Transfer) -> &MockGatt {
    transfer.link().gatt()
}

fn write(transfer: &Transfer, handle: u16, value: &[u8], kind: WriteKind) {
    transfer.handle_event(GattEvent::Write(WriteRequest {
        conn_id: 1,
        trans_id: 7,
        handle,
        offset: 0,
        kind,
        is_prep: false,
        value,
    }));
}

fn read(transfer: &Transfer, handle: u16) -> Vec<u8> {
    transfer.handle_event(GattEvent::Read(ReadRequest {
        conn_id: 1,
        trans_id: 9,
        handle,
        offset: 0,
    }));
    gatt(transfer).last_response().map(|(_, value)| value).unwrap_or_default()
}

fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

/// Acts as the central: waits for each large object announcement and pulls
/// the remainder with reads until a short chunk ends it.
async fn pull_large_messages(transfer: &Transfer, service: usize, count: usize) -> Vec<Vec<u8>> {
    let handle = transfer.service(service).unwrap().handle(Attribute::TxLargeChar);
    let transmit_len = transfer.link().transmit_len();
    let mut messages = Vec::new();
    let mut current: Option<Vec<u8>> = None;
    let mut announced = 0;

    for _ in 0..20_000 {
        if messages.len() == count {
            break;
        }
        Timer::after_millis(1).await;
        if current.is_none() {
            let notifications = gatt(transfer).notifications(handle);
            if notifications.len() == announced {
                continue;
            }
            current = Some(notifications[announced].clone());
            announced += 1;
        }
        let chunk = read(transfer, handle);
        let done = chunk.len() < transmit_len;
        current.as_mut().unwrap().extend_from_slice(&chunk);
        if done {
            messages.push(current.take().unwrap());
        }
    }
    messages
}

/// Waits for the large object announcement, then reads back to back until a
/// short chunk without yielding to the sender in between.
async fn pull_without_yielding(transfer: &Transfer, service: usize) -> Vec<u8> {
    let handle = transfer.service(service).unwrap().handle(Attribute::TxLargeChar);
    let transmit_len = transfer.link().transmit_len();
    loop {
        Timer::after_millis(1).await;
        let Some(mut message) = gatt(transfer).notifications(handle).first().cloned() else {
            continue;
        };
        loop {
            let chunk = read(transfer, handle);
            let done = chunk.len() < transmit_len;
            message.extend_from_slice(&chunk);
            if done {
                return message;
            }
        }
    }
}

#[test]
fn init_registers_each_service_once() {
    let transfer = new_transfer(test_config());
    transfer.init().unwrap();
    transfer.init().unwrap();

    let first = transfer.service(0).unwrap().handles();
    let second = transfer.service(1).unwrap().handles();
    assert_eq!(first, [1, 2, 3, 4, 5, 6, 7]);
    assert_eq!(second, [11, 12, 13, 14, 15, 16, 17]);
    assert_eq!(*gatt(transfer).next_handle.lock().unwrap(), 20);
}

#[test]
fn service_table_layout() {
    let table = attributes::service_table(1);
    assert_eq!(table.len(), ATTRIBUTE_COUNT);
    assert_eq!(table[Attribute::TxCccd as usize].uuid, attributes::Uuid::Uuid16(0x2902));
    assert_eq!(table[Attribute::TxLargeCccd as usize].uuid, attributes::Uuid::Uuid16(0x2902));
    match table[Attribute::RxLargeChar as usize].uuid {
        attributes::Uuid::Uuid128(bytes) => {
            assert_eq!(bytes[0], 0x05);
            assert_eq!(bytes[1], 1);
            assert_eq!(bytes[2..], consts::DATA_TRANSFER_UUID_MASK);
        }
        other => panic!("unexpected uuid {other:?}"),
    }
}

#[test]
fn message_just_below_payload_is_one_notification() {
    let transfer = connected(23, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let message = pattern(23 - 4, 1);

    let sent = block_on(service.send(transfer.link(), &message));

    assert_eq!(sent, message.len());
    assert_eq!(
        gatt(transfer).log(),
        vec![Record::Notify {
            handle: service.handle(Attribute::TxChar),
            value: message,
        }]
    );
    assert_eq!(service.pending_bytes(), 0);
    assert!(!service.is_sending());
}

#[test]
fn send_requires_open_connection() {
    let transfer = connected(23, test_config());
    let sent = block_on(transfer.service(0).unwrap().send(transfer.link(), b"hi"));
    assert_eq!(sent, 0);
    assert!(gatt(transfer).log().is_empty());
}

#[test]
fn large_message_is_pulled_by_reads() {
    let transfer = connected(103, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let message = pattern(2500, 3);

    let (sent, received) = block_on(join(
        service.send(transfer.link(), &message),
        pull_large_messages(transfer, 0, 1),
    ));

    assert_eq!(sent, message.len());
    assert_eq!(received, vec![message]);
    assert!(!service.is_sending());
    assert_eq!(service.pending_bytes(), 0);
}

#[test]
fn exact_payload_multiple_ends_with_empty_read() {
    let transfer = connected(103, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let message = pattern(300, 5);

    let (sent, received) = block_on(join(
        service.send(transfer.link(), &message),
        pull_large_messages(transfer, 0, 1),
    ));

    assert_eq!(sent, 300);
    assert_eq!(received, vec![message]);
    assert_eq!(gatt(transfer).last_response(), Some((ResponseStatus::Success, Vec::new())));
}

#[test]
fn concurrent_large_sends_are_serialized() {
    let transfer = connected(103, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let first = pattern(700, 10);
    let second = pattern(650, 20);

    let (sent_first, sent_second, received) = block_on(join3(
        service.send(transfer.link(), &first),
        service.send(transfer.link(), &second),
        pull_large_messages(transfer, 0, 2),
    ));

    assert_eq!(sent_first, first.len());
    assert_eq!(sent_second, second.len());
    assert_eq!(received, vec![first, second]);

    // The second announcement only goes out after the first message ended.
    let large = service.handle(Attribute::TxLargeChar);
    let log = gatt(transfer).log();
    let second_notify = log
        .iter()
        .enumerate()
        .filter(|(_, r)| matches!(r, Record::Notify { handle, .. } if *handle == large))
        .nth(1)
        .map(|(idx, _)| idx)
        .unwrap();
    let first_end = log
        .iter()
        .position(|r| matches!(r, Record::Response { value, .. } if value.len() < 100))
        .unwrap();
    assert!(first_end < second_notify);
}

#[test]
fn early_end_of_message_is_reported_as_short_send() {
    let transfer = connected(517, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let message = pattern(2000, 9);

    let (sent, received) = block_on(join(
        service.send(transfer.link(), &message),
        pull_without_yielding(transfer, 0),
    ));

    // The first chunk plus one full buffer reached the peer before it saw a short read.
    assert_eq!(received.len(), 514 + 1024);
    assert_eq!(sent, received.len());
    assert_eq!(received, message[..sent]);
    assert!(!service.is_sending());
    assert_eq!(service.pending_bytes(), 0);
}

#[test]
fn disconnect_cancels_blocked_send() {
    let transfer = connected(103, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    let message = pattern(3000, 7);
    let started = StdInstant::now();

    let (sent, ()) = block_on(join(service.send(transfer.link(), &message), async {
        Timer::after_millis(20).await;
        transfer.handle_event(GattEvent::Disconnected { conn_id: 1 });
    }));

    assert_eq!(sent, 100);
    assert!(started.elapsed() < std::time::Duration::from_millis(1000));
    assert!(!service.is_sending());
    assert_eq!(service.pending_bytes(), 0);
}

#[test]
fn send_times_out_when_peer_never_reads() {
    let config = DataTransferConfig {
        send_timeout: Duration::from_millis(50),
        ..test_config()
    };
    let transfer = connected(103, config);
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));

    let sent = block_on(service.send(transfer.link(), &pattern(400, 1)));

    assert_eq!(sent, 100);
    assert!(!service.is_sending());
    assert_eq!(service.pending_bytes(), 0);
}

#[test]
fn notify_failure_aborts_send() {
    let transfer = connected(103, test_config());
    let service = transfer.service(0).unwrap();
    service.set_receiver(Some(recorder()));
    gatt(transfer).fail_notify.store(true, Ordering::Relaxed);

    assert_eq!(block_on(service.send(transfer.link(), &pattern(10, 0))), 0);
    assert_eq!(block_on(service.send(transfer.link(), &pattern(500, 0))), 0);
    assert!(!service.is_sending());
    assert_eq!(service.pending_bytes(), 0);
}

#[test]
fn fragmented_writes_reassemble() {
    for mtu in [23u16, 64, 185, 247] {
        let transmit_len = mtu as usize - 3;
        for len in [transmit_len + 1, 2 * transmit_len, 3 * transmit_len + 7, 4101] {
            let transfer = connected(mtu, test_config());
            let service = transfer.service(0).unwrap();
            let handler = recorder();
            service.set_receiver(Some(handler));
            let handle = service.handle(Attribute::RxLargeChar);
            let message = pattern(len, mtu as u8);

            for chunk in message.chunks(transmit_len) {
                write(transfer, handle, chunk, WriteKind::Command);
            }
            if len % transmit_len == 0 {
                write(transfer, handle, &[], WriteKind::Command);
            }

            assert_eq!(handler.messages(), vec![message], "mtu {mtu} len {len}");
        }
    }
}

#[test]
fn interleaved_large_writes_stay_per_service() {
    let transfer = connected(23, test_config());
    let handlers = [recorder(), recorder()];
    let messages = [pattern(95, 1), pattern(77, 2)];
    let handles: Vec<u16> = (0..2)
        .map(|i| {
            let service = transfer.service(i).unwrap();
            service.set_receiver(Some(handlers[i]));
            service.handle(Attribute::RxLargeChar)
        })
        .collect();

    let mut chunks = [messages[0].chunks(20), messages[1].chunks(20)];
    loop {
        let mut progressed = false;
        for i in 0..2 {
            if let Some(chunk) = chunks[i].next() {
                write(transfer, handles[i], chunk, WriteKind::Request);
                progressed = true;
            }
        }
        if !progressed {
            break;
        }
    }

    assert_eq!(handlers[0].messages(), vec![messages[0].clone()]);
    assert_eq!(handlers[1].messages(), vec![messages[1].clone()]);
}

#[test]
fn receive_buffer_allocation_failure_fails_the_write() {
    let config = DataTransferConfig {
        rx_initial_size: usize::MAX,
        ..test_config()
    };
    let transfer = connected(23, config);
    let service = transfer.service(0).unwrap();
    let handler = recorder();
    service.set_receiver(Some(handler));
    let handle = service.handle(Attribute::RxLargeChar);

    write(transfer, handle, &[0x5A; 20], WriteKind::Request);
    assert_eq!(gatt(transfer).last_response(), Some((ResponseStatus::Failure, Vec::new())));

    write(transfer, handle, &[0x5B; 5], WriteKind::Request);
    assert_eq!(gatt(transfer).last_response(), Some((ResponseStatus::Failure, Vec::new())));
    assert!(handler.messages().is_empty());
}

#[test]
fn short_write_is_handed_over_directly() {
    let transfer = connected(23, test_config());
    let service = transfer.service(1).unwrap();
    let handler = recorder();
    service.set_receiver(Some(handler));

    write(transfer, service.handle(Attribute::RxChar), b"ping", WriteKind::Request);

    assert_eq!(handler.messages(), vec![b"ping".to_vec()]);
    assert_eq!(gatt(transfer).last_response(), Some((ResponseStatus::Success, Vec::new())));
}

#[test]
fn write_command_gets_no_response() {
    let transfer = connected(23, test_config());
    let service = transfer.service(0).unwrap();
    let handler = recorder();
    service.set_receiver(Some(handler));

    write(transfer, service.handle(Attribute::RxChar), b"cmd", WriteKind::Command);

    assert_eq!(handler.messages(), vec![b"cmd".to_vec()]);
    assert!(gatt(transfer).log().is_empty());
}

#[test]
fn prepare_writes_are_rejected() {
    let transfer = connected(23, test_config());
    let service = transfer.service(0).unwrap();
    let handler = recorder();
    service.set_receiver(Some(handler));

    for attribute in [Attribute::RxChar, Attribute::RxLargeChar] {
        transfer.handle_event(GattEvent::Write(WriteRequest {
            conn_id: 1,
            trans_id: 3,
            handle: service.handle(attribute),
            offset: 0,
            kind: WriteKind::Request,
            is_prep: true,
            value: b"queued",
        }));
        assert_eq!(gatt(transfer).last_response().map(|(status, _)| status), Some(ResponseStatus::Failure));
    }
    assert!(handler.messages().is_empty());
}

#[test]
fn writes_without_handler_are_dropped() {
    let transfer = connected(23, test_config());
    let service = transfer.service(0).unwrap();

    write(transfer, service.handle(Attribute::RxLargeChar), b"orphan", WriteKind::Request);

    assert_eq!(gatt(transfer).last_response().map(|(status, _)| status), Some(ResponseStatus::Failure));
}

#[test]
fn cccd_write_and_read() {
    let transfer = connected(23, test_config());
    let service = transfer.service(0).unwrap();
    let cccd = service.handle(Attribute::TxLargeCccd);

    write(transfer, cccd, &[0x01, 0x00], WriteKind::Request);
    assert_eq!(gatt(transfer).last_response(), Some((ResponseStatus::Success, Vec::new())));
    assert_eq!(service.ccfg(), 1);
    assert!(service.notifications_enabled());
    assert_eq!(read(transfer, service.handle(Attribute::TxCccd)), vec![0x01, 0x00]);

    write(transfer, cccd, &[0x02, 0x00, 0x00], WriteKind::Request);
    assert_eq!(service.ccfg(), 1);
    assert_eq!(gatt(transfer).last_response().map(|(status, _)| status), Some(ResponseStatus::Failure));
}

#[test]
fn disconnect_closes_every_service_and_restores_mtu() {
    let transfer = connected(103, test_config());
    for service in transfer.services() {
        service.set_receiver(Some(recorder()));
    }
    assert_eq!(transfer.link().transmit_len(), 100);

    transfer.handle_event(GattEvent::Disconnected { conn_id: 1 });

    assert!(transfer.services().iter().all(|service| !service.is_open()));
    assert!(!transfer.link().is_connected());
    assert_eq!(transfer.link().mtu(), consts::PREFERRED_MTU);
}

#[test]
fn mtu_is_kept_within_att_bounds() {
    let transfer = connected(10, test_config());
    assert_eq!(transfer.link().mtu(), 23);
    transfer.handle_event(GattEvent::MtuChanged { conn_id: 1, mtu: 2000 });
    assert_eq!(transfer.link().mtu(), 517);
    assert_eq!(transfer.link().transmit_len(), consts::MAX_TRANSMIT_LEN);
}

#[test]
fn incoming_copies_in_pieces() {
    let mut incoming = Incoming::new(b"abcdef");
    let mut buf = [0u8; 4];
    assert_eq!(incoming.receive(&mut buf), 4);
    assert_eq!(&buf, b"abcd");
    assert_eq!(incoming.remaining(), 2);
    assert_eq!(incoming.receive(&mut buf), 2);
    assert_eq!(&buf[..2], b"ef");
    assert_eq!(incoming.receive(&mut buf), 0);
    assert_eq!(incoming.len(), 6);
}

#[test]
fn create_checks_link_and_service_state() {
    let transfer = new_transfer(test_config());
    let network = BleNetwork::new(transfer);

    transfer.handle_event(GattEvent::Connected { conn_id: 1 });
    assert_eq!(network.create(0).err(), Some(NetworkError::NotInitialized));
    transfer.handle_event(GattEvent::Disconnected { conn_id: 1 });

    transfer.init().unwrap();
    assert_eq!(network.create(0).err(), Some(NetworkError::NotConnected));

    transfer.handle_event(GattEvent::Connected { conn_id: 1 });
    assert_eq!(network.create(5).err(), Some(NetworkError::InvalidService));

    let connection = network.create(ServiceId::Mqtt.index()).unwrap();
    assert_eq!(connection.service_id(), 0);
    connection.set_receive_callback(recorder());
    assert_eq!(network.create(0).err(), Some(NetworkError::InUse));
    assert!(network.create(ServiceId::WifiProvisioning.index()).is_ok());

    connection.close();
    assert!(network.create(0).is_ok());
}

#[test]
fn close_drops_partial_incoming_message() {
    let transfer = connected(23, test_config());
    let network = BleNetwork::new(transfer);
    let handle = transfer.service(0).unwrap().handle(Attribute::RxLargeChar);

    let connection = network.create(0).unwrap();
    let first = recorder();
    connection.set_receive_callback(first);
    write(transfer, handle, &[0xAA; 20], WriteKind::Command);
    connection.close();

    let connection = network.create(0).unwrap();
    let second = recorder();
    connection.set_receive_callback(second);
    write(transfer, handle, &[0x11; 20], WriteKind::Command);
    write(transfer, handle, &[0x22; 5], WriteKind::Command);

    let mut expected = vec![0x11; 20];
    expected.extend_from_slice(&[0x22; 5]);
    assert!(first.messages().is_empty());
    assert_eq!(second.messages(), vec![expected]);
}

#[test]
fn connection_round_trip() {
    let transfer = connected(23, test_config());
    let network = BleNetwork::new(transfer);
    let connection = network.create(0).unwrap();
    let handler = recorder();
    connection.set_receive_callback(handler);

    assert_eq!(block_on(connection.send(b"publish")), 7);
    write(transfer, transfer.service(0).unwrap().handle(Attribute::RxChar), b"puback", WriteKind::Command);
    assert_eq!(handler.messages(), vec![b"puback".to_vec()]);

    let mut incoming = Incoming::new(b"payload");
    let mut buf = [0u8; 3];
    assert_eq!(connection.receive(&mut incoming, &mut buf), 3);
    assert_eq!(&buf, b"pay");
}

#[test]
fn destroy_only_after_close() {
    let transfer = connected(23, test_config());
    let network = BleNetwork::new(transfer);

    let connection = network.create(0).unwrap();
    connection.set_receive_callback(recorder());
    assert_eq!(block_on(connection.destroy()), Err(NetworkError::InUse));

    let connection = network.create(1).unwrap();
    connection.set_receive_callback(recorder());
    connection.close();
    assert_eq!(block_on(connection.destroy()), Ok(()));
    assert_eq!(transfer.service(1).unwrap().pending_bytes(), 0);
}

#[test]
fn create_with_retry_waits_for_the_link() {
    let transfer = new_transfer(test_config());
    transfer.init().unwrap();
    let network = BleNetwork::new(transfer);

    let (result, ()) = block_on(join(network.create_with_retry(0), async {
        Timer::after_millis(20).await;
        transfer.handle_event(GattEvent::Connected { conn_id: 4 });
    }));

    assert!(result.is_ok());
    assert_eq!(transfer.link().conn_id(), 4);
}

#[test]
fn create_with_retry_gives_up() {
    let config = DataTransferConfig {
        create_retries: 3,
        create_retry_wait: Duration::from_millis(1),
        ..test_config()
    };
    let transfer = new_transfer(config);
    transfer.init().unwrap();
    let network = BleNetwork::new(transfer);

    assert_eq!(block_on(network.create_with_retry(0)).err(), Some(NetworkError::NotConnected));
}
