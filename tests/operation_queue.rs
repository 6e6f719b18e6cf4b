//! Serialization, timeout and cancellation behavior of the per-device request queue, observed
//! through the public session surface.

mod common;

use std::sync::Arc;
use std::time::Duration;

use ble_central::prelude::*;
use common::*;

fn device() -> (Device<MockCentral>, Arc<MockShared>) {
  let (central, shared) = MockCentral::new();
  (Device::new(Arc::new(central), address()), shared)
}

#[tokio::test]
async fn back_to_back_writes_reach_the_platform_one_at_a_time() {
  let (device, shared) = device();
  connect_and_discover(&shared, &device).await;
  let control = device.characteristic(&CONTROL_POINT).unwrap();

  let first = tokio::spawn({
    let c = control.clone();
    async move { c.write(&[0x01], true).await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Write(..))) == 1).await;

  let second = tokio::spawn({
    let c = control.clone();
    async move { c.write(&[0x02], true).await }
  });
  settle().await;

  // The second write must not be initiated while the first is outstanding.
  assert_eq!(shared.count(|c| matches!(c, Call::Write(..))), 1);

  shared.emit_gatt(GattEvent::CharacteristicWritten {
    characteristic: CONTROL_POINT,
    status: GattStatus::Success,
  });
  first.await.unwrap().unwrap();

  wait_until(|| shared.count(|c| matches!(c, Call::Write(..))) == 2).await;
  shared.emit_gatt(GattEvent::CharacteristicWritten {
    characteristic: CONTROL_POINT,
    status: GattStatus::Success,
  });
  second.await.unwrap().unwrap();

  let writes: Vec<Call> = shared
    .calls()
    .into_iter()
    .filter(|c| matches!(c, Call::Write(..)))
    .collect();
  assert_eq!(
    writes,
    vec![
      Call::Write(CONTROL_POINT, vec![0x01], WriteType::WithResponse),
      Call::Write(CONTROL_POINT, vec![0x02], WriteType::WithResponse),
    ]
  );
}

#[tokio::test]
async fn operations_resolve_in_enqueue_order() {
  let (device, shared) = device();
  connect_and_discover(&shared, &device).await;
  let measurement = device.characteristic(&MEASUREMENT).unwrap();

  let read = tokio::spawn({
    let c = measurement.clone();
    async move { c.read().await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Read(_))) == 1).await;

  let mtu = tokio::spawn({
    let d = device.clone();
    async move { d.request_mtu(185).await }
  });
  settle().await;
  assert_eq!(shared.count(|c| matches!(c, Call::RequestMtu(_))), 0);

  shared.emit_gatt(GattEvent::CharacteristicRead {
    characteristic: MEASUREMENT,
    status: GattStatus::Success,
    value: Some(vec![0x42]),
  });
  assert_eq!(read.await.unwrap().unwrap(), vec![0x42]);

  wait_until(|| shared.count(|c| matches!(c, Call::RequestMtu(_))) == 1).await;
  shared.emit_gatt(GattEvent::MtuChanged {
    status: GattStatus::Success,
    mtu: 183,
  });
  assert_eq!(mtu.await.unwrap().unwrap(), 183);
}

#[tokio::test(start_paused = true)]
async fn timed_out_operation_is_cancelled_and_queue_advances() {
  let (device, shared) = device();
  connect_and_discover(&shared, &device).await;
  let measurement = device.characteristic(&MEASUREMENT).unwrap();

  let stuck = tokio::spawn({
    let c = measurement.clone();
    async move { c.read().await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Read(_))) == 1).await;

  let next = tokio::spawn({
    let d = device.clone();
    async move { d.request_mtu(247).await }
  });
  settle().await;

  // No callback ever arrives for the read; its timer must fire and unblock the queue.
  tokio::time::sleep(OPERATION_TIMEOUT + Duration::from_secs(1)).await;

  assert_eq!(stuck.await.unwrap(), Err(Error::Cancelled));
  wait_until(|| shared.count(|c| matches!(c, Call::RequestMtu(_))) == 1).await;

  shared.emit_gatt(GattEvent::MtuChanged {
    status: GattStatus::Success,
    mtu: 247,
  });
  assert_eq!(next.await.unwrap().unwrap(), 247);
}

#[tokio::test]
async fn disconnect_cancels_in_flight_operation_exactly_once() {
  let (device, shared) = device();
  connect_and_discover(&shared, &device).await;
  let measurement = device.characteristic(&MEASUREMENT).unwrap();

  let read = tokio::spawn({
    let c = measurement.clone();
    async move { c.read().await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Read(_))) == 1).await;

  shared.emit_gatt(disconnected());
  assert_eq!(read.await.unwrap(), Err(Error::Disconnected));

  // A legitimate-looking success callback straggling in afterwards must be a no-op.
  shared.emit_gatt(GattEvent::CharacteristicRead {
    characteristic: MEASUREMENT,
    status: GattStatus::Success,
    value: Some(vec![0x42]),
  });

  assert_eq!(*device.connection_status().borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn pending_operations_fail_fast_after_disconnect_in_fifo_order() {
  let (device, shared) = device();

  // A first cycle yields a characteristic handle that survives the link.
  connect_and_discover(&shared, &device).await;
  let measurement = device.characteristic(&MEASUREMENT).unwrap();
  shared.emit_gatt(disconnected());

  let connecting = tokio::spawn({
    let d = device.clone();
    async move { d.connect().await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Connect(_))) == 2).await;

  let disconnecting = tokio::spawn({
    let d = device.clone();
    async move { d.disconnect().await }
  });
  settle().await;

  // Queued behind connect and disconnect; must never reach the platform.
  let reading = tokio::spawn({
    let c = measurement.clone();
    async move { c.read().await }
  });
  settle().await;

  shared.emit_gatt(connected(&shared));
  connecting.await.unwrap().unwrap();

  wait_until(|| shared.calls().contains(&Call::Close)).await;
  shared.emit_gatt(disconnected());
  disconnecting.await.unwrap().unwrap();

  assert_eq!(reading.await.unwrap(), Err(Error::NotConnected));
  assert_eq!(shared.count(|c| matches!(c, Call::Read(_))), 0);
}

#[tokio::test]
async fn operations_without_a_link_fail_fast() {
  let (device, shared) = device();

  assert_eq!(device.request_mtu(185).await, Err(Error::NotConnected));
  assert_eq!(device.discover_services().await, Err(Error::NotConnected));
  assert!(shared.calls().is_empty());

  // Disconnect with no link is a success, not an error.
  device.disconnect().await.unwrap();
  assert!(shared.calls().is_empty());
}

#[tokio::test]
async fn synchronous_platform_rejection_resolves_and_advances() {
  let (device, shared) = device();
  connect_and_discover(&shared, &device).await;
  let measurement = device.characteristic(&MEASUREMENT).unwrap();

  shared.fail_next_call("busy");
  let result = device.discover_services().await;
  assert!(matches!(result, Err(Error::Adapter(_))));

  // The queue is not wedged: the next request dispatches normally.
  let read = tokio::spawn({
    let c = measurement.clone();
    async move { c.read().await }
  });
  wait_until(|| shared.count(|c| matches!(c, Call::Read(_))) == 1).await;
  shared.emit_gatt(GattEvent::CharacteristicRead {
    characteristic: MEASUREMENT,
    status: GattStatus::Success,
    value: Some(vec![0x01, 0x02]),
  });
  assert_eq!(read.await.unwrap().unwrap(), vec![0x01, 0x02]);
}
