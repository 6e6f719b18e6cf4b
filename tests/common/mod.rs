//! Scripted in-memory platform adapter.  Tests drive it by asserting on the calls the library
//! issues and by injecting the callbacks a real stack would deliver.
#![allow(dead_code)]

use std::sync::{Arc, Mutex, Weak};

use ble_central::prelude::*;

pub fn address() -> BluetoothAddress {
  BluetoothAddress([0xAA, 0xBB, 0xCC, 0x00, 0x11, 0x22])
}

/// Every platform call the library can make, in the order it made them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
  Connect(BluetoothAddress),
  Close,
  DiscoverServices,
  RequestMtu(u16),
  Read(UUID),
  Write(UUID, Vec<u8>, WriteType),
  EnableNotifications(UUID, bool),
  WriteDescriptor(UUID, UUID, Vec<u8>),
  ScanStart(Vec<UUID>),
  ScanStop,
  AuthorizationRequest,
}

#[derive(Debug)]
pub struct MockError(pub &'static str);

#[derive(Default)]
pub struct MockShared {
  calls: Mutex<Vec<Call>>,
  fail_next: Mutex<Option<&'static str>>,
  gatt_sink: Mutex<Option<Weak<dyn GattCallback<MockLink>>>>,
  central_sink: Mutex<Option<Weak<dyn CentralCallback>>>,
}

impl MockShared {
  fn record(&self, call: Call) -> Result<(), MockError> {
    if let Some(message) = self.fail_next.lock().unwrap().take() {
      return Err(MockError(message));
    }
    self.calls.lock().unwrap().push(call);
    Ok(())
  }

  pub fn calls(&self) -> Vec<Call> {
    self.calls.lock().unwrap().clone()
  }

  pub fn count(&self, filter: impl Fn(&Call) -> bool) -> usize {
    self.calls.lock().unwrap().iter().filter(|c| filter(c)).count()
  }

  /// Make the next platform call fail synchronously with the given message.
  pub fn fail_next_call(&self, message: &'static str) {
    *self.fail_next.lock().unwrap() = Some(message);
  }

  /// Deliver a per-connection event as the platform stack would.
  pub fn emit_gatt(&self, event: GattEvent<MockLink>) {
    let sink = self.gatt_sink.lock().unwrap().clone();
    if let Some(sink) = sink.and_then(|weak| weak.upgrade()) {
      sink.on_event(event);
    }
  }

  /// Deliver an adapter-level event as the platform stack would.
  pub fn emit_central(&self, event: CentralEvent) {
    let sink = self.central_sink.lock().unwrap().clone();
    if let Some(sink) = sink.and_then(|weak| weak.upgrade()) {
      sink.on_event(event);
    }
  }
}

pub struct MockCentral {
  shared: Arc<MockShared>,
}

impl MockCentral {
  pub fn new() -> (Self, Arc<MockShared>) {
    let shared = Arc::new(MockShared::default());
    (
      Self {
        shared: shared.clone(),
      },
      shared,
    )
  }
}

impl Central for MockCentral {
  type SystemError = MockError;
  type Connection = MockLink;

  fn configure(&self, callback: Weak<dyn CentralCallback>) -> Result<(), MockError> {
    *self.shared.central_sink.lock().unwrap() = Some(callback);
    Ok(())
  }

  fn adapter_state(&self) -> AdapterState {
    AdapterState::PoweredOn
  }

  fn authorization(&self) -> Authorization {
    Authorization::Authorized
  }

  fn authorization_request(&self) -> Result<(), MockError> {
    self.shared.record(Call::AuthorizationRequest)
  }

  fn scan_start(&self, service_filter: &[UUID]) -> Result<(), MockError> {
    self.shared.record(Call::ScanStart(service_filter.to_vec()))
  }

  fn scan_stop(&self) -> Result<(), MockError> {
    self.shared.record(Call::ScanStop)
  }

  fn connect(
    &self,
    address: &BluetoothAddress,
    callback: Weak<dyn GattCallback<MockLink>>,
  ) -> Result<(), MockError> {
    self.shared.record(Call::Connect(*address))?;
    *self.shared.gatt_sink.lock().unwrap() = Some(callback);
    Ok(())
  }
}

#[derive(Clone)]
pub struct MockLink {
  address: BluetoothAddress,
  shared: Arc<MockShared>,
}

impl core::fmt::Debug for MockLink {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    write!(f, "MockLink({})", self.address)
  }
}

impl GattLink for MockLink {
  type SystemError = MockError;

  fn peer_address(&self) -> &BluetoothAddress {
    &self.address
  }

  fn close(&self) -> Result<(), MockError> {
    self.shared.record(Call::Close)
  }

  fn discover_services(&self) -> Result<(), MockError> {
    self.shared.record(Call::DiscoverServices)
  }

  fn request_mtu(&self, mtu: u16) -> Result<(), MockError> {
    self.shared.record(Call::RequestMtu(mtu))
  }

  fn read_characteristic(&self, characteristic: &UUID) -> Result<(), MockError> {
    self.shared.record(Call::Read(*characteristic))
  }

  fn write_characteristic(
    &self,
    characteristic: &UUID,
    value: &[u8],
    write_type: WriteType,
  ) -> Result<(), MockError> {
    self
      .shared
      .record(Call::Write(*characteristic, value.to_vec(), write_type))
  }

  fn enable_notifications(&self, characteristic: &UUID, enable: bool) -> Result<(), MockError> {
    self
      .shared
      .record(Call::EnableNotifications(*characteristic, enable))
  }

  fn write_descriptor(
    &self,
    characteristic: &UUID,
    descriptor: &UUID,
    value: &[u8],
  ) -> Result<(), MockError> {
    self
      .shared
      .record(Call::WriteDescriptor(*characteristic, *descriptor, value.to_vec()))
  }
}

// Canned events.

pub fn link(shared: &Arc<MockShared>) -> MockLink {
  MockLink {
    address: address(),
    shared: shared.clone(),
  }
}

pub fn connected(shared: &Arc<MockShared>) -> GattEvent<MockLink> {
  GattEvent::ConnectionStateChanged {
    status: GattStatus::Success,
    state: ConnectionState::Connected,
    link: Some(link(shared)),
  }
}

pub fn disconnected() -> GattEvent<MockLink> {
  GattEvent::ConnectionStateChanged {
    status: GattStatus::Success,
    state: ConnectionState::Disconnected,
    link: None,
  }
}

pub const HEART_RATE_SERVICE: UUID = UUID::Short(0x180D);
pub const MEASUREMENT: UUID = UUID::Short(0x2A37);
pub const CONTROL_POINT: UUID = UUID::Short(0x2A39);
pub const INDICATE_ONLY: UUID = UUID::Short(0x2A05);

pub fn heart_rate_tree() -> Vec<DiscoveredService> {
  vec![DiscoveredService {
    uuid: HEART_RATE_SERVICE,
    characteristics: vec![
      DiscoveredCharacteristic {
        uuid: MEASUREMENT,
        properties: CharacteristicProperty::Read | CharacteristicProperty::Notify,
      },
      DiscoveredCharacteristic {
        uuid: CONTROL_POINT,
        properties: CharacteristicProperty::WriteWithResponse
          | CharacteristicProperty::WriteWithoutResponse,
      },
      DiscoveredCharacteristic {
        uuid: INDICATE_ONLY,
        properties: CharacteristicProperty::Indicate.into(),
      },
    ],
  }]
}

pub fn discovered(services: Vec<DiscoveredService>) -> GattEvent<MockLink> {
  GattEvent::ServicesDiscovered {
    status: GattStatus::Success,
    services,
  }
}

/// Spin the scheduler until `condition` holds.  Panics rather than hanging when it never does.
pub async fn wait_until(condition: impl Fn() -> bool) {
  for _ in 0..1000 {
    if condition() {
      return;
    }
    tokio::task::yield_now().await;
  }
  panic!("condition not reached");
}

/// Let already-spawned tasks run up to their next suspension point.
pub async fn settle() {
  for _ in 0..10 {
    tokio::task::yield_now().await;
  }
}

/// Connect and discover the heart-rate tree, the setup most tests start from.
pub async fn connect_and_discover(shared: &Arc<MockShared>, device: &Device<MockCentral>) {
  let connecting = tokio::spawn({
    let device = device.clone();
    async move { device.connect().await }
  });
  wait_until(|| shared.calls().contains(&Call::Connect(address()))).await;
  shared.emit_gatt(connected(shared));
  connecting.await.unwrap().unwrap();

  let discovering = tokio::spawn({
    let device = device.clone();
    async move { device.discover_services().await }
  });
  wait_until(|| shared.calls().contains(&Call::DiscoverServices)).await;
  shared.emit_gatt(discovered(heart_rate_tree()));
  discovering.await.unwrap().unwrap();
}
