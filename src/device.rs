use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::{debug, warn};

use crate::advertisement::AdvertisementData;
use crate::bluetooth_address::BluetoothAddress;
use crate::central::Central;
use crate::characteristic::Characteristic;
use crate::error::Error;
use crate::gatt_client_cb::{ConnectionState, GattCallback, GattEvent};
use crate::mtu::Mtu;
use crate::operation::{OperationOutcome, OperationRequest};
use crate::operation_queue::OperationQueue;
use crate::service::Service;
use crate::uuid::UUID;

/// How often [Device::connect] will try before surfacing a transient failure, and the delay
/// added between tries (multiplied by the attempt number).  These match observed platform
/// flakiness rather than anything in the protocol; tune freely.
pub const CONNECT_ATTEMPTS: u32 = 3;
pub const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(300);

/// One remote peripheral, addressable whether or not it is currently connected.  A session is
/// created the first time its address is seen (or requested) and survives connect/disconnect
/// cycles; only dropping every clone releases it.
///
/// All GATT requests on one device are serialized through its operation queue, so callers may
/// invoke these methods concurrently from anywhere and still observe strict FIFO completion.
pub struct Device<C: Central> {
  shared: Arc<DeviceShared<C>>,
}

impl<C: Central> Clone for Device<C> {
  fn clone(&self) -> Self {
    Self {
      shared: self.shared.clone(),
    }
  }
}

impl<C: Central> core::fmt::Debug for Device<C> {
  fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
    f.debug_struct("Device")
      .field("address", &self.shared.address)
      .finish()
  }
}

pub(crate) struct DeviceShared<C: Central> {
  address: BluetoothAddress,
  queue: Arc<OperationQueue<C>>,
  connection_status: watch::Sender<ConnectionState>,
  mtu: watch::Sender<Mtu>,
  services: watch::Sender<Vec<Service<C>>>,
  details: Mutex<Details>,
}

/// Scan-time metadata, refreshed on every advertisement.
#[derive(Default)]
struct Details {
  name: Option<String>,
  rssi: i16,
  advertisement: AdvertisementData,
  connectable: bool,
}

impl<C: Central> Device<C> {
  /// Build a session for a known address.  Must be called within a Tokio runtime; the
  /// runtime's handle drives the session's operation timeouts.
  pub fn new(backend: Arc<C>, address: BluetoothAddress) -> Self {
    Self::with_runtime(backend, address, Handle::current())
  }

  pub(crate) fn with_runtime(backend: Arc<C>, address: BluetoothAddress, runtime: Handle) -> Self {
    let queue = OperationQueue::new(backend, address, runtime);
    let shared = Arc::new(DeviceShared {
      address,
      queue: queue.clone(),
      connection_status: watch::Sender::new(ConnectionState::Disconnected),
      mtu: watch::Sender::new(Mtu::DEFAULT),
      services: watch::Sender::new(Vec::new()),
      details: Mutex::new(Details::default()),
    });
    let sink_arc: Arc<dyn GattCallback<C::Connection>> = shared.clone();
    let sink: Weak<dyn GattCallback<C::Connection>> = Arc::downgrade(&sink_arc);
    queue.set_sink(sink);
    Self { shared }
  }

  pub fn address(&self) -> BluetoothAddress {
    self.shared.address
  }

  /// Remembered device name: the scanner-reported name when the platform knows one, otherwise
  /// whatever the latest advertisement carried.
  pub fn name(&self) -> Option<String> {
    let details = self.shared.details.lock().unwrap();
    details
      .name
      .clone()
      .or_else(|| details.advertisement.local_name().map(str::to_owned))
  }

  pub fn rssi(&self) -> i16 {
    self.shared.details.lock().unwrap().rssi
  }

  pub fn advertisement(&self) -> AdvertisementData {
    self.shared.details.lock().unwrap().advertisement.clone()
  }

  pub fn is_connectable(&self) -> bool {
    self.shared.details.lock().unwrap().connectable
  }

  pub fn connection_status(&self) -> watch::Receiver<ConnectionState> {
    self.shared.connection_status.subscribe()
  }

  pub fn mtu(&self) -> watch::Receiver<Mtu> {
    self.shared.mtu.subscribe()
  }

  /// The discovered service tree.  Replaced wholesale on each successful discovery pass and
  /// emptied on disconnect.
  pub fn services(&self) -> watch::Receiver<Vec<Service<C>>> {
    self.shared.services.subscribe()
  }

  /// Find a characteristic anywhere in the current service tree.
  pub fn characteristic(&self, uuid: &UUID) -> Option<Characteristic<C>> {
    self.shared.characteristic(uuid)
  }

  /// Open the link.  Transient transport failures (the generic stack error most platforms
  /// produce under radio contention) are retried with an increasing delay before the final
  /// error surfaces; everything else fails immediately.
  pub async fn connect(&self) -> Result<(), Error> {
    let mut attempt = 0;
    loop {
      attempt += 1;
      self
        .shared
        .connection_status
        .send_replace(ConnectionState::Connecting);

      match self.shared.enqueue(OperationRequest::Connect).await {
        Ok(_) => return Ok(()),
        Err(Error::Gatt { status }) if status.is_transient() && attempt < CONNECT_ATTEMPTS => {
          warn!(
            device = %self.shared.address,
            attempt,
            ?status,
            "transient connect failure, backing off"
          );
          self
            .shared
            .connection_status
            .send_replace(ConnectionState::Disconnected);
          tokio::time::sleep(CONNECT_RETRY_DELAY * attempt).await;
        }
        Err(e) => {
          self
            .shared
            .connection_status
            .send_replace(ConnectionState::Disconnected);
          return Err(e);
        }
      }
    }
  }

  /// Close the link.  Succeeds immediately when already disconnected.
  pub async fn disconnect(&self) -> Result<(), Error> {
    self.shared.enqueue(OperationRequest::Disconnect).await?;
    Ok(())
  }

  /// Enumerate the peer's services and characteristics.  On success the tree is available
  /// through [Device::services].
  pub async fn discover_services(&self) -> Result<(), Error> {
    self.shared.enqueue(OperationRequest::DiscoverServices).await?;
    Ok(())
  }

  /// Negotiate the ATT MTU.  Returns the granted value, which the platform may cap below the
  /// request.
  pub async fn request_mtu(&self, mtu: u16) -> Result<u16, Error> {
    self
      .shared
      .enqueue(OperationRequest::RequestMtu { mtu })
      .await?
      .expect_mtu()
  }

  pub(crate) fn shared(&self) -> &Arc<DeviceShared<C>> {
    &self.shared
  }
}

impl<C: Central> DeviceShared<C> {
  async fn enqueue(&self, request: OperationRequest) -> Result<OperationOutcome, Error> {
    let receiver = self.queue.enqueue(request);
    receiver.await.unwrap_or(Err(Error::Cancelled))
  }

  fn characteristic(&self, uuid: &UUID) -> Option<Characteristic<C>> {
    self
      .services
      .borrow()
      .iter()
      .find_map(|s| s.characteristic(uuid).cloned())
  }

  /// Apply an event to session-level state after the queue has seen it.
  fn apply_event(&self, event: &GattEvent<C::Connection>) {
    match event {
      GattEvent::ConnectionStateChanged { state, .. } => match state {
        ConnectionState::Connected => {
          debug!(device = %self.address, "connected");
          self.connection_status.send_replace(ConnectionState::Connected);
        }
        ConnectionState::Disconnected => {
          debug!(device = %self.address, "disconnected");
          // The GATT world ends with the link: stale handles must not answer for a future
          // connection's attributes.
          for service in self.services.borrow().iter() {
            for characteristic in service.characteristics() {
              characteristic.reset_on_disconnect();
            }
          }
          self.services.send_replace(Vec::new());
          self.mtu.send_replace(Mtu::DEFAULT);
          self
            .connection_status
            .send_replace(ConnectionState::Disconnected);
        }
        ConnectionState::Connecting => {}
      },

      GattEvent::ServicesDiscovered { status, services } if status.is_success() => {
        debug!(device = %self.address, count = services.len(), "services discovered");
        let queue = Arc::downgrade(&self.queue);
        let tree = services
          .iter()
          .map(|s| Service::new(s, queue.clone()))
          .collect();
        self.services.send_replace(tree);
      }

      GattEvent::MtuChanged { status, mtu } if status.is_success() => {
        self.mtu.send_replace(Mtu::new(*mtu));
      }

      GattEvent::CharacteristicRead {
        characteristic,
        status,
        value,
      } if status.is_success() => {
        if let Some(c) = self.characteristic(characteristic) {
          c.update_value(value.clone().unwrap_or_default());
        }
      }

      GattEvent::CharacteristicChanged {
        characteristic,
        value,
      } => {
        if let Some(c) = self.characteristic(characteristic) {
          c.update_value(value.clone());
        }
      }

      _ => {}
    }
  }

  /// Refresh scan-time metadata from an advertisement.
  pub(crate) fn note_scan_result(
    &self,
    name: Option<String>,
    rssi: i16,
    advertisement: AdvertisementData,
    connectable: bool,
  ) {
    let mut details = self.details.lock().unwrap();
    if name.is_some() {
      details.name = name;
    }
    details.rssi = rssi;
    details.advertisement = advertisement;
    details.connectable = connectable;
  }
}

impl<C: Central> GattCallback<C::Connection> for DeviceShared<C> {
  /// Entry point for every platform callback on this connection.  The current operation sees
  /// the event first (it may be the answer it is waiting for), characteristic- and
  /// session-level state update second, and then dispatch advances in case the current slot
  /// opened up.
  fn on_event(&self, event: GattEvent<C::Connection>) {
    self.queue.route_event(&event);
    self.apply_event(&event);
    self.queue.pump();
  }
}
