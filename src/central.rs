use core::fmt::Debug;
use std::sync::Weak;

use crate::bluetooth_address::BluetoothAddress;
use crate::gatt_client_cb::GattCallback;
use crate::gatt_link::GattLink;
use crate::uuid::UUID;

/// Trait defining the capabilities of a host-side BLE central adapter, typically backed by the
/// operating system Bluetooth stack.  For more information, see:
/// https://embeddedcentric.com/lesson-2-ble-profiles-services-characteristics-device-roles-and-network-topology/
///
/// Note that this trait is meant to be a low-level mapping to common platform BLE APIs and is
/// not ergonomic or safe on its own: calls are fire-and-forget with results delivered through
/// callbacks on arbitrary threads, and connections tolerate only one outstanding request each.
/// The [crate::Manager]/[crate::Device] session layer exists to make it safe.
pub trait Central: Send + Sync + 'static {
  type SystemError: Debug;

  type Connection: GattLink + Debug + Clone + Send + Sync + 'static;

  /// Register the sink for adapter-level events.  Only one sink is ever registered per
  /// adapter.  The sink is held weakly so a released manager stops receiving events.
  fn configure(&self, callback: Weak<dyn CentralCallback>) -> Result<(), Self::SystemError>;

  /// Current power/availability state of the adapter.  Later transitions arrive through
  /// [CentralEvent::StateChanged].
  fn adapter_state(&self) -> AdapterState;

  /// Current status of the OS permission grant for using Bluetooth.  Later transitions arrive
  /// through [CentralEvent::AuthorizationChanged].
  fn authorization(&self) -> Authorization;

  /// Ask the OS to prompt the user for the Bluetooth permissions this crate needs.  The
  /// outcome arrives through [CentralEvent::AuthorizationChanged].
  fn authorization_request(&self) -> Result<(), Self::SystemError>;

  /// Begin scanning for advertisements, optionally restricted to peripherals advertising one
  /// of the given service UUIDs.  Results arrive through [CentralEvent::ScanResult] until
  /// [Central::scan_stop] or a [CentralEvent::ScanFailed].
  fn scan_start(&self, service_filter: &[UUID]) -> Result<(), Self::SystemError>;

  fn scan_stop(&self) -> Result<(), Self::SystemError>;

  /// Open a GATT connection to the given address over the LE transport.  Fire-and-forget:
  /// exactly one connection-state-changed event follows, carrying the live
  /// [Self::Connection] handle on success.  Every event for this connection must be delivered
  /// to `callback`.
  fn connect(
    &self,
    address: &BluetoothAddress,
    callback: Weak<dyn GattCallback<Self::Connection>>,
  ) -> Result<(), Self::SystemError>;
}

/// Sink for adapter-level events, registered once through [Central::configure].
pub trait CentralCallback: Send + Sync {
  fn on_event(&self, event: CentralEvent);
}

impl<F> CentralCallback for F
where
  F: Fn(CentralEvent) + Send + Sync,
{
  fn on_event(&self, event: CentralEvent) {
    (self)(event)
  }
}

/// Adapter-level events delivered to the registered [CentralCallback].
#[derive(Debug, Clone)]
pub enum CentralEvent {
  StateChanged(AdapterState),

  AuthorizationChanged(Authorization),

  /// One advertisement (or merged scan response) from one peripheral.  `data` is the raw
  /// payload; parsing is left to the receiving side.
  ScanResult {
    address: BluetoothAddress,
    name: Option<String>,
    rssi: i16,
    data: Vec<u8>,
    connectable: bool,
  },

  /// Scanning stopped on its own.  `code` is the platform's error code, kept raw for
  /// diagnostics.
  ScanFailed { code: i32 },
}

/// Power/availability of the Bluetooth adapter.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdapterState {
  Unknown,
  Unauthorized,
  PoweredOff,
  PoweredOn,
}

/// Status of the OS permission grant for Bluetooth use.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Authorization {
  Unknown,
  /// The user denied once; the OS suggests explaining why the permission is needed before
  /// asking again.
  ShowRationale,
  Denied,
  Authorized,
}
