use core::fmt::Debug;

use crate::bluetooth_address::BluetoothAddress;
use crate::uuid::UUID;

/// Represents a live GATT connection from the central perspective: the handle through which
/// every request to the remote peripheral is issued.  The handle exists only between a
/// successful connect and the following disconnect; sessions hold it as an `Option` and drop
/// it the moment the link goes down.
///
/// All request methods are fire-and-forget against a platform stack that accepts exactly one
/// outstanding request per connection: an `Ok` return means the request was submitted and
/// exactly one matching [crate::GattEvent] will be delivered later.  An `Err` return is a
/// synchronous rejection and no event will follow.  Serializing calls so that only one request
/// is ever outstanding is the job of this crate, not of implementations.
pub trait GattLink {
  type SystemError: Debug;

  /// Access the connected peer's Bluetooth address.
  fn peer_address(&self) -> &BluetoothAddress;

  /// Request an orderly disconnect.  Completion is reported through a
  /// connection-state-changed event.
  fn close(&self) -> Result<(), Self::SystemError>;

  /// Request enumeration of the peer's service/characteristic tree.  The resulting tree rides
  /// on the services-discovered event.
  fn discover_services(&self) -> Result<(), Self::SystemError>;

  /// Request ATT MTU renegotiation.  The stack may grant less than requested; the granted
  /// value rides on the mtu-changed event.
  fn request_mtu(&self, mtu: u16) -> Result<(), Self::SystemError>;

  fn read_characteristic(&self, characteristic: &UUID) -> Result<(), Self::SystemError>;

  /// Write a characteristic value.  Implementations must deliver a characteristic-written
  /// event for both write types, including [WriteType::WithoutResponse] (stacks signal local
  /// buffer acceptance for those).
  fn write_characteristic(
    &self,
    characteristic: &UUID,
    value: &[u8],
    write_type: WriteType,
  ) -> Result<(), Self::SystemError>;

  /// Arm or disarm local delivery of notifications for a characteristic.  This only affects
  /// the local stack; the peer is told through a CCCD write.
  fn enable_notifications(&self, characteristic: &UUID, enable: bool) -> Result<(), Self::SystemError>;

  /// Write a descriptor value, reported through a descriptor-written event.  Used by this
  /// crate to flip the CCCD for subscribe/unsubscribe.
  fn write_descriptor(
    &self,
    characteristic: &UUID,
    descriptor: &UUID,
    value: &[u8],
  ) -> Result<(), Self::SystemError>;
}

/// Whether a characteristic write requests a link-layer acknowledged response from the peer.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WriteType {
  WithResponse,
  WithoutResponse,
}
