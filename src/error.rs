use std::time::Duration;

use crate::gatt_status::GattStatus;

/// Failure surfaced to callers of device and characteristic operations.  Every enqueued
/// operation resolves with exactly one of a success value or one of these; nothing in the
/// session layer panics or hangs past its timeout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
  /// The platform stack reported a failure status for a dispatched request.  The raw status
  /// is kept for diagnostics.
  #[error("gatt request failed with status {status:?}")]
  Gatt { status: GattStatus },

  /// The link dropped while the operation was in flight.
  #[error("disconnected while the operation was in flight")]
  Disconnected,

  /// The operation was cancelled before a matching platform callback arrived, normally
  /// because its timeout window elapsed.
  #[error("operation cancelled before completion")]
  Cancelled,

  /// The operation needs a live connection and there is none.
  #[error("device is not connected")]
  NotConnected,

  /// Scan starts exceeded the platform budget.  Wait at least this long before scanning again.
  #[error("scanning throttled, retry in {wait:?}")]
  ScanThrottled { wait: Duration },

  /// The platform adapter rejected a call synchronously.  Carries the adapter's own error
  /// rendering since those types are platform specific.
  #[error("platform adapter error: {0}")]
  Adapter(String),
}
