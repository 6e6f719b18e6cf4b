use std::time::Duration;

use enumset::EnumSet;
use tokio::sync::oneshot;

use crate::characteristic::CharacteristicProperty;
use crate::error::Error;
use crate::gatt_client_cb::{ConnectionState, GattEvent};
use crate::gatt_link::WriteType;
use crate::uuid::UUID;

/// Window within which a dispatched operation must resolve before it is cancelled and the
/// queue moves on.
pub const OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

/// CCCD payloads.  Which enable value applies depends on whether the characteristic
/// advertises notify or only indicate.
pub(crate) const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
pub(crate) const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];
pub(crate) const DISABLE_NOTIFICATION_VALUE: [u8; 2] = [0x00, 0x00];

/// One GATT request unit, the granularity at which the per-device queue serializes work
/// against the single-outstanding-request platform channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OperationRequest {
  Connect,
  Disconnect,
  DiscoverServices,
  RequestMtu {
    mtu: u16,
  },
  Read {
    characteristic: UUID,
  },
  Write {
    characteristic: UUID,
    value: Vec<u8>,
    write_type: WriteType,
  },
  Subscribe {
    characteristic: UUID,
    properties: EnumSet<CharacteristicProperty>,
  },
  Unsubscribe {
    characteristic: UUID,
  },
}

/// Success payload of a resolved operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum OperationOutcome {
  Done,
  Mtu(u16),
  Value(Vec<u8>),
}

impl OperationOutcome {
  pub(crate) fn expect_mtu(self) -> Result<u16, Error> {
    match self {
      OperationOutcome::Mtu(mtu) => Ok(mtu),
      _ => Err(Error::Adapter("unexpected completion payload".into())),
    }
  }

  pub(crate) fn expect_value(self) -> Result<Vec<u8>, Error> {
    match self {
      OperationOutcome::Value(value) => Ok(value),
      _ => Err(Error::Adapter("unexpected completion payload".into())),
    }
  }
}

pub(crate) type OperationResult = Result<OperationOutcome, Error>;

/// A queued request together with its single-shot completion slot.
///
/// Success callbacks, timeout expiry and disconnect cancellation race against each other, so
/// every completion path funnels through [Operation::resolve], which is a no-op once the
/// operation is complete.  Callers must invoke it under the queue lock.
#[derive(Debug)]
pub(crate) struct Operation {
  pub(crate) seq: u64,
  pub(crate) request: OperationRequest,
  pub(crate) timeout: Duration,
  reply: Option<oneshot::Sender<OperationResult>>,
  complete: bool,
}

impl Operation {
  pub(crate) fn new(seq: u64, request: OperationRequest, reply: oneshot::Sender<OperationResult>) -> Self {
    Self {
      seq,
      request,
      timeout: OPERATION_TIMEOUT,
      reply: Some(reply),
      complete: false,
    }
  }

  pub(crate) fn is_complete(&self) -> bool {
    self.complete
  }

  /// Resolve at most once; any later call is a no-op.
  pub(crate) fn resolve(&mut self, result: OperationResult) {
    if self.complete {
      return;
    }
    self.complete = true;
    if let Some(reply) = self.reply.take() {
      // The caller may have stopped waiting; that is not our problem.
      let _ = reply.send(result);
    }
  }

  /// Interpret a platform event against this in-flight request.  Returns the resolution when
  /// the event belongs to this operation, `None` to keep waiting.  Events addressed to other
  /// targets (a different characteristic, a different descriptor) fall through to `None`
  /// because the platform also delivers events we never asked for.
  pub(crate) fn handle_event<L>(&self, event: &GattEvent<L>) -> Option<OperationResult> {
    match (&self.request, event) {
      (
        OperationRequest::Connect,
        GattEvent::ConnectionStateChanged { status, state, .. },
      ) => {
        if !status.is_success() {
          return Some(Err(Error::Gatt { status: *status }));
        }
        match state {
          ConnectionState::Connected => Some(Ok(OperationOutcome::Done)),
          // A disconnect reported mid-connect is a definite failure, not an ignorable event.
          ConnectionState::Disconnected => Some(Err(Error::Disconnected)),
          ConnectionState::Connecting => None,
        }
      }

      (
        OperationRequest::Disconnect,
        GattEvent::ConnectionStateChanged { status, state, .. },
      ) => {
        if !status.is_success() {
          return Some(Err(Error::Gatt { status: *status }));
        }
        match state {
          ConnectionState::Disconnected => Some(Ok(OperationOutcome::Done)),
          _ => None,
        }
      }

      (OperationRequest::DiscoverServices, GattEvent::ServicesDiscovered { status, .. }) => {
        Some(status_result(*status, OperationOutcome::Done))
      }

      (OperationRequest::RequestMtu { .. }, GattEvent::MtuChanged { status, mtu }) => {
        Some(status_result(*status, OperationOutcome::Mtu(*mtu)))
      }

      (
        OperationRequest::Read { characteristic },
        GattEvent::CharacteristicRead {
          characteristic: uuid,
          status,
          value,
        },
      ) if uuid == characteristic => Some(status_result(
        *status,
        OperationOutcome::Value(value.clone().unwrap_or_default()),
      )),

      (
        OperationRequest::Write { characteristic, .. },
        GattEvent::CharacteristicWritten {
          characteristic: uuid,
          status,
        },
      ) if uuid == characteristic => Some(status_result(*status, OperationOutcome::Done)),

      (
        OperationRequest::Subscribe { characteristic, .. }
        | OperationRequest::Unsubscribe { characteristic },
        GattEvent::DescriptorWritten {
          characteristic: uuid,
          descriptor,
          status,
        },
      ) if uuid == characteristic && *descriptor == UUID::CCCD => {
        Some(status_result(*status, OperationOutcome::Done))
      }

      // Shared base rule: losing the link fails whatever else is in flight.
      (
        _,
        GattEvent::ConnectionStateChanged {
          state: ConnectionState::Disconnected,
          ..
        },
      ) => Some(Err(Error::Disconnected)),

      _ => None,
    }
  }
}

fn status_result(status: crate::gatt_status::GattStatus, outcome: OperationOutcome) -> OperationResult {
  if status.is_success() {
    Ok(outcome)
  } else {
    Err(Error::Gatt { status })
  }
}
