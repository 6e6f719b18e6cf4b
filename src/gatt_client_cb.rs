use enumset::EnumSet;

use crate::characteristic::CharacteristicProperty;
use crate::gatt_status::GattStatus;
use crate::uuid::UUID;

/// Sink for the per-connection events a platform adapter delivers.  A session hands one of
/// these (weakly, so a released session stops receiving) to [crate::Central::connect]; the
/// adapter must invoke it for every event on that connection, from whatever thread its stack
/// uses for callbacks.
pub trait GattCallback<L>: Send + Sync {
  fn on_event(&self, event: GattEvent<L>);
}

impl<L, F> GattCallback<L> for F
where
  F: Fn(GattEvent<L>) + Send + Sync,
{
  fn on_event(&self, event: GattEvent<L>) {
    (self)(event)
  }
}

/// Connection lifecycle as observed by callers.  Platform adapters only ever report
/// [ConnectionState::Connected] and [ConnectionState::Disconnected];
/// [ConnectionState::Connecting] is published by sessions while a connect request is pending.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
  Disconnected,
  Connecting,
  Connected,
}

/// One asynchronous platform callback.  The stack delivers exactly one of these per
/// outstanding request, plus unsolicited [GattEvent::CharacteristicChanged] events that have
/// no request correlation at all, so consumers must match events against what they are
/// actually waiting for rather than assume the next event answers the current request.
#[derive(Debug, Clone)]
pub enum GattEvent<L> {
  /// The link came up or went down.  On connect success the live link handle rides along and
  /// is the only way a session ever obtains one.
  ConnectionStateChanged {
    status: GattStatus,
    state: ConnectionState,
    link: Option<L>,
  },

  /// Service enumeration finished.  The tree is only meaningful on success.
  ServicesDiscovered {
    status: GattStatus,
    services: Vec<DiscoveredService>,
  },

  /// MTU renegotiation finished; `mtu` is the granted value, which may be lower than
  /// requested.
  MtuChanged { status: GattStatus, mtu: u16 },

  /// A characteristic read finished.  A missing value on success is normalized to empty
  /// bytes by the session layer.
  CharacteristicRead {
    characteristic: UUID,
    status: GattStatus,
    value: Option<Vec<u8>>,
  },

  /// A characteristic write finished (both write types).
  CharacteristicWritten {
    characteristic: UUID,
    status: GattStatus,
  },

  /// Unsolicited value push from the peer (notify or indicate).  Arrives at any time with no
  /// pending request.
  CharacteristicChanged { characteristic: UUID, value: Vec<u8> },

  /// A descriptor write finished.
  DescriptorWritten {
    characteristic: UUID,
    descriptor: UUID,
    status: GattStatus,
  },
}

/// Raw service tree as enumerated by the platform.  Pure data; sessions convert it into the
/// operational [crate::Service]/[crate::Characteristic] objects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredService {
  pub uuid: UUID,
  pub characteristics: Vec<DiscoveredCharacteristic>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredCharacteristic {
  pub uuid: UUID,
  pub properties: EnumSet<CharacteristicProperty>,
}
