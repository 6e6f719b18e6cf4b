use core::fmt::{Display, Formatter};

/// Holder type to clarify a frequent gotcha with BLE around the true ATT MTU size.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Mtu {
  negotiated_mtu: u16,
}

impl Mtu {
  /// The ATT default every link starts at and falls back to on disconnect.  Larger values only
  /// apply after a successful MTU negotiation.
  pub const DEFAULT: Mtu = Mtu { negotiated_mtu: 23 };

  pub fn new(negotiated_mtu: u16) -> Self {
    Self { negotiated_mtu }
  }

  /// Return the actual negotiated value for the _total_ BLE payload, which doesn't take into
  /// account the ATT header (which is 3 bytes).  Most customers should avoid this method as user
  /// provided payloads at this size will be truncated.
  pub fn negotiated_value(&self) -> u16 {
    self.negotiated_mtu
  }

  /// Return the usable maximum payload size for writes we issue to the remote peripheral.
  /// This is the size at which packets must be fragmented by the caller.  To be extremely
  /// clear: this is the actual maximum size of a characteristic write that will be delivered
  /// without truncation.
  pub fn usable_value(&self) -> u16 {
    self.negotiated_mtu - 3
  }
}

impl Default for Mtu {
  fn default() -> Self {
    Self::DEFAULT
  }
}

impl From<u16> for Mtu {
  fn from(negotiated_mtu: u16) -> Self {
    Self::new(negotiated_mtu)
  }
}

impl Display for Mtu {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    write!(f, "{:?}", self.negotiated_mtu)
  }
}
