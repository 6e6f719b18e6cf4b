use core::fmt::{Display, Formatter};
use core::str::FromStr;

/// 48-bit Bluetooth device address, stored most significant byte first (the order it is
/// conventionally written).  This is the stable identity key for device sessions.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BluetoothAddress(pub [u8; 6]);

impl BluetoothAddress {
  pub fn bytes(&self) -> &[u8; 6] {
    &self.0
  }
}

impl Display for BluetoothAddress {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    let [a, b, c, d, e, g] = self.0;
    write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid Bluetooth address string")]
pub struct ParseAddressError;

impl FromStr for BluetoothAddress {
  type Err = ParseAddressError;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    let mut bytes = [0u8; 6];
    let mut parts = s.split(':');
    for byte in bytes.iter_mut() {
      let part = parts.next().ok_or(ParseAddressError)?;
      if part.len() != 2 {
        return Err(ParseAddressError);
      }
      *byte = u8::from_str_radix(part, 16).map_err(|_| ParseAddressError)?;
    }
    if parts.next().is_some() {
      return Err(ParseAddressError);
    }
    Ok(BluetoothAddress(bytes))
  }
}
