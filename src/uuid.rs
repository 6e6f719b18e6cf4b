use core::cmp::Ordering;
use core::fmt::{Display, Formatter};
use core::hash::{Hash, Hasher};
use core::str::FromStr;

/// The Bluetooth base UUID.  Every SIG-assigned 16-bit identifier expands onto this value as
/// `0000xxxx-0000-1000-8000-00805F9B34FB`.
pub const BASE_UUID: u128 = 0x00000000_0000_1000_8000_00805F9B34FB;

const SHORT_FORM_MASK: u128 = !(0xFFFFu128 << 96);

#[derive(Debug, Copy, Clone)]
pub enum UUID {
  /// For use only with SIG defined services (i.e. registered and publicly well known services).
  Short(u16),

  /// All other BLE UUIDs must be 128-bit
  Long(u128),
}

impl UUID {
  /// The Client Characteristic Configuration Descriptor, written to enable or disable
  /// notify/indicate delivery for a characteristic.
  pub const CCCD: UUID = UUID::Short(0x2902);

  /// Build from a full 128-bit value, collapsing onto the short form when the value lies on
  /// the base UUID.
  pub fn from_u128(value: u128) -> Self {
    if value & SHORT_FORM_MASK == BASE_UUID {
      UUID::Short((value >> 96) as u16)
    } else {
      UUID::Long(value)
    }
  }

  /// Decode the 2-byte little-endian encoding used in advertisement payloads.
  pub fn from_le_bytes_16(bytes: [u8; 2]) -> Self {
    UUID::Short(u16::from_le_bytes(bytes))
  }

  /// Decode the 16-byte little-endian encoding used in advertisement payloads.
  pub fn from_le_bytes_128(bytes: [u8; 16]) -> Self {
    Self::from_u128(u128::from_le_bytes(bytes))
  }

  pub fn as_u128(&self) -> u128 {
    match *self {
      UUID::Short(u) => BASE_UUID | ((u as u128) << 96),
      UUID::Long(u) => u,
    }
  }
}

// Short and long forms of the same identifier must compare equal, so equality, ordering and
// hashing all go through the expanded value.
impl PartialEq for UUID {
  fn eq(&self, other: &Self) -> bool {
    self.as_u128() == other.as_u128()
  }
}

impl Eq for UUID {}

impl Hash for UUID {
  fn hash<H: Hasher>(&self, state: &mut H) {
    self.as_u128().hash(state);
  }
}

impl PartialOrd for UUID {
  fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
    Some(self.cmp(other))
  }
}

impl Ord for UUID {
  fn cmp(&self, other: &Self) -> Ordering {
    self.as_u128().cmp(&other.as_u128())
  }
}

impl Display for UUID {
  fn fmt(&self, f: &mut Formatter<'_>) -> core::fmt::Result {
    match Self::from_u128(self.as_u128()) {
      UUID::Short(u) => write!(f, "{u:04X}"),
      UUID::Long(u) => write!(
        f,
        "{:08X}-{:04X}-{:04X}-{:04X}-{:012X}",
        (u >> 96) as u32,
        (u >> 80) as u16,
        (u >> 64) as u16,
        (u >> 48) as u16,
        u & 0xFFFF_FFFF_FFFF,
      ),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid BLE UUID string")]
pub struct ParseUuidError;

impl FromStr for UUID {
  type Err = ParseUuidError;

  /// Accepts the 4-hex-digit short form (`"2902"`) or the full dashed form
  /// (`"0000180F-0000-1000-8000-00805F9B34FB"`).  Full-form values on the base UUID collapse
  /// to the short variant.
  fn from_str(s: &str) -> Result<Self, Self::Err> {
    if s.len() == 4 {
      let value = u16::from_str_radix(s, 16).map_err(|_| ParseUuidError)?;
      return Ok(UUID::Short(value));
    }

    if s.len() != 36 {
      return Err(ParseUuidError);
    }
    let dashes_ok = s
      .char_indices()
      .all(|(i, c)| matches!(i, 8 | 13 | 18 | 23) == (c == '-'));
    if !dashes_ok {
      return Err(ParseUuidError);
    }

    let mut value = 0u128;
    for c in s.chars().filter(|c| *c != '-') {
      let digit = c.to_digit(16).ok_or(ParseUuidError)?;
      value = (value << 4) | digit as u128;
    }
    Ok(Self::from_u128(value))
  }
}
