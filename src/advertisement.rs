use std::collections::BTreeMap;

use crate::uuid::UUID;

/// Advertisement record types this crate's parser understands.  Advertisements consist of one
/// or more records in an LTV layout (length, type, value).  The list is not exhaustive; records
/// with unknown types are kept and can be fetched raw.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum AdType {
  Flags = 0x01,
  IncompleteServiceUuids16 = 0x02,
  CompleteServiceUuids16 = 0x03,
  IncompleteServiceUuids128 = 0x06,
  CompleteServiceUuids128 = 0x07,
  ShortenedLocalName = 0x08,
  CompleteLocalName = 0x09,
  TxPowerLevel = 0x0A,
  ServiceData16 = 0x16,
  Appearance = 0x19,
  BroadcastName = 0x30,
  ManufacturerData = 0xFF,
}

/// Parsed advertisement payload keyed by record type.  Later duplicates of a record type
/// replace earlier ones, which also merges a scan response over the advertisement it extends.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AdvertisementData {
  records: BTreeMap<u8, Vec<u8>>,
}

impl AdvertisementData {
  /// Decode the raw bytes of an advertisement or scan response.  Parsing is forgiving: a
  /// zero length terminates the payload (padding), and a record running past the end of the
  /// buffer is dropped along with everything after it.
  pub fn parse(raw: &[u8]) -> Self {
    let mut data = Self::default();
    data.extend_from(raw);
    data
  }

  /// Merge further records into this payload, as when a scan response follows the
  /// advertisement itself.
  pub fn extend_from(&mut self, raw: &[u8]) {
    let mut i = 0;
    while i + 1 < raw.len() {
      let length = raw[i] as usize;
      if length == 0 || i + 1 + length > raw.len() {
        break;
      }
      self
        .records
        .insert(raw[i + 1], raw[i + 2..i + 1 + length].to_vec());
      i += 1 + length;
    }
  }

  pub fn is_empty(&self) -> bool {
    self.records.is_empty()
  }

  /// Raw value of a record, if present.
  pub fn record(&self, ad_type: AdType) -> Option<&[u8]> {
    self.records.get(&(ad_type as u8)).map(Vec::as_slice)
  }

  pub fn flags(&self) -> Option<u8> {
    self.record(AdType::Flags).and_then(|v| v.first().copied())
  }

  /// Device name, preferring the complete name over the shortened one over the broadcast name.
  pub fn local_name(&self) -> Option<&str> {
    [
      AdType::CompleteLocalName,
      AdType::ShortenedLocalName,
      AdType::BroadcastName,
    ]
    .iter()
    .find_map(|t| self.record(*t))
    .and_then(|v| core::str::from_utf8(v).ok())
  }

  pub fn tx_power(&self) -> Option<i8> {
    self
      .record(AdType::TxPowerLevel)
      .and_then(|v| v.first().map(|b| *b as i8))
  }

  /// Manufacturer-specific payload, without the leading company identifier.
  pub fn manufacturer_data(&self) -> Option<&[u8]> {
    self.record(AdType::ManufacturerData).map(|v| v.get(2..).unwrap_or(&[]))
  }

  /// Company identifier of the manufacturer record (little-endian on the wire).
  pub fn manufacturer_id(&self) -> Option<u16> {
    match self.record(AdType::ManufacturerData) {
      Some([lo, hi, ..]) => Some(u16::from_le_bytes([*lo, *hi])),
      _ => None,
    }
  }

  /// Every advertised service UUID, across the 16-bit and 128-bit encodings and both the
  /// complete and incomplete list variants.
  pub fn service_uuids(&self) -> Vec<UUID> {
    let mut uuids = Vec::new();

    for t in [AdType::IncompleteServiceUuids16, AdType::CompleteServiceUuids16] {
      if let Some(value) = self.record(t) {
        for chunk in value.chunks_exact(2) {
          uuids.push(UUID::from_le_bytes_16([chunk[0], chunk[1]]));
        }
      }
    }

    for t in [AdType::IncompleteServiceUuids128, AdType::CompleteServiceUuids128] {
      if let Some(value) = self.record(t) {
        for chunk in value.chunks_exact(16) {
          let mut bytes = [0u8; 16];
          bytes.copy_from_slice(chunk);
          uuids.push(UUID::from_le_bytes_128(bytes));
        }
      }
    }

    uuids
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use byteorder::{LittleEndian, WriteBytesExt};

  use super::*;

  fn record(out: &mut Vec<u8>, ad_type: AdType, value: &[u8]) {
    out.write_u8((value.len() + 1) as u8).unwrap();
    out.write_u8(ad_type as u8).unwrap();
    out.write_all(value).unwrap();
  }

  #[test]
  pub fn test_parse_name_and_manufacturer() {
    let mut raw = Vec::new();
    record(&mut raw, AdType::Flags, &[0x06]);
    record(&mut raw, AdType::CompleteLocalName, b"HeartMonitor");
    let mut mfg = Vec::new();
    mfg.write_u16::<LittleEndian>(0x004C).unwrap();
    mfg.write_all(&[0xAA, 0xBB]).unwrap();
    record(&mut raw, AdType::ManufacturerData, &mfg);

    let data = AdvertisementData::parse(&raw);
    assert_eq!(data.flags(), Some(0x06));
    assert_eq!(data.local_name(), Some("HeartMonitor"));
    assert_eq!(data.manufacturer_id(), Some(0x004C));
    assert_eq!(data.manufacturer_data(), Some(&[0xAA, 0xBB][..]));
  }

  #[test]
  pub fn test_name_preference_order() {
    let mut raw = Vec::new();
    record(&mut raw, AdType::ShortenedLocalName, b"HM");
    let mut data = AdvertisementData::parse(&raw);
    assert_eq!(data.local_name(), Some("HM"));

    let mut raw = Vec::new();
    record(&mut raw, AdType::CompleteLocalName, b"HeartMonitor");
    data.extend_from(&raw);
    assert_eq!(data.local_name(), Some("HeartMonitor"));
  }

  #[test]
  pub fn test_service_uuids_both_widths() {
    let mut raw = Vec::new();
    let mut uuids16 = Vec::new();
    uuids16.write_u16::<LittleEndian>(0x180F).unwrap();
    uuids16.write_u16::<LittleEndian>(0x180D).unwrap();
    record(&mut raw, AdType::CompleteServiceUuids16, &uuids16);

    let long = 0x6E400001_B5A3_F393_E0A9_E50E24DCCA9Eu128;
    let mut uuids128 = Vec::new();
    uuids128.write_u128::<LittleEndian>(long).unwrap();
    record(&mut raw, AdType::IncompleteServiceUuids128, &uuids128);

    let data = AdvertisementData::parse(&raw);
    assert_eq!(
      data.service_uuids(),
      vec![UUID::Short(0x180F), UUID::Short(0x180D), UUID::Long(long)]
    );
  }

  #[test]
  pub fn test_truncated_record_is_dropped() {
    let mut raw = Vec::new();
    record(&mut raw, AdType::CompleteLocalName, b"Good");
    raw.extend_from_slice(&[0x10, AdType::ManufacturerData as u8, 0x01]);

    let data = AdvertisementData::parse(&raw);
    assert_eq!(data.local_name(), Some("Good"));
    assert_eq!(data.manufacturer_id(), None);
  }

  #[test]
  pub fn test_zero_length_terminates() {
    let mut raw = Vec::new();
    record(&mut raw, AdType::TxPowerLevel, &[0xF4]);
    raw.push(0x00);
    record(&mut raw, AdType::CompleteLocalName, b"Ignored");

    let data = AdvertisementData::parse(&raw);
    assert_eq!(data.tx_power(), Some(-12));
    assert_eq!(data.local_name(), None);
  }

  #[test]
  pub fn test_empty_payload() {
    assert!(AdvertisementData::parse(&[]).is_empty());
  }
}
