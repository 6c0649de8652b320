//! Decodes the typed read-only attributes returned by `GET_INFO`, plus the
//! `HEARTBEAT` and `GET_RFID` responses (§4.7).

use crate::error::Result;
use crate::protocol;
use crate::router::ResponseRouter;

/// Which `GET_INFO` attribute to request. The numeric value doubles as the
/// expected response type, since `GET_INFO(k)`'s response type is `k` itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoKey {
    Density = 1,
    PrintSpeed = 2,
    LabelType = 3,
    Language = 6,
    AutoShutdownTime = 7,
    DeviceType = 8,
    SoftVersion = 9,
    Battery = 10,
    DeviceSerial = 11,
    HardVersion = 12,
}

impl InfoKey {
    fn code(self) -> u8 {
        self as u8
    }
}

/// A decoded `GET_INFO` value, shaped according to the key that was queried
/// (§3: "decode shape is a function of the key").
#[derive(Debug, Clone, PartialEq)]
pub enum InfoValue {
    Integer(u64),
    /// `SOFT_VERSION` / `HARD_VERSION`: big-endian integer payload / 100.0.
    Version(f64),
    /// `DEVICE_SERIAL`: lowercase hex of the raw payload bytes.
    SerialHex(String),
}

fn payload_as_be_u64(payload: &[u8]) -> u64 {
    payload.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

fn to_hex(payload: &[u8]) -> String {
    payload.iter().map(|b| format!("{b:02x}")).collect()
}

/// Closing state of the print cover, as reported by `HEARTBEAT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Unknown,
    No,
    Yes,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub closing_state: TriState,
    pub power_level: Option<u8>,
    pub paper_state: TriState,
    pub rfid_read_state: TriState,
}

fn tri_from_byte(b: Option<u8>) -> TriState {
    match b {
        None => TriState::Unknown,
        Some(0) => TriState::No,
        Some(_) => TriState::Yes,
    }
}

/// Decode a `HEARTBEAT` payload. Which offsets are populated depends on the
/// payload length (9, 10, 13, 19, or 20 bytes); any other length yields all
/// fields `Unknown` (§4.7).
fn decode_heartbeat(payload: &[u8]) -> Heartbeat {
    let get = |i: usize| payload.get(i).copied();
    match payload.len() {
        9 => Heartbeat {
            closing_state: tri_from_byte(get(8)),
            power_level: get(6),
            paper_state: tri_from_byte(get(7)),
            rfid_read_state: TriState::Unknown,
        },
        10 => Heartbeat {
            closing_state: tri_from_byte(get(9)),
            power_level: get(6),
            paper_state: tri_from_byte(get(7)),
            rfid_read_state: tri_from_byte(get(8)),
        },
        13 => Heartbeat {
            closing_state: tri_from_byte(get(9)),
            power_level: get(10),
            paper_state: tri_from_byte(get(11)),
            rfid_read_state: tri_from_byte(get(12)),
        },
        19 => Heartbeat {
            closing_state: tri_from_byte(get(15)),
            power_level: get(16),
            paper_state: tri_from_byte(get(17)),
            rfid_read_state: tri_from_byte(get(18)),
        },
        20 => Heartbeat {
            closing_state: tri_from_byte(get(18)),
            power_level: get(16),
            paper_state: tri_from_byte(get(17)),
            rfid_read_state: tri_from_byte(get(19)),
        },
        _ => Heartbeat {
            closing_state: TriState::Unknown,
            power_level: None,
            paper_state: TriState::Unknown,
            rfid_read_state: TriState::Unknown,
        },
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RfidInfo {
    pub uuid_hex: String,
    pub barcode: String,
    pub serial: String,
    pub total_len: u16,
    pub used_len: u16,
    pub tag_type: u8,
}

fn read_length_prefixed(payload: &[u8], offset: usize) -> Option<(String, usize)> {
    let len = *payload.get(offset)? as usize;
    let start = offset + 1;
    let bytes = payload.get(start..start + len)?;
    Some((String::from_utf8_lossy(bytes).into_owned(), start + len))
}

/// Decode a `GET_RFID` payload: an 8-byte UUID, length-prefixed barcode and
/// serial strings, then `total_len`, `used_len`, and `type`. Returns `None`
/// ("no tag") if the first byte is 0 (§4.7).
fn decode_rfid(payload: &[u8]) -> Option<RfidInfo> {
    if payload.first() == Some(&0) {
        return None;
    }
    if payload.len() < 8 {
        return None;
    }
    let uuid_hex = to_hex(&payload[0..8]);
    let (barcode, offset) = read_length_prefixed(payload, 8)?;
    let (serial, offset) = read_length_prefixed(payload, offset)?;
    if payload.len() < offset + 5 {
        return None;
    }
    let total_len = u16::from_be_bytes([payload[offset], payload[offset + 1]]);
    let used_len = u16::from_be_bytes([payload[offset + 2], payload[offset + 3]]);
    let tag_type = payload[offset + 4];
    Some(RfidInfo {
        uuid_hex,
        barcode,
        serial,
        total_len,
        used_len,
        tag_type,
    })
}

/// Read-only attribute, heartbeat, and RFID queries, layered over a
/// [`ResponseRouter`].
pub struct InfoService<'a> {
    router: &'a mut ResponseRouter,
}

impl<'a> InfoService<'a> {
    pub fn new(router: &'a mut ResponseRouter) -> Self {
        Self { router }
    }

    /// Issue `GET_INFO` with `[key]`; the expected response type equals the
    /// key itself.
    pub fn get_info(&mut self, key: InfoKey) -> Result<InfoValue> {
        let code = key.code();
        let packet = self
            .router
            .transceive(protocol::GET_INFO, &[code], code)?;
        Ok(match key {
            InfoKey::DeviceSerial => InfoValue::SerialHex(to_hex(&packet.payload)),
            InfoKey::SoftVersion | InfoKey::HardVersion => {
                InfoValue::Version(payload_as_be_u64(&packet.payload) as f64 / 100.0)
            }
            _ => InfoValue::Integer(payload_as_be_u64(&packet.payload)),
        })
    }

    pub fn heartbeat(&mut self) -> Result<Heartbeat> {
        let packet = self
            .router
            .transceive(protocol::HEARTBEAT, &[], protocol::HEARTBEAT)?;
        Ok(decode_heartbeat(&packet.payload))
    }

    pub fn get_rfid(&mut self) -> Result<Option<RfidInfo>> {
        let packet = self
            .router
            .transceive(protocol::GET_RFID, &[], protocol::GET_RFID)?;
        Ok(decode_rfid(&packet.payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_divides_by_100() {
        let payload = [0x00, 0x7B]; // 123
        assert_eq!(payload_as_be_u64(&payload) as f64 / 100.0, 1.23);
    }

    #[test]
    fn serial_is_lowercase_hex() {
        assert_eq!(to_hex(&[0xAB, 0x01, 0xFF]), "ab01ff");
    }

    #[test]
    fn heartbeat_9_byte_payload() {
        let payload = [0, 0, 0, 0, 0, 0, 77, 1, 1];
        let hb = decode_heartbeat(&payload);
        assert_eq!(hb.power_level, Some(77));
        assert_eq!(hb.paper_state, TriState::Yes);
        assert_eq!(hb.closing_state, TriState::Yes);
        assert_eq!(hb.rfid_read_state, TriState::Unknown);
    }

    #[test]
    fn heartbeat_unknown_length_is_all_unknown() {
        let hb = decode_heartbeat(&[1, 2, 3]);
        assert_eq!(hb.closing_state, TriState::Unknown);
        assert_eq!(hb.power_level, None);
    }

    #[test]
    fn rfid_no_tag_when_first_byte_zero() {
        assert_eq!(decode_rfid(&[0, 0, 0]), None);
    }

    #[test]
    fn rfid_decodes_length_prefixed_fields() {
        let mut payload = vec![1u8; 8]; // uuid bytes, first != 0
        payload.push(3);
        payload.extend_from_slice(b"abc"); // barcode
        payload.push(4);
        payload.extend_from_slice(b"wxyz"); // serial
        payload.extend_from_slice(&100u16.to_be_bytes()); // total_len
        payload.extend_from_slice(&40u16.to_be_bytes()); // used_len
        payload.push(7); // type

        let rfid = decode_rfid(&payload).unwrap();
        assert_eq!(rfid.barcode, "abc");
        assert_eq!(rfid.serial, "wxyz");
        assert_eq!(rfid.total_len, 100);
        assert_eq!(rfid.used_len, 40);
        assert_eq!(rfid.tag_type, 7);
    }
}
