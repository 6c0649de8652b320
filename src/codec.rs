//! Packet framing for the NIIMBOT wire protocol.
//!
//! Two dialects are supported (§4.1):
//!
//! * **Dialect A** — the live command/response framing used for every
//!   request, every response, and per-row image data:
//!   `55 55 | type:u8 | len:u8 | payload[len] | xor_checksum:u8 | AA AA`.
//! * **Dialect B** — an offline export framing produced by the
//!   PNG→packet utility; never spoken on a live transport:
//!   `55 55 | cmd:u8 (0xA2) | len:u16_be | payload[len] | add_checksum:u8 | AA AA`.

use crate::error::{BadFrame, NiimbotError, Result};

const HEADER: [u8; 2] = [0x55, 0x55];
const TRAILER: [u8; 2] = [0xAA, 0xAA];

/// Dialect B's fixed command byte; the export format only ever carries one.
pub const DIALECT_B_COMMAND: u8 = 0xA2;

/// A decoded frame and how many bytes of the input buffer it consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub kind: u8,
    pub payload: Vec<u8>,
}

/// Result of attempting to decode one frame from the head of a buffer.
#[derive(Debug)]
pub enum Decoded {
    /// A complete, valid frame; `.1` is the number of bytes to drop from the buffer.
    Frame(Packet, usize),
    /// Not enough bytes yet to know whether the head is a valid frame.
    NeedMore,
}

fn xor_checksum(kind: u8, len: u8, payload: &[u8]) -> u8 {
    payload.iter().fold(kind ^ len, |acc, &b| acc ^ b)
}

/// Encode a Dialect A request or response.
///
/// Fails with [`BadFrame::PayloadTooLong`] if `payload.len() > 255`, since
/// the one-byte length field cannot represent it.
pub fn encode_a(kind: u8, payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > 255 {
        return Err(NiimbotError::BadFrame(BadFrame::PayloadTooLong(
            payload.len(),
        )));
    }
    let len = payload.len() as u8;
    let mut out = Vec::with_capacity(7 + payload.len());
    out.extend_from_slice(&HEADER);
    out.push(kind);
    out.push(len);
    out.extend_from_slice(payload);
    out.push(xor_checksum(kind, len, payload));
    out.extend_from_slice(&TRAILER);
    out
}

/// Try to decode one Dialect A frame from the head of `buf`.
///
/// On a checksum or trailer error the caller should advance the buffer by
/// one byte and retry (§4.1's resynchronization rule) rather than discard
/// everything; this function never does that advancing itself, since doing
/// so here would hide the distinction between "no frame yet" and "garbage
/// ahead of a real one" from [`crate::router::ResponseRouter`].
pub fn decode_one(buf: &[u8]) -> std::result::Result<Decoded, BadFrame> {
    if buf.len() < 2 {
        return Ok(Decoded::NeedMore);
    }
    if buf[0..2] != HEADER {
        return Err(BadFrame::BadHeader);
    }
    if buf.len() < 4 {
        return Ok(Decoded::NeedMore);
    }
    let kind = buf[2];
    let len = buf[3] as usize;
    let frame_len = 4 + len + 1 + 2;
    if buf.len() < frame_len {
        return Ok(Decoded::NeedMore);
    }
    let payload = &buf[4..4 + len];
    let checksum = buf[4 + len];
    let trailer = &buf[4 + len + 1..frame_len];
    if trailer != TRAILER {
        return Err(BadFrame::BadTrailer);
    }
    if checksum != xor_checksum(kind, len as u8, payload) {
        return Err(BadFrame::BadChecksum);
    }
    Ok(Decoded::Frame(
        Packet {
            kind,
            payload: payload.to_vec(),
        },
        frame_len,
    ))
}

/// Encode a Dialect B (offline export) blob.
///
/// Checksum is the low 8 bits of `cmd + len_hi + len_lo + sum(payload)`.
pub fn encode_b(payload: &[u8]) -> Result<Vec<u8>> {
    if payload.len() > u16::MAX as usize {
        return Err(NiimbotError::BadFrame(BadFrame::PayloadTooLong(
            payload.len(),
        )));
    }
    let len = payload.len() as u16;
    let len_hi = (len >> 8) as u8;
    let len_lo = (len & 0xff) as u8;
    let mut checksum: u32 = DIALECT_B_COMMAND as u32 + len_hi as u32 + len_lo as u32;
    for &b in payload {
        checksum += b as u32;
    }
    let mut out = Vec::with_capacity(8 + payload.len());
    out.extend_from_slice(&HEADER);
    out.push(DIALECT_B_COMMAND);
    out.push(len_hi);
    out.push(len_lo);
    out.extend_from_slice(payload);
    out.push((checksum & 0xff) as u8);
    out.extend_from_slice(&TRAILER);
    Ok(out)
}

/// Decode a Dialect B blob produced by [`encode_b`].
///
/// Only used to read back previously exported `.bin` artifacts; never
/// consulted on the live print path.
pub fn decode_b(buf: &[u8]) -> std::result::Result<Packet, BadFrame> {
    if buf.len() < 7 {
        return Err(BadFrame::Truncated);
    }
    if buf[0..2] != HEADER {
        return Err(BadFrame::BadHeader);
    }
    let cmd = buf[2];
    let len = ((buf[3] as usize) << 8) | buf[4] as usize;
    let frame_len = 5 + len + 1 + 2;
    if buf.len() < frame_len {
        return Err(BadFrame::Truncated);
    }
    let payload = &buf[5..5 + len];
    let checksum = buf[5 + len];
    let trailer = &buf[5 + len + 1..frame_len];
    if trailer != TRAILER {
        return Err(BadFrame::BadTrailer);
    }
    let mut expected: u32 = cmd as u32 + buf[3] as u32 + buf[4] as u32;
    for &b in payload {
        expected += b as u32;
    }
    if checksum != (expected & 0xff) as u8 {
        return Err(BadFrame::BadChecksum);
    }
    Ok(Packet {
        kind: cmd,
        payload: payload.to_vec(),
    })
}
