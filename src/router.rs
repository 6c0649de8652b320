//! Correlates responses to pending requests (§4.3).
//!
//! Owns a [`ParseBuffer`] fed by the transport and serializes `transceive`
//! calls so at most one request is ever in flight per transport.

use std::thread::sleep;
use std::time::Duration;

use log::{debug, trace, warn};

use crate::codec::{self, Decoded, Packet};
use crate::error::{NiimbotError, Result};
use crate::transport::Transport;

const ERROR_PACKET_TYPE: u8 = 0xDB;
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const DEFAULT_POLL_ROUNDS: u32 = 6;

/// A growable byte queue, exclusively owned by [`ResponseRouter`] (§3).
#[derive(Default)]
struct ParseBuffer {
    bytes: Vec<u8>,
}

impl ParseBuffer {
    fn append(&mut self, chunk: &[u8]) {
        self.bytes.extend_from_slice(chunk);
    }

    /// Decode every complete frame currently at the head of the buffer,
    /// resynchronizing on the next `0x55 0x55` after any framing error
    /// instead of discarding the rest of the buffer (§4.1 tie-break rule).
    fn drain_frames(&mut self) -> Vec<Packet> {
        let mut frames = Vec::new();
        loop {
            match codec::decode_one(&self.bytes) {
                Ok(Decoded::Frame(packet, consumed)) => {
                    self.bytes.drain(..consumed);
                    frames.push(packet);
                }
                Ok(Decoded::NeedMore) => break,
                Err(_) => {
                    // Drop one byte and re-seek the header; this may strand
                    // a garbage byte before a NeedMore-qualifying prefix, so
                    // retry immediately rather than waiting for more data.
                    if self.bytes.is_empty() {
                        break;
                    }
                    self.bytes.remove(0);
                }
            }
        }
        frames
    }
}

pub struct ResponseRouter {
    transport: Transport,
    buffer: ParseBuffer,
}

impl ResponseRouter {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            buffer: ParseBuffer::default(),
        }
    }

    pub fn into_transport(self) -> Transport {
        self.transport
    }

    /// Send `payload` framed as `req_type` and poll for a response of
    /// `expected_type`, up to `rounds` times at `POLL_INTERVAL` apart.
    ///
    /// Fails with [`NiimbotError::PrinterError`] immediately if a type
    /// `0xDB` error packet appears, and with [`NiimbotError::Timeout`] once
    /// the polling budget is exhausted. Frames of any other type are
    /// discarded as unsolicited heartbeats/status packets.
    pub fn transceive(
        &mut self,
        req_type: u8,
        payload: &[u8],
        expected_type: u8,
    ) -> Result<Packet> {
        self.transceive_with_rounds(req_type, payload, expected_type, DEFAULT_POLL_ROUNDS, &|| false)
    }

    /// Like [`Self::transceive`], but checks `is_cancelled` at each polling
    /// round — including the inter-poll sleep — and bails out with
    /// [`NiimbotError::Timeout`] as soon as it reports `true`, instead of
    /// only being observable by the caller once the whole call returns
    /// (§5: "inter-poll sleeps inside the response router" are a named
    /// cancellation suspension point).
    pub fn transceive_cancellable(
        &mut self,
        req_type: u8,
        payload: &[u8],
        expected_type: u8,
        is_cancelled: &dyn Fn() -> bool,
    ) -> Result<Packet> {
        self.transceive_with_rounds(req_type, payload, expected_type, DEFAULT_POLL_ROUNDS, is_cancelled)
    }

    pub fn transceive_with_rounds(
        &mut self,
        req_type: u8,
        payload: &[u8],
        expected_type: u8,
        rounds: u32,
        is_cancelled: &dyn Fn() -> bool,
    ) -> Result<Packet> {
        let frame = codec::encode_a(req_type, payload)?;
        trace!("-> type=0x{req_type:02X} len={}", payload.len());
        self.transport.write(&frame)?;

        for round in 0..rounds {
            if is_cancelled() {
                return Err(NiimbotError::Timeout);
            }

            let mut chunk = Vec::new();
            self.transport.read_available(&mut chunk)?;
            if !chunk.is_empty() {
                self.buffer.append(&chunk);
            }

            for packet in self.buffer.drain_frames() {
                if packet.kind == ERROR_PACKET_TYPE {
                    warn!("printer returned error packet");
                    return Err(NiimbotError::PrinterError);
                }
                if packet.kind == expected_type {
                    debug!("<- type=0x{:02X} (round {round})", packet.kind);
                    return Ok(packet);
                }
                trace!(
                    "discarding unsolicited frame type=0x{:02X} while awaiting 0x{expected_type:02X}",
                    packet.kind
                );
            }

            if round + 1 < rounds {
                sleep(POLL_INTERVAL);
                if is_cancelled() {
                    return Err(NiimbotError::Timeout);
                }
            }
        }

        Err(NiimbotError::Timeout)
    }

    /// Send `payload` framed as `IMAGE_ROW` without waiting for a response
    /// (§4.6 — row packets are fire-and-forget).
    pub fn send_row(&mut self, row_type: u8, payload: &[u8]) -> Result<()> {
        let frame = codec::encode_a(row_type, payload)?;
        self.transport.write(&frame)
    }
}
