// SPDX-License-Identifier: MIT OR Apache-2.0

//! Minimal LIN transport layer (LIN-TP).
//!
//! Reassembles diagnostic PDUs from single, first and consecutive
//! frames received on identifier 0x3C and segments outbound PDUs into
//! the eight-byte frames published on identifier 0x3D.

use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::{
    frame::{DataFrame, FRAME_DATA_LEN},
    slave::Nad,
};

/// Longest PDU the emulated node exchanges: the two-byte identity echo
/// plus a 38-byte status buffer. Larger payloads still work, they just
/// spill to the heap.
const PDU_INLINE_LEN: usize = 48;

/// How long an open reassembly session survives without input.
pub const REASSEMBLY_TIMEOUT: Duration = Duration::from_secs(1);

/// Padding value for unused frame bytes.
const PAD: u8 = 0xFF;

/// PCI frame types (high nibble of the PCI byte).
const PCI_SINGLE: u8 = 0x0;
const PCI_FIRST: u8 = 0x1;
const PCI_CONSECUTIVE: u8 = 0x2;

/// A reassembled diagnostic PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub nad: Nad,
    pub sid: u8,
    pub payload: SmallVec<[u8; PDU_INLINE_LEN]>,
}

/// Counters over transport-layer mishaps. Logged at debug level and
/// never surfaced to users.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Complete PDUs delivered upward.
    pub delivered: u64,
    /// Sessions cancelled by an unexpected frame type.
    pub cancelled: u64,
    /// Consecutive frames with the wrong sequence counter.
    pub sequence_errors: u64,
    /// Sessions dropped after [`REASSEMBLY_TIMEOUT`].
    pub timeouts: u64,
}

#[derive(Debug)]
struct Session {
    nad: Nad,
    sid: u8,
    expected: usize,
    payload: SmallVec<[u8; PDU_INLINE_LEN]>,
    next_seq: u8,
    last_rx: Instant,
}

/// Reassembles master-to-slave transfers on identifier 0x3C.
#[derive(Debug, Default)]
pub struct Reassembler {
    session: Option<Session>,
    stats: TransportStats,
}

impl Reassembler {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Counters accumulated since creation.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        self.stats
    }

    /// Drop the in-progress session if it has gone stale.
    pub fn expire(&mut self, now: Instant) {
        let stale = self
            .session
            .as_ref()
            .is_some_and(|s| now.duration_since(s.last_rx) >= REASSEMBLY_TIMEOUT);
        if stale {
            let session = self.session.take();
            if let Some(session) = session {
                log::debug!(
                    "transport: session from {} (SID 0x{:02X}) timed out at {}/{} byte(s)",
                    session.nad,
                    session.sid,
                    session.payload.len(),
                    session.expected
                );
            }
            self.stats.timeouts += 1;
        }
    }

    fn cancel(&mut self, reason: &str) {
        if self.session.take().is_some() {
            log::debug!("transport: reassembly cancelled ({reason})");
            self.stats.cancelled += 1;
        }
    }

    /// Feed one validated 0x3C frame. Returns a PDU once complete.
    pub fn accept(&mut self, frame: &DataFrame, now: Instant) -> Option<Pdu> {
        let data = &frame.data;
        let nad = Nad(data[0]);
        let pci = data[1];
        match pci >> 4 {
            PCI_SINGLE => {
                // Anything that is not a valid CF ends an open session.
                self.cancel("single frame received");
                let len = usize::from(pci & 0x0F);
                if len == 0 || 2 + len > FRAME_DATA_LEN {
                    log::debug!("transport: invalid single-frame length {len}");
                    return None;
                }
                let sid = data[2];
                let payload = SmallVec::from_slice(&data[3..2 + len]);
                self.stats.delivered += 1;
                Some(Pdu { nad, sid, payload })
            }
            PCI_FIRST => {
                self.cancel("first frame received");
                // Twelve-bit total length, counted including the SID.
                let total = usize::from(pci & 0x0F) << 8 | usize::from(data[2]);
                if total < 2 {
                    log::debug!("transport: invalid first-frame length {total}");
                    return None;
                }
                let expected = total - 1;
                let sid = data[3];
                let mut payload: SmallVec<[u8; PDU_INLINE_LEN]> =
                    SmallVec::with_capacity(expected);
                payload.extend_from_slice(&data[4..]);
                if payload.len() >= expected {
                    // Degenerate length that fits the first frame; a
                    // conforming sender would have used a single frame.
                    payload.truncate(expected);
                    self.stats.delivered += 1;
                    return Some(Pdu { nad, sid, payload });
                }
                self.session = Some(Session {
                    nad,
                    sid,
                    expected,
                    payload,
                    next_seq: 1,
                    last_rx: now,
                });
                None
            }
            PCI_CONSECUTIVE => {
                let seq = pci & 0x0F;
                let Some(session) = self.session.as_mut() else {
                    log::debug!("transport: stray consecutive frame (seq {seq})");
                    return None;
                };
                if seq != session.next_seq {
                    log::debug!(
                        "transport: sequence error (expected {}, received {seq})",
                        session.next_seq
                    );
                    self.stats.sequence_errors += 1;
                    self.cancel("out-of-order consecutive frame");
                    return None;
                }
                session.next_seq = (session.next_seq + 1) & 0x0F;
                session.last_rx = now;
                let remaining = session.expected - session.payload.len();
                let take = remaining.min(FRAME_DATA_LEN - 2);
                session.payload.extend_from_slice(&data[2..2 + take]);
                if session.payload.len() < session.expected {
                    return None;
                }
                let session = self.session.take()?;
                self.stats.delivered += 1;
                Some(Pdu {
                    nad: session.nad,
                    sid: session.sid,
                    payload: session.payload,
                })
            }
            _ => {
                self.cancel("reserved PCI type");
                log::debug!("transport: reserved PCI byte 0x{pci:02X}");
                None
            }
        }
    }
}

/// Segment an outbound PDU into eight-byte response frames.
///
/// Frames are published one per 0x3D header in order; unused bytes are
/// padded with 0xFF.
#[must_use]
pub fn segment(nad: Nad, rsid: u8, payload: &[u8]) -> Vec<[u8; FRAME_DATA_LEN]> {
    let total = payload.len() + 1; // RSID counts toward the length
    let mut frames = Vec::new();
    if total <= FRAME_DATA_LEN - 2 + 1 {
        // Single frame: NAD, PCI, SID, payload, padding.
        let mut frame = [PAD; FRAME_DATA_LEN];
        frame[0] = nad.into();
        frame[1] = total as u8;
        frame[2] = rsid;
        frame[3..3 + payload.len()].copy_from_slice(payload);
        frames.push(frame);
        return frames;
    }

    // First frame: NAD, PCI | len_hi, len_lo, SID, four payload bytes.
    let mut frame = [PAD; FRAME_DATA_LEN];
    frame[0] = nad.into();
    frame[1] = (PCI_FIRST << 4) | ((total >> 8) as u8 & 0x0F);
    frame[2] = (total & 0xFF) as u8;
    frame[3] = rsid;
    frame[4..].copy_from_slice(&payload[..4]);
    frames.push(frame);

    // Consecutive frames: NAD, PCI | seq, six payload bytes each.
    let mut seq = 1u8;
    for chunk in payload[4..].chunks(FRAME_DATA_LEN - 2) {
        let mut frame = [PAD; FRAME_DATA_LEN];
        frame[0] = nad.into();
        frame[1] = (PCI_CONSECUTIVE << 4) | seq;
        frame[2..2 + chunk.len()].copy_from_slice(chunk);
        frames.push(frame);
        seq = (seq + 1) & 0x0F;
    }
    frames
}
