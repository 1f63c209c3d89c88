// SPDX-License-Identifier: MIT OR Apache-2.0

//! Byte-accurate LIN frame codec.
//!
//! The receive path recognizes headers (break, sync, protected
//! identifier), validates PID parity and checksums and emits
//! [`FrameEvent`]s. The transmit path writes only response bytes (data
//! plus checksum): a responder never drives break or sync.
//!
//! Timing is the caller's concern: the server loop reads with a short
//! timeout and calls [`LinCodec::on_idle`] when it expires, which is
//! how partially received frames (e.g. an unanswered response header)
//! are discarded.

use std::io::{Error, Result};

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::frame::{
    frame_checksum, DataFrame, FrameEvent, Pid, ResponseFrame, BREAK_BYTE, FRAME_DATA_LEN,
    SYNC_BYTE,
};

/// Data bytes plus the trailing checksum byte.
const FRAME_TAIL_LEN: usize = FRAME_DATA_LEN + 1;

/// Counters over everything the codec dropped.
///
/// Transient bus errors are never surfaced to users; they are counted
/// here and logged at debug level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecStats {
    /// Valid frames handed to the upper layers.
    pub frames: u64,
    /// Bytes skipped while hunting for a break/sync sequence.
    pub dropped_bytes: u64,
    /// Protected identifiers failing the parity check.
    pub parity_errors: u64,
    /// Frames discarded for a checksum mismatch.
    pub checksum_errors: u64,
    /// Frames cut short by bus idle before all bytes arrived.
    pub truncated_frames: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    /// Hunting for a break byte.
    Break,
    /// Break seen, expecting the sync byte.
    Sync,
    /// Sync seen, expecting the protected identifier.
    Header,
    /// Header emitted, collecting data and checksum bytes.
    Data { pid: Pid, len: usize },
}

/// LIN slave codec for [`tokio_util::codec::Framed`].
#[derive(Debug)]
pub struct LinCodec {
    state: DecodeState,
    tail: [u8; FRAME_TAIL_LEN],
    stats: CodecStats,
}

impl Default for LinCodec {
    fn default() -> Self {
        Self {
            state: DecodeState::Break,
            tail: [0; FRAME_TAIL_LEN],
            stats: CodecStats::default(),
        }
    }
}

impl LinCodec {
    /// Drop all partial input and resynchronize on the next break.
    ///
    /// Called after the slave transmitted a response, which parallels
    /// flushing the receive buffer to discard the transceiver echo.
    pub fn reset(&mut self) {
        self.state = DecodeState::Break;
    }

    /// Notify the codec that the bus went idle (read timeout).
    ///
    /// A header nobody answered simply times out; that is the normal
    /// fate of an unanswered 0x3D and is not an error. A frame cut
    /// short mid-data is counted as truncated.
    pub fn on_idle(&mut self) {
        match self.state {
            DecodeState::Break => {}
            DecodeState::Data { pid, len } if len > 0 => {
                log::debug!("frame {pid} truncated after {len} byte(s)");
                self.stats.truncated_frames += 1;
            }
            _ => {}
        }
        self.state = DecodeState::Break;
    }

    /// Error counters accumulated since creation.
    #[must_use]
    pub fn stats(&self) -> CodecStats {
        self.stats
    }

    fn complete_frame(&mut self, pid: Pid) -> Option<DataFrame> {
        let mut data = [0u8; FRAME_DATA_LEN];
        data.copy_from_slice(&self.tail[..FRAME_DATA_LEN]);
        let received = self.tail[FRAME_DATA_LEN];
        let expected = frame_checksum(pid, &data);
        if received != expected {
            log::debug!(
                "frame {pid}: checksum error (received {received:02X}, calculated {expected:02X})"
            );
            self.stats.checksum_errors += 1;
            return None;
        }
        self.stats.frames += 1;
        Some(DataFrame { pid, data })
    }
}

impl Decoder for LinCodec {
    type Item = FrameEvent;
    type Error = Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<FrameEvent>> {
        while !src.is_empty() {
            match self.state {
                DecodeState::Break => {
                    match src.iter().position(|&b| b == BREAK_BYTE) {
                        None => {
                            self.stats.dropped_bytes += src.len() as u64;
                            src.clear();
                        }
                        Some(pos) => {
                            self.stats.dropped_bytes += pos as u64;
                            src.advance(pos + 1);
                            self.state = DecodeState::Sync;
                        }
                    }
                }
                DecodeState::Sync => {
                    let byte = src.get_u8();
                    match byte {
                        SYNC_BYTE => self.state = DecodeState::Header,
                        // A break may be sampled as more than one zero
                        // byte; keep waiting for the sync.
                        BREAK_BYTE => {}
                        _ => {
                            log::debug!("in < 00 {byte:02X}: not a proper sync, resynchronizing");
                            self.stats.dropped_bytes += 2;
                            self.state = DecodeState::Break;
                        }
                    }
                }
                DecodeState::Header => {
                    let byte = src.get_u8();
                    match Pid::from_protected(byte) {
                        Ok(pid) => {
                            self.state = DecodeState::Data { pid, len: 0 };
                            return Ok(Some(FrameEvent::Header(pid)));
                        }
                        Err(byte) => {
                            log::debug!("in < 00 55 {byte:02X}: PID parity error");
                            self.stats.parity_errors += 1;
                            self.state = DecodeState::Break;
                        }
                    }
                }
                DecodeState::Data { pid, len } => {
                    let take = (FRAME_TAIL_LEN - len).min(src.len());
                    self.tail[len..len + take].copy_from_slice(&src[..take]);
                    src.advance(take);
                    let len = len + take;
                    if len < FRAME_TAIL_LEN {
                        self.state = DecodeState::Data { pid, len };
                        continue;
                    }
                    self.state = DecodeState::Break;
                    if let Some(frame) = self.complete_frame(pid) {
                        return Ok(Some(FrameEvent::Frame(frame)));
                    }
                }
            }
        }
        Ok(None)
    }
}

impl Encoder<ResponseFrame> for LinCodec {
    type Error = Error;

    fn encode(&mut self, frame: ResponseFrame, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(FRAME_TAIL_LEN);
        dst.put_slice(&frame.data);
        dst.put_u8(frame_checksum(frame.pid, &frame.data));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{PID_DIAG_REQUEST, PID_UPDATE_POLL};

    fn drain(codec: &mut LinCodec, buf: &mut BytesMut) -> Vec<FrameEvent> {
        let mut events = Vec::new();
        while let Some(event) = codec.decode(buf).unwrap() {
            events.push(event);
        }
        events
    }

    #[test]
    fn decode_empty_input() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::new();
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }

    #[test]
    fn decode_diagnostic_request() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(
            &[
                0x00, 0x55, 0x3C, // header
                0x01, 0x06, 0xB8, 0x40, 0x03, 0x00, 0x00, 0xFF, // data
                0xFC, // classic checksum
            ][..],
        );
        let events = drain(&mut codec, &mut buf);
        let pid = Pid::new(PID_DIAG_REQUEST);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0], FrameEvent::Header(pid));
        assert_eq!(
            events[1],
            FrameEvent::Frame(DataFrame {
                pid,
                data: [0x01, 0x06, 0xB8, 0x40, 0x03, 0x00, 0x00, 0xFF],
            })
        );
        assert_eq!(codec.stats().frames, 1);
    }

    #[test]
    fn decode_enhanced_checksum_frame() {
        let pid = Pid::new(PID_UPDATE_POLL);
        let data = [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        let mut wire = vec![0x00, 0x55, pid.protected()];
        wire.extend_from_slice(&data);
        wire.push(frame_checksum(pid, &data));

        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(&wire[..]);
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events.len(), 2);
        assert_eq!(events[1], FrameEvent::Frame(DataFrame { pid, data }));
    }

    #[test]
    fn checksum_mismatch_is_counted_and_dropped() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(
            &[
                0x00, 0x55, 0x3C, //
                0x01, 0x06, 0xB8, 0x40, 0x03, 0x00, 0x00, 0xFF, //
                0xFD, // wrong
            ][..],
        );
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events.len(), 1); // header only
        assert_eq!(codec.stats().checksum_errors, 1);
        assert_eq!(codec.stats().frames, 0);
    }

    #[test]
    fn parity_error_resynchronizes() {
        let mut codec = LinCodec::default();
        // 0xD9 is 0xD8 with a flipped identifier bit.
        let mut buf = BytesMut::from(&[0x00, 0x55, 0xD9][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.stats().parity_errors, 1);

        // The next proper header is picked up again.
        let mut buf = BytesMut::from(&[0x00, 0x55, 0xD8][..]);
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events, vec![FrameEvent::Header(Pid::new(PID_UPDATE_POLL))]);
    }

    #[test]
    fn garbage_before_break_is_skipped() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(&[0x42, 0x43, 0x00, 0x55, 0xD8][..]);
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events, vec![FrameEvent::Header(Pid::new(PID_UPDATE_POLL))]);
        assert_eq!(codec.stats().dropped_bytes, 2);
    }

    #[test]
    fn long_break_tolerated() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(&[0x00, 0x00, 0x00, 0x55, 0x20][..]);
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events, vec![FrameEvent::Header(Pid::new(0x20))]);
    }

    #[test]
    fn idle_mid_frame_counts_truncation() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(&[0x00, 0x55, 0x20, 0x01, 0x02][..]);
        let events = drain(&mut codec, &mut buf);
        assert_eq!(events.len(), 1);
        codec.on_idle();
        assert_eq!(codec.stats().truncated_frames, 1);

        // An unanswered header is not an error.
        let mut buf = BytesMut::from(&[0x00, 0x55, 0x7D][..]);
        drain(&mut codec, &mut buf);
        codec.on_idle();
        assert_eq!(codec.stats().truncated_frames, 1);
    }

    #[test]
    fn frame_split_across_reads() {
        let mut codec = LinCodec::default();
        let pid = Pid::new(0x20);
        let data = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];
        let mut wire = vec![0x00, 0x55, pid.protected()];
        wire.extend_from_slice(&data);
        wire.push(frame_checksum(pid, &data));

        let mut buf = BytesMut::new();
        let mut events = Vec::new();
        for chunk in wire.chunks(3) {
            buf.extend_from_slice(chunk);
            events.extend(drain(&mut codec, &mut buf));
        }
        assert_eq!(
            events,
            vec![
                FrameEvent::Header(pid),
                FrameEvent::Frame(DataFrame { pid, data }),
            ]
        );
    }

    #[test]
    fn encode_response_with_checksum() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::new();
        // Alive-check response on the diagnostic channel (classic).
        let data = [0x03, 0x02, 0xF9, 0x00, 0xFF, 0xFF, 0xFF, 0xFF];
        codec
            .encode(
                ResponseFrame {
                    pid: Pid::new(0x3D),
                    data,
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(
            &buf[..],
            &[0x03, 0x02, 0xF9, 0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]
        );

        // Update poll response (enhanced: protected 0xD8 in the sum).
        let mut buf = BytesMut::new();
        let data = [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];
        codec
            .encode(
                ResponseFrame {
                    pid: Pid::new(PID_UPDATE_POLL),
                    data,
                },
                &mut buf,
            )
            .unwrap();
        assert_eq!(buf[FRAME_DATA_LEN], frame_checksum(Pid::new(0x18), &data));
    }

    #[test]
    fn encode_decode_round_trip() {
        // Property: whatever the responder transmits is accepted back
        // by the receive path with the identical data bytes.
        for id in [0x18u8, 0x20, 0x3C, 0x3D] {
            let pid = Pid::new(id);
            let data = [id, 0x00, 0xA5, 0xFF, 0x01, 0x80, 0x7F, 0xFE];
            let mut codec = LinCodec::default();
            let mut wire = BytesMut::from(&[0x00, 0x55, pid.protected()][..]);
            codec.encode(ResponseFrame { pid, data }, &mut wire).unwrap();
            let events = drain(&mut codec, &mut wire);
            assert_eq!(
                events,
                vec![
                    FrameEvent::Header(pid),
                    FrameEvent::Frame(DataFrame { pid, data }),
                ]
            );
        }
    }

    #[test]
    fn reset_discards_partial_state() {
        let mut codec = LinCodec::default();
        let mut buf = BytesMut::from(&[0x00, 0x55, 0xD8][..]);
        drain(&mut codec, &mut buf);
        codec.reset();
        // Echo of our own response must not be parsed as data.
        let mut buf = BytesMut::from(&[0xFE, 0xFF, 0xFF][..]);
        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert_eq!(codec.stats().frames, 0);
    }
}
