// SPDX-License-Identifier: MIT OR Apache-2.0

//! Offline log replay.
//!
//! Feeds bus captures through the receive codec as though the bytes
//! came from the serial device. Each input line holds one frame as
//! whitespace-separated hex bytes, usually surrounded by a timestamp
//! and trailing annotation columns which are sliced away.

use std::io::{BufRead, Result};

use bytes::BytesMut;
use tokio_util::codec::Decoder as _;

use crate::{
    codec::{CodecStats, LinCodec},
    frame::{DataFrame, FrameEvent, BREAK_BYTE, SYNC_BYTE},
};

/// Which columns of a log line carry the frame bytes.
///
/// Python-style indices: negative values count from the end of the
/// line. The default skips a leading timestamp and two trailing
/// annotation columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySlice {
    pub first: isize,
    pub last: isize,
}

impl Default for ReplaySlice {
    fn default() -> Self {
        Self { first: 1, last: -2 }
    }
}

impl ReplaySlice {
    fn apply<'a>(&self, tokens: &'a [String]) -> &'a [String] {
        let len = tokens.len() as isize;
        let resolve = |index: isize| -> usize {
            let index = if index < 0 { len + index } else { index };
            index.clamp(0, len) as usize
        };
        let first = resolve(self.first);
        let last = resolve(self.last);
        if first >= last {
            &[]
        } else {
            &tokens[first..last]
        }
    }
}

/// Counters over one replay run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplayStats {
    /// Non-empty lines processed.
    pub lines: u64,
    /// Valid frames delivered to the handler.
    pub frames: u64,
    /// Lines skipped because of malformed hex tokens.
    pub skipped: u64,
    /// Codec counters over all replayed bytes.
    pub codec: CodecStats,
}

/// Replay a capture, invoking `on_frame` for every validated frame.
///
/// Empty lines are ignored; lines with non-hex tokens in the sliced
/// range are counted and skipped. Checksum variants are inferred from
/// the PID exactly as on the live bus.
pub fn replay_log<R, F>(reader: R, slice: ReplaySlice, mut on_frame: F) -> Result<ReplayStats>
where
    R: BufRead,
    F: FnMut(&DataFrame),
{
    let mut stats = ReplayStats::default();
    let mut codec = LinCodec::default();
    let mut buf = BytesMut::new();

    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let tokens: Vec<String> = line.split_whitespace().map(str::to_string).collect();
        let tokens = slice.apply(&tokens);
        let mut bytes = Vec::with_capacity(tokens.len() + 2);
        // Synthesize the break/sync pair the logger did not record.
        bytes.push(BREAK_BYTE);
        bytes.push(SYNC_BYTE);
        let mut valid = true;
        for token in tokens {
            match u8::from_str_radix(token, 16) {
                Ok(byte) => bytes.push(byte),
                Err(_) => {
                    log::debug!("replay: skipping line with non-hex token `{token}`");
                    valid = false;
                    break;
                }
            }
        }
        if !valid || bytes.len() == 2 {
            stats.skipped += 1;
            continue;
        }

        buf.extend_from_slice(&bytes);
        while let Some(event) = codec.decode(&mut buf)? {
            if let FrameEvent::Frame(frame) = event {
                stats.frames += 1;
                on_frame(&frame);
            }
        }
        // A line boundary is a frame boundary.
        codec.on_idle();
        buf.clear();
    }

    stats.codec = codec.stats();
    Ok(stats)
}
