// SPDX-License-Identifier: MIT OR Apache-2.0

//! Replaying a synthesized capture reproduces the live decode path.

use std::io::Cursor;
use std::time::Instant;

use tokio_inetbox::{
    frame::{frame_checksum, Pid, PID_DIAG_REQUEST},
    replay::{replay_log, ReplaySlice},
    responder::{Handled, Responder},
    slave::Nad,
    status::{
        schema::{self, SchemaId},
        StatusStore,
    },
    transport::{segment, Reassembler},
};

/// Format a frame the way the reference logger writes it: timestamp,
/// PID, data, checksum, two annotation columns.
fn log_line(id: u8, data: &[u8; 8]) -> String {
    let pid = Pid::new(id);
    let mut line = format!("10:32:01.042 {:02X}", pid.protected());
    for byte in data {
        line.push_str(&format!(" {byte:02X}"));
    }
    line.push_str(&format!(" {:02X} len=9 rx\n", frame_checksum(pid, data)));
    line
}

fn display_read_buffer() -> Vec<u8> {
    let schema = schema::lookup(SchemaId::DISPLAY_READ).unwrap();
    let mut buffer = vec![0u8; schema.buffer_len()];
    buffer[..schema::PREAMBLE.len()].copy_from_slice(&schema::PREAMBLE);
    buffer[schema::ID_OFFSET] = 0x14;
    buffer[schema::ID_OFFSET + 1] = 0x33;
    let body = &mut buffer[schema::BODY_OFFSET..];
    for spec in schema.fields {
        let value = match schema::base_name(spec.name) {
            "target_temp_room" => 2930,
            "heating_mode" => 1,
            "current_temp_room" => 2925,
            "operating_status" => 5,
            _ => continue,
        };
        schema::write_field(body, spec, value);
    }
    schema::finalize_checksum(&mut buffer, schema);
    buffer
}

#[test]
fn capture_replay_reaches_the_application_layer() {
    let _ = env_logger::builder().is_test(true).try_init();

    // A session as logged from the bus: display broadcast, then a
    // segmented status download, with noise lines in between.
    let mut log = String::new();
    log.push_str(&log_line(0x20, &[0x72, 0x0B, 0x00, 0xFA, 0x00, 0x00, 0x00, 0x00]));
    log.push('\n');

    let buffer = display_read_buffer();
    let mut payload = vec![0x00, 0x1F];
    payload.extend_from_slice(&buffer);
    for data in segment(Nad::initial(), 0xBB, &payload) {
        log.push_str(&log_line(0x3C, &data));
    }
    log.push_str("10:32:02.000 corrupted line zz 00 :(\n");

    let mut reassembler = Reassembler::new();
    let mut responder = Responder::new(Nad::initial());
    let mut store = StatusStore::new();
    let mut display_frames = 0;
    let mut accepted = None;

    let stats = replay_log(Cursor::new(log), ReplaySlice::default(), |frame| {
        if frame.pid.id() == 0x20 {
            display_frames += 1;
        }
        if frame.pid.id() == PID_DIAG_REQUEST {
            if let Some(pdu) = reassembler.accept(frame, Instant::now()) {
                if let Handled::StatusAccepted(id) = responder.handle_pdu(&pdu, &mut store) {
                    accepted = Some(id);
                }
            }
        }
    })
    .unwrap();

    assert_eq!(stats.frames, 8); // 1 broadcast + FF + 6 CFs
    assert_eq!(stats.skipped, 1);
    assert_eq!(stats.codec.checksum_errors, 0);
    assert_eq!(display_frames, 1);
    assert_eq!(accepted, Some(SchemaId::DISPLAY_READ));

    let view = store.view(SchemaId::DISPLAY_READ).unwrap();
    assert_eq!(view["target_temp_room"], "20.0");
    assert_eq!(view["heating_mode"], "eco");
    assert_eq!(view["current_temp_room"], "19.5");
    assert_eq!(view["operating_status"], "on");
}

#[test]
fn replay_infers_checksum_variant_per_pid() {
    let _ = env_logger::builder().is_test(true).try_init();

    // The same data bytes need a classic checksum on 0x3C and an
    // enhanced one on 0x22; both lines must pass.
    let data = [0x01, 0x06, 0xB8, 0x40, 0x03, 0x00, 0x00, 0xFF];
    let mut log = String::new();
    log.push_str(&log_line(0x3C, &data));
    log.push_str(&log_line(0x22, &data));

    let stats = replay_log(Cursor::new(log), ReplaySlice::default(), |_| {}).unwrap();
    assert_eq!(stats.frames, 2);
    assert_eq!(stats.codec.checksum_errors, 0);
}
