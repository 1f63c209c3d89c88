// SPDX-License-Identifier: MIT OR Apache-2.0

//! Broadcast display frames.
//!
//! CP Plus periodically publishes three eight-byte status frames
//! (identifiers 0x20, 0x21, 0x22) that every node may read. They are
//! not buffers: temperatures are nibble-packed and the enums differ
//! from the buffer codecs, so they get their own decoder. Bytes whose
//! meaning is unknown are reported as hex strings instead of being
//! dropped.

use crate::{
    frame::{DataFrame, PID_COMMAND_STATUS, PID_STATUS_1, PID_STATUS_2},
    settings::temp_string,
};

/// Decoded key/value pairs of one display frame.
pub type DisplayFields = Vec<(&'static str, String)>;

fn map_or_debug(mapping: &[(u8, &str)], value: u8) -> String {
    mapping
        .iter()
        .find(|(code, _)| *code == value)
        .map_or_else(|| format!("unknown value 0x{value:02x}"), |(_, name)| (*name).to_string())
}

const ENERGY_SELECTION: &[(u8, &str)] = &[(0x00, "electricity"), (0xFA, "gas/mix")];

const ENERGY_MODE: &[(u8, &str)] = &[
    (0x00, "gas"),
    (0x09, "mix/electricity 1"),
    (0x12, "mix/electricity 2"),
];

const ENERGY_MODE_2: &[(u8, &str)] = &[
    (0x1, "gas"),
    (0x2, "electricity"),
    (0x3, "gas/electricity"),
];

const VENT_MODE: &[(u8, &str)] = &[
    (0x0, "off"),
    (0xB, "eco"),
    (0xD, "high"),
    (0x1, "vent 1"),
    (0x2, "vent 2"),
    (0x3, "vent 3"),
    (0x4, "vent 4"),
    (0x5, "vent 5"),
    (0x6, "vent 6"),
    (0x7, "vent 7"),
    (0x8, "vent 8"),
    (0x9, "vent 9"),
    (0xA, "vent 10"),
];

const OPERATING: &[(u8, &str)] = &[
    (0x01, "off"),
    (0x02, "on"),
    (0x22, "on + airvent"),
    (0x21, "airvent"),
    (0x31, "error"),
    (0x32, "fatal error"),
];

const CP_PLUS_DISPLAY: &[(u8, &str)] = &[
    (0xF0, "heating on"),
    (0x20, "standby ac on"),
    (0x00, "standby ac off"),
    (0xD0, "error"),
    (0x70, "fatal error"),
    (0x50, "boiler on"),
    (0x40, "boiler off"),
];

const HEATING_STATUS: &[(u8, &str)] = &[
    (0x10, "boiler eco done"),
    (0x11, "boiler eco heating"),
    (0x30, "boiler hot done"),
    (0x31, "boiler hot heating"),
];

const HEATING_STATUS_2: &[(u8, &str)] = &[
    (0x04, "normal"),
    (0xFE, "normal"),
    (0x05, "error"),
    (0xFF, "fatal error"),
];

/// Room temperature code packed across bytes `lo` and `shared`.
fn packed_temp_low(lo: u8, shared: u8) -> u32 {
    u32::from(lo) | (u32::from(shared & 0x0F) << 8)
}

/// Water temperature code packed across bytes `shared` and `hi`.
fn packed_temp_high(shared: u8, hi: u8) -> u32 {
    (u32::from(hi) << 4) | (u32::from(shared & 0xF0) >> 4)
}

fn decode_command_status(data: &[u8; 8]) -> DisplayFields {
    vec![
        ("target_temp_room", temp_string(packed_temp_low(data[0], data[1]))),
        ("target_temp_water", temp_string(packed_temp_high(data[1], data[2]))),
        ("energy_mix", map_or_debug(ENERGY_SELECTION, data[3])),
        ("energy_mode", map_or_debug(ENERGY_MODE, data[4])),
        ("energy_mode_2", map_or_debug(ENERGY_MODE_2, data[5] & 0x0F)),
        ("vent_mode", map_or_debug(VENT_MODE, data[5] >> 4)),
        ("pid_20_unknown_byte_6", format!("0x{:02x}", data[6])),
        ("pid_20_unknown_byte_7", format!("0x{:02x}", data[7])),
    ]
}

fn decode_status_1(data: &[u8; 8]) -> DisplayFields {
    vec![
        ("current_temp_room", temp_string(packed_temp_low(data[0], data[1]))),
        ("current_temp_water", temp_string(packed_temp_high(data[1], data[2]))),
        ("pid_21_unknown_byte_3", format!("0x{:02x}", data[3])),
        ("pid_21_unknown_byte_4", format!("0x{:02x}", data[4])),
        ("operating_status", map_or_debug(OPERATING, data[5])),
        ("pid_21_unknown_byte_6", format!("0x{:02x}", data[6])),
        ("pid_21_unknown_byte_7", format!("0x{:02x}", data[7])),
    ]
}

fn decode_status_2(data: &[u8; 8]) -> DisplayFields {
    vec![
        ("voltage", format!("{}.{}", data[0] / 10, data[0] % 10)),
        ("cp_plus_display_status", map_or_debug(CP_PLUS_DISPLAY, data[1])),
        ("heating_status", map_or_debug(HEATING_STATUS, data[2])),
        ("heating_status_2", map_or_debug(HEATING_STATUS_2, data[3])),
        ("pid_22_unknown_byte_4", format!("0x{:02x}", data[4])),
        ("pid_22_unknown_byte_5", format!("0x{:02x}", data[5])),
        ("pid_22_unknown_byte_6", format!("0x{:02x}", data[6])),
        ("pid_22_unknown_byte_7", format!("0x{:02x}", data[7])),
    ]
}

/// Decode a broadcast display frame; `None` for other identifiers.
#[must_use]
pub fn decode(frame: &DataFrame) -> Option<DisplayFields> {
    match frame.pid.id() {
        PID_COMMAND_STATUS => Some(decode_command_status(&frame.data)),
        PID_STATUS_1 => Some(decode_status_1(&frame.data)),
        PID_STATUS_2 => Some(decode_status_2(&frame.data)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::Pid;

    fn frame(pid: u8, data: [u8; 8]) -> DataFrame {
        DataFrame {
            pid: Pid::new(pid),
            data,
        }
    }

    fn get<'a>(fields: &'a DisplayFields, key: &str) -> &'a str {
        fields
            .iter()
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value.as_str())
            .unwrap()
    }

    #[test]
    fn command_status_temperatures_unpack() {
        // Room 20.0 C = 0x0B72, water 40.0 C = 0x0C3A nibble-packed:
        // byte0 = 0x72, byte1 = low nibble room hi | water lo nibble,
        // byte2 = water code >> 4.
        let fields = decode(&frame(
            0x20,
            [0x72, 0xAB, 0xC3, 0xFA, 0x09, 0xB1, 0x00, 0x00],
        ))
        .unwrap();
        assert_eq!(get(&fields, "target_temp_room"), "20.0");
        assert_eq!(get(&fields, "target_temp_water"), "40.0");
        assert_eq!(get(&fields, "energy_mix"), "gas/mix");
        assert_eq!(get(&fields, "energy_mode"), "mix/electricity 1");
        assert_eq!(get(&fields, "energy_mode_2"), "gas");
        assert_eq!(get(&fields, "vent_mode"), "eco");
    }

    #[test]
    fn status_1_operating_byte() {
        let fields = decode(&frame(
            0x21,
            [0x72, 0x0B, 0x00, 0x00, 0x00, 0x22, 0x00, 0x00],
        ))
        .unwrap();
        assert_eq!(get(&fields, "current_temp_room"), "20.0");
        assert_eq!(get(&fields, "current_temp_water"), "0");
        assert_eq!(get(&fields, "operating_status"), "on + airvent");
    }

    #[test]
    fn status_2_voltage_and_states() {
        let fields = decode(&frame(
            0x22,
            [0x7C, 0xF0, 0x11, 0x04, 0x00, 0x00, 0x00, 0x00],
        ))
        .unwrap();
        assert_eq!(get(&fields, "voltage"), "12.4");
        assert_eq!(get(&fields, "cp_plus_display_status"), "heating on");
        assert_eq!(get(&fields, "heating_status"), "boiler eco heating");
        assert_eq!(get(&fields, "heating_status_2"), "normal");
    }

    #[test]
    fn unknown_bytes_kept_as_hex() {
        let fields = decode(&frame(
            0x22,
            [0x00, 0x99, 0x00, 0x00, 0xAB, 0x00, 0x00, 0x00],
        ))
        .unwrap();
        assert_eq!(get(&fields, "cp_plus_display_status"), "unknown value 0x99");
        assert_eq!(get(&fields, "pid_22_unknown_byte_4"), "0xab");
    }

    #[test]
    fn other_identifiers_are_not_display_frames() {
        assert!(decode(&frame(0x18, [0; 8])).is_none());
        assert!(decode(&frame(0x3C, [0; 8])).is_none());
    }
}
