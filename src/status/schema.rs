// SPDX-License-Identifier: MIT OR Apache-2.0

//! Declarative status-buffer schemas.
//!
//! Every buffer starts with a shared ten-byte preamble and a two-byte
//! schema identifier; the layout of the remaining body is described by
//! a static field table. The engine below is the only code that reads
//! or writes fields: decoding walks the table, encoding copies a base
//! buffer and overlays the touched fields so that undocumented bits
//! round-trip untouched.

use byteorder::{ByteOrder, LittleEndian};

use crate::frame::checksum;

/// Shared preamble of every status buffer.
pub const PREAMBLE: [u8; 10] = [0x00, 0x1E, 0x00, 0x00, 0x22, 0xFF, 0xFF, 0xFF, 0x54, 0x01];

/// Offset of the schema identifier pair within a buffer.
pub const ID_OFFSET: usize = PREAMBLE.len();

/// Offset of the schema-specific body within a buffer.
pub const BODY_OFFSET: usize = ID_OFFSET + 2;

/// The buffer checksum covers everything from this offset onward.
const CHECKSUM_SPAN_START: usize = 8;

/// Initial value of the command counter carried by write buffers.
pub const COUNTER_START: u8 = 128;

/// The two identifier bytes selecting a schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SchemaId(pub u8, pub u8);

impl SchemaId {
    /// Display-and-control read buffer sent by CP Plus.
    pub const DISPLAY_READ: SchemaId = SchemaId(0x14, 0x33);
    /// Control write buffer uploaded by the slave.
    pub const CONTROL_WRITE: SchemaId = SchemaId(0x0C, 0x32);
    /// Timer read buffer.
    pub const TIMER_READ: SchemaId = SchemaId(0x18, 0x3D);
    /// Timer write buffer; captured but not fully verified.
    pub const TIMER_WRITE: SchemaId = SchemaId(0x10, 0x3C);
    /// Wall-clock buffer, read and written under the same identifier.
    pub const CLOCK: SchemaId = SchemaId(0x15, 0x24);
    /// Acknowledgement buffer carrying only a command counter.
    pub const COUNTER_ONLY: SchemaId = SchemaId(0x02, 0x0D);
}

impl std::fmt::Display for SchemaId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "(0x{:02X}, 0x{:02X})", self.0, self.1)
    }
}

/// Value mapping applied to a raw field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Codec {
    /// Plain unsigned integer.
    Uint,
    /// Two-byte temperature code (tenths of Kelvin, 273.0 offset).
    Temperature,
    /// Heating mode enum (0 off, 1 eco, 10 high).
    HeatingMode,
    /// Energy mix bit set.
    EnergyMix,
    /// Electric heating power in watts (0/900/1800 verbatim).
    PowerLevel,
    /// Operating status byte.
    OperatingStatus,
    /// Two error-code bytes, combined as high * 100 + low.
    ErrorCode,
    /// BCD-coded value (wall-clock digits).
    Bcd,
    /// Internal byte kept verbatim (checksums, counters, unknowns).
    Raw,
}

/// One field of a schema body.
///
/// `byte`/`bit` locate the least significant bit of the field within
/// the body; multi-byte fields are little-endian on the wire.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub byte: usize,
    pub bit: u8,
    pub width: u8,
    pub codec: Codec,
}

const fn field(name: &'static str, byte: usize, width: u8, codec: Codec) -> FieldSpec {
    FieldSpec {
        name,
        byte,
        bit: 0,
        width,
        codec,
    }
}

/// A status-buffer layout.
#[derive(Debug, Clone, Copy)]
pub struct Schema {
    pub id: SchemaId,
    pub body_len: usize,
    pub fields: &'static [FieldSpec],
    /// Write member of this schema's family, if uploads exist for it.
    pub write_id: Option<SchemaId>,
    /// Whether body byte 0 carries the command counter.
    pub has_counter: bool,
    /// Offset of the checksum byte within the body.
    pub checksum_at: Option<usize>,
}

impl Schema {
    /// Total buffer length including preamble and identifier.
    #[must_use]
    pub fn buffer_len(&self) -> usize {
        BODY_OFFSET + self.body_len
    }
}

// The `el_power` and `energy_mix` values appear twice on the wire;
// the duplicated slots carry a `#2` suffix and are written through
// both. The control write buffer mirrors the read buffer's writable
// fields at identical body offsets (checked by a test below).
const DISPLAY_READ_FIELDS: &[FieldSpec] = &[
    field("_checksum", 1, 8, Codec::Raw),
    field("target_temp_room", 2, 16, Codec::Temperature),
    field("heating_mode", 4, 8, Codec::HeatingMode),
    field("_status_u3", 5, 8, Codec::Raw),
    field("el_power_level", 6, 16, Codec::PowerLevel),
    field("target_temp_water", 8, 16, Codec::Temperature),
    field("el_power_level#2", 10, 16, Codec::PowerLevel),
    field("energy_mix", 12, 8, Codec::EnergyMix),
    field("energy_mix#2", 13, 8, Codec::EnergyMix),
    field("current_temp_water", 14, 16, Codec::Temperature),
    field("current_temp_room", 16, 16, Codec::Temperature),
    field("operating_status", 18, 8, Codec::OperatingStatus),
    field("error_code", 19, 16, Codec::ErrorCode),
];

const CONTROL_WRITE_FIELDS: &[FieldSpec] = &[
    field("_checksum", 1, 8, Codec::Raw),
    field("target_temp_room", 2, 16, Codec::Temperature),
    field("heating_mode", 4, 8, Codec::HeatingMode),
    field("_status_u3", 5, 8, Codec::Raw),
    field("el_power_level", 6, 16, Codec::PowerLevel),
    field("target_temp_water", 8, 16, Codec::Temperature),
    field("el_power_level#2", 10, 16, Codec::PowerLevel),
    field("energy_mix", 12, 8, Codec::EnergyMix),
    field("energy_mix#2", 13, 8, Codec::EnergyMix),
];

const TIMER_FIELDS: &[FieldSpec] = &[
    field("_checksum", 1, 8, Codec::Raw),
    field("timer_target_temp_room", 2, 16, Codec::Temperature),
    field("timer_target_temp_water", 8, 16, Codec::Temperature),
    field("timer_active", 19, 8, Codec::Uint),
    field("timer_start_minutes", 20, 8, Codec::Uint),
    field("timer_start_hours", 21, 8, Codec::Uint),
    field("timer_stop_minutes", 22, 8, Codec::Uint),
    field("timer_stop_hours", 23, 8, Codec::Uint),
];

const CLOCK_FIELDS: &[FieldSpec] = &[
    field("_checksum", 1, 8, Codec::Raw),
    field("wall_time_hours", 2, 8, Codec::Bcd),
    field("wall_time_minutes", 3, 8, Codec::Bcd),
    field("wall_time_seconds", 4, 8, Codec::Bcd),
    field("clock_mode", 5, 8, Codec::Uint),
    field("clock_source", 6, 8, Codec::Uint),
];

const COUNTER_ONLY_FIELDS: &[FieldSpec] = &[];

const SCHEMAS: &[Schema] = &[
    Schema {
        id: SchemaId::DISPLAY_READ,
        body_len: 26,
        fields: DISPLAY_READ_FIELDS,
        write_id: Some(SchemaId::CONTROL_WRITE),
        has_counter: false,
        checksum_at: Some(1),
    },
    Schema {
        id: SchemaId::CONTROL_WRITE,
        body_len: 26,
        fields: CONTROL_WRITE_FIELDS,
        write_id: Some(SchemaId::CONTROL_WRITE),
        has_counter: true,
        checksum_at: Some(1),
    },
    Schema {
        id: SchemaId::TIMER_READ,
        body_len: 25,
        fields: TIMER_FIELDS,
        write_id: Some(SchemaId::TIMER_WRITE),
        has_counter: false,
        checksum_at: Some(1),
    },
    Schema {
        id: SchemaId::TIMER_WRITE,
        body_len: 25,
        fields: TIMER_FIELDS,
        write_id: Some(SchemaId::TIMER_WRITE),
        has_counter: true,
        checksum_at: Some(1),
    },
    Schema {
        id: SchemaId::CLOCK,
        body_len: 10,
        fields: CLOCK_FIELDS,
        write_id: Some(SchemaId::CLOCK),
        has_counter: true,
        checksum_at: Some(1),
    },
    Schema {
        id: SchemaId::COUNTER_ONLY,
        body_len: 26,
        fields: COUNTER_ONLY_FIELDS,
        write_id: None,
        has_counter: true,
        checksum_at: None,
    },
];

/// All known schemas.
#[must_use]
pub fn all() -> &'static [Schema] {
    SCHEMAS
}

/// Look up the schema selected by an identifier pair.
#[must_use]
pub fn lookup(id: SchemaId) -> Option<&'static Schema> {
    SCHEMAS.iter().find(|s| s.id == id)
}

/// The write member of the family a requested identifier belongs to.
#[must_use]
pub fn write_member(id: SchemaId) -> Option<&'static Schema> {
    lookup(id)
        .and_then(|s| s.write_id)
        .and_then(lookup)
}

/// Strip the `#n` suffix distinguishing duplicated wire slots.
#[must_use]
pub fn base_name(name: &str) -> &str {
    name.split_once('#').map_or(name, |(base, _)| base)
}

fn mask(width: u8) -> u32 {
    if width >= 32 {
        u32::MAX
    } else {
        (1 << width) - 1
    }
}

/// Read a field's raw value from a schema body.
#[must_use]
pub fn read_field(body: &[u8], spec: &FieldSpec) -> u32 {
    let nbytes = usize::from((spec.bit + spec.width + 7) / 8);
    let mut raw = [0u8; 4];
    raw[..nbytes].copy_from_slice(&body[spec.byte..spec.byte + nbytes]);
    (LittleEndian::read_u32(&raw) >> spec.bit) & mask(spec.width)
}

/// Write a field's raw value into a schema body.
pub fn write_field(body: &mut [u8], spec: &FieldSpec, value: u32) {
    let nbytes = usize::from((spec.bit + spec.width + 7) / 8);
    let mut raw = [0u8; 4];
    raw[..nbytes].copy_from_slice(&body[spec.byte..spec.byte + nbytes]);
    let mut word = LittleEndian::read_u32(&raw);
    let mask = mask(spec.width) << spec.bit;
    word = (word & !mask) | ((value << spec.bit) & mask);
    LittleEndian::write_u32(&mut raw, word);
    body[spec.byte..spec.byte + nbytes].copy_from_slice(&raw[..nbytes]);
}

/// Apply a codec to a raw field value for display.
#[must_use]
pub fn display_value(codec: Codec, raw: u32) -> String {
    use crate::settings;
    match codec {
        Codec::Uint | Codec::PowerLevel => raw.to_string(),
        Codec::Temperature => settings::temp_string(raw),
        Codec::HeatingMode => settings::heating_mode_string(raw),
        Codec::EnergyMix => settings::energy_mix_string(raw),
        Codec::OperatingStatus => settings::operating_status_string(raw),
        Codec::ErrorCode => settings::error_code_string(raw),
        Codec::Bcd => ((raw >> 4) * 10 + (raw & 0x0F)).to_string(),
        Codec::Raw => format!("0x{raw:02X}"),
    }
}

/// Encode a raw value through a codec for the wire.
///
/// Only BCD actually transforms; the remaining codecs store their raw
/// value verbatim.
#[must_use]
pub fn wire_value(codec: Codec, raw: u32) -> u32 {
    match codec {
        Codec::Bcd => (raw / 10) << 4 | (raw % 10),
        _ => raw,
    }
}

/// Compute and store the buffer checksum.
///
/// The checksum spans the buffer from byte 8 onward with the checksum
/// field itself zeroed; the preamble tail bytes `0x54 0x01` are part
/// of the sum.
pub fn finalize_checksum(buffer: &mut [u8], schema: &Schema) {
    let Some(at) = schema.checksum_at else {
        return;
    };
    buffer[BODY_OFFSET + at] = 0;
    let sum = checksum(&buffer[CHECKSUM_SPAN_START..]);
    buffer[BODY_OFFSET + at] = sum;
}

/// Verify the checksum of an inbound buffer.
#[must_use]
pub fn verify_checksum(buffer: &[u8], schema: &Schema) -> bool {
    let Some(at) = schema.checksum_at else {
        return true;
    };
    let mut copy = buffer.to_vec();
    copy[BODY_OFFSET + at] = 0;
    checksum(&copy[CHECKSUM_SPAN_START..]) == buffer[BODY_OFFSET + at]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_sizes() {
        assert_eq!(lookup(SchemaId::DISPLAY_READ).unwrap().buffer_len(), 38);
        assert_eq!(lookup(SchemaId::CONTROL_WRITE).unwrap().buffer_len(), 38);
        assert_eq!(lookup(SchemaId::TIMER_READ).unwrap().buffer_len(), 37);
        assert_eq!(lookup(SchemaId::CLOCK).unwrap().buffer_len(), 22);
    }

    #[test]
    fn shared_fields_line_up() {
        // The control write buffer mirrors the read buffer's writable
        // fields at identical body offsets.
        let read = lookup(SchemaId::DISPLAY_READ).unwrap();
        let write = lookup(SchemaId::CONTROL_WRITE).unwrap();
        for wf in write.fields.iter().filter(|f| f.name != "_checksum") {
            let rf = read
                .fields
                .iter()
                .find(|f| f.name == wf.name)
                .unwrap_or_else(|| panic!("missing {}", wf.name));
            assert_eq!(rf.byte, wf.byte);
            assert_eq!(rf.width, wf.width);
        }
    }

    #[test]
    fn field_round_trip() {
        let schema = lookup(SchemaId::DISPLAY_READ).unwrap();
        let mut body = vec![0u8; schema.body_len];
        for spec in schema.fields {
            let value = 0x1234_5678 & mask(spec.width);
            write_field(&mut body, spec, value);
            assert_eq!(read_field(&body, spec), value, "field {}", spec.name);
        }
    }

    #[test]
    fn sixteen_bit_fields_are_little_endian() {
        let schema = lookup(SchemaId::DISPLAY_READ).unwrap();
        let spec = schema
            .fields
            .iter()
            .find(|f| f.name == "target_temp_room")
            .unwrap();
        let mut body = vec![0u8; schema.body_len];
        write_field(&mut body, spec, 2930); // 0x0B72
        assert_eq!(body[2], 0x72);
        assert_eq!(body[3], 0x0B);
    }

    #[test]
    fn writes_do_not_clobber_neighbours() {
        let schema = lookup(SchemaId::DISPLAY_READ).unwrap();
        let mut body = vec![0xAAu8; schema.body_len];
        let spec = schema
            .fields
            .iter()
            .find(|f| f.name == "heating_mode")
            .unwrap();
        write_field(&mut body, spec, 1);
        assert_eq!(body[3], 0xAA);
        assert_eq!(body[4], 1);
        assert_eq!(body[5], 0xAA);
    }

    #[test]
    fn bcd_wire_encoding() {
        assert_eq!(wire_value(Codec::Bcd, 0), 0x00);
        assert_eq!(wire_value(Codec::Bcd, 9), 0x09);
        assert_eq!(wire_value(Codec::Bcd, 23), 0x23);
        assert_eq!(wire_value(Codec::Bcd, 59), 0x59);
    }

    #[test]
    fn checksum_span_and_position() {
        let schema = lookup(SchemaId::CONTROL_WRITE).unwrap();
        let mut buffer = vec![0u8; schema.buffer_len()];
        buffer[..PREAMBLE.len()].copy_from_slice(&PREAMBLE);
        buffer[ID_OFFSET] = schema.id.0;
        buffer[ID_OFFSET + 1] = schema.id.1;
        finalize_checksum(&mut buffer, schema);
        assert!(verify_checksum(&buffer, schema));
        // Checksum lives at absolute offset 13 for this family.
        assert_ne!(buffer[13], 0);
        // Any payload flip must invalidate it.
        buffer[20] ^= 0x01;
        assert!(!verify_checksum(&buffer, schema));
        // Bytes before the span are not covered.
        buffer[20] ^= 0x01;
        buffer[0] ^= 0xFF;
        assert!(verify_checksum(&buffer, schema));
    }

    #[test]
    fn family_routing() {
        assert_eq!(
            write_member(SchemaId::DISPLAY_READ).unwrap().id,
            SchemaId::CONTROL_WRITE
        );
        assert_eq!(
            write_member(SchemaId::CONTROL_WRITE).unwrap().id,
            SchemaId::CONTROL_WRITE
        );
        assert_eq!(
            write_member(SchemaId::TIMER_READ).unwrap().id,
            SchemaId::TIMER_WRITE
        );
        assert_eq!(write_member(SchemaId::CLOCK).unwrap().id, SchemaId::CLOCK);
        assert_eq!(write_member(SchemaId(0x7E, 0x7E)).map(|s| s.id), None);
    }

    #[test]
    fn base_name_strips_slot_suffix() {
        assert_eq!(base_name("el_power_level#2"), "el_power_level");
        assert_eq!(base_name("el_power_level"), "el_power_level");
    }
}
