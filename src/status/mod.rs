// SPDX-License-Identifier: MIT OR Apache-2.0

//! Status buffers: the application layer of the iNet box.
//!
//! Inbound buffers are kept as raw snapshots keyed by schema; decoding
//! produces a named view for telemetry. Outbound (write) buffers start
//! from the latest inbound snapshot of the same family so that every
//! bit outside the declared fields round-trips untouched.

pub mod display;
pub mod schema;

use std::collections::{BTreeMap, HashMap};

use thiserror::Error;

use self::schema::{
    base_name, display_value, finalize_checksum, lookup, read_field, wire_value, write_field,
    Schema, SchemaId, BODY_OFFSET, COUNTER_START, ID_OFFSET, PREAMBLE,
};

/// Decoded buffer contents keyed by field name.
pub type StatusView = BTreeMap<&'static str, String>;

/// Raw field overlays pending for an upload.
pub type FieldValues = BTreeMap<&'static str, u32>;

/// Why an inbound buffer was declined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BufferError {
    #[error("status buffer does not start with the common preamble")]
    BadPreamble,
    #[error("unknown status buffer type {0}")]
    UnknownSchema(SchemaId),
    #[error("status buffer truncated: {received} of {expected} byte(s)")]
    Truncated { received: usize, expected: usize },
}

/// Store of the latest status buffer per schema.
#[derive(Debug)]
pub struct StatusStore {
    snapshots: HashMap<SchemaId, Vec<u8>>,
    counter: u8,
}

impl Default for StatusStore {
    fn default() -> Self {
        Self {
            snapshots: HashMap::new(),
            counter: COUNTER_START,
        }
    }
}

impl StatusStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept a downloaded status buffer, replacing the previous
    /// snapshot of the same schema.
    pub fn accept(&mut self, buffer: &[u8]) -> Result<SchemaId, BufferError> {
        if buffer.len() < BODY_OFFSET || buffer[..PREAMBLE.len()] != PREAMBLE {
            return Err(BufferError::BadPreamble);
        }
        let id = SchemaId(buffer[ID_OFFSET], buffer[ID_OFFSET + 1]);
        let Some(schema) = lookup(id) else {
            return Err(BufferError::UnknownSchema(id));
        };
        if buffer.len() < schema.buffer_len() {
            return Err(BufferError::Truncated {
                received: buffer.len(),
                expected: schema.buffer_len(),
            });
        }
        self.snapshots.insert(id, buffer.to_vec());
        log::debug!("status: stored {} snapshot ({} bytes)", id, buffer.len());
        Ok(id)
    }

    /// The latest raw snapshot of a schema, if any arrived yet.
    #[must_use]
    pub fn snapshot(&self, id: SchemaId) -> Option<&[u8]> {
        self.snapshots.get(&id).map(Vec::as_slice)
    }

    /// Decode one stored snapshot into a named view.
    #[must_use]
    pub fn view(&self, id: SchemaId) -> Option<StatusView> {
        let schema = lookup(id)?;
        let buffer = self.snapshot(id)?;
        Some(decode_body(schema, &buffer[BODY_OFFSET..]))
    }

    /// Decoded view over every snapshot received so far.
    ///
    /// Field names are unique across schemas, so the union is flat.
    #[must_use]
    pub fn control_view(&self) -> StatusView {
        let mut view = StatusView::new();
        for id in self.snapshots.keys() {
            if let Some(decoded) = self.view(*id) {
                view.extend(decoded);
            }
        }
        view
    }

    /// Build the write buffer of `write_id`, overlaying `values` on
    /// the latest inbound snapshot of the same family.
    ///
    /// Returns `None` while the family's base snapshot is still
    /// missing; a control buffer can only be synthesized after CP Plus
    /// delivered the state it expects to be mirrored back.
    #[must_use]
    pub fn encode(&mut self, write_id: SchemaId, values: &FieldValues) -> Option<Vec<u8>> {
        let schema = lookup(write_id)?;
        let mut body = vec![0u8; schema.body_len];

        if let Some(snapshot) = self.snapshots.get(&write_id) {
            body.copy_from_slice(&snapshot[BODY_OFFSET..schema.buffer_len()]);
        } else if let Some((twin, snapshot)) = self.read_twin(write_id) {
            // Project the shared fields of the read-side layout.
            for spec in schema.fields {
                if let Some(source) = twin.fields.iter().find(|f| f.name == spec.name) {
                    let raw = read_field(&snapshot[BODY_OFFSET..], source);
                    write_field(&mut body, spec, raw);
                }
            }
        } else if has_read_twin(write_id) {
            log::info!("status: no {write_id} base snapshot yet, holding upload");
            return None;
        }

        for spec in schema.fields {
            if let Some(&raw) = values.get(base_name(spec.name)) {
                write_field(&mut body, spec, wire_value(spec.codec, raw));
            }
        }

        if write_id == SchemaId::CLOCK {
            // The clock buffer states its provenance.
            if let Some(source) = schema.fields.iter().find(|f| f.name == "clock_source") {
                write_field(&mut body, source, CLOCK_SOURCE_INETBOX);
            }
        }

        if schema.has_counter {
            self.counter = (self.counter + 1) % 0xFF;
            body[0] = self.counter;
        }

        let mut buffer = Vec::with_capacity(schema.buffer_len());
        buffer.extend_from_slice(&PREAMBLE);
        buffer.push(write_id.0);
        buffer.push(write_id.1);
        buffer.extend_from_slice(&body);
        finalize_checksum(&mut buffer, schema);
        Some(buffer)
    }

    fn read_twin(&self, write_id: SchemaId) -> Option<(&'static Schema, &Vec<u8>)> {
        let twin = read_twin_schema(write_id)?;
        let snapshot = self.snapshots.get(&twin.id)?;
        Some((twin, snapshot))
    }
}

/// Wire value of the "set by the iNet box" clock source.
const CLOCK_SOURCE_INETBOX: u32 = 2;

fn read_twin_schema(write_id: SchemaId) -> Option<&'static Schema> {
    schema::all()
        .iter()
        .find(|s| s.write_id == Some(write_id) && s.id != write_id)
}

fn has_read_twin(write_id: SchemaId) -> bool {
    read_twin_schema(write_id).is_some()
}

fn decode_body(schema: &Schema, body: &[u8]) -> StatusView {
    schema
        .fields
        .iter()
        .filter(|f| !f.name.starts_with('_') && !f.name.contains('#'))
        .map(|f| (f.name, display_value(f.codec, read_field(body, f))))
        .collect()
}
