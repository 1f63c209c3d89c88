// SPDX-License-Identifier: MIT OR Apache-2.0

//! The iNet box slave state machine.
//!
//! Decides, per received header, whether the node publishes a response
//! and with which bytes, and services the diagnostic PDUs assembled by
//! the transport layer. Outbound I/O only ever happens in reaction to
//! a header: the master owns the schedule.

use std::collections::{HashMap, VecDeque};

use crate::{
    frame::{Pid, FRAME_DATA_LEN, PID_DIAG_RESPONSE, PID_UPDATE_POLL},
    settings::Family,
    slave::{Identity, Nad},
    status::{schema::SchemaId, StatusStore},
    transport::{segment, Pdu},
};

/// Diagnostic service identifiers understood by the node.
const SID_ASSIGN_NAD: u8 = 0xB0;
const SID_READ_BY_IDENTIFIER: u8 = 0xB2;
const SID_ALIVE: u8 = 0xB9;
const SID_UPLOAD: u8 = 0xBA;
const SID_DOWNLOAD: u8 = 0xBB;

/// Positive responses carry the SID plus this offset.
const RSID_OFFSET: u8 = 0x40;

/// Base value of the first byte of the 0x18 poll response, captured
/// from the reference device. Bit 0 mirrors the update-pending flag
/// (0xFE idle, 0xFF pending); the remaining bytes are all 0xFF.
const UPDATE_POLL_BASE: u8 = 0xFE;

/// Outcome of servicing an assembled PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handled {
    /// Not addressed to this node, or nothing to do.
    Ignored,
    /// A response was queued for the next 0x3D headers.
    Responded,
    /// A status buffer was stored; the ack is queued.
    StatusAccepted(SchemaId),
}

#[derive(Debug, Clone, Copy)]
struct OutFrame {
    data: [u8; FRAME_DATA_LEN],
    upload: bool,
}

/// A write buffer staged for the master to pull.
#[derive(Debug)]
struct StagedUpload {
    family: Family,
    write_id: SchemaId,
    buffer: Vec<u8>,
}

/// Slave-side protocol state.
#[derive(Debug)]
pub struct Responder {
    nad: Nad,
    identity: Identity,
    update_pending: bool,
    outbound: VecDeque<OutFrame>,
    staged: Option<StagedUpload>,
    uploading: Option<Family>,
    drained: Option<Family>,
    canned: HashMap<u8, [u8; FRAME_DATA_LEN]>,
}

impl Responder {
    #[must_use]
    pub fn new(nad: Nad) -> Self {
        Self {
            nad,
            identity: Identity::inetbox(),
            update_pending: false,
            outbound: VecDeque::new(),
            staged: None,
            uploading: None,
            drained: None,
            canned: HashMap::new(),
        }
    }

    /// Register a fixed response for a non-diagnostic identifier,
    /// e.g. bytes captured from the reference device.
    pub fn set_canned_response(&mut self, id: u8, data: [u8; FRAME_DATA_LEN]) {
        self.canned.insert(id, data);
    }

    /// The node address currently assigned to this slave.
    #[must_use]
    pub fn nad(&self) -> Nad {
        self.nad
    }

    /// Whether the master is being signalled that an update waits.
    #[must_use]
    pub fn update_pending(&self) -> bool {
        self.update_pending
    }

    /// Take the family whose staged upload was fully pulled.
    pub fn take_drained(&mut self) -> Option<Family> {
        self.drained.take()
    }

    /// Stage a write buffer and raise the update-pending flag.
    ///
    /// There is a single slot: a newer buffer replaces an unpulled one.
    pub fn stage_upload(&mut self, family: Family, write_id: SchemaId, buffer: Vec<u8>) {
        if self.staged.is_some() {
            log::debug!("responder: replacing staged {write_id} upload");
        }
        self.staged = Some(StagedUpload {
            family,
            write_id,
            buffer,
        });
        self.update_pending = true;
    }

    /// The response published for a just-received header, if any.
    pub fn response_for(&mut self, pid: Pid) -> Option<[u8; FRAME_DATA_LEN]> {
        match pid.id() {
            PID_UPDATE_POLL => {
                log::debug!(
                    "responder: answering update poll (pending={})",
                    self.update_pending
                );
                let mut data = [0xFF; FRAME_DATA_LEN];
                data[0] = UPDATE_POLL_BASE | u8::from(self.update_pending);
                Some(data)
            }
            PID_DIAG_RESPONSE => {
                let frame = self.outbound.pop_front()?;
                if frame.upload && !self.outbound.iter().any(|f| f.upload) {
                    // The master pulled the last segment: the exchange
                    // that drains the staged buffer is complete.
                    self.update_pending = false;
                    self.drained = self.uploading.take();
                }
                Some(frame.data)
            }
            id => self.canned.get(&id).copied(),
        }
    }

    /// Whether a queued response is waiting for 0x3D headers.
    #[must_use]
    pub fn response_waiting(&self) -> bool {
        !self.outbound.is_empty()
    }

    fn enqueue(&mut self, sid: u8, payload: &[u8], upload: bool) {
        for data in segment(self.nad, sid + RSID_OFFSET, payload) {
            self.outbound.push_back(OutFrame { data, upload });
        }
    }

    /// Service a fully reassembled diagnostic PDU.
    pub fn handle_pdu(&mut self, pdu: &Pdu, store: &mut StatusStore) -> Handled {
        if pdu.sid == SID_READ_BY_IDENTIFIER {
            // Selected by identity, not by node address.
            if pdu.payload.len() >= 5 && pdu.payload[1..5] == self.identity.0 {
                log::info!("responder: read-by-identifier request");
                let mut payload = self.identity.0.to_vec();
                payload.push(0x00);
                self.enqueue(SID_READ_BY_IDENTIFIER, &payload, false);
                return Handled::Responded;
            }
            return Handled::Ignored;
        }

        if !self.nad.accepts(pdu.nad) {
            return Handled::Ignored;
        }

        match pdu.sid {
            SID_ALIVE => {
                // The payload usually repeats the identity echo; a bare
                // request is answered as well.
                if pdu.payload.len() >= 2 && !self.identity.matches_echo(&pdu.payload) {
                    return Handled::Ignored;
                }
                log::info!("responder: alive check");
                self.enqueue(SID_ALIVE, &[0x00], false);
                Handled::Responded
            }
            SID_ASSIGN_NAD => {
                if pdu.payload.len() < 5 || pdu.payload[..4] != self.identity.0 {
                    return Handled::Ignored;
                }
                let assigned = Nad(pdu.payload[4]);
                if assigned != self.nad {
                    log::info!("responder: node address changed {} -> {}", self.nad, assigned);
                    self.nad = assigned;
                }
                self.enqueue(SID_ASSIGN_NAD, &[], false);
                log::info!("responder: registration complete");
                Handled::Responded
            }
            SID_UPLOAD => {
                let Some(echoed) = self.strip_echo(&pdu.payload) else {
                    return Handled::Ignored;
                };
                let Some(requested) = requested_schema(echoed) else {
                    log::warn!("responder: upload request names no known buffer");
                    return Handled::Ignored;
                };
                match self.staged.take() {
                    None => {
                        log::info!("responder: no update staged, staying silent");
                        Handled::Ignored
                    }
                    Some(staged) if staged.write_id != requested => {
                        log::info!(
                            "responder: upload request for {requested}, staged {}",
                            staged.write_id
                        );
                        self.staged = Some(staged);
                        Handled::Ignored
                    }
                    Some(StagedUpload { family, buffer, .. }) => {
                        let mut payload = self.identity.echo().to_vec();
                        payload.extend_from_slice(&buffer);
                        self.enqueue(SID_UPLOAD, &payload, true);
                        self.uploading = Some(family);
                        log::info!("responder: uploading staged buffer");
                        Handled::Responded
                    }
                }
            }
            SID_DOWNLOAD => {
                let Some(buffer) = self.strip_echo(&pdu.payload) else {
                    return Handled::Ignored;
                };
                match store.accept(buffer) {
                    Ok(id) => {
                        log::info!("responder: stored status buffer {id}");
                        self.enqueue(SID_DOWNLOAD, &[], false);
                        Handled::StatusAccepted(id)
                    }
                    Err(err) => {
                        log::warn!("responder: download declined: {err}");
                        Handled::Ignored
                    }
                }
            }
            sid => {
                log::warn!("responder: unsupported service 0x{sid:02X}");
                Handled::Ignored
            }
        }
    }

    fn strip_echo<'a>(&self, payload: &'a [u8]) -> Option<&'a [u8]> {
        if self.identity.matches_echo(payload) {
            Some(&payload[2..])
        } else {
            log::debug!("responder: payload lacks the identity echo");
            None
        }
    }
}

/// Extract the schema a data-upload request asks for and map it to the
/// write member of its family.
///
/// Captures show the master naming the schema either as a bare
/// identifier pair or embedded in a buffer-shaped request behind the
/// common preamble.
fn requested_schema(payload: &[u8]) -> Option<SchemaId> {
    use crate::status::schema::{write_member, ID_OFFSET, PREAMBLE};

    let id = if payload.len() >= ID_OFFSET + 2 && payload[..PREAMBLE.len()] == PREAMBLE {
        SchemaId(payload[ID_OFFSET], payload[ID_OFFSET + 1])
    } else if payload.len() >= 2 {
        SchemaId(payload[0], payload[1])
    } else {
        return None;
    };
    write_member(id).map(|schema| schema.id)
}
