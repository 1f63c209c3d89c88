// SPDX-License-Identifier: MIT OR Apache-2.0

//! iNet box server: the single task owning the serial device.
//!
//! One cooperative loop drives everything: it reads the bus with a
//! short timeout, reacts to each frame through the protocol layers,
//! drains user set-requests between bus events and checks the
//! coordinator's timers on every iteration. Responses are written only
//! when a header was just received, so the node never competes with
//! the master for bus time.

use std::{future::Future, path::Path, time::Instant};

use futures_util::{SinkExt as _, StreamExt as _};
use tokio::{sync::mpsc, time};
use tokio_serial::{ClearBuffer, SerialPort as _, SerialStream};
use tokio_util::codec::Framed;

use crate::{
    codec::LinCodec,
    error::Error,
    frame::{DataFrame, FrameEvent, Pid, ResponseFrame, PID_DIAG_REQUEST, PID_DIAG_RESPONSE},
    responder::{Handled, Responder},
    slave::Nad,
    status::{display, StatusStore, StatusView},
    transport::Reassembler,
    update::{CpPlusStatus, UpdateConfig, UpdateCoordinator},
};

/// Server configuration; the UART path and baud rate are passed to
/// [`Server::new_from_path`] directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Node address answered to before any assign-NAD request.
    pub nad: Nad,
    /// Serial read timeout; also the timer tick of the loop.
    pub read_timeout: std::time::Duration,
    /// Update coordinator timing and defaults.
    pub update: UpdateConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            nad: Nad::initial(),
            read_timeout: std::time::Duration::from_millis(30),
            update: UpdateConfig::default(),
        }
    }
}

/// A user set-request delivered through the inbound queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetRequest {
    pub name: String,
    pub value: String,
}

/// Telemetry emitted by the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Decoded display broadcast fields (accumulated view).
    DisplayStatus(StatusView),
    /// Decoded control state after a status-buffer download.
    ControlStatus(StatusView),
    /// Lifecycle of the buffered update.
    UpdateStatus(&'static str),
    /// Whether CP Plus has been heard from recently.
    CpPlusStatus(&'static str),
    /// A rejected set-request, with key and reason.
    Error(String),
}

/// iNet box LIN server.
#[derive(Debug)]
pub struct Server {
    serial: SerialStream,
}

impl Server {
    /// Open the UART at `path` in exclusive mode.
    ///
    /// Fails if another process holds the device; the bus must have
    /// exactly one emulated node.
    pub fn new_from_path<P: AsRef<Path>>(path: P, baud_rate: u32) -> Result<Self, Error> {
        let builder = tokio_serial::new(path.as_ref().to_string_lossy(), baud_rate);
        let mut serial = SerialStream::open(&builder)?;
        #[cfg(unix)]
        serial.set_exclusive(true)?;
        Ok(Server { serial })
    }

    /// Set up a server from a pre-configured serial stream.
    #[must_use]
    pub fn new(serial: SerialStream) -> Self {
        Server { serial }
    }

    /// Serve until the serial device fails or reaches EOF.
    pub async fn serve_forever(
        self,
        config: Config,
        requests: mpsc::Receiver<SetRequest>,
        events: mpsc::Sender<Event>,
    ) -> Result<(), Error> {
        let framed = Framed::new(self.serial, LinCodec::default());
        process(framed, config, requests, events).await
    }

    /// Serve until a shutdown signal resolves.
    pub async fn serve_until<Sd>(
        self,
        config: Config,
        requests: mpsc::Receiver<SetRequest>,
        events: mpsc::Sender<Event>,
        shutdown_signal: Sd,
    ) -> Result<(), Error>
    where
        Sd: Future<Output = ()>,
    {
        let framed = Framed::new(self.serial, LinCodec::default());
        let serve = process(framed, config, requests, events);
        tokio::pin!(serve);
        tokio::pin!(shutdown_signal);
        tokio::select! {
            res = &mut serve => res,
            () = &mut shutdown_signal => {
                log::info!("shutdown signal received");
                Ok(())
            }
        }
    }
}

/// Protocol state behind the serial loop.
struct Stack {
    responder: Responder,
    reassembler: Reassembler,
    store: StatusStore,
    coordinator: UpdateCoordinator,
    events: mpsc::Sender<Event>,
    display: StatusView,
    last_update_status: &'static str,
    last_cp_status: Option<CpPlusStatus>,
}

impl Stack {
    fn new(config: &Config, events: mpsc::Sender<Event>) -> Self {
        Self {
            responder: Responder::new(config.nad),
            reassembler: Reassembler::new(),
            store: StatusStore::new(),
            coordinator: UpdateCoordinator::new(config.update.clone()),
            events,
            display: StatusView::new(),
            last_update_status: "idle",
            last_cp_status: None,
        }
    }

    fn emit(&self, event: Event) {
        // Telemetry is best effort: a full queue must never stall the
        // bus loop.
        if let Err(err) = self.events.try_send(event) {
            log::warn!("event dropped: {err}");
        }
    }

    fn publish_status_changes(&mut self, now: Instant) {
        let update_status = self.coordinator.update_status();
        if update_status != self.last_update_status {
            self.last_update_status = update_status;
            self.emit(Event::UpdateStatus(update_status));
        }
        let cp_status = self.coordinator.cp_status(now);
        if Some(cp_status) != self.last_cp_status {
            self.emit(Event::CpPlusStatus(match cp_status {
                CpPlusStatus::Online => "online",
                CpPlusStatus::Waiting => "waiting",
            }));
            self.last_cp_status = Some(cp_status);
        }
    }

    fn apply_set(&mut self, request: &SetRequest, now: Instant) {
        if let Err(err) = self.coordinator.set(&request.name, &request.value, now) {
            log::warn!("set-request rejected: {err}");
            self.emit(Event::Error(err.to_string()));
        }
        self.publish_status_changes(now);
    }

    fn tick(&mut self, now: Instant) {
        self.reassembler.expire(now);
        let errors = self
            .coordinator
            .poll(now, &mut self.store, &mut self.responder);
        for err in errors {
            self.emit(Event::Error(err.to_string()));
        }
        self.publish_status_changes(now);
    }

    fn on_frame(&mut self, frame: &DataFrame, now: Instant) {
        if let Some(fields) = display::decode(frame) {
            for (key, value) in fields {
                self.display.insert(key, value);
            }
            self.coordinator.mark_cp_seen(now);
            self.emit(Event::DisplayStatus(self.display.clone()));
            self.publish_status_changes(now);
            return;
        }
        match frame.pid.id() {
            PID_DIAG_REQUEST => {
                if let Some(pdu) = self.reassembler.accept(frame, now) {
                    match self.responder.handle_pdu(&pdu, &mut self.store) {
                        Handled::StatusAccepted(_) => {
                            self.emit(Event::ControlStatus(self.store.control_view()));
                        }
                        Handled::Responded | Handled::Ignored => {}
                    }
                }
            }
            PID_DIAG_RESPONSE => {
                // Another node's diagnostic response; observed only.
                log::debug!("in < response frame from {}", Nad(frame.data[0]));
            }
            id => {
                log::debug!("in < frame 0x{id:02X} not handled");
            }
        }
    }

    fn after_response(&mut self, now: Instant) {
        if let Some(family) = self.responder.take_drained() {
            log::info!("update for {family:?} pulled completely");
            self.coordinator.upload_drained(family, now);
            self.publish_status_changes(now);
        }
    }
}

async fn process(
    mut framed: Framed<SerialStream, LinCodec>,
    config: Config,
    mut requests: mpsc::Receiver<SetRequest>,
    events: mpsc::Sender<Event>,
) -> Result<(), Error> {
    let mut stack = Stack::new(&config, events);
    loop {
        // User intent is drained between bus events; the queue is
        // bounded and lossless.
        while let Ok(request) = requests.try_recv() {
            stack.apply_set(&request, Instant::now());
        }

        stack.tick(Instant::now());

        match time::timeout(config.read_timeout, framed.next()).await {
            Err(_) => {
                // Bus idle; frame boundaries are timing.
                framed.codec_mut().on_idle();
            }
            Ok(None) => {
                log::info!("serial stream ended");
                return Ok(());
            }
            Ok(Some(Err(err))) => return Err(err.into()),
            Ok(Some(Ok(FrameEvent::Header(pid)))) => {
                if let Some(data) = stack.responder.response_for(pid) {
                    respond(&mut framed, pid, data).await?;
                    stack.after_response(Instant::now());
                }
            }
            Ok(Some(Ok(FrameEvent::Frame(frame)))) => {
                stack.on_frame(&frame, Instant::now());
            }
        }
    }
}

async fn respond(
    framed: &mut Framed<SerialStream, LinCodec>,
    pid: Pid,
    data: [u8; 8],
) -> Result<(), Error> {
    framed.send(ResponseFrame { pid, data }).await?;
    // Discard the transceiver echo of our own bytes: flush the OS
    // buffer, the framed read buffer and the decoder state.
    if let Err(err) = framed.get_ref().clear(ClearBuffer::Input) {
        log::debug!("input buffer clear failed: {err}");
    }
    framed.read_buffer_mut().clear();
    framed.codec_mut().reset();
    Ok(())
}
