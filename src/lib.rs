// SPDX-License-Identifier: MIT OR Apache-2.0

//! A pure [Rust](https://www.rust-lang.org) emulator of the Truma
//! iNet box, a [LIN](https://en.wikipedia.org/wiki/Local_Interconnect_Network)
//! bus peripheral of the CP Plus heating controller, based on
//! [tokio](https://tokio.rs).
//!
//! From the bus master's point of view the emulated node is
//! indistinguishable from the original accessory: it answers scheduled
//! headers with correct payloads and checksums, services the LIN
//! diagnostic transport layer, decodes status buffers into named
//! telemetry and encodes buffered user settings into a buffer the
//! master accepts.
//!
//! ## Features
//!
//! - byte-accurate frame codec: break/sync detection, PID parity,
//!   classic and enhanced checksums
//! - LIN transport layer: single/first/consecutive frame reassembly
//!   and segmentation with flow timeouts
//! - slave state machine with the update-pending handshake on
//!   identifier 0x18
//! - declarative status-buffer schemas with bit-exact preservation of
//!   undocumented fields
//! - debounced update coordinator with domain and interdependency
//!   validation
//! - offline log replay through the same codec path
//!
//! ## Example
//!
//! ```rust,no_run
//! use tokio::sync::mpsc;
//! use tokio_inetbox::server::{Config, Event, Server, SetRequest};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), tokio_inetbox::Error> {
//!     let server = Server::new_from_path("/dev/ttyUSB0", 9600)?;
//!
//!     let (set_tx, set_rx) = mpsc::channel::<SetRequest>(16);
//!     let (event_tx, mut event_rx) = mpsc::channel::<Event>(64);
//!
//!     tokio::spawn(async move {
//!         while let Some(event) = event_rx.recv().await {
//!             println!("{event:?}");
//!         }
//!     });
//!
//!     // Wire `set_tx` to your MQTT client or CLI.
//!     let _ = set_tx;
//!
//!     server.serve_forever(Config::default(), set_rx, event_tx).await
//! }
//! ```
//!
//! The bus is trusted by design: there is no authentication, and the
//! node only ever transmits in response to a master header.

pub mod prelude;

pub mod codec;
pub mod frame;
pub mod replay;
pub mod responder;
pub mod server;
pub mod settings;
pub mod slave;
pub mod status;
pub mod transport;
pub mod update;

mod error;

pub use crate::{
    error::{Error, SettingError},
    slave::{Identity, Nad, NadId},
};
