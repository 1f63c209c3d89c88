// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types and traits

///////////////////////////////////////////////////////////////////
/// Types
///////////////////////////////////////////////////////////////////
pub use crate::error::{Error, SettingError};
pub use crate::frame::{DataFrame, FrameEvent, Pid, ResponseFrame};
pub use crate::server::{Config, Event, Server, SetRequest};
pub use crate::slave::{Identity, Nad, NadId};
pub use crate::status::{schema::SchemaId, StatusStore, StatusView};
pub use crate::transport::Pdu;
pub use crate::update::{CpPlusStatus, UpdateConfig, UpdateState};

///////////////////////////////////////////////////////////////////
/// Functions
///////////////////////////////////////////////////////////////////
pub use crate::replay::{replay_log, ReplaySlice};
