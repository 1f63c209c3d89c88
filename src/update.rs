// SPDX-License-Identifier: MIT OR Apache-2.0

//! Update coordinator.
//!
//! Buffers user set-requests, debounces them into a single write
//! buffer, and walks the upload lifecycle:
//!
//! ```text
//! idle -> waiting_commit -> waiting_truma -> idle
//! ```
//!
//! A commit is held (reported as `waiting_for_cp_plus`) while the
//! master has not been heard from recently or while the base snapshot
//! the write buffer must be derived from is still missing. All timing
//! is driven by [`UpdateCoordinator::poll`] against a monotonic clock;
//! the coordinator never sleeps on its own.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

use crate::{
    error::SettingError,
    responder::Responder,
    settings::{cross_validate, family_of, parse_request, Family, HEATING_MODE_ECO},
    status::{schema::SchemaId, FieldValues, StatusStore},
};

/// Timing and default-fill configuration of the coordinator.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    /// Debounce window for collecting set-requests into one buffer.
    pub buffer_time: Duration,
    /// Re-log interval while the master does not pull a staged update.
    pub pull_warn_interval: Duration,
    /// How long a display broadcast keeps CP Plus counted as online.
    pub online_window: Duration,
    /// Heating mode filled in when a room target arrives alone.
    pub default_heating_mode: u32,
    /// Electric power level filled in when an energy mix arrives alone.
    pub default_el_power: u32,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            buffer_time: Duration::from_secs(1),
            pull_warn_interval: Duration::from_secs(10),
            online_window: Duration::from_secs(30),
            default_heating_mode: HEATING_MODE_ECO,
            default_el_power: 900,
        }
    }
}

/// Lifecycle of a buffered update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateState {
    Idle,
    WaitingCommit,
    WaitingTruma,
}

/// Whether the bus master has been heard from recently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CpPlusStatus {
    Waiting,
    Online,
}

impl fmt::Display for CpPlusStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Waiting => f.write_str("waiting"),
            Self::Online => f.write_str("online"),
        }
    }
}

/// Debounces user intent and hands finished buffers to the responder.
#[derive(Debug)]
pub struct UpdateCoordinator {
    cfg: UpdateConfig,
    state: UpdateState,
    blocked_on_cp: bool,
    pending: BTreeMap<Family, FieldValues>,
    commit_at: Option<Instant>,
    pull_warn_at: Option<Instant>,
    cp_last_seen: Option<Instant>,
}

impl UpdateCoordinator {
    #[must_use]
    pub fn new(cfg: UpdateConfig) -> Self {
        Self {
            cfg,
            state: UpdateState::Idle,
            blocked_on_cp: false,
            pending: BTreeMap::new(),
            commit_at: None,
            pull_warn_at: None,
            cp_last_seen: None,
        }
    }

    /// The lifecycle state as published on the `update_status` stream.
    #[must_use]
    pub fn update_status(&self) -> &'static str {
        match self.state {
            UpdateState::Idle => "idle",
            UpdateState::WaitingCommit if self.blocked_on_cp => "waiting_for_cp_plus",
            UpdateState::WaitingCommit => "waiting_commit",
            UpdateState::WaitingTruma => "waiting_truma",
        }
    }

    /// Note that a display broadcast arrived, keeping CP Plus online.
    pub fn mark_cp_seen(&mut self, now: Instant) {
        self.cp_last_seen = Some(now);
    }

    /// CP Plus is online iff a display broadcast arrived within the
    /// configured window.
    #[must_use]
    pub fn cp_status(&self, now: Instant) -> CpPlusStatus {
        let online = self
            .cp_last_seen
            .is_some_and(|seen| now.duration_since(seen) < self.cfg.online_window);
        if online {
            CpPlusStatus::Online
        } else {
            CpPlusStatus::Waiting
        }
    }

    /// Validate and buffer one user set-request.
    ///
    /// Every accepted request restarts the debounce window; a
    /// rejection leaves all state untouched.
    pub fn set(&mut self, key: &str, value: &str, now: Instant) -> Result<(), SettingError> {
        let writes = parse_request(key, value, self.cfg.default_heating_mode)?;
        for (field, raw) in writes {
            log::info!("update: buffering {field} = {raw}");
            self.pending.entry(family_of(field)).or_default().insert(field, raw);
        }
        self.commit_at = Some(now + self.cfg.buffer_time);
        if self.state == UpdateState::Idle {
            self.state = UpdateState::WaitingCommit;
        } else if self.state == UpdateState::WaitingTruma {
            // More intent while an upload waits: collect it and build
            // a fresh buffer, replacing the unpulled one.
            self.state = UpdateState::WaitingCommit;
            self.pull_warn_at = None;
        }
        Ok(())
    }

    /// The master pulled a staged buffer completely.
    pub fn upload_drained(&mut self, family: Family, now: Instant) {
        if let Some(values) = self.pending.get_mut(&family) {
            values.clear();
        }
        self.pending.retain(|_, values| !values.is_empty());
        self.pull_warn_at = None;
        if self.pending.is_empty() {
            self.state = UpdateState::Idle;
            self.commit_at = None;
            log::info!("update: buffer pulled by CP Plus, idle again");
        } else {
            // Another family still waits; commit it right away.
            self.state = UpdateState::WaitingCommit;
            self.commit_at = Some(now);
        }
    }

    /// Drive timers: debounce expiry and the master-pull watchdog.
    ///
    /// Returns the interdependency errors found while committing, for
    /// the caller to surface on the error stream.
    pub fn poll(
        &mut self,
        now: Instant,
        store: &mut StatusStore,
        responder: &mut Responder,
    ) -> Vec<SettingError> {
        let mut errors = Vec::new();

        if self.state == UpdateState::WaitingCommit
            && self.commit_at.is_some_and(|at| now >= at)
        {
            errors = self.try_commit(now, store, responder);
        }

        if self.state == UpdateState::WaitingTruma
            && self.pull_warn_at.is_some_and(|at| now >= at)
        {
            log::warn!("update: staged buffer not pulled by CP Plus yet");
            self.pull_warn_at = Some(now + self.cfg.pull_warn_interval);
        }

        errors
    }

    fn try_commit(
        &mut self,
        now: Instant,
        store: &mut StatusStore,
        responder: &mut Responder,
    ) -> Vec<SettingError> {
        if self.cp_status(now) == CpPlusStatus::Waiting {
            if !self.blocked_on_cp {
                log::info!("update: waiting for CP Plus before committing");
                self.blocked_on_cp = true;
            }
            return Vec::new();
        }

        let Some((&family, _)) = self.pending.iter().find(|(_, values)| !values.is_empty())
        else {
            self.state = UpdateState::Idle;
            self.commit_at = None;
            return Vec::new();
        };

        let mut errors = Vec::new();
        let write_id = match family {
            Family::Control => {
                if let Some(values) = self.pending.get_mut(&family) {
                    errors = cross_validate(
                        values,
                        self.cfg.default_heating_mode,
                        self.cfg.default_el_power,
                    );
                }
                SchemaId::CONTROL_WRITE
            }
            Family::Clock => SchemaId::CLOCK,
        };

        let values = self.pending.get(&family).cloned().unwrap_or_default();
        match store.encode(write_id, &values) {
            Some(buffer) => {
                responder.stage_upload(family, write_id, buffer);
                self.state = UpdateState::WaitingTruma;
                self.blocked_on_cp = false;
                self.commit_at = None;
                self.pull_warn_at = Some(now + self.cfg.pull_warn_interval);
                log::info!("update: buffer staged, waiting for CP Plus to pull");
            }
            None => {
                // Base snapshot still missing: hold like an offline
                // master and retry on the next poll.
                if !self.blocked_on_cp {
                    log::info!("update: waiting for a status snapshot before committing");
                    self.blocked_on_cp = true;
                }
            }
        }
        errors
    }
}
