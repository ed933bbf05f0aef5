// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Progress reporting (spec §4.6): structured `(phase, current, total,
//! detail)` events, emitted to a caller-supplied sink so tests can
//! substitute a recording sink for the default terminal UI.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Unpack,
    Inventory,
    Authenticate,
    Reconcile,
    PortalMutations,
    Profiles,
    Rewrite,
    Sign,
    Repack,
}

impl Phase {
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Unpack => "unpacking",
            Phase::Inventory => "building inventory",
            Phase::Authenticate => "authenticating",
            Phase::Reconcile => "reconciling entitlements",
            Phase::PortalMutations => "applying portal mutations",
            Phase::Profiles => "materializing provisioning profiles",
            Phase::Rewrite => "rewriting binaries",
            Phase::Sign => "signing",
            Phase::Repack => "repacking",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub detail: String,
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// The default sink: a terse log line per event (the orchestrator is
/// invoked both interactively and from CI, so this deliberately doesn't
/// assume a TTY).
pub struct LogSink;

impl ProgressSink for LogSink {
    fn emit(&self, event: ProgressEvent) {
        log::info!(
            "[{}/{}] {}: {}",
            event.current,
            event.total,
            event.phase.label(),
            event.detail
        );
    }
}

/// Records every event in order; used by orchestrator tests.
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ProgressEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl ProgressSink for RecordingSink {
    fn emit(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}
