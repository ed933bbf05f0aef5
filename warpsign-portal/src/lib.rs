// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Apple Developer Portal protocol client.
//!
//! Handles the SRP-6a + two-factor login exchange, persists the
//! resulting session, and exposes the typed identifier/capability/
//! app-group/device/profile operations the signing pipeline needs. Does
//! not know anything about bundles or Mach-O binaries — see
//! `warpsign-bundle` and `warpsign-macho` for those.

mod api;
mod client;
mod error;
mod session;
mod srp;

pub use api::{AppGroup, Certificate, Device, Identifier, Profile, Team};
pub use client::{LoginState, PortalClient, TwoFactorMode, TwoFactorPrompt};
pub use error::{Error, Result, NON_RETRYABLE_RESULT_CODES};
pub use session::{SessionData, SessionStore, StoredCookie};
pub use srp::{stretch_password, SrpExchange, StretchAlgorithm};
