// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("network error: {0}")]
    Reqwest(#[from] reqwest::Error),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("bad Apple ID or password")]
    BadCredentials,

    #[error("two-factor authentication failed")]
    TwoFactorFailed,

    #[error("account is locked out by Apple; manual intervention required")]
    SessionLockedOut,

    #[error("multiple teams found and none selected")]
    TeamAmbiguous,

    #[error("capability '{0}' is not enabled for this team and no override was requested")]
    CapabilityUnavailable(String),

    #[error("identifier conflict: {0}")]
    IdentifierConflict(String),

    #[error("failed to create provisioning profile: {0}")]
    ProfileCreationFailed(String),

    #[error("developer portal unavailable after retry budget exhausted")]
    PortalUnavailable,

    #[error("rate limited by the developer portal")]
    RateLimited,

    #[error("unexpected portal response: {0}")]
    UnexpectedResponse(String),

    #[error("session file at {0} is invalid or unreadable")]
    InvalidSession(std::path::PathBuf),

    #[error("login state machine used out of order: expected {expected}, was in {actual}")]
    InvalidLoginState {
        expected: &'static str,
        actual: &'static str,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

/// Apple service error codes (`serviceErrors[].code` in portal JSON bodies)
/// that must never be retried, per the retry policy in spec §4.1.
pub const NON_RETRYABLE_RESULT_CODES: &[i64] = &[-20101, -22938];
