// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

/// Top-level pipeline error. Wraps each collaborator crate's error type
/// and adds the user-facing/orchestration errors that don't belong to any
/// one of them, carrying enough shape to pick a process exit code.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Bundle(#[from] warpsign_bundle::Error),

    #[error("{0}")]
    MachO(#[from] warpsign_macho::Error),

    #[error("{0}")]
    Portal(#[from] warpsign_portal::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("prompt failed: {0}")]
    Prompt(#[from] dialoguer::Error),

    #[error("config error: {0}")]
    Config(#[from] figment::Error),

    #[error("archive not found or unreadable: {0}")]
    ArchiveUnreadable(PathBuf),

    #[error("--force-original-id requires a distribution certificate")]
    ForceOriginalIdNeedsDistribution,

    #[error("--patch-debug requires a development certificate")]
    PatchDebugNeedsDevelopment,

    #[error("missing required configuration key '{0}'; run `warpsign setup` first")]
    MissingConfigKey(&'static str),

    #[error("capability map is invalid: {0}")]
    CapabilityMapInvalid(String),

    #[error("identifiers {parent} and {child} are no longer in prefix relation after allocation")]
    NestedIdentifierMismatch { parent: String, child: String },

    #[error("external signer failed for {bundle}: {source}")]
    SignerFailed {
        bundle: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// Maps onto the exit codes in spec §6: 1 user error, 2 portal
    /// failure, 3 signing failure, 4 cancellation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ArchiveUnreadable(_)
            | Error::ForceOriginalIdNeedsDistribution
            | Error::PatchDebugNeedsDevelopment
            | Error::MissingConfigKey(_)
            | Error::Config(_)
            | Error::NestedIdentifierMismatch { .. }
            | Error::CapabilityMapInvalid(_)
            | Error::Bundle(_) => 1,
            Error::Portal(_) => 2,
            Error::MachO(_) | Error::SignerFailed { .. } => 3,
            Error::Cancelled => 4,
            Error::Io(_) | Error::Prompt(_) => 1,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
