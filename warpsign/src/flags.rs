// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The caller-controllable knobs from spec §6, threaded through the
//! reconciler, allocator, and orchestrator.

use std::path::PathBuf;

#[derive(Debug, Clone, Default)]
pub struct SignFlags {
    pub force_original_id: bool,
    pub patch_debug: bool,
    pub patch_file_sharing: bool,
    pub patch_promotion: bool,
    pub icon: Option<PathBuf>,
    pub prefix: Option<String>,
    /// Require capability-gated entitlements the team lacks to be a hard
    /// failure instead of a stripped-with-warning, per §4.2.
    pub require_capabilities: bool,
    /// Pass through entitlements the reconciler doesn't recognise instead
    /// of stripping them with a warning (spec §9 open question).
    pub passthrough_unknown_entitlements: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertificateChoice {
    Development,
    Distribution,
}

impl SignFlags {
    /// Validates flag combinations that are user errors independent of
    /// any portal or bundle state (spec §8 scenario 3).
    pub fn validate(&self, cert: CertificateChoice) -> Result<(), FlagError> {
        if self.force_original_id && cert != CertificateChoice::Distribution {
            return Err(FlagError::ForceOriginalIdNeedsDistribution);
        }
        if self.patch_debug && cert != CertificateChoice::Development {
            return Err(FlagError::PatchDebugNeedsDevelopment);
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FlagError {
    #[error("--force-original-id requires a distribution certificate")]
    ForceOriginalIdNeedsDistribution,
    #[error("--patch-debug requires a development certificate")]
    PatchDebugNeedsDevelopment,
}
