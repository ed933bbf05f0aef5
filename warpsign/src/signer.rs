// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! The external `Signer` collaborator boundary. WarpSign's core owns
//! *when* a bundle gets signed and *with what inputs*; the cryptographic
//! signing itself is delegated to an `ldid`/`codesign`-equivalent tool,
//! matching spec §1's explicit non-goal.

use std::path::{Path, PathBuf};

use anyhow::Context;

/// Everything a `Signer` needs to produce a code signature for one
/// bundle.
pub struct SignRequest<'a> {
    pub bundle_path: &'a Path,
    pub entitlements_path: &'a Path,
    pub certificate_identity: &'a str,
}

/// Pluggable signer boundary (spec §1, §4.6 step 7).
pub trait Signer: Send + Sync {
    fn sign(&self, request: &SignRequest<'_>) -> anyhow::Result<()>;
}

/// Invokes a local `ldid`-compatible binary on `$PATH`.
pub struct LdidSigner {
    pub binary: PathBuf,
}

impl Default for LdidSigner {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("ldid"),
        }
    }
}

impl Signer for LdidSigner {
    fn sign(&self, request: &SignRequest<'_>) -> anyhow::Result<()> {
        let status = std::process::Command::new(&self.binary)
            .arg("-S")
            .arg(request.entitlements_path)
            .arg(request.bundle_path)
            .status()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;

        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.binary.display());
        }
        Ok(())
    }
}

/// Invokes Apple's `codesign` with an identity drawn from the local
/// keychain (development workflow on macOS hosts).
pub struct CodesignSigner {
    pub binary: PathBuf,
}

impl Default for CodesignSigner {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("codesign"),
        }
    }
}

impl Signer for CodesignSigner {
    fn sign(&self, request: &SignRequest<'_>) -> anyhow::Result<()> {
        let status = std::process::Command::new(&self.binary)
            .arg("--force")
            .arg("--sign")
            .arg(request.certificate_identity)
            .arg("--entitlements")
            .arg(request.entitlements_path)
            .arg(request.bundle_path)
            .status()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;

        if !status.success() {
            anyhow::bail!("{} exited with {status}", self.binary.display());
        }
        Ok(())
    }
}
