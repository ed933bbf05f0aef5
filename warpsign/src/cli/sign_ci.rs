// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `sign-ci`: hands off signing to an external CI collaborator (a GitHub
//! Actions workflow, in the reference deployment). The CI orchestrator
//! itself, the file-transfer providers it uses to move the archive back
//! and forth, and the remote-trigger protocol are out of scope for this
//! core (spec §1) — this module owns only the boundary contract a real
//! collaborator must satisfy.

use std::path::PathBuf;

use clap::Args;

use crate::config::Config;
use crate::error::{Error, Result};

#[derive(Debug, Args)]
pub struct SignCiArgs {
    pub ipa: PathBuf,
}

/// What a CI hand-off collaborator needs from this process and must hand
/// back: the archive to sign, and (eventually) the signed result.
pub trait CiHandoff {
    fn dispatch(&self, ipa: &std::path::Path, repository: &str, workflow: &str) -> anyhow::Result<()>;
}

pub fn run(args: SignCiArgs, config: Config) -> Result<()> {
    if !args.ipa.is_file() {
        return Err(Error::ArchiveUnreadable(args.ipa));
    }
    let repository = config
        .repository
        .ok_or(Error::MissingConfigKey("repository"))?;
    let workflow = config.workflow.ok_or(Error::MissingConfigKey("workflow"))?;

    Err(Error::Io(std::io::Error::new(
        std::io::ErrorKind::Unsupported,
        format!(
            "no CI hand-off collaborator configured for {repository}/{workflow}; \
             sign-ci requires an external CiHandoff implementation"
        ),
    )))
}
