// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! CLI surface (spec §6): `sign`, `sign-ci`, `setup`.

pub mod setup;
pub mod sign;
pub mod sign_ci;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "warpsign", version, about = "Re-sign an iOS .ipa against your Apple Developer team")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the local signing pipeline.
    Sign(sign::SignArgs),
    /// Hand off signing to an external CI collaborator.
    SignCi(sign_ci::SignCiArgs),
    /// Interactive configuration wizard.
    Setup(setup::SetupArgs),
}
