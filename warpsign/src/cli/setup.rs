// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! `setup`: interactive configuration wizard. The full wizard (CI
//! provider selection, keychain certificate import, the HTTP/JS
//! certificate-upload form) is out of scope for this core (spec §1);
//! this covers just the config file fields the pipeline itself reads.

use clap::Args;

use crate::config::{base_dir, Config};
use crate::error::Result;

#[derive(Debug, Args)]
pub struct SetupArgs {
    /// Configure for CI usage (prompts for repository/workflow too).
    #[arg(long)]
    pub ci: bool,
}

pub fn run(args: SetupArgs) -> Result<()> {
    let home = base_dir();
    std::fs::create_dir_all(&home)?;
    #[cfg(unix)]
    std::fs::set_permissions(&home, std::fs::Permissions::from_mode_compat(0o700))?;

    let apple_id: String = dialoguer::Input::new().with_prompt("Apple ID").interact_text()?;
    let prefix: String = dialoguer::Input::new()
        .with_prompt("Identifier prefix")
        .interact_text()?;

    let mut config = Config {
        apple_id: Some(apple_id),
        prefix: Some(prefix),
        ..Config::default()
    };

    if args.ci {
        config.repository = Some(
            dialoguer::Input::new()
                .with_prompt("GitHub repository (owner/name)")
                .interact_text()?,
        );
        config.workflow = Some(
            dialoguer::Input::new()
                .with_prompt("Workflow file name")
                .interact_text()?,
        );
        config.github_token = Some(
            dialoguer::Password::new()
                .with_prompt("GitHub token")
                .interact()?,
        );
    }

    let serialized = toml::to_string_pretty(&config).map_err(|e| {
        crate::error::Error::CapabilityMapInvalid(format!("failed to serialize config: {e}"))
    })?;
    std::fs::write(home.join("config.toml"), serialized)?;

    log::info!("wrote configuration to {}", home.join("config.toml").display());
    Ok(())
}

#[cfg(unix)]
trait PermissionsExtCompat {
    fn from_mode_compat(mode: u32) -> std::fs::Permissions;
}

#[cfg(unix)]
impl PermissionsExtCompat for std::fs::Permissions {
    fn from_mode_compat(mode: u32) -> std::fs::Permissions {
        use std::os::unix::fs::PermissionsExt;
        std::fs::Permissions::from_mode(mode)
    }
}
