// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Configuration layering: `<home>/.warpsign/config.toml` under
//! environment-variable overrides, per spec §6.

use std::path::{Path, PathBuf};

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub apple_id: Option<String>,
    pub apple_password: Option<String>,
    pub github_token: Option<String>,
    pub repository: Option<String>,
    pub workflow: Option<String>,
    pub prefix: Option<String>,
}

impl Config {
    /// Load the config file under `home`, with `APPLE_ID`/`APPLE_PASSWORD`
    /// (and any other `WARPSIGN_`-prefixed var) overriding file values.
    pub fn load(home: &Path) -> Result<Self> {
        let path = home.join("config.toml");
        let figment = Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::raw().only(&["APPLE_ID", "APPLE_PASSWORD"]).map(|k| {
                match k.as_str() {
                    "APPLE_ID" => "apple_id".into(),
                    "APPLE_PASSWORD" => "apple_password".into(),
                    other => other.into(),
                }
            }))
            .merge(Env::prefixed("WARPSIGN_").split("_").lowercase(true));

        Ok(figment.extract()?)
    }

    pub fn require_apple_id(&self) -> Result<&str> {
        self.apple_id
            .as_deref()
            .ok_or(Error::MissingConfigKey("apple_id"))
    }

    pub fn require_prefix(&self) -> Result<&str> {
        self.prefix.as_deref().ok_or(Error::MissingConfigKey("prefix"))
    }
}

/// Resolve the base directory: `WARPSIGN_HOME` env var, else
/// `<user-home>/.warpsign`.
pub fn base_dir() -> PathBuf {
    if let Ok(custom) = std::env::var("WARPSIGN_HOME") {
        return PathBuf::from(custom);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".warpsign")
}

pub fn sessions_dir(home: &Path) -> PathBuf {
    home.join("sessions")
}

pub fn certificates_dir(home: &Path, kind: &str) -> PathBuf {
    home.join("certificates").join(kind)
}
