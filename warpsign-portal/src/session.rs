// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Persisted portal session: cookie jar, widget token, and the Apple ID
//! it belongs to. Written atomically (write-to-temp + rename) after every
//! response that mutates cookies, and guarded by an advisory file lock so
//! two invocations of the tool don't race on the same file.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

#[derive(Debug, Serialize, Deserialize, Clone, Default)]
pub struct SessionData {
    pub apple_id: String,
    pub cookies: Vec<StoredCookie>,
    pub widget_token: Option<String>,
    pub hsa_trusted: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StoredCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
}

/// A single session file on disk, guarded by an advisory lock for the
/// lifetime of the handle.
pub struct SessionStore {
    path: PathBuf,
    _lock: File,
}

impl SessionStore {
    /// Open (creating the parent directory if needed) the session file
    /// for `apple_id` under `sessions_dir`, taking an exclusive advisory
    /// lock that is released when the returned handle is dropped.
    pub fn open(sessions_dir: &Path, apple_id: &str) -> Result<Self> {
        fs::create_dir_all(sessions_dir)?;
        #[cfg(unix)]
        fs::set_permissions(sessions_dir, std::fs::Permissions::from_mode_compat(0o700))?;

        let path = sessions_dir.join(format!("{}.session", sanitize_apple_id(apple_id)));

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        lock_file.lock_exclusive()?;

        Ok(Self {
            path,
            _lock: lock_file,
        })
    }

    pub fn load(&self) -> Result<Option<SessionData>> {
        if !self.path.is_file() {
            return Ok(None);
        }
        let data = fs::read(&self.path)?;
        if data.is_empty() {
            return Ok(None);
        }
        let parsed: SessionData =
            serde_json::from_slice(&data).map_err(|_| Error::InvalidSession(self.path.clone()))?;
        Ok(Some(parsed))
    }

    /// Write atomically: write to a temp file in the same directory, then
    /// rename over the target.
    pub fn save(&self, data: &SessionData) -> Result<()> {
        let serialized = serde_json::to_vec_pretty(data)?;
        let tmp_path = self.path.with_extension("session.tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            tmp.write_all(&serialized)?;
            tmp.sync_all()?;
            #[cfg(unix)]
            tmp.set_permissions(std::fs::Permissions::from_mode_compat(0o600))?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.is_file() {
            fs::remove_file(&self.path)?;
        }
        Ok(())
    }
}

fn sanitize_apple_id(apple_id: &str) -> String {
    apple_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '.' || c == '-' { c } else { '_' })
        .collect()
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_and_load_round_trips() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::open(tmp.path(), "dev@example.com").unwrap();
        assert!(store.load().unwrap().is_none());

        let data = SessionData {
            apple_id: "dev@example.com".into(),
            cookies: vec![StoredCookie {
                name: "myacinfo".into(),
                value: "abc123".into(),
                domain: "apple.com".into(),
            }],
            widget_token: Some("widget-token".into()),
            hsa_trusted: true,
        };
        store.save(&data).unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.apple_id, "dev@example.com");
        assert_eq!(loaded.cookies.len(), 1);
        assert_eq!(loaded.widget_token.as_deref(), Some("widget-token"));
    }

    #[test]
    fn sanitizes_apple_id_for_filename() {
        assert_eq!(sanitize_apple_id("dev+test@example.com"), "dev_test_example.com");
    }
}
