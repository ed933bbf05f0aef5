// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("plist error: {0}")]
    Plist(#[from] plist::Error),

    #[error("archive at {0} has no top-level .app bundle")]
    NoAppBundle(PathBuf),

    #[error("cycle detected while walking nested bundles at {0}")]
    NestedBundleCycle(PathBuf),

    #[error("bundle at {0} is missing Info.plist")]
    MissingInfoPlist(PathBuf),

    #[error("bundle at {0} is missing CFBundleIdentifier")]
    MissingBundleIdentifier(PathBuf),

    #[error("plist round-trip produced different output for {0}")]
    PlistRoundTripFailed(PathBuf),
}

pub type Result<T> = std::result::Result<T, Error>;
