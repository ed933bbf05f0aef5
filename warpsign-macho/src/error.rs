// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Mach-O parse error: {0}")]
    Goblin(#[from] goblin::error::Error),

    #[error("unsupported Mach-O file: {0}")]
    Unsupported(String),

    #[error("new identifier '{new}' ({new_len} bytes) is longer than '{old}' ({old_len} bytes) and no padding headroom exists in __TEXT,__info_plist")]
    IdentifierTooLong {
        old: String,
        new: String,
        old_len: usize,
        new_len: usize,
    },

    #[error("binary has no __TEXT,__info_plist section to patch")]
    NoEmbeddedInfoPlist,

    #[error("binary has no __LINKEDIT segment")]
    MissingLinkedit,
}

pub type Result<T> = std::result::Result<T, Error>;
