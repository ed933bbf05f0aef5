// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Mach-O identifier patching and code-signature stripping.
//!
//! This crate owns the narrow slice of code-signing work that happens
//! *before* the external signer runs: finding and rewriting the embedded
//! `Info.plist` identifier, and removing any pre-existing
//! `LC_CODE_SIGNATURE` load command so the signer can lay down a fresh
//! one. It does not compute or write code signatures itself.

pub mod error;
pub mod rewriter;
pub mod universal;

pub use error::{Error, Result};
pub use rewriter::{check_rewritable, patch_embedded_identifier, strip_code_signature};
pub use universal::{rewrite_macho, RewriteSummary};
