// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Archive I/O, the plist/entitlements codec, and the app bundle data
//! model shared by the rest of WarpSign.

pub mod archive;
pub mod bundle;
pub mod error;
pub mod plist_codec;
pub mod signing_plan;
pub mod team_context;

pub use bundle::{build_inventory, find_root_app, AppBundle, BundleKind};
pub use error::{Error, Result};
pub use plist_codec::{PlistDocument, PlistFormat};
pub use signing_plan::{is_nested, MachORewrite, SigningPlan};
pub use team_context::{
    AppGroup, CapabilityKey, Certificate, CertificateKind, ICloudContainer, Identifier,
    Profile, ProfileKey, TeamContext,
};
